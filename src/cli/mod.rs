//! Command-line interface definitions for the `nebula` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `nebula` binary.
#[derive(Debug, Parser)]
#[command(
    name = "nebula",
    about = "Manage a k3s cluster on AWS spot instances with Terraform and Ansible",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Show detailed output, including debug-level logs.
    #[arg(long, global = true)]
    pub(crate) verbose: bool,
    /// Subcommand to run.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subcommands exposed by `nebula`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Provision the cluster with Terraform and configure it with Ansible.
    #[command(name = "up", about = "Spin up the k3s cluster")]
    Up(UpCommand),
    /// Tear down the cluster and its AWS resources.
    #[command(name = "destroy", about = "Tear down the cluster and AWS resources")]
    Destroy(DestroyCommand),
    /// Show live price and health for every cluster node.
    #[command(name = "status", about = "View the current state of cluster instances")]
    Status,
    /// Report the session cost so far and terminate every running node.
    #[command(name = "reap", about = "Report session cost and terminate running nodes")]
    Reap(ReapCommand),
}

/// Arguments for the `nebula up` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct UpCommand {
    /// Preview infrastructure changes without applying them.
    #[arg(long)]
    pub(crate) dry_run: bool,
}

/// Arguments for the `nebula destroy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DestroyCommand {
    /// Skip the confirmation prompt.
    #[arg(long, short = 'f')]
    pub(crate) force: bool,
}

/// Arguments for the `nebula reap` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ReapCommand {
    /// Skip the confirmation prompt.
    #[arg(long, short = 'f')]
    pub(crate) force: bool,
}
