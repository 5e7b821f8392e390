//! Build script for the `nebula` man page and embedded asset tables.
//!
//! The packaging pipeline expects the man page to be available from the
//! build output directory, so we generate it using clap-mangen here. The
//! Terraform and Ansible trees under `assets/` are compiled into static
//! `AssetEntry` tables so the binary carries them without touching the source
//! checkout at run time.

use std::env;
use std::fmt::Write as _;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::CommandFactory;
use clap_mangen::Man;
use walkdir::WalkDir;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

type BuildResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> BuildResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=assets")?;

    let out_dir = env::var("OUT_DIR").map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
    })?;
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")?;
    let out = Dir::open_ambient_dir(&out_dir, ambient_authority())?;

    let mut buffer = Vec::new();
    Man::new(Cli::command()).render(&mut buffer)?;
    out.write("nebula.1", &buffer)?;

    let assets_root = Utf8PathBuf::from(manifest_dir).join("assets");
    let mut tables = String::new();
    // Terraform keeps its `terraform/` prefix; the engine root is nested.
    write_table(
        &mut tables,
        "TERRAFORM_ENTRIES",
        &assets_root,
        &assets_root.join("terraform"),
    )?;
    write_table(
        &mut tables,
        "ANSIBLE_ENTRIES",
        &assets_root.join("ansible"),
        &assets_root.join("ansible"),
    )?;
    out.write("bundles.rs", tables)?;

    Ok(())
}

fn write_table(
    target: &mut String,
    name: &str,
    strip_prefix: &Utf8Path,
    walk_root: &Utf8Path,
) -> BuildResult<()> {
    writeln!(target, "pub(crate) static {name}: &[AssetEntry] = &[")?;
    for entry in WalkDir::new(walk_root).sort_by_file_name() {
        let entry = entry?;
        let path = Utf8Path::from_path(entry.path())
            .ok_or_else(|| format!("asset path is not UTF-8: {}", entry.path().display()))?;
        let relative = path.strip_prefix(strip_prefix)?;
        if relative.as_str().is_empty() {
            continue;
        }
        let bundle_path = relative
            .components()
            .map(|component| component.as_str())
            .collect::<Vec<_>>()
            .join("/");
        if entry.file_type().is_dir() {
            writeln!(target, "    AssetEntry::dir({bundle_path:?}),")?;
        } else {
            writeln!(
                target,
                "    AssetEntry::file({bundle_path:?}, include_bytes!({:?})),",
                path.as_str()
            )?;
        }
    }
    writeln!(target, "];")?;
    Ok(())
}
