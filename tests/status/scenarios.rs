//! BDD scenarios for cluster status and session reaping.

use rstest_bdd_macros::scenario;

use super::test_helpers::{StatusContext, status_context};

#[scenario(
    path = "tests/features/status.feature",
    name = "Burn rate sums the live prices"
)]
fn scenario_burn_rate(status_context: StatusContext) {
    drop(status_context);
}

#[scenario(
    path = "tests/features/status.feature",
    name = "Nodes without price data stay in the report"
)]
fn scenario_unknown_price(status_context: StatusContext) {
    drop(status_context);
}

#[scenario(
    path = "tests/features/status.feature",
    name = "Reclaimed nodes are flagged"
)]
fn scenario_reclaimed(status_context: StatusContext) {
    drop(status_context);
}

#[scenario(
    path = "tests/features/status.feature",
    name = "Discovery failure aborts the report"
)]
fn scenario_discovery_failure(status_context: StatusContext) {
    drop(status_context);
}

#[scenario(
    path = "tests/features/reaper.feature",
    name = "Session cost multiplies uptime by live price"
)]
fn scenario_session_cost(status_context: StatusContext) {
    drop(status_context);
}

#[scenario(
    path = "tests/features/reaper.feature",
    name = "Reaping terminates every running node"
)]
fn scenario_reap(status_context: StatusContext) {
    drop(status_context);
}

#[scenario(
    path = "tests/features/reaper.feature",
    name = "An empty session terminates nothing"
)]
fn scenario_empty_session(status_context: StatusContext) {
    drop(status_context);
}
