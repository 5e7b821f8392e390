//! BDD scenarios for cluster orchestration.

use rstest_bdd_macros::scenario;

use super::test_helpers::{OrchestratorContext, orchestrator_context};

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Dry run only plans the infrastructure"
)]
fn scenario_dry_run(orchestrator_context: OrchestratorContext) {
    drop(orchestrator_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Apply failure prevents configuration"
)]
fn scenario_apply_failure(orchestrator_context: OrchestratorContext) {
    drop(orchestrator_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Unreachable nodes leave the cluster provisioned"
)]
fn scenario_unreachable_nodes(orchestrator_context: OrchestratorContext) {
    drop(orchestrator_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Cluster comes up after a slow start"
)]
fn scenario_slow_start(orchestrator_context: OrchestratorContext) {
    drop(orchestrator_context);
}

#[scenario(
    path = "tests/features/orchestrator.feature",
    name = "Destroy tears the infrastructure down"
)]
fn scenario_destroy(orchestrator_context: OrchestratorContext) {
    drop(orchestrator_context);
}
