//! BDD step definitions for cluster orchestration.

use nebula::{OrchestratorError, TerminalState, UpOptions};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{ClusterOutcome, INVENTORY, OrchestratorContext};

/// Probe budget used by every scenario.
const PROBE_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("terraform succeeds at every stage")]
fn terraform_succeeds(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    orchestrator_context.runner.push_success();
    orchestrator_context.runner.push_success();
    orchestrator_context
}

#[given("terraform init succeeds")]
fn terraform_init_succeeds(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    orchestrator_context.runner.push_success();
    orchestrator_context
}

#[given("terraform apply fails with exit code \"{code}\"")]
fn terraform_apply_fails(orchestrator_context: OrchestratorContext, code: i32) -> OrchestratorContext {
    orchestrator_context.runner.push_failure(code);
    orchestrator_context
}

#[given("the nodes fail \"{count}\" connectivity probes")]
fn nodes_fail_probes(orchestrator_context: OrchestratorContext, count: u32) -> OrchestratorContext {
    for _ in 0..count {
        orchestrator_context.runner.push_failure(4);
    }
    orchestrator_context
}

#[given("the nodes then answer the connectivity probe")]
fn nodes_answer(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    orchestrator_context.runner.push_success();
    orchestrator_context
}

#[given("the playbook succeeds")]
fn playbook_succeeds(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    orchestrator_context.runner.push_success();
    orchestrator_context
}

#[when("I bring the cluster up with a dry run")]
fn bring_up_dry_run(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    let result = orchestrator_context
        .orchestrator(PROBE_ATTEMPTS)
        .up(&UpOptions::dry_run());
    record(orchestrator_context, result)
}

#[when("I bring the cluster up")]
fn bring_up(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    let result = orchestrator_context
        .orchestrator(PROBE_ATTEMPTS)
        .up(&UpOptions::default());
    record(orchestrator_context, result)
}

#[when("I destroy the cluster")]
fn destroy(orchestrator_context: OrchestratorContext) -> OrchestratorContext {
    let result = orchestrator_context.orchestrator(PROBE_ATTEMPTS).destroy();
    record(orchestrator_context, result)
}

fn record<PE, CE>(
    mut context: OrchestratorContext,
    result: Result<TerminalState, OrchestratorError<PE, CE>>,
) -> OrchestratorContext
where
    PE: std::error::Error + 'static,
    CE: std::error::Error + 'static,
{
    context.outcome = Some(match result {
        Ok(state) => ClusterOutcome { state, error: None },
        Err(err) => ClusterOutcome {
            state: err.terminal_state(),
            error: Some(err.to_string()),
        },
    });
    context
}

fn outcome(context: &OrchestratorContext) -> Result<&ClusterOutcome, StepError> {
    context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("missing outcome")))
}

#[then("the terminal state is \"{state}\"")]
fn terminal_state_is(orchestrator_context: &OrchestratorContext, state: String) -> Result<(), StepError> {
    let actual = outcome(orchestrator_context)?;
    if actual.state.to_string() == state {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected state {state}, got {} ({:?})",
            actual.state, actual.error
        )))
    }
}

#[then("the error mentions \"{text}\"")]
fn error_mentions(orchestrator_context: &OrchestratorContext, text: String) -> Result<(), StepError> {
    match &outcome(orchestrator_context)?.error {
        Some(message) if message.contains(&text) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected error mentioning {text:?}, got {other:?}"
        ))),
    }
}

#[then("terraform ran \"{stages}\"")]
fn terraform_ran(orchestrator_context: &OrchestratorContext, stages: String) -> Result<(), StepError> {
    let expected: Vec<String> = stages.split(',').map(str::to_owned).collect();
    let actual = orchestrator_context.terraform_stages();
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected terraform stages {expected:?}, got {actual:?}"
        )))
    }
}

#[then("no ansible command ran")]
fn no_ansible(orchestrator_context: &OrchestratorContext) -> Result<(), StepError> {
    let runs = orchestrator_context.runs_of("ansible") + orchestrator_context.runs_of("ansible-playbook");
    if runs == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no ansible runs, got {:?}",
            orchestrator_context.runner.commands()
        )))
    }
}

#[then("\"{count}\" connectivity probes ran")]
fn probes_ran(orchestrator_context: &OrchestratorContext, count: usize) -> Result<(), StepError> {
    let probes = orchestrator_context.runs_of("ansible");
    if probes == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} probes, got {probes}"
        )))
    }
}

#[then("the playbook never ran")]
fn playbook_never_ran(orchestrator_context: &OrchestratorContext) -> Result<(), StepError> {
    if orchestrator_context.runs_of("ansible-playbook") == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "ansible-playbook should not run",
        )))
    }
}

#[then("the playbook ran against the copied inventory")]
fn playbook_used_inventory(orchestrator_context: &OrchestratorContext) -> Result<(), StepError> {
    let seen = orchestrator_context.playbook_inventory();
    if seen.as_deref() == Some(INVENTORY) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected copied inventory, playbook saw {seen:?}"
        )))
    }
}

#[then("every sandbox has been removed")]
fn sandboxes_removed(orchestrator_context: &OrchestratorContext) -> Result<(), StepError> {
    let leftovers = std::fs::read_dir(&orchestrator_context.temp_root)
        .map_err(|err| StepError::Assertion(format!("read temp root: {err}")))?
        .count();
    if leftovers == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected empty temp root, found {leftovers} entries"
        )))
    }
}
