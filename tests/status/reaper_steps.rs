//! BDD step definitions for `nebula reap`.

use nebula::{CloudError, SessionReaper, SessionReport};
use rstest_bdd_macros::{given, then, when};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use super::bdd_steps::StepError;
use super::test_helpers::{PROJECT, SessionOutcome, StatusContext, session_clock};

#[given(
    "a running node \"{name}\" of type \"{instance_type}\" in \"{zone}\" up for \"{hours}\" hours at \"{price}\""
)]
fn running_node(
    status_context: StatusContext,
    name: String,
    instance_type: String,
    zone: String,
    hours: i64,
    price: Decimal,
) -> StatusContext {
    status_context.add_node(&name, &instance_type, &zone, hours);
    status_context.stage(|cloud| cloud.with_price(&instance_type, &zone, price));
    status_context
}

#[when("I compute the session cost")]
fn compute_session(mut status_context: StatusContext) -> Result<StatusContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let reaper = SessionReaper::new(status_context.take_cloud());
    let result = runtime.block_on(reaper.session(PROJECT, session_clock()));
    status_context.session = Some(session_outcome(result));
    Ok(status_context)
}

#[when("I reap the session")]
fn reap_session(mut status_context: StatusContext) -> Result<StatusContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let reaper = SessionReaper::new(status_context.take_cloud());
    let result = runtime.block_on(async {
        let report = reaper.session(PROJECT, session_clock()).await?;
        reaper.terminate(&report).await?;
        Ok::<_, CloudError>(report)
    });
    status_context.session = Some(session_outcome(result));
    status_context.terminated = reaper.cloud().terminated();
    Ok(status_context)
}

fn session_outcome(result: Result<SessionReport, CloudError>) -> SessionOutcome {
    match result {
        Ok(report) => SessionOutcome::Session(report),
        Err(err) => SessionOutcome::Failure(err.to_string()),
    }
}

fn session(context: &StatusContext) -> Result<&SessionReport, StepError> {
    match &context.session {
        Some(SessionOutcome::Session(report)) => Ok(report),
        Some(SessionOutcome::Failure(message)) => Err(StepError::Assertion(format!(
            "session request failed: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing session"))),
    }
}

#[then("the session total is \"{amount}\"")]
fn session_total(status_context: &StatusContext, amount: Decimal) -> Result<(), StepError> {
    let total = session(status_context)?.total_cost;
    if total == amount {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected session total {amount}, got {total}"
        )))
    }
}

#[then("the session output ends with \"{line}\"")]
fn session_output(status_context: &StatusContext, line: String) -> Result<(), StepError> {
    let rendered = session(status_context)?.render();
    if rendered.ends_with(&line) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected output to end with {line:?}, got:\n{rendered}"
        )))
    }
}

#[then("termination was requested for \"{ids}\"")]
fn termination_requested(status_context: &StatusContext, ids: String) -> Result<(), StepError> {
    let expected: Vec<String> = ids.split(',').map(str::to_owned).collect();
    if status_context.terminated == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected termination of {expected:?}, got {:?}",
            status_context.terminated
        )))
    }
}

#[then("no termination was requested")]
fn no_termination(status_context: &StatusContext) -> Result<(), StepError> {
    if status_context.terminated.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected termination of {:?}",
            status_context.terminated
        )))
    }
}
