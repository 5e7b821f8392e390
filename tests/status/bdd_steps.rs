//! BDD step definitions for `nebula status`.

use nebula::{ClusterReport, StatusAggregator};
use rstest_bdd_macros::{given, then, when};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use super::test_helpers::{PROJECT, ReportOutcome, StatusContext, node_id};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a node \"{name}\" of type \"{instance_type}\" in \"{zone}\" priced at \"{price}\"")]
fn priced_node(
    status_context: StatusContext,
    name: String,
    instance_type: String,
    zone: String,
    price: Decimal,
) -> StatusContext {
    status_context.add_priced_node(&name, &instance_type, &zone, price);
    status_context
}

#[given("a node \"{name}\" of type \"{instance_type}\" in \"{zone}\" with no price data")]
fn unpriced_node(
    status_context: StatusContext,
    name: String,
    instance_type: String,
    zone: String,
) -> StatusContext {
    status_context.add_node(&name, &instance_type, &zone, 1);
    status_context
}

#[given("node \"{name}\" is scheduled for reclamation")]
fn node_reclaimed(status_context: StatusContext, name: String) -> StatusContext {
    status_context.stage(|cloud| cloud.with_interrupted(&node_id(&name)));
    status_context
}

#[given("node discovery fails")]
fn discovery_fails(status_context: StatusContext) -> StatusContext {
    status_context.stage(nebula::test_support::FakeCloud::with_discovery_failure);
    status_context
}

#[when("I request the cluster status")]
fn request_status(mut status_context: StatusContext) -> Result<StatusContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let aggregator = StatusAggregator::new(status_context.take_cloud());
    let result = runtime.block_on(aggregator.report(PROJECT));
    status_context.report = Some(match result {
        Ok(report) => ReportOutcome::Report(report),
        Err(err) => ReportOutcome::Failure(err.to_string()),
    });
    Ok(status_context)
}

fn report(context: &StatusContext) -> Result<&ClusterReport, StepError> {
    match &context.report {
        Some(ReportOutcome::Report(report)) => Ok(report),
        Some(ReportOutcome::Failure(message)) => Err(StepError::Assertion(format!(
            "status request failed: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing report"))),
    }
}

fn expect_decimal(label: &str, actual: Decimal, expected: &str) -> Result<(), StepError> {
    let wanted: Decimal = expected
        .parse()
        .map_err(|err| StepError::Assertion(format!("bad decimal {expected:?}: {err}")))?;
    if actual == wanted {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {label} {wanted}, got {actual}"
        )))
    }
}

#[then("the report has \"{count}\" rows")]
fn report_rows(status_context: &StatusContext, count: usize) -> Result<(), StepError> {
    let rows = report(status_context)?.nodes.len();
    if rows == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} rows, got {rows}"
        )))
    }
}

#[then("the hourly burn is \"{amount}\"")]
fn hourly_burn(status_context: &StatusContext, amount: String) -> Result<(), StepError> {
    expect_decimal("hourly burn", report(status_context)?.hourly_burn, &amount)
}

#[then("the monthly estimate is \"{amount}\"")]
fn monthly_estimate(status_context: &StatusContext, amount: String) -> Result<(), StepError> {
    expect_decimal(
        "monthly estimate",
        report(status_context)?.monthly_estimate(),
        &amount,
    )
}

#[then("the report ends with \"{line}\"")]
fn report_ends_with(status_context: &StatusContext, line: String) -> Result<(), StepError> {
    let rendered = report(status_context)?.render();
    if rendered.ends_with(&line) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected report to end with {line:?}, got:\n{rendered}"
        )))
    }
}

#[then("row \"{row}\" shows price \"{price}\"")]
fn row_price(status_context: &StatusContext, row: usize, price: String) -> Result<(), StepError> {
    let status = row_at(report(status_context)?, row)?;
    let shown = status
        .price
        .map_or_else(|| String::from("unknown"), |value| value.to_string());
    if shown == price {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected row {row} price {price}, got {shown}"
        )))
    }
}

#[then("row \"{row}\" shows health \"{health}\"")]
fn row_health(status_context: &StatusContext, row: usize, health: String) -> Result<(), StepError> {
    let status = row_at(report(status_context)?, row)?;
    let shown = status.health.to_string();
    if shown == health {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected row {row} health {health}, got {shown}"
        )))
    }
}

#[then("the status request fails")]
fn status_fails(status_context: &StatusContext) -> Result<(), StepError> {
    match &status_context.report {
        Some(ReportOutcome::Failure(_)) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected failure, got {other:?}"
        ))),
    }
}

fn row_at(report: &ClusterReport, row: usize) -> Result<&nebula::NodeStatus, StepError> {
    row.checked_sub(1)
        .and_then(|index| report.nodes.get(index))
        .ok_or_else(|| StepError::Assertion(format!("missing row {row}")))
}
