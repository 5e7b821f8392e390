//! Shared fixtures for status and reaper scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};
use nebula::test_support::{FakeCloud, node_record};
use nebula::{ClusterReport, SessionReport};
use rstest::fixture;
use rust_decimal::Decimal;

pub const PROJECT: &str = "nebula";

/// Fixed clock for session cost scenarios.
pub fn session_clock() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(20_000)
}

#[derive(Clone, Debug)]
pub enum ReportOutcome {
    Report(ClusterReport),
    Failure(String),
}

#[derive(Clone, Debug)]
pub enum SessionOutcome {
    Session(SessionReport),
    Failure(String),
}

#[derive(Clone, Debug, Default)]
pub struct StatusContext {
    pub cloud: Rc<RefCell<FakeCloud>>,
    pub report: Option<ReportOutcome>,
    pub session: Option<SessionOutcome>,
    pub terminated: Vec<String>,
}

impl StatusContext {
    /// Applies a builder step to the staged cloud.
    pub fn stage(&self, step: impl FnOnce(FakeCloud) -> FakeCloud) {
        let staged = self.cloud.take();
        *self.cloud.borrow_mut() = step(staged);
    }

    /// Adds a running node launched `hours` before the session clock.
    pub fn add_node(&self, name: &str, instance_type: &str, zone: &str, hours: i64) {
        let launched = session_clock() - TimeDelta::hours(hours);
        let node = node_record(&node_id(name), Some(name), instance_type, zone, launched);
        self.stage(|cloud| cloud.with_node(node));
    }

    /// Adds a node with a live price.
    pub fn add_priced_node(&self, name: &str, instance_type: &str, zone: &str, price: Decimal) {
        self.add_node(name, instance_type, zone, 1);
        self.stage(|cloud| cloud.with_price(instance_type, zone, price));
    }

    /// Hands the staged cloud over to the code under test.
    pub fn take_cloud(&self) -> FakeCloud {
        self.cloud.take()
    }
}

/// Instance id derived from a node name.
pub fn node_id(name: &str) -> String {
    format!("i-{name}")
}

#[fixture]
pub fn status_context() -> StatusContext {
    StatusContext::default()
}
