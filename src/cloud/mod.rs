//! Read-mostly view of the cloud account hosting the cluster.
//!
//! The status and reaper paths only need four questions answered: which
//! nodes carry the project tag, what each one currently costs, whether the
//! provider has scheduled it for reclamation, and (for reaping) how to
//! terminate them. [`CloudProvider`] captures exactly that surface so the
//! aggregators can be driven by in-memory fakes.

mod aws;

pub use aws::{AwsCli, DEFAULT_AWS_BIN};

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Tag key carrying a node's display name.
pub const NAME_TAG: &str = "Name";

/// Tag key identifying the owning project.
pub const PROJECT_TAG: &str = "Project";

/// Lifecycle state of a node as reported by the provider.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NodeState {
    /// Launch requested, not yet running.
    Pending,
    /// Running and billable.
    Running,
    /// Shutting down.
    Stopping,
    /// Stopped.
    Stopped,
    /// Terminating.
    ShuttingDown,
    /// Gone.
    Terminated,
}

impl NodeState {
    /// Provider name for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        }
    }

    /// Parses a provider state name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::Pending,
            Self::Running,
            Self::Stopping,
            Self::Stopped,
            Self::ShuttingDown,
            Self::Terminated,
        ]
        .into_iter()
        .find(|state| state.as_str() == value)
    }
}

/// A compute node discovered in the account.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeRecord {
    /// Provider instance identifier.
    pub id: String,
    /// Instance type (for example `t3.medium`).
    pub instance_type: String,
    /// Availability zone.
    pub zone: String,
    /// Launch timestamp.
    pub launch_time: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: NodeState,
    /// Resource tags.
    pub tags: BTreeMap<String, String>,
}

impl NodeRecord {
    /// Returns the `Name` tag, or `unknown` when the node has none.
    #[must_use]
    pub fn name(&self) -> &str {
        self.tags.get(NAME_TAG).map_or("unknown", String::as_str)
    }
}

/// Most recent spot price observed for an instance type in a zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PricePoint {
    /// Instance type priced.
    pub instance_type: String,
    /// Availability zone priced.
    pub zone: String,
    /// Hourly price in USD.
    pub price: Decimal,
    /// When the provider recorded the price.
    pub observed_at: DateTime<Utc>,
}

/// Whether the provider has scheduled a node for reclamation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InterruptionSignal {
    /// Node the signal refers to.
    pub node_id: String,
    /// `true` when a stop event is pending.
    pub interrupted: bool,
    /// Provider description of the event, if any.
    pub description: Option<String>,
}

/// Errors raised by cloud providers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// The provider CLI could not be started.
    #[error("failed to launch {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// The provider CLI exited unsuccessfully.
    #[error("{program} {operation} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Operation being performed.
        operation: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// The provider returned output that could not be interpreted.
    #[error("failed to parse {operation} output: {message}")]
    Parse {
        /// Operation whose output was malformed.
        operation: String,
        /// Parser error message.
        message: String,
    },
    /// No price history exists for the instance type and zone.
    #[error("no spot price data for {instance_type} in {zone}")]
    NoPriceData {
        /// Instance type requested.
        instance_type: String,
        /// Availability zone requested.
        zone: String,
    },
}

/// Future returned by cloud operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Cloud operations consumed by the status and reaper paths.
pub trait CloudProvider: Sync {
    /// Lists nodes tagged `Project=<project_tag>` in any of `states`.
    fn describe_nodes<'a>(
        &'a self,
        project_tag: &'a str,
        states: &'a [NodeState],
    ) -> CloudFuture<'a, Vec<NodeRecord>>;

    /// Fetches the current spot price for `instance_type` in `zone`.
    fn spot_price<'a>(&'a self, instance_type: &'a str, zone: &'a str)
    -> CloudFuture<'a, PricePoint>;

    /// Reports whether `node_id` has a pending reclamation event.
    fn interruption_status<'a>(&'a self, node_id: &'a str) -> CloudFuture<'a, InterruptionSignal>;

    /// Terminates every node in `node_ids`.
    fn terminate_nodes<'a>(&'a self, node_ids: &'a [String]) -> CloudFuture<'a, ()>;
}
