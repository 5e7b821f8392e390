//! Live cost and health report for the running cluster.
//!
//! Every node's spot price and interruption status are fetched concurrently.
//! A failed fetch degrades that one cell to `unknown`; it never aborts the
//! report or the sibling fetches.

use std::fmt;

use futures_util::future::join_all;
use rust_decimal::Decimal;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cloud::{CloudError, CloudProvider, NodeRecord, NodeState};

/// States included in the status report.
pub const REPORTED_STATES: [NodeState; 2] = [NodeState::Running, NodeState::Pending];

const HOURS_PER_MONTH: u32 = 24 * 30;

/// Health of a node as far as spot reclamation is concerned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Health {
    /// No reclamation event pending.
    Healthy,
    /// The provider has posted a stop event.
    Reclaimed,
    /// The interruption status could not be fetched.
    Unknown,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "Healthy",
            Self::Reclaimed => "Reclaimed",
            Self::Unknown => "unknown",
        })
    }
}

/// One row of the report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeStatus {
    /// Discovered node.
    pub node: NodeRecord,
    /// Live hourly price; `None` when the fetch failed.
    pub price: Option<Decimal>,
    /// Reclamation health.
    pub health: Health,
}

/// Point-in-time cost and health summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterReport {
    /// Project tag the nodes were discovered by.
    pub project_tag: String,
    /// Rows in discovery order.
    pub nodes: Vec<NodeStatus>,
    /// Sum of every fetched price.
    pub hourly_burn: Decimal,
}

impl ClusterReport {
    /// Hourly burn extrapolated over a 30-day month.
    #[must_use]
    pub fn monthly_estimate(&self) -> Decimal {
        self.hourly_burn * Decimal::from(HOURS_PER_MONTH)
    }

    /// Renders the header, node table, and burn summary.
    #[must_use]
    pub fn render(&self) -> String {
        let rows = self.nodes.iter().map(StatusRow::from);
        let mut table = Table::new(rows);
        table.with(Style::blank());

        format!(
            "Nebula Cluster: {}\n{table}\n{}",
            self.project_tag,
            self.burn_line()
        )
    }

    /// The `Total Estimated Burn` summary line.
    #[must_use]
    pub fn burn_line(&self) -> String {
        format!(
            "Total Estimated Burn: ${:.4}/hr (~${:.2}/month)",
            self.hourly_burn,
            self.monthly_estimate()
        )
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    instance_type: String,
    #[tabled(rename = "AZ")]
    zone: String,
    #[tabled(rename = "LIVE PRICE")]
    price: String,
    #[tabled(rename = "STATE")]
    state: &'static str,
    #[tabled(rename = "HEALTH")]
    health: String,
}

impl From<&NodeStatus> for StatusRow {
    fn from(status: &NodeStatus) -> Self {
        Self {
            name: status.node.name().to_owned(),
            instance_type: status.node.instance_type.clone(),
            zone: status.node.zone.clone(),
            price: status
                .price
                .map_or_else(|| String::from("unknown"), |price| format!("${price:.4}/hr")),
            state: status.node.state.as_str(),
            health: status.health.to_string(),
        }
    }
}

/// Builds [`ClusterReport`]s from a [`CloudProvider`].
#[derive(Debug)]
pub struct StatusAggregator<C> {
    cloud: C,
}

impl<C: CloudProvider> StatusAggregator<C> {
    /// Creates an aggregator over `cloud`.
    #[must_use]
    pub const fn new(cloud: C) -> Self {
        Self { cloud }
    }

    /// Returns the cloud provider.
    #[must_use]
    pub const fn cloud(&self) -> &C {
        &self.cloud
    }

    /// Discovers the project's nodes and fetches their price and health.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] only when node discovery fails.
    pub async fn report(&self, project_tag: &str) -> Result<ClusterReport, CloudError> {
        let nodes = self
            .cloud
            .describe_nodes(project_tag, &REPORTED_STATES)
            .await?;
        tracing::debug!(count = nodes.len(), "discovered nodes");

        let rows = join_all(nodes.into_iter().map(|node| self.inspect(node))).await;
        let hourly_burn = rows.iter().filter_map(|row| row.price).sum();
        Ok(ClusterReport {
            project_tag: project_tag.to_owned(),
            nodes: rows,
            hourly_burn,
        })
    }

    async fn inspect(&self, node: NodeRecord) -> NodeStatus {
        let (fetched_price, fetched_signal) = tokio::join!(
            self.cloud.spot_price(&node.instance_type, &node.zone),
            self.cloud.interruption_status(&node.id),
        );

        let price = match fetched_price {
            Ok(point) => Some(point.price),
            Err(err) => {
                tracing::warn!(node = %node.id, error = %err, "spot price unavailable");
                None
            }
        };
        let health = match fetched_signal {
            Ok(signal) if signal.interrupted => Health::Reclaimed,
            Ok(_) => Health::Healthy,
            Err(err) => {
                tracing::warn!(node = %node.id, error = %err, "interruption status unavailable");
                Health::Unknown
            }
        };
        NodeStatus {
            node,
            price,
            health,
        }
    }
}
