//! Session cost accounting and bulk termination of project nodes.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;

use crate::cloud::{CloudError, CloudProvider, NodeRecord, NodeState};

const SECONDS_PER_HOUR: u32 = 3600;

/// Cost accrued by one node since launch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionNode {
    /// Discovered node.
    pub node: NodeRecord,
    /// Hours since launch.
    pub uptime_hours: Decimal,
    /// Live hourly price; `None` when the fetch failed.
    pub price: Option<Decimal>,
    /// `uptime_hours × price`, zero when the price is unknown.
    pub cost: Decimal,
}

/// Cost of every running node in the project.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionReport {
    /// Per-node breakdown in discovery order.
    pub nodes: Vec<SessionNode>,
    /// Sum of every node's cost.
    pub total_cost: Decimal,
}

impl SessionReport {
    /// Returns `true` when no running nodes were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identifiers of every node in the report.
    #[must_use]
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|entry| entry.node.id.clone()).collect()
    }

    /// Renders the per-node breakdown followed by the session total.
    #[must_use]
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::from("No active nodes.");
        }
        let mut blocks: Vec<String> = self
            .nodes
            .iter()
            .map(|entry| {
                let price = entry
                    .price
                    .map_or_else(|| String::from("unknown"), |value| format!("${value:.4}/hr"));
                format!(
                    "Node: {} ({})\n  └─ Live Price: {price}\n  └─ Uptime:     {:.2} hours\n  └─ Spent:      ${:.4}\n",
                    entry.node.id, entry.node.instance_type, entry.uptime_hours, entry.cost
                )
            })
            .collect();
        blocks.push(format!("Total Session Cost: ${:.2}", self.total_cost));
        blocks.join("\n")
    }
}

/// Hours elapsed between `launched` and `now`, never negative.
#[must_use]
pub fn uptime_hours(launched: DateTime<Utc>, now: DateTime<Utc>) -> Decimal {
    let seconds = (now - launched).num_seconds().max(0);
    Decimal::from(seconds) / Decimal::from(SECONDS_PER_HOUR)
}

/// Computes session cost and terminates project nodes.
#[derive(Debug)]
pub struct SessionReaper<C> {
    cloud: C,
}

impl<C: CloudProvider> SessionReaper<C> {
    /// Creates a reaper over `cloud`.
    #[must_use]
    pub const fn new(cloud: C) -> Self {
        Self { cloud }
    }

    /// Returns the cloud provider.
    #[must_use]
    pub const fn cloud(&self) -> &C {
        &self.cloud
    }

    /// Prices every running node tagged `project_tag` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] when node discovery fails. Price failures are
    /// logged and counted as zero.
    pub async fn session(
        &self,
        project_tag: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionReport, CloudError> {
        let nodes = self
            .cloud
            .describe_nodes(project_tag, &[NodeState::Running])
            .await?;

        let entries = join_all(nodes.into_iter().map(|node| self.price_node(node, now))).await;
        let total_cost = entries.iter().map(|entry| entry.cost).sum();
        Ok(SessionReport {
            nodes: entries,
            total_cost,
        })
    }

    /// Terminates every node in `report`. An empty report is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] when the termination request fails.
    pub async fn terminate(&self, report: &SessionReport) -> Result<(), CloudError> {
        if report.is_empty() {
            return Ok(());
        }
        let ids = report.node_ids();
        tracing::info!(count = ids.len(), "terminating nodes");
        self.cloud.terminate_nodes(&ids).await
    }

    async fn price_node(&self, node: NodeRecord, now: DateTime<Utc>) -> SessionNode {
        let uptime = uptime_hours(node.launch_time, now);
        let price = match self.cloud.spot_price(&node.instance_type, &node.zone).await {
            Ok(point) => Some(point.price),
            Err(err) => {
                tracing::warn!(node = %node.id, error = %err, "spot price unavailable");
                None
            }
        };
        let cost = price.map_or(Decimal::ZERO, |value| uptime * value);
        SessionNode {
            node,
            uptime_hours: uptime,
            price,
            cost,
        }
    }
}
