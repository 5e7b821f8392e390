//! [`CloudProvider`] backed by the `aws` CLI.
//!
//! Each operation shells out to `aws ec2 ...` with `--output json` and
//! parses the response. Parsing lives in free functions so it can be tested
//! against captured payloads without a network.

mod types;

use std::ffi::OsString;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rust_decimal::Decimal;
use tokio::process::Command;

use self::types::{DescribeInstanceStatus, DescribeInstances, SpotPriceHistory};
use super::{
    CloudError, CloudFuture, CloudProvider, InterruptionSignal, NodeRecord, NodeState, PricePoint,
};

/// Default `aws` CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

/// Event code the provider posts before reclaiming a spot node.
const INSTANCE_STOP_EVENT: &str = "instance-stop";

/// Product whose spot history is queried.
const PRODUCT_DESCRIPTION: &str = "Linux/UNIX";

/// Reads cluster state through the `aws` CLI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsCli {
    aws_bin: String,
    region: String,
    profile: Option<String>,
}

impl AwsCli {
    /// Creates a provider for `region` using the default binary and profile.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            aws_bin: String::from(DEFAULT_AWS_BIN),
            region: region.into(),
            profile: None,
        }
    }

    /// Overrides the `aws` binary.
    #[must_use]
    pub fn with_binary(mut self, aws_bin: impl Into<String>) -> Self {
        self.aws_bin = aws_bin.into();
        self
    }

    /// Selects a named credentials profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Builds the full argument vector for `aws ec2 <operation> <extra>`.
    fn ec2_args<I, S>(&self, operation: &str, extra: I) -> Vec<OsString>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut args = vec![OsString::from("ec2"), OsString::from(operation)];
        args.extend(extra.into_iter().map(Into::into));
        args.push(OsString::from("--region"));
        args.push(OsString::from(&self.region));
        if let Some(profile) = &self.profile {
            args.push(OsString::from("--profile"));
            args.push(OsString::from(profile));
        }
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        args
    }

    async fn run_json(&self, operation: &str, args: Vec<OsString>) -> Result<String, CloudError> {
        tracing::debug!(program = %self.aws_bin, operation, "querying cloud");
        let output = Command::new(&self.aws_bin)
            .args(&args)
            .output()
            .await
            .map_err(|err| CloudError::Spawn {
                program: self.aws_bin.clone(),
                message: err.to_string(),
            })?;

        if !output.status.success() {
            let status_text = output
                .status
                .code()
                .map_or_else(|| String::from("unknown"), |code| code.to_string());
            return Err(CloudError::CommandFailure {
                program: self.aws_bin.clone(),
                operation: operation.to_owned(),
                status_text,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl CloudProvider for AwsCli {
    fn describe_nodes<'a>(
        &'a self,
        project_tag: &'a str,
        states: &'a [NodeState],
    ) -> CloudFuture<'a, Vec<NodeRecord>> {
        Box::pin(async move {
            let state_names: Vec<&str> = states.iter().map(|state| state.as_str()).collect();
            let args = self.ec2_args(
                "describe-instances",
                [
                    String::from("--filters"),
                    format!("Name=tag:{},Values={project_tag}", super::PROJECT_TAG),
                    format!("Name=instance-state-name,Values={}", state_names.join(",")),
                ],
            );
            let stdout = self.run_json("describe-instances", args).await?;
            parse_instances(&stdout)
        })
    }

    fn spot_price<'a>(
        &'a self,
        instance_type: &'a str,
        zone: &'a str,
    ) -> CloudFuture<'a, PricePoint> {
        Box::pin(async move {
            let since = Utc::now() - TimeDelta::hours(1);
            let args = self.ec2_args(
                "describe-spot-price-history",
                [
                    String::from("--instance-types"),
                    instance_type.to_owned(),
                    String::from("--availability-zone"),
                    zone.to_owned(),
                    String::from("--product-descriptions"),
                    String::from(PRODUCT_DESCRIPTION),
                    String::from("--start-time"),
                    since.to_rfc3339_opts(SecondsFormat::Secs, true),
                    String::from("--max-items"),
                    String::from("1"),
                ],
            );
            let stdout = self.run_json("describe-spot-price-history", args).await?;
            parse_spot_price(&stdout, instance_type, zone)
        })
    }

    fn interruption_status<'a>(&'a self, node_id: &'a str) -> CloudFuture<'a, InterruptionSignal> {
        Box::pin(async move {
            let args = self.ec2_args(
                "describe-instance-status",
                [
                    String::from("--instance-ids"),
                    node_id.to_owned(),
                    String::from("--include-all-instances"),
                ],
            );
            let stdout = self.run_json("describe-instance-status", args).await?;
            parse_interruption(&stdout, node_id)
        })
    }

    fn terminate_nodes<'a>(&'a self, node_ids: &'a [String]) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            if node_ids.is_empty() {
                return Ok(());
            }
            let mut extra = vec![String::from("--instance-ids")];
            extra.extend(node_ids.iter().cloned());
            let args = self.ec2_args("terminate-instances", extra);
            self.run_json("terminate-instances", args).await?;
            tracing::info!(count = node_ids.len(), "termination requested");
            Ok(())
        })
    }
}

fn parse_error(operation: &str, message: impl ToString) -> CloudError {
    CloudError::Parse {
        operation: operation.to_owned(),
        message: message.to_string(),
    }
}

fn parse_timestamp(operation: &str, raw: &str) -> Result<DateTime<Utc>, CloudError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|stamp| stamp.with_timezone(&Utc))
        .map_err(|err| parse_error(operation, format!("invalid timestamp {raw:?}: {err}")))
}

/// Parses `aws ec2 describe-instances` output into node records.
///
/// # Errors
///
/// Returns [`CloudError::Parse`] for malformed JSON, timestamps, or states.
pub(crate) fn parse_instances(json: &str) -> Result<Vec<NodeRecord>, CloudError> {
    const OPERATION: &str = "describe-instances";
    let payload: DescribeInstances =
        serde_json::from_str(json).map_err(|err| parse_error(OPERATION, err))?;

    payload
        .reservations
        .into_iter()
        .flat_map(|reservation| reservation.instances)
        .map(|instance| {
            let state = NodeState::parse(&instance.state.name).ok_or_else(|| {
                parse_error(OPERATION, format!("unknown state {:?}", instance.state.name))
            })?;
            Ok(NodeRecord {
                launch_time: parse_timestamp(OPERATION, &instance.launch_time)?,
                id: instance.instance_id,
                instance_type: instance.instance_type,
                zone: instance.placement.availability_zone,
                state,
                tags: instance
                    .tags
                    .into_iter()
                    .map(|tag| (tag.key, tag.value))
                    .collect(),
            })
        })
        .collect()
}

/// Parses `aws ec2 describe-spot-price-history` output, keeping the newest
/// entry.
///
/// # Errors
///
/// Returns [`CloudError::NoPriceData`] when the history is empty and
/// [`CloudError::Parse`] for malformed output.
pub(crate) fn parse_spot_price(
    json: &str,
    instance_type: &str,
    zone: &str,
) -> Result<PricePoint, CloudError> {
    const OPERATION: &str = "describe-spot-price-history";
    let payload: SpotPriceHistory =
        serde_json::from_str(json).map_err(|err| parse_error(OPERATION, err))?;

    let Some(entry) = payload.spot_price_history.into_iter().next() else {
        return Err(CloudError::NoPriceData {
            instance_type: instance_type.to_owned(),
            zone: zone.to_owned(),
        });
    };
    let price = Decimal::from_str(entry.spot_price.trim()).map_err(|err| {
        parse_error(OPERATION, format!("invalid price {:?}: {err}", entry.spot_price))
    })?;
    Ok(PricePoint {
        instance_type: instance_type.to_owned(),
        zone: zone.to_owned(),
        price,
        observed_at: parse_timestamp(OPERATION, &entry.timestamp)?,
    })
}

/// Parses `aws ec2 describe-instance-status` output for one node.
///
/// # Errors
///
/// Returns [`CloudError::Parse`] for malformed output.
pub(crate) fn parse_interruption(json: &str, node_id: &str) -> Result<InterruptionSignal, CloudError> {
    let payload: DescribeInstanceStatus = serde_json::from_str(json)
        .map_err(|err| parse_error("describe-instance-status", err))?;

    let stop_event = payload
        .instance_statuses
        .into_iter()
        .flat_map(|status| status.events)
        .find(|event| event.code == INSTANCE_STOP_EVENT);
    Ok(InterruptionSignal {
        node_id: node_id.to_owned(),
        interrupted: stop_event.is_some(),
        description: stop_event.and_then(|event| event.description),
    })
}
