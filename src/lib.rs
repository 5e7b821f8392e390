//! Core library for the Nebula cluster manager.
//!
//! Nebula brings an ephemeral k3s cluster up on AWS spot instances, reports
//! its live cost and health, and tears it down again. Terraform provisions
//! the nodes and Ansible configures them; both run as external engines from
//! disposable sandboxes populated with embedded definitions.

pub mod assets;
pub mod cloud;
pub mod config;
pub mod configure;
pub mod confirm;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod provision;
pub mod readiness;
pub mod reaper;
pub mod sandbox;
pub mod status;
pub mod test_support;

pub use assets::{ANSIBLE_BUNDLE, AssetBundle, AssetEntry, AssetKind, TERRAFORM_BUNDLE};
pub use cloud::{
    AwsCli, CloudError, CloudProvider, InterruptionSignal, NodeRecord, NodeState, PricePoint,
};
pub use config::{ConfigError, NebulaConfig};
pub use configure::{AnsibleDriver, ConfigureError, Configurator};
pub use confirm::confirm;
pub use logging::{LogFormat, LoggingError};
pub use orchestrator::{ClusterOrchestrator, OrchestratorError, TerminalState, UpOptions};
pub use process::{
    CommandRunner, EngineInvocation, OutputSink, ProcessError, StdioSink, Stream,
    StreamingCommandRunner,
};
pub use provision::{ProvisionError, Provisioner, Stage, TerraformDriver};
pub use readiness::{ReadinessError, ReadinessProber};
pub use reaper::{SessionReaper, SessionReport};
pub use sandbox::{ExtractionError, Sandbox, materialize};
pub use status::{ClusterReport, Health, NodeStatus, StatusAggregator};
