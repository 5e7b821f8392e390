//! Sequences provisioning and configuration for `up` and `destroy`.
//!
//! The orchestrator is a short, fail-fast state machine:
//!
//! ```text
//! up (dry run):  plan ─────────────────────────────► Planned
//! up:            apply ──► playbook ─────────────────► Ready
//!                  │          └─ failure ───────────► FailedConfig
//!                  └─ failure ───────────────────────► Failed
//! destroy:       destroy ────────────────────────────► Destroyed | Failed
//! ```
//!
//! A configuration failure leaves the provisioned cluster in place; nothing
//! is destroyed automatically.

use std::fmt;

use thiserror::Error;

use crate::configure::Configurator;
use crate::provision::{Provisioner, Stage};

/// Playbook applied after a successful `apply`.
pub const DEFAULT_PLAYBOOK: &str = "cluster-playbook.yml";

/// Options for [`ClusterOrchestrator::up`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UpOptions {
    /// Only show the plan; create nothing.
    pub dry_run: bool,
}

impl UpOptions {
    /// Options for a plan-only run.
    #[must_use]
    pub const fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// Final state reached by an orchestrated operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalState {
    /// The plan was shown; nothing changed.
    Planned,
    /// Infrastructure exists and is configured.
    Ready,
    /// Provisioning failed.
    Failed,
    /// Infrastructure exists but configuration failed.
    FailedConfig,
    /// Infrastructure was torn down.
    Destroyed,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planned => "planned",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::FailedConfig => "failed (configuration)",
            Self::Destroyed => "destroyed",
        };
        f.write_str(label)
    }
}

/// Errors surfaced by the orchestrator, generic over the capability errors.
#[derive(Debug, Error)]
pub enum OrchestratorError<ProvisionError, ConfigureError>
where
    ProvisionError: std::error::Error + 'static,
    ConfigureError: std::error::Error + 'static,
{
    /// A provisioning stage failed.
    #[error("{stage} stage failed: {source}")]
    Provision {
        /// Stage requested from the provisioner.
        stage: Stage,
        /// Provisioner error.
        #[source]
        source: ProvisionError,
    },
    /// Configuration failed after infrastructure was created.
    #[error("configure stage failed (infrastructure left in place): {source}")]
    Configure {
        /// Configurator error.
        #[source]
        source: ConfigureError,
    },
}

impl<PE, CE> OrchestratorError<PE, CE>
where
    PE: std::error::Error + 'static,
    CE: std::error::Error + 'static,
{
    /// Terminal state the failed operation ended in.
    #[must_use]
    pub const fn terminal_state(&self) -> TerminalState {
        match self {
            Self::Provision { .. } => TerminalState::Failed,
            Self::Configure { .. } => TerminalState::FailedConfig,
        }
    }
}

/// Drives a [`Provisioner`] and a [`Configurator`] through cluster workflows.
#[derive(Debug)]
pub struct ClusterOrchestrator<P, C> {
    provisioner: P,
    configurator: C,
    playbook: String,
}

impl<P, C> ClusterOrchestrator<P, C>
where
    P: Provisioner,
    C: Configurator,
{
    /// Creates an orchestrator applying [`DEFAULT_PLAYBOOK`].
    #[must_use]
    pub fn new(provisioner: P, configurator: C) -> Self {
        Self {
            provisioner,
            configurator,
            playbook: String::from(DEFAULT_PLAYBOOK),
        }
    }

    /// Overrides the playbook applied after `apply`.
    #[must_use]
    pub fn with_playbook(mut self, playbook: impl Into<String>) -> Self {
        self.playbook = playbook.into();
        self
    }

    /// Returns the provisioner.
    #[must_use]
    pub const fn provisioner(&self) -> &P {
        &self.provisioner
    }

    /// Returns the configurator.
    #[must_use]
    pub const fn configurator(&self) -> &C {
        &self.configurator
    }

    /// Brings the cluster up, or only plans it when `options.dry_run` is set.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Provision`] when `plan` or `apply` fails;
    /// the configurator is not called in that case. Returns
    /// [`OrchestratorError::Configure`] when the playbook fails.
    pub fn up(
        &self,
        options: &UpOptions,
    ) -> Result<TerminalState, OrchestratorError<P::Error, C::Error>> {
        if options.dry_run {
            tracing::info!("dry run: planning only");
            self.provisioner
                .plan()
                .map_err(|source| OrchestratorError::Provision {
                    stage: Stage::Plan,
                    source,
                })?;
            return Ok(TerminalState::Planned);
        }

        tracing::info!("provisioning cluster");
        self.provisioner
            .apply()
            .map_err(|source| OrchestratorError::Provision {
                stage: Stage::Apply,
                source,
            })?;

        tracing::info!(playbook = %self.playbook, "configuring cluster");
        self.configurator
            .playbook(&self.playbook)
            .map_err(|source| OrchestratorError::Configure { source })?;

        tracing::info!("cluster ready");
        Ok(TerminalState::Ready)
    }

    /// Tears the cluster down.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Provision`] when `destroy` fails.
    pub fn destroy(&self) -> Result<TerminalState, OrchestratorError<P::Error, C::Error>> {
        tracing::info!("destroying cluster");
        self.provisioner
            .destroy()
            .map_err(|source| OrchestratorError::Provision {
                stage: Stage::Destroy,
                source,
            })?;
        Ok(TerminalState::Destroyed)
    }
}
