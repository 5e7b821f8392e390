//! Terraform stage driver.
//!
//! Every call materialises a fresh copy of the bundled definitions, runs
//! `terraform init` followed by the requested subcommand, and removes the
//! sandbox when it returns. Remote state lives in the S3 backend declared by
//! the definitions, so nothing local survives between runs.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::assets::{AssetBundle, TERRAFORM_BUNDLE};
use crate::process::{CommandRunner, EngineInvocation, ProcessError};
use crate::sandbox::{self, ExtractionError};

const TERRAFORM_LABEL: &str = "TF";

/// Engine environment shared by every Terraform invocation.
const TERRAFORM_ENV: [(&str, &str); 3] = [
    ("TF_IN_AUTOMATION", "true"),
    ("NO_COLOR", "true"),
    ("TF_INPUT", "false"),
];

/// Named stage of a Terraform run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// `terraform init`.
    Init,
    /// `terraform plan`.
    Plan,
    /// `terraform apply -auto-approve`.
    Apply,
    /// `terraform destroy -auto-approve`.
    Destroy,
}

impl Stage {
    /// Arguments passed to Terraform for this stage.
    #[must_use]
    pub const fn args(self) -> &'static [&'static str] {
        match self {
            Self::Init => &["init"],
            Self::Plan => &["plan"],
            Self::Apply => &["apply", "-auto-approve"],
            Self::Destroy => &["destroy", "-auto-approve"],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Errors raised while driving Terraform.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The bundled definitions could not be written out.
    #[error("failed to prepare terraform workspace: {0}")]
    Extraction(#[from] ExtractionError),
    /// A Terraform stage failed to start or exited unsuccessfully.
    #[error("terraform {stage} failed: {source}")]
    Stage {
        /// Stage that failed.
        stage: Stage,
        /// Underlying process failure.
        #[source]
        source: ProcessError,
    },
}

/// Infrastructure capability used by the cluster orchestrator.
pub trait Provisioner {
    /// Error returned by every operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Shows the changes `apply` would make.
    ///
    /// # Errors
    ///
    /// Returns the provisioner error when the plan cannot be produced.
    fn plan(&self) -> Result<(), Self::Error>;

    /// Creates or updates the cluster infrastructure.
    ///
    /// # Errors
    ///
    /// Returns the provisioner error when the apply fails.
    fn apply(&self) -> Result<(), Self::Error>;

    /// Tears down every resource the definitions own.
    ///
    /// # Errors
    ///
    /// Returns the provisioner error when the destroy fails.
    fn destroy(&self) -> Result<(), Self::Error>;
}

/// Runs the bundled Terraform definitions through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct TerraformDriver<R> {
    runner: R,
    terraform_bin: String,
    bundle: &'static AssetBundle,
    temp_root: Utf8PathBuf,
    artifacts_dir: Utf8PathBuf,
    project_tag: String,
}

impl<R: CommandRunner> TerraformDriver<R> {
    /// Creates a driver for the embedded Terraform bundle.
    ///
    /// `artifacts_dir` is where `apply` writes the inventory and SSH key.
    #[must_use]
    pub fn new(
        runner: R,
        terraform_bin: impl Into<String>,
        temp_root: impl Into<Utf8PathBuf>,
        artifacts_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            runner,
            terraform_bin: terraform_bin.into(),
            bundle: &TERRAFORM_BUNDLE,
            temp_root: temp_root.into(),
            artifacts_dir: artifacts_dir.into(),
            project_tag: String::from("nebula"),
        }
    }

    /// Sets the value of the `Project` tag applied to every resource.
    #[must_use]
    pub fn with_project_tag(mut self, project_tag: impl Into<String>) -> Self {
        self.project_tag = project_tag.into();
        self
    }

    /// Materialises the bundle, then runs `init` and `stage` in order.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Extraction`] if the workspace cannot be
    /// written and [`ProvisionError::Stage`] naming the first stage that
    /// failed. A failed `init` stops before `stage` runs.
    pub fn execute(&self, stage: Stage) -> Result<(), ProvisionError> {
        let sandbox = sandbox::materialize(self.bundle, &self.temp_root)?;
        tracing::info!(%stage, work_dir = %sandbox.path(), "running terraform");

        for current in [Stage::Init, stage] {
            let invocation = self.invocation(sandbox.path(), current);
            self.runner
                .run(&invocation)
                .map_err(|source| ProvisionError::Stage {
                    stage: current,
                    source,
                })?;
            tracing::debug!(stage = %current, "terraform stage complete");
        }
        Ok(())
    }

    fn invocation(&self, work_dir: &Utf8Path, stage: Stage) -> EngineInvocation {
        EngineInvocation::new(TERRAFORM_LABEL, self.terraform_bin.as_str(), work_dir)
            .args(stage.args().iter().copied())
            .envs(&TERRAFORM_ENV)
            .env("TF_VAR_artifacts_dir", self.artifacts_dir.as_str())
            .env("TF_VAR_project_tag", self.project_tag.as_str())
    }
}

impl<R: CommandRunner> Provisioner for TerraformDriver<R> {
    type Error = ProvisionError;

    fn plan(&self) -> Result<(), Self::Error> {
        self.execute(Stage::Plan)
    }

    fn apply(&self) -> Result<(), Self::Error> {
        self.execute(Stage::Apply)
    }

    fn destroy(&self) -> Result<(), Self::Error> {
        self.execute(Stage::Destroy)
    }
}
