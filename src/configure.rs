//! Ansible stage driver.
//!
//! The driver copies the inventory and SSH key Terraform produced into a
//! fresh playbook sandbox, waits for every node to answer a ping, then runs
//! the requested playbook.

use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::assets::{ANSIBLE_BUNDLE, AssetBundle};
use crate::process::{CommandRunner, EngineInvocation, ProcessError};
use crate::readiness::{DEFAULT_PROBE_DELAY, ReadinessError, ReadinessProber};
use crate::sandbox::{self, ExtractionError, FILE_MODE};

/// Engine environment shared by every Ansible invocation.
pub const ANSIBLE_ENV: [(&str, &str); 2] = [
    ("ANSIBLE_FORCE_COLOR", "true"),
    ("ANSIBLE_HOST_KEY_CHECKING", "False"),
];

/// Inventory file written by `terraform apply`.
pub const INVENTORY_FILE: &str = "inventory.ini";

/// Private key written by `terraform apply`.
pub const KEY_FILE: &str = "nebula-key.pem";

/// Connectivity attempts made before giving up.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 5;

const KEY_MODE: u32 = 0o400;
const PLAYBOOK_LABEL: &str = "ANSIBLE";

/// Files carried from the artifacts directory into the sandbox.
const ARTIFACTS: [(&str, u32); 2] = [(INVENTORY_FILE, FILE_MODE), (KEY_FILE, KEY_MODE)];

/// Errors raised while configuring the cluster.
#[derive(Debug, Error)]
pub enum ConfigureError {
    /// The bundled playbooks could not be written out.
    #[error("failed to prepare ansible workspace: {0}")]
    Extraction(#[from] ExtractionError),
    /// A Terraform artifact exists but could not be copied.
    #[error("failed to copy artifact {path}: {message}")]
    Artifact {
        /// Artifact path.
        path: Utf8PathBuf,
        /// Underlying I/O error text.
        message: String,
    },
    /// The nodes never answered the connectivity probe.
    #[error("cluster connectivity check failed: {0}")]
    Connectivity(#[source] ReadinessError),
    /// The playbook failed to start or exited unsuccessfully.
    #[error("playbook {playbook} failed: {source}")]
    Playbook {
        /// Playbook path relative to the bundle root.
        playbook: String,
        /// Underlying process failure.
        #[source]
        source: ProcessError,
    },
}

/// Configuration capability used by the cluster orchestrator.
pub trait Configurator {
    /// Error returned by every operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Applies the playbook at `path`, relative to the bundled playbooks.
    ///
    /// # Errors
    ///
    /// Returns the configurator error when the nodes are unreachable or the
    /// playbook fails.
    fn playbook(&self, path: &str) -> Result<(), Self::Error>;
}

/// Runs bundled Ansible playbooks through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct AnsibleDriver<R> {
    runner: R,
    ansible_bin: String,
    ansible_playbook_bin: String,
    bundle: &'static AssetBundle,
    temp_root: Utf8PathBuf,
    artifacts_dir: Utf8PathBuf,
    probe_attempts: u32,
    probe_delay: Duration,
}

impl<R: CommandRunner> AnsibleDriver<R> {
    /// Creates a driver for the embedded playbooks.
    #[must_use]
    pub fn new(
        runner: R,
        temp_root: impl Into<Utf8PathBuf>,
        artifacts_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            runner,
            ansible_bin: String::from("ansible"),
            ansible_playbook_bin: String::from("ansible-playbook"),
            bundle: &ANSIBLE_BUNDLE,
            temp_root: temp_root.into(),
            artifacts_dir: artifacts_dir.into(),
            probe_attempts: DEFAULT_PROBE_ATTEMPTS,
            probe_delay: DEFAULT_PROBE_DELAY,
        }
    }

    /// Overrides the `ansible` and `ansible-playbook` binaries.
    #[must_use]
    pub fn with_binaries(
        mut self,
        ansible_bin: impl Into<String>,
        ansible_playbook_bin: impl Into<String>,
    ) -> Self {
        self.ansible_bin = ansible_bin.into();
        self.ansible_playbook_bin = ansible_playbook_bin.into();
        self
    }

    /// Overrides the readiness budget.
    #[must_use]
    pub const fn with_probe(mut self, attempts: u32, delay: Duration) -> Self {
        self.probe_attempts = attempts;
        self.probe_delay = delay;
        self
    }

    fn copy_artifacts(
        &self,
        sandbox_dir: &Dir,
        sandbox_root: &Utf8Path,
    ) -> Result<(), ConfigureError> {
        let source = match Dir::open_ambient_dir(&self.artifacts_dir, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.artifacts_dir, "artifacts directory missing");
                return Ok(());
            }
            Err(err) => return Err(artifact_error(&self.artifacts_dir, &err)),
        };

        for (name, mode) in ARTIFACTS {
            let origin = self.artifacts_dir.join(name);
            let contents = match source.read(name) {
                Ok(contents) => contents,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::warn!(path = %origin, "artifact missing; skipping");
                    continue;
                }
                Err(err) => return Err(artifact_error(&origin, &err)),
            };
            let target = sandbox_root.join(name);
            sandbox::write_with_mode(sandbox_dir, name, &target, &contents, mode).map_err(
                |err| ConfigureError::Artifact {
                    path: err.path,
                    message: err.message,
                },
            )?;
            tracing::debug!(from = %origin, to = %target, "copied artifact");
        }
        Ok(())
    }

    fn playbook_invocation(&self, work_dir: &Utf8Path, playbook: &Utf8Path) -> EngineInvocation {
        EngineInvocation::new(PLAYBOOK_LABEL, self.ansible_playbook_bin.as_str(), work_dir)
            .arg("-i")
            .arg(work_dir.join(INVENTORY_FILE).as_str())
            .arg(playbook.as_str())
            .envs(&ANSIBLE_ENV)
    }
}

impl<R: CommandRunner> Configurator for AnsibleDriver<R> {
    type Error = ConfigureError;

    fn playbook(&self, path: &str) -> Result<(), Self::Error> {
        let sandbox = sandbox::materialize(self.bundle, &self.temp_root)?;
        let work_dir = sandbox.path();
        self.copy_artifacts(&sandbox.open()?, work_dir)?;

        let inventory = work_dir.join(INVENTORY_FILE);
        let attempts = ReadinessProber::new(&self.runner, self.ansible_bin.as_str())
            .with_delay(self.probe_delay)
            .probe_ready(work_dir, &inventory, self.probe_attempts)
            .map_err(ConfigureError::Connectivity)?;
        tracing::info!(attempts, playbook = path, "nodes ready; running playbook");

        let invocation = self.playbook_invocation(work_dir, &work_dir.join(path));
        self.runner
            .run(&invocation)
            .map_err(|source| ConfigureError::Playbook {
                playbook: path.to_owned(),
                source,
            })
    }
}

fn artifact_error(path: &Utf8Path, err: &io::Error) -> ConfigureError {
    ConfigureError::Artifact {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
