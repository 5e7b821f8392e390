//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::logging::LogFormat;

/// Settings for every `nebula` command, derived from environment variables
/// and configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "NEBULA",
    discovery(
        app_name = "nebula",
        env_var = "NEBULA_CONFIG_PATH",
        config_file_name = "nebula.toml",
        dotfile_name = ".nebula.toml",
        project_file_name = "nebula.toml"
    )
)]
pub struct NebulaConfig {
    /// Value of the `Project` tag identifying cluster resources.
    #[ortho_config(default = "nebula".to_owned())]
    pub project_tag: String,
    /// AWS region hosting the cluster.
    #[ortho_config(default = "us-west-1".to_owned())]
    pub region: String,
    /// Named AWS credentials profile. Falls back to the CLI's default chain.
    pub aws_profile: Option<String>,
    /// Path to the `aws` executable.
    #[ortho_config(default = "aws".to_owned())]
    pub aws_bin: String,
    /// Path to the `terraform` executable.
    #[ortho_config(default = "terraform".to_owned())]
    pub terraform_bin: String,
    /// Path to the `ansible` executable used for connectivity checks.
    #[ortho_config(default = "ansible".to_owned())]
    pub ansible_bin: String,
    /// Path to the `ansible-playbook` executable.
    #[ortho_config(default = "ansible-playbook".to_owned())]
    pub ansible_playbook_bin: String,
    /// Playbook applied after provisioning, relative to the bundled playbooks.
    #[ortho_config(default = "cluster-playbook.yml".to_owned())]
    pub playbook: String,
    /// Directory where Terraform writes the inventory and SSH key. Relative
    /// paths resolve against the working directory.
    #[ortho_config(default = "terraform".to_owned())]
    pub artifacts_dir: String,
    /// Connectivity attempts before configuration gives up.
    #[ortho_config(default = 5)]
    pub readiness_attempts: u32,
    /// Seconds between connectivity attempts.
    #[ortho_config(default = 10)]
    pub readiness_delay_secs: u64,
    /// Default log filter when `RUST_LOG` is unset.
    #[ortho_config(default = "info".to_owned())]
    pub log_level: String,
    /// Log output format: `pretty` or `json`.
    #[ortho_config(default = "pretty".to_owned())]
    pub log_format: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn guidance(&self) -> String {
        format!(
            "{}: set {} or add {} to nebula.toml",
            self.description, self.env_var, self.toml_key
        )
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 8] = [
    FieldMetadata::new("project tag", "NEBULA_PROJECT_TAG", "project_tag"),
    FieldMetadata::new("AWS region", "NEBULA_REGION", "region"),
    FieldMetadata::new("aws binary", "NEBULA_AWS_BIN", "aws_bin"),
    FieldMetadata::new("terraform binary", "NEBULA_TERRAFORM_BIN", "terraform_bin"),
    FieldMetadata::new("ansible binary", "NEBULA_ANSIBLE_BIN", "ansible_bin"),
    FieldMetadata::new(
        "ansible-playbook binary",
        "NEBULA_ANSIBLE_PLAYBOOK_BIN",
        "ansible_playbook_bin",
    ),
    FieldMetadata::new("playbook", "NEBULA_PLAYBOOK", "playbook"),
    FieldMetadata::new("artifacts directory", "NEBULA_ARTIFACTS_DIR", "artifacts_dir"),
];

impl NebulaConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("nebula")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn required_values(&self) -> [&str; 8] {
        [
            &self.project_tag,
            &self.region,
            &self.aws_bin,
            &self.terraform_bin,
            &self.ansible_bin,
            &self.ansible_playbook_bin,
            &self.playbook,
            &self.artifacts_dir,
        ]
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply the offending value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is blank
    /// and [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in self.required_values().into_iter().zip(&REQUIRED_FIELDS) {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(metadata.guidance()));
            }
        }
        if self.readiness_attempts == 0 {
            return Err(ConfigError::Invalid(
                FieldMetadata::new(
                    "readiness attempts must be at least 1",
                    "NEBULA_READINESS_ATTEMPTS",
                    "readiness_attempts",
                )
                .guidance(),
            ));
        }
        self.log_format()?;
        Ok(())
    }

    /// Delay between connectivity attempts.
    #[must_use]
    pub const fn readiness_delay(&self) -> Duration {
        Duration::from_secs(self.readiness_delay_secs)
    }

    /// Parsed log output format.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unrecognised format.
    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format.parse::<LogFormat>().map_err(|_| {
            ConfigError::Invalid(
                FieldMetadata::new(
                    "log format must be `pretty` or `json`",
                    "NEBULA_LOG_FORMAT",
                    "log_format",
                )
                .guidance(),
            )
        })
    }

    /// Resolves the artifacts directory against `cwd`.
    #[must_use]
    pub fn artifacts_dir_in(&self, cwd: &Utf8Path) -> Utf8PathBuf {
        let configured = Utf8Path::new(self.artifacts_dir.trim());
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            cwd.join(configured)
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
