//! External engine execution with live, labelled output streaming.
//!
//! Terraform and Ansible run as opaque subprocesses. The [`CommandRunner`]
//! seam lets drivers be exercised with scripted fakes, while
//! [`StreamingCommandRunner`] forwards every output line to an
//! [`OutputSink`] as it arrives.

mod invocation;
mod streaming;

pub use invocation::EngineInvocation;
pub use streaming::{OutputSink, StdioSink, Stream, StreamingCommandRunner};

use thiserror::Error;

/// Errors surfaced while running an external engine.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProcessError {
    /// Raised when the binary cannot be started (missing, not executable).
    #[error("failed to launch {program}: {message}")]
    Launch {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the engine ran and reported failure.
    #[error("{program} exited with status {status_text}")]
    Execution {
        /// Program that failed.
        program: String,
        /// Exit code reported by the OS; `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
    },
    /// Raised when the child process cannot be reaped.
    #[error("failed to wait for {program}: {message}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

impl ProcessError {
    /// Builds an [`ProcessError::Execution`] from an exit code.
    #[must_use]
    pub fn execution(program: impl Into<String>, exit_code: Option<i32>) -> Self {
        let status_text =
            exit_code.map_or_else(|| String::from("unknown"), |code| code.to_string());
        Self::Execution {
            program: program.into(),
            exit_code,
            status_text,
        }
    }

    /// Returns the exit code when the engine ran and failed.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Execution { exit_code, .. } => *exit_code,
            Self::Launch { .. } | Self::Wait { .. } => None,
        }
    }
}

/// Abstraction over engine execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs the invocation to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Launch`] if the program cannot be started and
    /// [`ProcessError::Execution`] if it exits unsuccessfully.
    fn run(&self, invocation: &EngineInvocation) -> Result<(), ProcessError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &EngineInvocation) -> Result<(), ProcessError> {
        (**self).run(invocation)
    }
}
