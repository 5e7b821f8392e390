//! Bounded retry of the cluster connectivity check.
//!
//! Freshly provisioned spot nodes take a while to accept SSH. The prober runs
//! an Ansible `ping` against the inventory with a fixed delay between
//! attempts, so the worst-case wait is `max_attempts × delay`.

use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;

use crate::process::{CommandRunner, EngineInvocation, ProcessError};

/// Delay between connectivity attempts.
pub const DEFAULT_PROBE_DELAY: Duration = Duration::from_secs(10);

/// Label prefixed to streamed probe output.
const PROBE_LABEL: &str = "ANSIBLE";

/// Errors raised when the cluster never becomes reachable.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ReadinessError {
    /// Every attempt failed.
    #[error("nodes not reachable after {attempts} attempts: {source}")]
    Timeout {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        source: ProcessError,
    },
}

/// Runs `ansible all -m ping` until it succeeds or the budget is spent.
#[derive(Clone, Debug)]
pub struct ReadinessProber<R> {
    runner: R,
    ansible_bin: String,
    delay: Duration,
}

impl<R: CommandRunner> ReadinessProber<R> {
    /// Creates a prober that uses `ansible_bin` with the default delay.
    #[must_use]
    pub fn new(runner: R, ansible_bin: impl Into<String>) -> Self {
        Self {
            runner,
            ansible_bin: ansible_bin.into(),
            delay: DEFAULT_PROBE_DELAY,
        }
    }

    /// Overrides the fixed delay between attempts.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Probes every host in `inventory` until one attempt succeeds.
    ///
    /// Returns the number of attempts used. A budget of zero still makes one
    /// attempt. There is no sleep after the final failure.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError::Timeout`] once `max_attempts` probes have
    /// failed. Launch failures are retried like any other failure.
    pub fn probe_ready(
        &self,
        work_dir: &Utf8Path,
        inventory: &Utf8Path,
        max_attempts: u32,
    ) -> Result<u32, ReadinessError> {
        let budget = max_attempts.max(1);
        let invocation = self.ping_invocation(work_dir, inventory);
        let mut attempt = 1;
        loop {
            match self.runner.run(&invocation) {
                Ok(()) => {
                    tracing::info!(attempt, "all nodes reachable");
                    return Ok(attempt);
                }
                Err(err) if attempt >= budget => {
                    return Err(ReadinessError::Timeout {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "attempt {attempt}/{budget}: nodes not ready yet");
                    thread::sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }

    fn ping_invocation(&self, work_dir: &Utf8Path, inventory: &Utf8Path) -> EngineInvocation {
        EngineInvocation::new(PROBE_LABEL, self.ansible_bin.as_str(), work_dir)
            .args(["all", "-i", inventory.as_str(), "-m", "ping"])
            .envs(&crate::configure::ANSIBLE_ENV)
    }
}
