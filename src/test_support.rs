//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::rc::Rc;
use std::sync::{Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::cloud::{
    CloudError, CloudFuture, CloudProvider, InterruptionSignal, NAME_TAG, NodeRecord, NodeState,
    PROJECT_TAG, PricePoint,
};
use crate::configure::Configurator;
use crate::process::{CommandRunner, EngineInvocation, OutputSink, ProcessError, Stream};
use crate::provision::Provisioner;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Scripted {
    Success,
    Exit(i32),
    Launch,
}

/// State of one watched work-directory file at the moment a run started.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileSnapshot {
    /// Program of the invocation that observed the file.
    pub program: String,
    /// File name relative to the work directory.
    pub name: String,
    /// UTF-8 contents, or `None` when the file was absent.
    pub contents: Option<String>,
    /// Permission bits, or `None` when the file was absent.
    pub mode: Option<u32>,
}

/// Scripted command runner that returns pre-seeded outcomes in FIFO order.
///
/// Used to drive deterministic engine outcomes without spawning processes.
/// Once the script is exhausted every call fails with a launch error.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<Scripted>>>,
    invocations: Rc<RefCell<Vec<EngineInvocation>>>,
    watched: Rc<RefCell<Vec<String>>>,
    snapshots: Rc<RefCell<Vec<FileSnapshot>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<EngineInvocation> {
        self.invocations.borrow().clone()
    }

    /// Returns the rendered command line of every invocation.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(EngineInvocation::command_string)
            .collect()
    }

    /// Pushes a successful run.
    pub fn push_success(&self) {
        self.responses.borrow_mut().push_back(Scripted::Success);
    }

    /// Pushes a run that exits with `code`.
    pub fn push_failure(&self, code: i32) {
        self.responses.borrow_mut().push_back(Scripted::Exit(code));
    }

    /// Pushes a run whose binary cannot be started.
    pub fn push_launch_failure(&self) {
        self.responses.borrow_mut().push_back(Scripted::Launch);
    }

    /// Records `name` from the work directory on every later run.
    ///
    /// Snapshots capture sandbox contents before the sandbox is removed.
    pub fn watch_file(&self, name: &str) {
        self.watched.borrow_mut().push(name.to_owned());
    }

    /// Snapshots taken so far, in run order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<FileSnapshot> {
        self.snapshots.borrow().clone()
    }

    fn snapshot(&self, invocation: &EngineInvocation) {
        for name in self.watched.borrow().iter() {
            let path = invocation.work_dir.join(name);
            let mode = std::fs::metadata(&path)
                .map(|meta| meta.permissions().mode() & 0o777)
                .ok();
            self.snapshots.borrow_mut().push(FileSnapshot {
                program: invocation.program.clone(),
                name: name.clone(),
                contents: std::fs::read_to_string(&path).ok(),
                mode,
            });
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &EngineInvocation) -> Result<(), ProcessError> {
        self.invocations.borrow_mut().push(invocation.clone());
        self.snapshot(invocation);

        let next = self.responses.borrow_mut().pop_front();
        match next {
            Some(Scripted::Success) => Ok(()),
            Some(Scripted::Exit(code)) => Err(ProcessError::execution(
                invocation.program.clone(),
                Some(code),
            )),
            Some(Scripted::Launch) => Err(ProcessError::Launch {
                program: invocation.program.clone(),
                message: String::from("No such file or directory (os error 2)"),
            }),
            None => Err(ProcessError::Launch {
                program: invocation.program.clone(),
                message: String::from("no scripted response available"),
            }),
        }
    }
}

/// Output sink that records every line it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: StdMutex<Vec<(String, Stream, String)>>,
}

impl RecordingSink {
    /// Lines received on `stream`, in arrival order.
    #[must_use]
    pub fn lines(&self, stream: Stream) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, source, _)| *source == stream)
            .map(|(_, _, line)| line.clone())
            .collect()
    }

    /// Every line rendered as `<label> <tag>: <line>`.
    #[must_use]
    pub fn rendered(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(label, stream, line)| format!("{label} {}: {line}", stream.tag()))
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn line(&self, label: &str, stream: Stream, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((label.to_owned(), stream, line.to_owned()));
    }
}

/// Error returned by the in-memory capability fakes.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("simulated {0} failure")]
pub struct FakeFailure(pub String);

/// In-memory [`Provisioner`] that records calls.
#[derive(Clone, Debug, Default)]
pub struct FakeProvisioner {
    calls: Rc<RefCell<Vec<&'static str>>>,
    failing: Option<&'static str>,
}

impl FakeProvisioner {
    /// Creates a provisioner whose `operation` fails.
    #[must_use]
    pub fn failing_on(operation: &'static str) -> Self {
        Self {
            failing: Some(operation),
            ..Self::default()
        }
    }

    /// Operations invoked so far.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn record(&self, operation: &'static str) -> Result<(), FakeFailure> {
        self.calls.borrow_mut().push(operation);
        if self.failing == Some(operation) {
            return Err(FakeFailure(operation.to_owned()));
        }
        Ok(())
    }
}

impl Provisioner for FakeProvisioner {
    type Error = FakeFailure;

    fn plan(&self) -> Result<(), Self::Error> {
        self.record("plan")
    }

    fn apply(&self) -> Result<(), Self::Error> {
        self.record("apply")
    }

    fn destroy(&self) -> Result<(), Self::Error> {
        self.record("destroy")
    }
}

/// In-memory [`Configurator`] that records applied playbooks.
#[derive(Clone, Debug, Default)]
pub struct FakeConfigurator {
    calls: Rc<RefCell<Vec<String>>>,
    fail: bool,
}

impl FakeConfigurator {
    /// Creates a configurator whose playbooks always fail.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Playbooks applied so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Configurator for FakeConfigurator {
    type Error = FakeFailure;

    fn playbook(&self, path: &str) -> Result<(), Self::Error> {
        self.calls.borrow_mut().push(path.to_owned());
        if self.fail {
            return Err(FakeFailure(format!("playbook {path}")));
        }
        Ok(())
    }
}

/// Builds a node record tagged for `project`.
#[must_use]
pub fn node_record(
    id: &str,
    name: Option<&str>,
    instance_type: &str,
    zone: &str,
    launch_time: DateTime<Utc>,
) -> NodeRecord {
    let mut tags = BTreeMap::new();
    tags.insert(String::from(PROJECT_TAG), String::from("nebula"));
    if let Some(value) = name {
        tags.insert(String::from(NAME_TAG), value.to_owned());
    }
    NodeRecord {
        id: id.to_owned(),
        instance_type: instance_type.to_owned(),
        zone: zone.to_owned(),
        launch_time,
        state: NodeState::Running,
        tags,
    }
}

/// In-memory [`CloudProvider`] serving canned answers.
#[derive(Debug, Default)]
pub struct FakeCloud {
    nodes: Vec<NodeRecord>,
    discovery_failure: bool,
    prices: BTreeMap<(String, String), Decimal>,
    interrupted: BTreeSet<String>,
    status_failures: BTreeSet<String>,
    terminated: StdMutex<Vec<String>>,
    queried_states: StdMutex<Vec<Vec<NodeState>>>,
}

impl FakeCloud {
    /// Creates a cloud with no nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a discovered node.
    #[must_use]
    pub fn with_node(mut self, node: NodeRecord) -> Self {
        self.nodes.push(node);
        self
    }

    /// Serves `price` for `instance_type` in `zone`; other pairs have no data.
    #[must_use]
    pub fn with_price(mut self, instance_type: &str, zone: &str, price: Decimal) -> Self {
        self.prices
            .insert((instance_type.to_owned(), zone.to_owned()), price);
        self
    }

    /// Marks `node_id` as scheduled for reclamation.
    #[must_use]
    pub fn with_interrupted(mut self, node_id: &str) -> Self {
        self.interrupted.insert(node_id.to_owned());
        self
    }

    /// Makes the status query for `node_id` fail.
    #[must_use]
    pub fn with_status_failure(mut self, node_id: &str) -> Self {
        self.status_failures.insert(node_id.to_owned());
        self
    }

    /// Makes node discovery fail.
    #[must_use]
    pub const fn with_discovery_failure(mut self) -> Self {
        self.discovery_failure = true;
        self
    }

    /// Node ids passed to `terminate_nodes`.
    #[must_use]
    pub fn terminated(&self) -> Vec<String> {
        self.terminated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// State filters passed to `describe_nodes`.
    #[must_use]
    pub fn queried_states(&self) -> Vec<Vec<NodeState>> {
        self.queried_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn failure(operation: &str) -> CloudError {
        CloudError::CommandFailure {
            program: String::from("aws"),
            operation: operation.to_owned(),
            status_text: String::from("255"),
            stderr: String::from("simulated failure"),
        }
    }
}

impl CloudProvider for FakeCloud {
    fn describe_nodes<'a>(
        &'a self,
        _project_tag: &'a str,
        states: &'a [NodeState],
    ) -> CloudFuture<'a, Vec<NodeRecord>> {
        Box::pin(async move {
            self.queried_states
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(states.to_vec());
            if self.discovery_failure {
                return Err(Self::failure("describe-instances"));
            }
            Ok(self
                .nodes
                .iter()
                .filter(|node| states.contains(&node.state))
                .cloned()
                .collect())
        })
    }

    fn spot_price<'a>(
        &'a self,
        instance_type: &'a str,
        zone: &'a str,
    ) -> CloudFuture<'a, PricePoint> {
        Box::pin(async move {
            let key = (instance_type.to_owned(), zone.to_owned());
            let price = self
                .prices
                .get(&key)
                .copied()
                .ok_or_else(|| CloudError::NoPriceData {
                    instance_type: instance_type.to_owned(),
                    zone: zone.to_owned(),
                })?;
            Ok(PricePoint {
                instance_type: instance_type.to_owned(),
                zone: zone.to_owned(),
                price,
                observed_at: DateTime::<Utc>::UNIX_EPOCH,
            })
        })
    }

    fn interruption_status<'a>(&'a self, node_id: &'a str) -> CloudFuture<'a, InterruptionSignal> {
        Box::pin(async move {
            if self.status_failures.contains(node_id) {
                return Err(Self::failure("describe-instance-status"));
            }
            let interrupted = self.interrupted.contains(node_id);
            Ok(InterruptionSignal {
                node_id: node_id.to_owned(),
                interrupted,
                description: interrupted.then(|| String::from("Spot capacity reclaimed")),
            })
        })
    }

    fn terminate_nodes<'a>(&'a self, node_ids: &'a [String]) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            self.terminated
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(node_ids.iter().cloned());
            Ok(())
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
