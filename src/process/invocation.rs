//! Description of a single engine run.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;

/// A request to run one engine binary once.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineInvocation {
    /// Short prefix identifying the engine in streamed output.
    pub label: String,
    /// Program to execute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Working directory for the process.
    pub work_dir: Utf8PathBuf,
    /// Variables added to (or overriding) the ambient environment.
    pub env: Vec<(String, String)>,
}

impl EngineInvocation {
    /// Starts an invocation with no arguments and no overrides.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        program: impl Into<String>,
        work_dir: impl AsRef<Utf8Path>,
    ) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.as_ref().to_path_buf(),
            env: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<OsString>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Adds an environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds several environment overrides.
    #[must_use]
    pub fn envs<'a>(mut self, pairs: impl IntoIterator<Item = &'a (&'a str, &'a str)>) -> Self {
        self.env.extend(
            pairs
                .into_iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned())),
        );
        self
    }

    /// Returns the value of an environment override, if set.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Returns a shell-like command string for logs and assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(escape(self.program.as_str().into()).into_owned());
        parts.extend(self.args.iter().map(|arg| {
            let lossy = arg.to_string_lossy();
            escape(lossy).into_owned()
        }));
        parts.join(" ")
    }
}
