//! Streaming runner that drains stdout and stderr on two worker threads.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use super::{CommandRunner, EngineInvocation, ProcessError};

/// Identifies which output stream a line came from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl Stream {
    /// Tag rendered between the engine label and the line.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Stdout => "[OUT]",
            Self::Stderr => "[ERR]",
        }
    }
}

/// Append-only destination for streamed engine output.
///
/// Implementations are shared by both drain workers, so they must tolerate
/// concurrent calls; each call carries one complete line.
pub trait OutputSink: Sync {
    /// Forwards a single line (without its terminator).
    fn line(&self, label: &str, stream: Stream, line: &str);
}

/// Sink that writes stdout lines to stdout and stderr lines to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdioSink;

impl OutputSink for StdioSink {
    fn line(&self, label: &str, stream: Stream, line: &str) {
        let tag = stream.tag();
        match stream {
            Stream::Stdout => writeln!(io::stdout().lock(), "{label} {tag}: {line}").ok(),
            Stream::Stderr => writeln!(io::stderr().lock(), "{label} {tag}: {line}").ok(),
        };
    }
}

/// Runner that streams engine output line by line while the engine runs.
#[derive(Clone, Debug, Default)]
pub struct StreamingCommandRunner<S = StdioSink> {
    sink: S,
}

impl StreamingCommandRunner<StdioSink> {
    /// Creates a runner that streams to the terminal.
    #[must_use]
    pub const fn stdio() -> Self {
        Self { sink: StdioSink }
    }
}

impl<S: OutputSink> StreamingCommandRunner<S> {
    /// Creates a runner forwarding output to `sink`.
    #[must_use]
    pub const fn with_sink(sink: S) -> Self {
        Self { sink }
    }

    /// Returns the output sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: OutputSink> CommandRunner for StreamingCommandRunner<S> {
    fn run(&self, invocation: &EngineInvocation) -> Result<(), ProcessError> {
        tracing::debug!(
            command = %invocation.command_string(),
            work_dir = %invocation.work_dir,
            "launching engine"
        );

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.work_dir)
            .envs(invocation.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ProcessError::Launch {
                program: invocation.program.clone(),
                message: err.to_string(),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let label = invocation.label.as_str();
        let sink = &self.sink;

        // The scope joins both workers before returning, whatever happens.
        thread::scope(|scope| {
            let out = scope.spawn(move || drain(stdout, label, Stream::Stdout, sink));
            let err = scope.spawn(move || drain(stderr, label, Stream::Stderr, sink));
            for (stream, worker) in [(Stream::Stdout, out), (Stream::Stderr, err)] {
                match worker.join() {
                    Ok(Ok(lines)) => tracing::trace!(?stream, lines, "drained engine stream"),
                    Ok(Err(error)) => {
                        tracing::warn!(?stream, %error, "engine stream ended with a read error");
                    }
                    Err(_) => tracing::warn!(?stream, "engine stream worker panicked"),
                }
            }
        });

        let status = child.wait().map_err(|err| ProcessError::Wait {
            program: invocation.program.clone(),
            message: err.to_string(),
        })?;

        if status.success() {
            return Ok(());
        }
        Err(ProcessError::execution(
            invocation.program.clone(),
            status.code(),
        ))
    }
}

/// Forwards every line from `reader` to the sink, returning the line count.
fn drain<R: Read>(
    reader: Option<R>,
    label: &str,
    stream: Stream,
    sink: &impl OutputSink,
) -> io::Result<usize> {
    let Some(source) = reader else {
        return Ok(0);
    };

    let mut buffered = BufReader::new(source);
    let mut buffer = Vec::new();
    let mut lines = 0;
    loop {
        buffer.clear();
        if buffered.read_until(b'\n', &mut buffer)? == 0 {
            return Ok(lines);
        }
        let line = String::from_utf8_lossy(&buffer);
        sink.line(label, stream, line.trim_end_matches(['\n', '\r']));
        lines += 1;
    }
}
