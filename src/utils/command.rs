//! Running external commands, either captured or as live byte streams
//!
//! Short engine calls (`docker stop`, `docker run -d`) go through
//! [`run_command`], which captures everything. Pack, unpack and encryption
//! commands go through [`spawn_command`], which hands back the live process:
//! its stdout can be read incrementally and its stdin is fed from another
//! stream on a helper thread, so the archive never has to fit in memory.

use anyhow::{Context, Result};
use std::fmt;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// How often a waiting caller polls a child for exit
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A fully described command invocation
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables; never rendered in logs
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Run `command` through `sh -c`
    pub fn shell(command: &str) -> Self {
        Self::new("sh").arg("-c").arg(command)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined with spaces
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Captured result of a short command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stderr, or stdout when the command printed nothing to stderr
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {:?}: {}", self.code, self.stdout.trim())
        } else {
            format!("exit code {:?}: {}", self.code, stderr)
        }
    }
}

/// Kills the process it was taken from; safe to call after exit
pub type Killer = Arc<dyn Fn() + Send + Sync>;

/// Exit information reported by a [`ProcessHandle`]
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub stderr: String,
}

/// A launched process that can be waited on or killed
pub trait ProcessHandle: Send {
    /// Block until the process exits and its stderr has been collected
    fn wait(&mut self) -> io::Result<ProcessExit>;

    fn killer(&self) -> Killer;
}

/// Final state of a streamed command once it has exited
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub command: String,
    pub code: Option<i32>,
    pub stderr: String,
    /// Bytes written to the command's stdin, when it was fed a stream
    pub bytes_fed: Option<u64>,
    /// Why feeding stdin stopped early, if it did
    pub feed_error: Option<String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0) && self.feed_error.is_none()
    }

    pub fn failure_message(&self) -> String {
        match (&self.feed_error, self.stderr.trim()) {
            (Some(feed), "") => format!("input stream failed: {}", feed),
            (Some(feed), stderr) => format!("{} (input stream failed: {})", stderr, feed),
            (None, "") => format!("'{}' exited with code {:?}", self.command, self.code),
            (None, stderr) => stderr.to_string(),
        }
    }
}

/// A just-launched external process and the handles to its output.
///
/// Owns the stdout pipe (if captured) for as long as the caller drains it.
/// [`CommandExecutionResult::wait`] consumes it and yields the final
/// [`CommandOutcome`].
pub struct CommandExecutionResult {
    command: String,
    stdout: Option<Box<dyn Read + Send>>,
    process: Box<dyn ProcessHandle>,
    feeder: Option<JoinHandle<io::Result<u64>>>,
}

impl CommandExecutionResult {
    pub fn new(
        command: String,
        stdout: Option<Box<dyn Read + Send>>,
        process: Box<dyn ProcessHandle>,
        feeder: Option<JoinHandle<io::Result<u64>>>,
    ) -> Self {
        Self {
            command,
            stdout,
            process,
            feeder,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout.take()
    }

    pub fn killer(&self) -> Killer {
        self.process.killer()
    }

    /// Wait for the process to exit and for its stdin feeder to finish
    pub fn wait(mut self) -> io::Result<CommandOutcome> {
        // Close our end of stdout so a producer blocked on a full pipe gets EPIPE
        drop(self.stdout.take());

        let exit = self.process.wait()?;

        let (bytes_fed, feed_error) = match self.feeder.take() {
            Some(handle) => match handle.join() {
                Ok(Ok(bytes)) => (Some(bytes), None),
                Ok(Err(e)) => (None, Some(e.to_string())),
                Err(_) => (None, Some("stdin feeder thread panicked".to_string())),
            },
            None => (None, None),
        };

        Ok(CommandOutcome {
            command: self.command,
            code: exit.code,
            stderr: exit.stderr,
            bytes_fed,
            feed_error,
        })
    }
}

/// Observable state of a [`CommandStream`], shared with whoever launched it
#[derive(Debug, Clone)]
pub enum StreamState {
    Running,
    Completed(CommandOutcome),
    /// Waiting for the process failed
    Failed(String),
    /// Dropped before end-of-stream; the process was killed
    Abandoned,
}

/// Read-only view of a [`CommandStream`]'s state
#[derive(Debug, Clone)]
pub struct StreamMonitor(Arc<Mutex<StreamState>>);

impl StreamMonitor {
    pub fn state(&self) -> StreamState {
        self.0
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| StreamState::Failed("stream state lock poisoned".to_string()))
    }
}

/// Stdout of a live process as a singly-consumable byte stream.
///
/// Reaching end-of-stream waits for the process; a non-zero exit is returned
/// as an `io::Error` from that final `read`, so a failed pack command can
/// never look like a short but valid archive. Dropping the stream early
/// kills and reaps the process.
pub struct CommandStream {
    reader: Option<Box<dyn Read + Send>>,
    execution: Option<CommandExecutionResult>,
    state: Arc<Mutex<StreamState>>,
}

impl CommandStream {
    pub fn new(mut execution: CommandExecutionResult) -> (Self, StreamMonitor) {
        let reader = execution
            .take_stdout()
            .unwrap_or_else(|| Box::new(io::empty()));
        let state = Arc::new(Mutex::new(StreamState::Running));
        let monitor = StreamMonitor(Arc::clone(&state));

        (
            Self {
                reader: Some(reader),
                execution: Some(execution),
                state,
            },
            monitor,
        )
    }

    /// Killer for the underlying process, while it is still owned
    pub fn killer(&self) -> Option<Killer> {
        self.execution.as_ref().map(|e| e.killer())
    }

    fn set_state(&self, state: StreamState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn complete(&mut self) -> io::Result<()> {
        let Some(execution) = self.execution.take() else {
            return Ok(());
        };
        self.reader = None;

        match execution.wait() {
            Ok(outcome) => {
                let success = outcome.success();
                let message = outcome.failure_message();
                self.set_state(StreamState::Completed(outcome));
                if success {
                    Ok(())
                } else {
                    Err(io::Error::other(message))
                }
            }
            Err(e) => {
                self.set_state(StreamState::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}

impl Read for CommandStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };

        let n = reader.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.complete()?;
        }
        Ok(n)
    }
}

impl Drop for CommandStream {
    fn drop(&mut self) {
        if let Some(execution) = self.execution.take() {
            self.reader = None;
            debug!("Stream of '{}' dropped before end, killing it", execution.command());
            (execution.killer())();
            if let Err(e) = execution.wait() {
                warn!("Failed to reap abandoned command: {}", e);
            }
            self.set_state(StreamState::Abandoned);
        }
    }
}

/// A real child process
struct ChildProcess {
    child: Arc<Mutex<Child>>,
    stderr: Option<JoinHandle<String>>,
}

impl ProcessHandle for ChildProcess {
    fn wait(&mut self) -> io::Result<ProcessExit> {
        // Poll instead of blocking in wait() so a killer can still take the lock
        let status = loop {
            {
                let mut child = self
                    .child
                    .lock()
                    .map_err(|_| io::Error::other("child process lock poisoned"))?;
                if let Some(status) = child.try_wait()? {
                    break status;
                }
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        };

        let stderr = self
            .stderr
            .take()
            .map(|handle| handle.join().unwrap_or_default())
            .unwrap_or_default();

        Ok(ProcessExit {
            code: status.code(),
            stderr,
        })
    }

    fn killer(&self) -> Killer {
        let child = Arc::clone(&self.child);
        Arc::new(move || {
            if let Ok(mut child) = child.lock() {
                let _ = child.kill();
            }
        })
    }
}

/// Launch a command, optionally feeding `stdin` and capturing stdout
pub fn spawn_command(
    spec: &CommandSpec,
    stdin: Option<Box<dyn Read + Send>>,
    capture_stdout: bool,
) -> Result<CommandExecutionResult> {
    let mut cmd = spec.to_command();
    cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
    cmd.stdout(if capture_stdout { Stdio::piped() } else { Stdio::null() });
    cmd.stderr(Stdio::piped());

    debug!("Spawning command: {}", spec);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to execute {}", spec.program))?;

    let stderr = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let feeder = match (stdin, child.stdin.take()) {
        (Some(mut source), Some(mut sink)) => Some(thread::spawn(move || -> io::Result<u64> {
            let bytes = io::copy(&mut source, &mut sink)?;
            sink.flush()?;
            Ok(bytes)
        })),
        _ => None,
    };

    let stdout = child
        .stdout
        .take()
        .map(|pipe| Box::new(pipe) as Box<dyn Read + Send>);

    Ok(CommandExecutionResult::new(
        spec.to_string(),
        stdout,
        Box::new(ChildProcess {
            child: Arc::new(Mutex::new(child)),
            stderr,
        }),
        feeder,
    ))
}

/// Run a short command to completion and capture its output
pub fn run_command(spec: &CommandSpec) -> Result<CommandOutput> {
    debug!("Running command: {}", spec);

    let output = spec
        .to_command()
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to execute {}", spec.program))?;

    let result = CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.success() {
        debug!("Command '{}' failed: {}", spec, result.failure_message());
    }

    Ok(result)
}
