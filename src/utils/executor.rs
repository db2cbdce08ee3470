//! Command execution abstraction for testability
//!
//! Handlers and the container engine client only talk to processes through
//! [`CommandExecutor`], so tests can swap in the recording mock below.

use super::command::{CommandExecutionResult, CommandOutput, CommandSpec};
use anyhow::Result;
use std::io::Read;

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a short command to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; only failing to launch is.
    fn run_command(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Launch a command without waiting for it
    fn spawn(
        &self,
        spec: &CommandSpec,
        stdin: Option<Box<dyn Read + Send>>,
        capture_stdout: bool,
    ) -> Result<CommandExecutionResult>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealExecutor {
    fn run_command(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        super::command::run_command(spec)
    }

    fn spawn(
        &self,
        spec: &CommandSpec,
        stdin: Option<Box<dyn Read + Send>>,
        capture_stdout: bool,
    ) -> Result<CommandExecutionResult> {
        super::command::spawn_command(spec, stdin, capture_stdout)
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use crate::utils::command::{Killer, ProcessExit, ProcessHandle};
    use std::collections::VecDeque;
    use std::io::{self, Cursor};
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub env_keys: Vec<String>,
        pub streamed: bool,
    }

    impl CommandCall {
        pub fn command_line(&self) -> String {
            std::iter::once(self.program.as_str())
                .chain(self.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        }
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: Vec<u8>, stderr: String },
        Failure { stderr: String, exit_code: i32 },
        /// The program could not be launched at all
        Unavailable,
    }

    impl MockResponse {
        pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
            MockResponse::Success {
                stdout: stdout.into(),
                stderr: String::new(),
            }
        }

        pub fn fail(exit_code: i32, stderr: &str) -> Self {
            MockResponse::Failure {
                stderr: stderr.to_string(),
                exit_code,
            }
        }
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::ok(Vec::new())
        }
    }

    /// Mock executor for testing
    ///
    /// Responses are matched by substring against the full command line, in
    /// the order they were registered. A registered sequence yields one
    /// response per call and then keeps repeating its last one.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        responses: Arc<Mutex<Vec<(String, VecDeque<MockResponse>)>>>,
        default_response: Arc<Mutex<MockResponse>>,
        /// Bytes each streamed command received on stdin, in call order
        received: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for command lines containing `pattern`
        pub fn expect(self, pattern: &str, response: MockResponse) -> Self {
            self.expect_sequence(pattern, vec![response])
        }

        /// Configure successive responses for command lines containing `pattern`
        pub fn expect_sequence(self, pattern: &str, responses: Vec<MockResponse>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push((pattern.to_string(), responses.into()));
            self
        }

        /// Set the default response for unconfigured commands
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Recorded command lines, in call order
        pub fn command_lines(&self) -> Vec<String> {
            self.get_calls().iter().map(CommandCall::command_line).collect()
        }

        /// Check if any command line contained `pattern`
        pub fn was_called(&self, pattern: &str) -> bool {
            self.call_count(pattern) > 0
        }

        /// Number of command lines containing `pattern`
        pub fn call_count(&self, pattern: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.command_line().contains(pattern))
                .count()
        }

        /// What streamed commands were fed on stdin
        pub fn received_input(&self) -> Vec<Vec<u8>> {
            self.received.lock().unwrap().clone()
        }

        fn record_call(&self, spec: &CommandSpec, streamed: bool) {
            self.calls.lock().unwrap().push(CommandCall {
                program: spec.program.clone(),
                args: spec.args.clone(),
                env_keys: spec.env.iter().map(|(k, _)| k.clone()).collect(),
                streamed,
            });
        }

        fn get_response(&self, command_line: &str) -> MockResponse {
            let mut responses = self.responses.lock().unwrap();
            for (pattern, queue) in responses.iter_mut() {
                if command_line.contains(pattern.as_str()) {
                    return if queue.len() > 1 {
                        queue.pop_front().unwrap_or_default()
                    } else {
                        queue.front().cloned().unwrap_or_default()
                    };
                }
            }
            self.default_response.lock().unwrap().clone()
        }
    }

    struct MockProcess {
        exit: ProcessExit,
    }

    impl ProcessHandle for MockProcess {
        fn wait(&mut self) -> io::Result<ProcessExit> {
            Ok(self.exit.clone())
        }

        fn killer(&self) -> Killer {
            Arc::new(|| {})
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run_command(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            self.record_call(spec, false);
            match self.get_response(&spec.command_line()) {
                MockResponse::Success { stdout, stderr } => Ok(CommandOutput {
                    code: Some(0),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr,
                }),
                MockResponse::Failure { stderr, exit_code } => Ok(CommandOutput {
                    code: Some(exit_code),
                    stdout: String::new(),
                    stderr,
                }),
                MockResponse::Unavailable => {
                    anyhow::bail!("Failed to execute {}: not found", spec.program)
                }
            }
        }

        fn spawn(
            &self,
            spec: &CommandSpec,
            stdin: Option<Box<dyn Read + Send>>,
            capture_stdout: bool,
        ) -> Result<CommandExecutionResult> {
            self.record_call(spec, true);
            let (stdout, exit) = match self.get_response(&spec.command_line()) {
                MockResponse::Success { stdout, stderr } => {
                    (stdout, ProcessExit { code: Some(0), stderr })
                }
                MockResponse::Failure { stderr, exit_code } => (
                    Vec::new(),
                    ProcessExit {
                        code: Some(exit_code),
                        stderr,
                    },
                ),
                MockResponse::Unavailable => {
                    anyhow::bail!("Failed to execute {}: not found", spec.program)
                }
            };

            let feeder = stdin.map(|mut source| {
                let received = Arc::clone(&self.received);
                thread::spawn(move || -> io::Result<u64> {
                    let mut buf = Vec::new();
                    source.read_to_end(&mut buf)?;
                    let len = buf.len() as u64;
                    received.lock().unwrap().push(buf);
                    Ok(len)
                })
            });

            let stdout = capture_stdout.then(|| Box::new(Cursor::new(stdout)) as Box<dyn Read + Send>);

            Ok(CommandExecutionResult::new(
                spec.to_string(),
                stdout,
                Box::new(MockProcess { exit }),
                feeder,
            ))
        }
    }
}
