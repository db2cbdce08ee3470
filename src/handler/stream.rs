//! Running pack/unpack commands as byte streams
//!
//! Shared by every handler: where the command runs is an [`ExecTarget`], the
//! command itself comes from the definition's templates.

use crate::error::{BackupError, Result};
use crate::utils::cancel::CancellationToken;
use crate::utils::command::{CommandOutcome, CommandSpec, CommandStream, StreamMonitor, StreamState};
use crate::utils::docker::EngineBin;
use crate::utils::executor::CommandExecutor;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a pack or unpack command is executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecTarget {
    Host,
    Container { engine: EngineBin, container: String },
}

impl ExecTarget {
    /// Wrap a shell command so it runs on this target
    fn command(&self, shell_cmd: &str, interactive: bool) -> CommandSpec {
        match self {
            ExecTarget::Host => CommandSpec::shell(shell_cmd),
            ExecTarget::Container { engine, container } => {
                let mut args = vec!["exec".to_string()];
                if interactive {
                    args.push("-i".to_string());
                }
                args.extend([container.clone(), "sh".to_string(), "-c".to_string()]);
                args.push(shell_cmd.to_string());
                engine.command(args)
            }
        }
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecTarget::Host => f.write_str("host"),
            ExecTarget::Container { container, .. } => write!(f, "container '{}'", container),
        }
    }
}

/// Launches pack/unpack commands and checks how they ended
#[derive(Clone)]
pub struct ArchiveStreamer {
    executor: Arc<dyn CommandExecutor>,
}

impl ArchiveStreamer {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run `pack_cmd` on `target` and hand its stdout to `consume`.
    ///
    /// The command is already running when `consume` gets the stream. Once
    /// `consume` returns the stream has either been read to the end or
    /// dropped, which kills the command.
    pub fn receive_backup_stream<T>(
        &self,
        target: &ExecTarget,
        pack_cmd: &str,
        cancel: &CancellationToken,
        consume: impl FnOnce(CommandStream) -> Result<T>,
    ) -> Result<(T, CommandOutcome)> {
        cancel.check()?;
        info!("Packing on {}: {}", target, pack_cmd);

        let spec = target.command(pack_cmd, false);
        let execution = self
            .executor
            .spawn(&spec, None, true)
            .map_err(|e| BackupError::PackExecution {
                code: None,
                stderr: format!("{:#}", e),
            })?;

        let (stream, monitor) = CommandStream::new(execution);
        if let Some(killer) = stream.killer() {
            cancel.register(killer);
        }

        let consumed = consume(stream);
        settle_pack(consumed, &monitor, cancel)
    }

    /// Run `unpack_cmd` on `target`, feeding it `input` until either side ends
    pub fn restore_backup_from_stream(
        &self,
        target: &ExecTarget,
        unpack_cmd: &str,
        input: Box<dyn Read + Send>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome> {
        cancel.check()?;
        info!("Unpacking on {}: {}", target, unpack_cmd);

        let spec = target.command(unpack_cmd, true);
        let execution = self
            .executor
            .spawn(&spec, Some(input), false)
            .map_err(|e| BackupError::RestoreExecution {
                code: None,
                stderr: format!("{:#}", e),
            })?;
        cancel.register(execution.killer());

        let outcome = execution.wait()?;
        cancel.check()?;

        if outcome.code != Some(0) {
            return Err(BackupError::RestoreExecution {
                code: outcome.code,
                stderr: outcome.failure_message(),
            });
        }
        if let Some(ref feed_error) = outcome.feed_error {
            return Err(BackupError::Transfer(format!(
                "archive stream broke while unpacking: {}",
                feed_error
            )));
        }

        debug!(
            "Unpack command finished, {} bytes received",
            outcome.bytes_fed.unwrap_or_default()
        );
        Ok(outcome)
    }
}

/// Combine what the consumer returned with how the pack command ended.
///
/// A failed pack command wins over the consumer's own error, which is then
/// just the symptom (a read error at end-of-stream).
fn settle_pack<T>(
    consumed: Result<T>,
    monitor: &StreamMonitor,
    cancel: &CancellationToken,
) -> Result<(T, CommandOutcome)> {
    cancel.check()?;

    match monitor.state() {
        StreamState::Completed(outcome) if !outcome.success() => Err(BackupError::PackExecution {
            code: outcome.code,
            stderr: outcome.failure_message(),
        }),
        StreamState::Completed(outcome) => consumed.map(|value| (value, outcome)),
        StreamState::Abandoned => {
            consumed?;
            Err(BackupError::Transfer(
                "archive stream was not read to the end".to_string(),
            ))
        }
        StreamState::Failed(reason) => {
            consumed?;
            Err(BackupError::Transfer(format!(
                "cannot collect pack command status: {}",
                reason
            )))
        }
        StreamState::Running => {
            consumed?;
            Err(BackupError::Transfer(
                "archive stream outlived its consumer".to_string(),
            ))
        }
    }
}
