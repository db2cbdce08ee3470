//! Container engine access through its command line
//!
//! Every call is issued as `<docker_bin> <subcommand> <args...>`, where
//! `docker_bin` may carry a prefix such as `sudo docker`.

use super::command::{CommandOutput, CommandSpec};
use super::docker_ops::{ContainerOperations, KillOutcome, SurrogateId};
use super::executor::CommandExecutor;
use super::retry::{Attempt, RetryPolicy};
use crate::error::{BackupError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_DOCKER_BIN: &str = "docker";

/// Label put on every temporary container, pointing at its origin
pub const ORIGIN_LABEL: &str = "container-backup.origin";

/// Invocation prefix of the container engine, e.g. `docker` or `sudo docker`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineBin {
    program: String,
    prefix: Vec<String>,
}

impl EngineBin {
    /// Split a configured `docker_bin` on whitespace; `None` if it is blank
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            prefix: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// `<docker_bin> <args...>`
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.program.clone())
            .args(self.prefix.iter().cloned())
            .args(args)
    }
}

impl Default for EngineBin {
    fn default() -> Self {
        Self {
            program: DEFAULT_DOCKER_BIN.to_string(),
            prefix: Vec::new(),
        }
    }
}

impl fmt::Display for EngineBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for part in &self.prefix {
            write!(f, " {}", part)?;
        }
        Ok(())
    }
}

/// [`ContainerOperations`] over the engine's command line
#[derive(Clone)]
pub struct DockerCli {
    executor: Arc<dyn CommandExecutor>,
    retry: RetryPolicy,
}

impl DockerCli {
    pub fn new(executor: Arc<dyn CommandExecutor>, retry: RetryPolicy) -> Self {
        Self { executor, retry }
    }

    /// Run an engine subcommand, retrying transient failures
    fn run_engine(&self, engine: &EngineBin, args: &[&str], step: &str) -> std::result::Result<CommandOutput, String> {
        let spec = engine.command(args.iter().copied());
        debug!("Container engine call: {}", spec);

        self.retry.run(step, || {
            let output = self
                .executor
                .run_command(&spec)
                .map_err(|e| Attempt::Fatal(format!("{:#}", e)))?;

            if output.success() {
                Ok(output)
            } else {
                Err(Attempt::from_stderr(output.failure_message()))
            }
        })
    }

    /// `docker inspect` a single field; `Ok(None)` when there is no such container
    fn inspect(&self, engine: &EngineBin, container: &str, format: &str) -> Result<Option<String>> {
        let spec = engine.command(["inspect", "--type", "container", "--format", format, container]);
        let output = self
            .executor
            .run_command(&spec)
            .map_err(|e| BackupError::Precondition(format!("{:#}", e)))?;

        if output.success() {
            return Ok(Some(output.stdout.trim().to_string()));
        }
        if output.stderr.to_lowercase().contains("no such") {
            return Ok(None);
        }
        Err(BackupError::Precondition(format!(
            "Cannot inspect container '{}': {}",
            container,
            output.failure_message()
        )))
    }
}

impl ContainerOperations for DockerCli {
    fn stop(&self, engine: &EngineBin, container: &str) -> Result<()> {
        info!("Stopping container: {}", container);
        self.run_engine(engine, &["stop", container], "docker stop")
            .map(|_| ())
            .map_err(|reason| BackupError::WorkloadStop {
                container: container.to_string(),
                reason,
            })
    }

    fn start(&self, engine: &EngineBin, container: &str) -> Result<()> {
        info!("Starting container: {}", container);
        self.run_engine(engine, &["start", container], "docker start")
            .map(|_| ())
            .map_err(|reason| BackupError::OriginRestart {
                container: container.to_string(),
                reason,
                previous: None,
            })
    }

    fn spawn_temporary(
        &self,
        engine: &EngineBin,
        origin: &str,
        image: &str,
        run_cmd: &str,
    ) -> Result<SurrogateId> {
        info!(
            "Spawning temporary container from image '{}' with volumes of '{}'",
            image, origin
        );
        let label = format!("{}={}", ORIGIN_LABEL, origin);
        let args = [
            "run", "-d", "--volumes-from", origin, "--label", &label, image, "sh", "-c", run_cmd,
        ];

        let output = self
            .run_engine(engine, &args, "docker run")
            .map_err(|reason| BackupError::Spawn {
                origin: origin.to_string(),
                reason,
            })?;

        // `docker run -d` may print pull progress before the id
        let id = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| BackupError::Spawn {
                origin: origin.to_string(),
                reason: "engine did not report a container id".to_string(),
            })?;

        info!("Temporary container started: {}", id);
        Ok(SurrogateId::new(id))
    }

    fn kill(&self, engine: &EngineBin, surrogate: &SurrogateId) -> KillOutcome {
        let id = surrogate.as_str();

        let killed = match self.run_engine(engine, &["kill", id], "docker kill") {
            Ok(_) => Ok(()),
            // Already exited on its own; removing it is all that is left
            Err(reason) if reason.to_lowercase().contains("is not running") => Ok(()),
            Err(reason) => Err(reason),
        };
        let removed = self.run_engine(engine, &["rm", "-f", id], "docker rm");

        match (killed, removed) {
            (Ok(()), Ok(_)) => KillOutcome::Killed(surrogate.clone()),
            (Err(reason), _) | (Ok(()), Err(reason)) => KillOutcome::Failed {
                surrogate: surrogate.clone(),
                reason,
            },
        }
    }

    fn is_running(&self, engine: &EngineBin, container: &str) -> Result<bool> {
        match self.inspect(engine, container, "{{.State.Running}}")? {
            Some(state) => Ok(state == "true"),
            None => Err(BackupError::Precondition(format!(
                "Container '{}' does not exist",
                container
            ))),
        }
    }
}
