//! Stop/substitute/restart lifecycle of an origin container
//!
//! A [`LifecycleSession`] is created before the origin is touched and is
//! released exactly once: explicitly through [`LifecycleSession::finalize`],
//! or on drop if an early return skipped that. Releasing kills the temporary
//! container (a failure there is only reported) and then starts the origin
//! again, whatever happened in between.

use crate::definition::OfflineSettings;
use crate::error::{BackupError, Result};
use crate::utils::cancel::CancellationToken;
use crate::utils::docker::EngineBin;
use crate::utils::docker_ops::{ContainerOperations, KillOutcome, SurrogateId};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Backup,
    Restore,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleAction::Backup => f.write_str("backup"),
            LifecycleAction::Restore => f.write_str("restore"),
        }
    }
}

/// What finalize did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    pub action: LifecycleAction,
    pub origin: String,
    pub kill: KillOutcome,
    /// False only when the origin was never stopped, so there was nothing to start
    pub origin_restarted: bool,
}

pub struct LifecycleSession {
    containers: Arc<dyn ContainerOperations>,
    engine: EngineBin,
    origin: String,
    action: LifecycleAction,
    surrogate: Option<SurrogateId>,
    origin_touched: bool,
    released: bool,
}

impl LifecycleSession {
    /// Open a session for `origin`; nothing is changed until the first step
    pub fn begin(
        containers: Arc<dyn ContainerOperations>,
        engine: EngineBin,
        origin: impl Into<String>,
        action: LifecycleAction,
    ) -> Self {
        Self {
            containers,
            engine,
            origin: origin.into(),
            action,
            surrogate: None,
            origin_touched: false,
            released: false,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Stop the origin, then spawn a temporary container with its volumes.
    ///
    /// Either failure aborts the sequence; the session still owes a release.
    pub fn stop_origin_and_start_temporary_container(
        &mut self,
        offline: &OfflineSettings,
        cancel: &CancellationToken,
    ) -> Result<SurrogateId> {
        cancel.check()?;

        info!("[{}] Stopping origin container '{}'", self.action, self.origin);
        self.origin_touched = true;
        self.containers.stop(&self.engine, &self.origin)?;

        cancel.check()?;

        info!(
            "[{}] Spawning temporary container with volumes from '{}'",
            self.action, self.origin
        );
        let surrogate = self.containers.spawn_temporary(
            &self.engine,
            &self.origin,
            &offline.temp_image_name,
            &offline.temp_image_cmd,
        )?;
        self.surrogate = Some(surrogate.clone());

        Ok(surrogate)
    }

    /// Kill the temporary container and start the origin again
    pub fn finalize(mut self) -> Result<FinalizeReport> {
        self.release()
    }

    fn release(&mut self) -> Result<FinalizeReport> {
        self.released = true;

        let kill = match self.surrogate.take() {
            Some(surrogate) => {
                info!("[{}] Killing temporary container '{}'", self.action, surrogate);
                let outcome = self.containers.kill(&self.engine, &surrogate);
                if let Some(warning) = outcome.warning() {
                    warn!("[{}] {}", self.action, warning);
                }
                outcome
            }
            None => KillOutcome::NotSpawned,
        };

        if !self.origin_touched {
            return Ok(FinalizeReport {
                action: self.action,
                origin: self.origin.clone(),
                kill,
                origin_restarted: false,
            });
        }

        info!("[{}] Starting origin container '{}'", self.action, self.origin);
        if let Err(e) = self.containers.start(&self.engine, &self.origin) {
            error!(
                "[{}] Origin container '{}' is left down: {}",
                self.action, self.origin, e
            );
            return Err(match e {
                restart @ BackupError::OriginRestart { .. } => restart,
                other => BackupError::OriginRestart {
                    container: self.origin.clone(),
                    reason: other.to_string(),
                    previous: None,
                },
            });
        }

        Ok(FinalizeReport {
            action: self.action,
            origin: self.origin.clone(),
            kill,
            origin_restarted: true,
        })
    }
}

impl Drop for LifecycleSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "[{}] Session for '{}' was not finalized, releasing it now",
            self.action, self.origin
        );
        // Nobody is left to receive this error
        let _ = self.release();
    }
}

/// Merge the result of the work done inside a session with its finalize.
///
/// A failed restart always wins and carries the work's error along.
pub fn settle<T>(
    work: Result<T>,
    finalized: Result<FinalizeReport>,
) -> Result<(T, FinalizeReport)> {
    match (work, finalized) {
        (Ok(value), Ok(report)) => Ok((value, report)),
        (Err(e), Ok(_)) => Err(e),
        (work, Err(BackupError::OriginRestart { container, reason, .. })) => {
            Err(BackupError::OriginRestart {
                container,
                reason,
                previous: work.err().map(Box::new),
            })
        }
        (_, Err(other)) => Err(other),
    }
}
