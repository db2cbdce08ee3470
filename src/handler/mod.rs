//! Backup handlers: how each definition type produces and consumes archives
//!
//! - [`FileOrDirectoryHandler`]: paths on the host, or inside a container when
//!   the definition names one
//! - [`HotVolumeHandler`]: paths inside a running container
//! - [`OfflineVolumeHandler`]: stops the container, reads its volumes through a
//!   temporary container and starts it again afterwards
//!
//! All three share the streaming in [`stream::ArchiveStreamer`].

pub mod lifecycle;
pub mod stream;

use crate::definition::{BackupDefinition, ContainerTarget, DefinitionKind, OfflineSettings, PathSource};
use crate::error::{BackupError, Result};
use crate::utils::cancel::CancellationToken;
use crate::utils::command::{CommandOutcome, CommandStream};
use crate::utils::docker_ops::ContainerOperations;
use crate::utils::executor::CommandExecutor;
use lifecycle::{settle, FinalizeReport, LifecycleAction, LifecycleSession};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use stream::{ArchiveStreamer, ExecTarget};
use tracing::info;

/// Result of a backup stream handed to a consumer
#[derive(Debug)]
pub struct BackupOutcome<T> {
    /// What the consumer returned
    pub value: T,
    pub command: CommandOutcome,
    /// Present when a temporary container was involved
    pub finalize: Option<FinalizeReport>,
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub command: CommandOutcome,
    pub finalize: Option<FinalizeReport>,
}

fn container_target(target: &ContainerTarget) -> ExecTarget {
    ExecTarget::Container {
        engine: target.engine.clone(),
        container: target.name.clone(),
    }
}

fn require_running(containers: &dyn ContainerOperations, target: &ContainerTarget) -> Result<()> {
    if containers.is_running(&target.engine, &target.name)? {
        Ok(())
    } else {
        Err(BackupError::Precondition(format!(
            "Container '{}' is not running",
            target.name
        )))
    }
}

pub struct FileOrDirectoryHandler {
    source: PathSource,
    streamer: ArchiveStreamer,
    containers: Arc<dyn ContainerOperations>,
}

impl FileOrDirectoryHandler {
    pub fn new(
        source: PathSource,
        executor: Arc<dyn CommandExecutor>,
        containers: Arc<dyn ContainerOperations>,
    ) -> Self {
        Self {
            source,
            streamer: ArchiveStreamer::new(executor),
            containers,
        }
    }

    pub fn is_using_container(&self) -> bool {
        self.source.container.is_some()
    }

    fn exec_target(&self) -> ExecTarget {
        self.source
            .container
            .as_ref()
            .map(container_target)
            .unwrap_or(ExecTarget::Host)
    }

    pub fn validate_before_creating_backup(&self) -> Result<()> {
        match self.source.container {
            Some(ref target) => require_running(self.containers.as_ref(), target),
            None => {
                let missing: Vec<&str> = self
                    .source
                    .paths
                    .iter()
                    .map(String::as_str)
                    .filter(|p| !Path::new(p).exists())
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(BackupError::Precondition(format!(
                        "Paths do not exist: {}",
                        missing.join(", ")
                    )))
                }
            }
        }
    }

    pub fn validate_before_restoring(&self) -> Result<()> {
        match self.source.container {
            Some(ref target) => require_running(self.containers.as_ref(), target),
            None => Ok(()),
        }
    }

    /// Pack on `target` instead of this handler's own location
    fn receive_backup_stream_on<T>(
        &self,
        target: &ExecTarget,
        cancel: &CancellationToken,
        consume: impl FnOnce(CommandStream) -> Result<T>,
    ) -> Result<(T, CommandOutcome)> {
        self.streamer
            .receive_backup_stream(target, &self.source.pack_command(), cancel, consume)
    }

    fn restore_backup_from_stream_on(
        &self,
        target: &ExecTarget,
        input: Box<dyn Read + Send>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome> {
        self.streamer
            .restore_backup_from_stream(target, &self.source.unpack_command(), input, cancel)
    }

    pub fn receive_backup_stream<T>(
        &self,
        cancel: &CancellationToken,
        consume: impl FnOnce(CommandStream) -> Result<T>,
    ) -> Result<BackupOutcome<T>> {
        let (value, command) = self.receive_backup_stream_on(&self.exec_target(), cancel, consume)?;
        Ok(BackupOutcome {
            value,
            command,
            finalize: None,
        })
    }

    pub fn restore_backup_from_stream(
        &self,
        input: Box<dyn Read + Send>,
        cancel: &CancellationToken,
    ) -> Result<RestoreOutcome> {
        let command = self.restore_backup_from_stream_on(&self.exec_target(), input, cancel)?;
        Ok(RestoreOutcome {
            command,
            finalize: None,
        })
    }
}

/// Backs up a running container in place
pub struct HotVolumeHandler {
    paths: FileOrDirectoryHandler,
    container: ContainerTarget,
}

impl HotVolumeHandler {
    pub fn new(
        source: PathSource,
        executor: Arc<dyn CommandExecutor>,
        containers: Arc<dyn ContainerOperations>,
    ) -> Result<Self> {
        let container = source.container.clone().ok_or_else(|| {
            BackupError::Configuration("container volume backups require a container".to_string())
        })?;
        Ok(Self {
            paths: FileOrDirectoryHandler::new(source, executor, containers),
            container,
        })
    }

    pub fn is_using_container(&self) -> bool {
        true
    }

    pub fn validate_before_creating_backup(&self) -> Result<()> {
        require_running(self.paths.containers.as_ref(), &self.container)
    }

    pub fn validate_before_restoring(&self) -> Result<()> {
        self.validate_before_creating_backup()
    }

    /// Pack inside `container`, the configured one unless told otherwise
    pub fn receive_backup_stream_from<T>(
        &self,
        container: &str,
        cancel: &CancellationToken,
        consume: impl FnOnce(CommandStream) -> Result<T>,
    ) -> Result<(T, CommandOutcome)> {
        let target = ExecTarget::Container {
            engine: self.container.engine.clone(),
            container: container.to_string(),
        };
        self.paths.receive_backup_stream_on(&target, cancel, consume)
    }

    pub fn restore_backup_from_stream_into(
        &self,
        container: &str,
        input: Box<dyn Read + Send>,
        cancel: &CancellationToken,
    ) -> Result<CommandOutcome> {
        let target = ExecTarget::Container {
            engine: self.container.engine.clone(),
            container: container.to_string(),
        };
        self.paths.restore_backup_from_stream_on(&target, input, cancel)
    }

    pub fn receive_backup_stream<T>(
        &self,
        cancel: &CancellationToken,
        consume: impl FnOnce(CommandStream) -> Result<T>,
    ) -> Result<BackupOutcome<T>> {
        let (value, command) = self.receive_backup_stream_from(&self.container.name, cancel, consume)?;
        Ok(BackupOutcome {
            value,
            command,
            finalize: None,
        })
    }

    pub fn restore_backup_from_stream(
        &self,
        input: Box<dyn Read + Send>,
        cancel: &CancellationToken,
    ) -> Result<RestoreOutcome> {
        let command = self.restore_backup_from_stream_into(&self.container.name, input, cancel)?;
        Ok(RestoreOutcome {
            command,
            finalize: None,
        })
    }
}

/// Backs up a stopped container's volumes through a temporary container
pub struct OfflineVolumeHandler {
    hot: HotVolumeHandler,
    offline: OfflineSettings,
}

impl OfflineVolumeHandler {
    pub fn new(
        source: PathSource,
        offline: OfflineSettings,
        executor: Arc<dyn CommandExecutor>,
        containers: Arc<dyn ContainerOperations>,
    ) -> Result<Self> {
        Ok(Self {
            hot: HotVolumeHandler::new(source, executor, containers)?,
            offline,
        })
    }

    pub fn is_using_container(&self) -> bool {
        true
    }

    /// Nothing to check: the origin is stopped by the handler itself
    pub fn validate_before_creating_backup(&self) -> Result<()> {
        Ok(())
    }

    pub fn validate_before_restoring(&self) -> Result<()> {
        Ok(())
    }

    fn session(&self, action: LifecycleAction) -> LifecycleSession {
        LifecycleSession::begin(
            Arc::clone(&self.hot.paths.containers),
            self.hot.container.engine.clone(),
            self.hot.container.name.clone(),
            action,
        )
    }

    pub fn receive_backup_stream<T>(
        &self,
        cancel: &CancellationToken,
        consume: impl FnOnce(CommandStream) -> Result<T>,
    ) -> Result<BackupOutcome<T>> {
        info!("Performing backup of origin container in offline mode");
        let mut session = self.session(LifecycleAction::Backup);

        let streamed = session
            .stop_origin_and_start_temporary_container(&self.offline, cancel)
            .and_then(|surrogate| {
                self.hot
                    .receive_backup_stream_from(surrogate.as_str(), cancel, consume)
            });

        let ((value, command), report) = settle(streamed, session.finalize())?;
        Ok(BackupOutcome {
            value,
            command,
            finalize: Some(report),
        })
    }

    pub fn restore_backup_from_stream(
        &self,
        input: Box<dyn Read + Send>,
        cancel: &CancellationToken,
    ) -> Result<RestoreOutcome> {
        info!("Restoring backup through the volumes of the origin container");
        let mut session = self.session(LifecycleAction::Restore);

        let restored = session
            .stop_origin_and_start_temporary_container(&self.offline, cancel)
            .and_then(|surrogate| {
                self.hot
                    .restore_backup_from_stream_into(surrogate.as_str(), input, cancel)
            });

        let (command, report) = settle(restored, session.finalize())?;
        Ok(RestoreOutcome {
            command,
            finalize: Some(report),
        })
    }
}

/// One handler per definition type
pub enum BackupHandler {
    FileOrDirectory(FileOrDirectoryHandler),
    HotContainer(HotVolumeHandler),
    OfflineContainer(OfflineVolumeHandler),
}

impl BackupHandler {
    pub fn for_definition(
        definition: &BackupDefinition,
        executor: Arc<dyn CommandExecutor>,
        containers: Arc<dyn ContainerOperations>,
    ) -> Result<Self> {
        let source = definition.source.clone();
        match definition.kind {
            DefinitionKind::Directory => Ok(BackupHandler::FileOrDirectory(
                FileOrDirectoryHandler::new(source, executor, containers),
            )),
            DefinitionKind::HotVolumes => Ok(BackupHandler::HotContainer(HotVolumeHandler::new(
                source, executor, containers,
            )?)),
            DefinitionKind::OfflineVolumes => {
                let offline = definition.offline.clone().unwrap_or_default();
                Ok(BackupHandler::OfflineContainer(OfflineVolumeHandler::new(
                    source, offline, executor, containers,
                )?))
            }
        }
    }

    pub fn is_using_container(&self) -> bool {
        match self {
            BackupHandler::FileOrDirectory(h) => h.is_using_container(),
            BackupHandler::HotContainer(h) => h.is_using_container(),
            BackupHandler::OfflineContainer(h) => h.is_using_container(),
        }
    }

    pub fn validate_before_creating_backup(&self) -> Result<()> {
        match self {
            BackupHandler::FileOrDirectory(h) => h.validate_before_creating_backup(),
            BackupHandler::HotContainer(h) => h.validate_before_creating_backup(),
            BackupHandler::OfflineContainer(h) => h.validate_before_creating_backup(),
        }
    }

    pub fn validate_before_restoring(&self) -> Result<()> {
        match self {
            BackupHandler::FileOrDirectory(h) => h.validate_before_restoring(),
            BackupHandler::HotContainer(h) => h.validate_before_restoring(),
            BackupHandler::OfflineContainer(h) => h.validate_before_restoring(),
        }
    }

    /// Produce the archive and hand it to `consume` while it is being produced
    pub fn receive_backup_stream<T>(
        &self,
        cancel: &CancellationToken,
        consume: impl FnOnce(CommandStream) -> Result<T>,
    ) -> Result<BackupOutcome<T>> {
        match self {
            BackupHandler::FileOrDirectory(h) => h.receive_backup_stream(cancel, consume),
            BackupHandler::HotContainer(h) => h.receive_backup_stream(cancel, consume),
            BackupHandler::OfflineContainer(h) => h.receive_backup_stream(cancel, consume),
        }
    }

    pub fn restore_backup_from_stream(
        &self,
        input: Box<dyn Read + Send>,
        cancel: &CancellationToken,
    ) -> Result<RestoreOutcome> {
        match self {
            BackupHandler::FileOrDirectory(h) => h.restore_backup_from_stream(input, cancel),
            BackupHandler::HotContainer(h) => h.restore_backup_from_stream(input, cancel),
            BackupHandler::OfflineContainer(h) => h.restore_backup_from_stream(input, cancel),
        }
    }
}
