//! Backup manager - runs one backup or restore end to end
//!
//! validate → lock → handler stream → encryption → access, with the origin
//! container lifecycle owned by the handler.

use crate::config::Config;
use crate::definition::{BackupDefinition, DefinitionFactory};
use crate::error::{BackupError, Result};
use crate::handler::lifecycle::FinalizeReport;
use crate::handler::BackupHandler;
use crate::transport::{access_from_config, Access, Encryption};
use crate::utils::cancel::CancellationToken;
use crate::utils::docker::DockerCli;
use crate::utils::docker_ops::ContainerOperations;
use crate::utils::executor::{CommandExecutor, RealExecutor};
use crate::utils::locker::with_exclusive_lock;
use crate::utils::retry::RetryPolicy;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Summary of a finished backup
#[derive(Debug)]
pub struct BackupReport {
    pub definition: String,
    pub version: String,
    pub bytes: Option<u64>,
    pub finalize: Option<FinalizeReport>,
    pub duration: Duration,
}

/// Summary of a finished restore
#[derive(Debug)]
pub struct RestoreReport {
    pub definition: String,
    pub version: String,
    pub bytes: Option<u64>,
    pub finalize: Option<FinalizeReport>,
    pub duration: Duration,
}

pub struct BackupManager {
    config: Config,
    definitions: DefinitionFactory,
    executor: Arc<dyn CommandExecutor>,
    containers: Arc<dyn ContainerOperations>,
}

impl BackupManager {
    /// Manager driving real processes and the real container engine
    pub fn new(config: Config) -> Result<Self> {
        let executor: Arc<dyn CommandExecutor> = Arc::new(RealExecutor::new());
        let retry = RetryPolicy::new(
            config.global.retry_attempts,
            Duration::from_secs(config.global.retry_delay_seconds),
        );
        let containers = Arc::new(DockerCli::new(Arc::clone(&executor), retry));
        Self::with_operations(config, executor, containers)
    }

    /// Manager with injected process and container layers
    pub fn with_operations(
        config: Config,
        executor: Arc<dyn CommandExecutor>,
        containers: Arc<dyn ContainerOperations>,
    ) -> Result<Self> {
        let definitions = DefinitionFactory::from_config(&config)?;
        Ok(Self {
            config,
            definitions,
            executor,
            containers,
        })
    }

    pub fn definitions(&self) -> &DefinitionFactory {
        &self.definitions
    }

    /// Programs the definitions need that are not on `PATH`
    pub fn missing_binaries(&self) -> Vec<String> {
        let mut needed = BTreeSet::new();
        for definition in self.definitions.iter() {
            if let Some(target) = definition.container() {
                needed.insert(target.engine.program().to_string());
            }
            if let Some(ref encryption) = definition.encryption {
                if encryption.encrypt_cmd.is_none() || encryption.decrypt_cmd.is_none() {
                    needed.insert("openssl".to_string());
                }
            }
        }

        needed
            .into_iter()
            .filter(|program| which::which(program).is_err())
            .collect()
    }

    fn prepare(&self, name: &str) -> Result<(&BackupDefinition, BackupHandler, Box<dyn Access>, Encryption)> {
        let definition = self.definitions.get(name)?;
        let handler = BackupHandler::for_definition(
            definition,
            Arc::clone(&self.executor),
            Arc::clone(&self.containers),
        )?;
        let access = access_from_config(&definition.access)
            .map_err(|e| BackupError::Configuration(format!("backups.{}: {:#}", name, e)))?;
        let encryption = Encryption::new(definition.encryption.clone(), Arc::clone(&self.executor));
        Ok((definition, handler, access, encryption))
    }

    fn locked<T>(&self, definition: &BackupDefinition, f: impl FnOnce() -> Result<T>) -> Result<T> {
        with_exclusive_lock(&self.config.global.lock_directory(), &definition.lock_key(), f)
            .map_err(|e| BackupError::Precondition(format!("{:#}", e)))?
    }

    fn token(timeout: Option<Duration>) -> CancellationToken {
        let cancel = CancellationToken::new();
        if let Some(timeout) = timeout {
            cancel.cancel_after(timeout);
        }
        cancel
    }

    /// Back up definition `name`, giving up after `timeout` if set
    pub fn backup(&self, name: &str, timeout: Option<Duration>) -> Result<BackupReport> {
        self.backup_with(name, &Self::token(timeout))
    }

    pub fn backup_with(&self, name: &str, cancel: &CancellationToken) -> Result<BackupReport> {
        let start_time = Instant::now();
        info!("Starting backup: {}", name);

        let result = self.prepare(name).and_then(|(definition, handler, access, encryption)| {
            info!(
                "Backing up '{}' ({}) to {}",
                name,
                definition.kind,
                access.describe()
            );
            self.locked(definition, || {
                handler.validate_before_creating_backup()?;

                let outcome = handler.receive_backup_stream(cancel, |stream| {
                    let encrypted = encryption
                        .wrap(Box::new(stream), cancel)
                        .map_err(|e| BackupError::transfer(format!("{:#}", e)))?;
                    access
                        .upload(&definition.collection_id, encrypted)
                        .map_err(|e| BackupError::transfer(format!("{:#}", e)))
                })?;

                Ok(BackupReport {
                    definition: name.to_string(),
                    version: outcome.value.version,
                    bytes: outcome.value.bytes,
                    finalize: outcome.finalize,
                    duration: start_time.elapsed(),
                })
            })
        });

        match result {
            Ok(report) => {
                if let Some(warning) = report.finalize.as_ref().and_then(|f| f.kill.warning()) {
                    warn!("Backup '{}' succeeded with a warning: {}", name, warning);
                }
                info!(
                    "Backup '{}' stored as version {} in {:.2}s",
                    name,
                    report.version,
                    report.duration.as_secs_f64()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Backup '{}' failed: {}", name, e);
                Err(e)
            }
        }
    }

    /// Restore `version` (latest when `None`) of definition `name`
    pub fn restore(&self, name: &str, version: Option<&str>, timeout: Option<Duration>) -> Result<RestoreReport> {
        self.restore_with(name, version, &Self::token(timeout))
    }

    pub fn restore_with(
        &self,
        name: &str,
        version: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RestoreReport> {
        let start_time = Instant::now();
        let version_label = version.unwrap_or(crate::transport::LATEST_VERSION).to_string();
        info!("Starting restore of '{}' version {}", name, version_label);

        let result = self.prepare(name).and_then(|(definition, handler, access, encryption)| {
            self.locked(definition, || {
                handler.validate_before_restoring()?;

                let download = access
                    .download(&definition.collection_id, version)
                    .map_err(|e| BackupError::transfer(format!("{:#}", e)))?;
                let plain = encryption
                    .unwrap(download, cancel)
                    .map_err(|e| BackupError::transfer(format!("{:#}", e)))?;

                let outcome = handler.restore_backup_from_stream(plain, cancel)?;

                Ok(RestoreReport {
                    definition: name.to_string(),
                    version: version_label.clone(),
                    bytes: outcome.command.bytes_fed,
                    finalize: outcome.finalize,
                    duration: start_time.elapsed(),
                })
            })
        });

        match result {
            Ok(report) => {
                if let Some(warning) = report.finalize.as_ref().and_then(|f| f.kill.warning()) {
                    warn!("Restore '{}' succeeded with a warning: {}", name, warning);
                }
                info!(
                    "Restore of '{}' completed in {:.2}s",
                    name,
                    report.duration.as_secs_f64()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Restore of '{}' failed: {}", name, e);
                Err(e)
            }
        }
    }
}
