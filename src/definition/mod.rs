//! Backup definitions built from the `[backups]` configuration
//!
//! A [`BackupDefinition`] is a fully validated job: its access and encryption
//! references are resolved, its templates checked and its defaults applied.
//! [`DefinitionFactory`] builds all of them up front, so a broken section is
//! reported before any container is touched.

pub mod template;

use crate::config::{AccessConfig, BackupConfig, Config, ConfigError, EncryptionConfig};
use crate::error::{BackupError, Result};
use crate::utils::docker::EngineBin;
use std::collections::BTreeMap;
use std::fmt;
use template::{CommandTemplate, DEFAULT_PACK_CMD, DEFAULT_UNPACK_CMD};

pub const DEFAULT_TEMP_IMAGE_NAME: &str = "alpine:3.9";
pub const DEFAULT_TEMP_IMAGE_CMD: &str = "sleep 3600";

/// Unpacked archives land here unless `restore_target` says otherwise
pub const DEFAULT_RESTORE_TARGET: &str = "/";

/// The `type` of a backup definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    /// `directory`: paths on the host, or inside `container` if one is set
    Directory,
    /// `docker_hot_volumes`: paths inside a running container
    HotVolumes,
    /// `docker_volumes`: paths in a stopped container's volumes, read through a temporary container
    OfflineVolumes,
}

impl DefinitionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "directory" => Some(DefinitionKind::Directory),
            "docker_hot_volumes" => Some(DefinitionKind::HotVolumes),
            "docker_volumes" => Some(DefinitionKind::OfflineVolumes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Directory => "directory",
            DefinitionKind::HotVolumes => "docker_hot_volumes",
            DefinitionKind::OfflineVolumes => "docker_volumes",
        }
    }

    fn requires_container(&self) -> bool {
        !matches!(self, DefinitionKind::Directory)
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A container reached through a specific engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerTarget {
    pub name: String,
    pub engine: EngineBin,
}

/// What gets packed and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSource {
    pub paths: Vec<String>,
    pub pack: CommandTemplate,
    pub unpack: CommandTemplate,
    pub target_root: String,
    pub container: Option<ContainerTarget>,
}

impl PathSource {
    pub fn pack_command(&self) -> String {
        self.pack.render_pack(&self.paths)
    }

    pub fn unpack_command(&self) -> String {
        self.unpack.render_unpack(&self.paths, &self.target_root)
    }
}

/// Temporary container used by offline backups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineSettings {
    pub temp_image_name: String,
    pub temp_image_cmd: String,
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            temp_image_name: DEFAULT_TEMP_IMAGE_NAME.to_string(),
            temp_image_cmd: DEFAULT_TEMP_IMAGE_CMD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupDefinition {
    pub name: String,
    pub kind: DefinitionKind,
    pub collection_id: String,
    pub access: AccessConfig,
    pub encryption: Option<EncryptionConfig>,
    pub source: PathSource,
    /// Set only for [`DefinitionKind::OfflineVolumes`]
    pub offline: Option<OfflineSettings>,
}

impl BackupDefinition {
    /// Build and validate the definition of section `backups.<name>`
    pub fn from_config(
        name: &str,
        backup: &BackupConfig,
        config: &Config,
    ) -> std::result::Result<Self, ConfigError> {
        let kind = DefinitionKind::parse(&backup.backup_type).ok_or_else(|| {
            ConfigError::UnknownType {
                section: name.to_string(),
                backup_type: backup.backup_type.clone(),
            }
        })?;
        let invalid = |msg: String| ConfigError::ValidationError(format!("backups.{}: {}", name, msg));

        let access = config
            .accesses
            .get(&backup.access)
            .cloned()
            .ok_or_else(|| ConfigError::AccessNotFound(backup.access.clone()))?;

        let encryption = match backup.encryption.as_deref() {
            Some(key) => Some(
                config
                    .encryption
                    .get(key)
                    .cloned()
                    .ok_or_else(|| ConfigError::EncryptionNotFound(key.to_string()))?,
            ),
            None => None,
        };

        if backup.paths.is_empty() {
            return Err(invalid("paths must not be empty".to_string()));
        }
        if backup.paths.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("paths must not contain blank entries".to_string()));
        }

        let engine = match backup.docker_bin.as_deref() {
            Some(bin) => EngineBin::parse(bin)
                .ok_or_else(|| invalid("docker_bin must not be blank".to_string()))?,
            None => EngineBin::default(),
        };

        let container = match backup.container.as_deref().map(str::trim) {
            Some("") => return Err(invalid("container must not be blank".to_string())),
            Some(container) => Some(ContainerTarget {
                name: container.to_string(),
                engine,
            }),
            None if kind.requires_container() => {
                return Err(invalid(format!("type '{}' requires 'container'", kind)))
            }
            None => None,
        };

        let prefixed = |err: ConfigError| match err {
            ConfigError::ValidationError(msg) => invalid(msg),
            other => other,
        };
        let pack = CommandTemplate::pack(backup.tar_pack_cmd.as_deref().unwrap_or(DEFAULT_PACK_CMD))
            .map_err(prefixed)?;
        let unpack =
            CommandTemplate::unpack(backup.tar_unpack_cmd.as_deref().unwrap_or(DEFAULT_UNPACK_CMD))
                .map_err(prefixed)?;

        let offline = match kind {
            DefinitionKind::OfflineVolumes => {
                let defaults = OfflineSettings::default();
                let settings = OfflineSettings {
                    temp_image_name: backup
                        .temp_image_name
                        .clone()
                        .unwrap_or(defaults.temp_image_name),
                    temp_image_cmd: backup
                        .temp_image_cmd
                        .clone()
                        .unwrap_or(defaults.temp_image_cmd),
                };
                if settings.temp_image_name.trim().is_empty() {
                    return Err(invalid("temp_image_name must not be blank".to_string()));
                }
                if settings.temp_image_cmd.trim().is_empty() {
                    return Err(invalid("temp_image_cmd must not be blank".to_string()));
                }
                Some(settings)
            }
            _ => {
                if backup.temp_image_name.is_some() || backup.temp_image_cmd.is_some() {
                    return Err(invalid(format!(
                        "temp_image_name/temp_image_cmd only apply to type '{}'",
                        DefinitionKind::OfflineVolumes
                    )));
                }
                None
            }
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            collection_id: backup.collection_id.clone(),
            access,
            encryption,
            source: PathSource {
                paths: backup.paths.clone(),
                pack,
                unpack,
                target_root: backup
                    .restore_target
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RESTORE_TARGET.to_string()),
                container,
            },
            offline,
        })
    }

    pub fn container(&self) -> Option<&ContainerTarget> {
        self.source.container.as_ref()
    }

    pub fn is_using_container(&self) -> bool {
        self.source.container.is_some()
    }

    /// Key of the lock serializing invocations: the container when there is
    /// one, since two definitions may share it
    pub fn lock_key(&self) -> String {
        let raw = match self.container() {
            Some(target) => format!("container-{}", target.name),
            None => format!("definition-{}", self.name),
        };
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// All definitions of a configuration, by name
#[derive(Debug, Clone)]
pub struct DefinitionFactory {
    definitions: BTreeMap<String, BackupDefinition>,
}

impl DefinitionFactory {
    pub fn from_config(config: &Config) -> std::result::Result<Self, ConfigError> {
        let definitions = config
            .backups
            .iter()
            .map(|(name, backup)| {
                BackupDefinition::from_config(name, backup, config).map(|d| (name.clone(), d))
            })
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()?;

        Ok(Self { definitions })
    }

    pub fn get(&self, name: &str) -> Result<&BackupDefinition> {
        self.definitions.get(name).ok_or_else(|| {
            BackupError::Configuration(format!(
                "No such backup definition '{}', known: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackupDefinition> {
        self.definitions.values()
    }
}
