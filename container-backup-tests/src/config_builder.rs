//! Fluent API for building test configurations
//!
//! Every builder owns a temporary directory holding its logs, locks and the
//! local archive store, so tests never share state.

use container_backup::config::{AccessConfig, BackupConfig, Config, EncryptionConfig, GlobalConfig, Secret};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the local access every minimal config gets
pub const LOCAL_ACCESS: &str = "local";

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    global: GlobalConfig,
    accesses: BTreeMap<String, AccessConfig>,
    encryption: BTreeMap<String, EncryptionConfig>,
    backups: BTreeMap<String, BackupConfig>,
}

impl ConfigBuilder {
    /// Create a builder with no accesses or backups
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let log_directory = temp_dir.path().join("logs");
        fs::create_dir_all(&log_directory).expect("Failed to create log_directory");

        let global = GlobalConfig {
            log_directory,
            log_level: "debug".to_string(),
            log_max_files: 3,
            lock_directory: Some(temp_dir.path().join("locks")),
            retry_attempts: 1,
            retry_delay_seconds: 0,
        };

        Self {
            temp_dir,
            global,
            accesses: BTreeMap::new(),
            encryption: BTreeMap::new(),
            backups: BTreeMap::new(),
        }
    }

    /// A builder with a local access named [`LOCAL_ACCESS`]
    pub fn minimal() -> Self {
        let builder = Self::new();
        let store = builder.temp_dir.path().join("store");
        fs::create_dir_all(&store).expect("Failed to create store dir");
        builder.add_local_access(LOCAL_ACCESS, &store)
    }

    pub fn add_local_access(mut self, name: &str, path: &Path) -> Self {
        self.accesses.insert(
            name.to_string(),
            AccessConfig::Local {
                path: path.to_path_buf(),
            },
        );
        self
    }

    pub fn add_http_access(mut self, name: &str, url: &str, token: &str) -> Self {
        self.accesses.insert(
            name.to_string(),
            AccessConfig::Http {
                url: url.to_string(),
                token: Secret::new(token),
            },
        );
        self
    }

    pub fn add_encryption(mut self, name: &str, passphrase: &str) -> Self {
        self.encryption.insert(
            name.to_string(),
            EncryptionConfig {
                passphrase: Secret::new(passphrase),
                method: "aes-256-cbc".to_string(),
                encrypt_cmd: None,
                decrypt_cmd: None,
            },
        );
        self
    }

    /// Add a `docker_volumes` backup of `container`
    pub fn add_offline_backup(self, name: &str, container: &str) -> Self {
        self.add_backup(name, crate::fixtures::offline_backup(container))
    }

    /// Add a `docker_hot_volumes` backup of `container`
    pub fn add_hot_backup(self, name: &str, container: &str) -> Self {
        self.add_backup(name, crate::fixtures::hot_backup(container))
    }

    /// Add a `directory` backup of host paths
    pub fn add_directory_backup(self, name: &str, paths: Vec<String>) -> Self {
        self.add_backup(name, crate::fixtures::directory_backup(paths))
    }

    /// Add a backup with full configuration
    pub fn add_backup(mut self, name: &str, backup: BackupConfig) -> Self {
        self.backups.insert(name.to_string(), backup);
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay_seconds: u64) -> Self {
        self.global.retry_attempts = attempts;
        self.global.retry_delay_seconds = delay_seconds;
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Where the local access stores archives
    pub fn store_path(&self) -> Option<PathBuf> {
        match self.accesses.get(LOCAL_ACCESS) {
            Some(AccessConfig::Local { path }) => Some(path.clone()),
            _ => None,
        }
    }

    /// Build the Config
    pub fn build(self) -> Config {
        self.persist().0
    }

    /// Build the Config and keep the temp directory alive
    pub fn persist(self) -> (Config, TempDir) {
        let config = Config {
            global: self.global,
            accesses: self.accesses,
            encryption: self.encryption,
            backups: self.backups,
        };
        (config, self.temp_dir)
    }

    /// Write the config as TOML into its temp directory and return the path
    pub fn write(self) -> (PathBuf, Config, TempDir) {
        let (config, temp_dir) = self.persist();
        let path = temp_dir.path().join("config.toml");
        let text = toml::to_string_pretty(&config).expect("Failed to serialize config");
        fs::write(&path, text).expect("Failed to write config");
        (path, config, temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
