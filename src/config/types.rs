use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub accesses: BTreeMap<String, AccessConfig>,
    #[serde(default)]
    pub encryption: BTreeMap<String, EncryptionConfig>,
    #[serde(default)]
    pub backups: BTreeMap<String, BackupConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GlobalConfig {
    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,

    /// Where per-container lock files live (system temp dir when unset)
    #[serde(default)]
    pub lock_directory: Option<PathBuf>,

    /// Container engine retry policy
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_level: default_log_level(),
            log_max_files: default_log_max_files(),
            lock_directory: None,
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

impl GlobalConfig {
    pub fn lock_directory(&self) -> PathBuf {
        self.lock_directory
            .as_deref()
            .map(super::expand_tilde)
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// A string that never shows up in `Debug` output
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Where finished archives are stored
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AccessConfig {
    /// Remote backup repository over HTTP(S)
    Http { url: String, token: Secret },
    /// A local (or mounted) directory
    Local { path: PathBuf },
}

/// Symmetric encryption applied to the archive stream
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EncryptionConfig {
    pub passphrase: Secret,

    #[serde(default = "default_encryption_method")]
    pub method: String,

    /// Override the encrypting command (reads stdin, writes stdout)
    #[serde(default)]
    pub encrypt_cmd: Option<String>,

    /// Override the decrypting command (reads stdin, writes stdout)
    #[serde(default)]
    pub decrypt_cmd: Option<String>,
}

/// A backup definition as written in the file
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Definition type: `directory`, `docker_hot_volumes` or `docker_volumes`
    #[serde(rename = "type")]
    pub backup_type: String,

    /// Name of an entry in `[accesses]`
    pub access: String,

    /// Name of an entry in `[encryption]`
    #[serde(default)]
    pub encryption: Option<String>,

    pub collection_id: String,

    #[serde(default)]
    pub container: Option<String>,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub docker_bin: Option<String>,
    #[serde(default)]
    pub tar_pack_cmd: Option<String>,
    #[serde(default)]
    pub tar_unpack_cmd: Option<String>,

    /// Image and command of the temporary container (offline backups)
    #[serde(default)]
    pub temp_image_name: Option<String>,
    #[serde(default)]
    pub temp_image_cmd: Option<String>,

    /// Directory archives are unpacked into on restore
    #[serde(default)]
    pub restore_target: Option<String>,
}

// Default value functions

fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_delay() -> u64 { 2 }
fn default_encryption_method() -> String { "aes-256-cbc".to_string() }
