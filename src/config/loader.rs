use super::types::*;
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingVariable(String),

    #[error("Access '{0}' not found")]
    AccessNotFound(String),

    #[error("Encryption '{0}' not found")]
    EncryptionNotFound(String),

    #[error("backups.{section}: unknown backup type '{backup_type}'")]
    UnknownType { section: String, backup_type: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate configuration text, expanding `${VAR}` references first
pub fn parse_config(contents: &str) -> Result<Config> {
    let expanded = expand_env_vars(contents)?;
    let config: Config = toml::from_str(&expanded)?;
    validate_config(&config)?;
    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
    })
}

/// Replace every `${VAR}` with the value of the environment variable
pub fn expand_env_vars(contents: &str) -> Result<String> {
    let mut missing = None;

    let expanded = env_var_pattern().replace_all(contents, |caps: &Captures| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(ConfigError::MissingVariable(name)),
        None => Ok(expanded.into_owned()),
    }
}

/// Validate cross references; type-specific checks happen when definitions are built
fn validate_config(config: &Config) -> Result<()> {
    if config.backups.is_empty() {
        return Err(ConfigError::ValidationError(
            "No backups defined".to_string(),
        ));
    }

    for (name, backup) in &config.backups {
        validate_backup(name, backup, config)?;
    }

    Ok(())
}

fn validate_backup(name: &str, backup: &BackupConfig, config: &Config) -> Result<()> {
    if !config.accesses.contains_key(&backup.access) {
        return Err(ConfigError::AccessNotFound(backup.access.clone()));
    }

    if let Some(ref encryption) = backup.encryption {
        if !config.encryption.contains_key(encryption) {
            return Err(ConfigError::EncryptionNotFound(encryption.clone()));
        }
    }

    if backup.collection_id.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "backups.{}: collection_id must not be empty",
            name
        )));
    }

    Ok(())
}
