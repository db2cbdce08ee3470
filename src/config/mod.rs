//! Configuration module for container-backup
//!
//! Loads the TOML file describing where archives go (`[accesses]`), how
//! they are encrypted (`[encryption]`) and what is backed up (`[backups]`).
//!
//! ## Example
//!
//! ```toml
//! [accesses.backup_one]
//! type = "http"
//! url = "https://backups.example.org"
//! token = "${BACKUP_TOKEN}"
//!
//! [encryption.enc1]
//! passphrase = "${BACKUP_PASSPHRASE}"
//!
//! [backups.www_docker_offline]
//! type = "docker_volumes"
//! container = "test_www"
//! access = "backup_one"
//! encryption = "enc1"
//! collection_id = "${COLLECTION_ID}"
//! paths = ["/etc", "/var/lib/mysql"]
//! temp_image_name = "alpine:3.9"
//! ```
//!
//! Referenced accesses and encryption entries are checked here; everything
//! type-specific is checked when the definitions are built.

mod loader;
mod types;

pub use loader::{expand_env_vars, load_config, parse_config, ConfigError, Result};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
