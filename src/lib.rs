//! Container Backup Library
//!
//! Backs up and restores paths that live on the host or inside containers,
//! stopping a container and reading its volumes through a temporary one
//! when it cannot be read safely while running.

pub mod config;
pub mod definition;
pub mod error;
pub mod handler;
pub mod managers;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config, parse_config, Config, ConfigError};
pub use definition::{BackupDefinition, DefinitionFactory, DefinitionKind};
pub use error::{BackupError, Result};
pub use handler::{BackupHandler, BackupOutcome, RestoreOutcome};
pub use managers::backup::{BackupManager, BackupReport, RestoreReport};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
