//! Test utilities for container-backup
//!
//! Shared builders, fixtures and mock back-ends for the test targets of
//! this crate.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, MockContainerOps, MockExecutor};
//!
//! #[test]
//! fn my_test() {
//!     let (config, _dir) = ConfigBuilder::minimal()
//!         .add_offline_backup("www", "test_www")
//!         .persist();
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use container_backup::config::{
    AccessConfig, BackupConfig, Config, EncryptionConfig, GlobalConfig, Secret,
};
pub use container_backup::error::BackupError;

// Re-export mock implementations from the main crate
pub use container_backup::utils::docker_ops::mock::{ContainerCall, MockContainerOps};
pub use container_backup::utils::docker_ops::ContainerOperations;
pub use container_backup::utils::executor::mock::{MockExecutor, MockResponse};
pub use container_backup::utils::executor::CommandExecutor;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
