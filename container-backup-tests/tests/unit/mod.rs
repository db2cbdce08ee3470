//! Unit tests for container-backup
//!
//! Configuration, definitions and the container engine client, all without
//! touching a real engine.

mod config;
mod definition;
mod docker;
