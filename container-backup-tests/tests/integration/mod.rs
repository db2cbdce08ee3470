//! Integration tests for container-backup
//!
//! These tests require Docker and drive real containers through a full
//! backup and restore.
//! Run with: `cargo test -p container-backup-tests --test integration -- --ignored`

mod common;
