//! File-based locking so one origin container is never driven by two
//! invocations at once

use anyhow::{Context, Result};
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lock file used for `key` under `lock_dir`
pub fn lock_path(lock_dir: &Path, key: &str) -> PathBuf {
    lock_dir.join(format!("container-backup-{}.lock", key))
}

/// Run `f` while holding the exclusive lock `key`.
///
/// Fails immediately when another invocation holds the lock. The lock file
/// stays in place afterwards so every holder locks the same inode.
pub fn with_exclusive_lock<T>(lock_dir: &Path, key: &str, f: impl FnOnce() -> T) -> Result<T> {
    let path = lock_path(lock_dir, key);
    debug!("Attempting to acquire lock: {:?}", path);

    std::fs::create_dir_all(lock_dir).context("Failed to create lock directory")?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Failed to open lock file: {:?}", path))?;

    let mut lock = RwLock::new(file);
    let guard = lock
        .try_write()
        .with_context(|| format!("'{}' is already in use by another invocation (lock held)", key))?;

    info!("Acquired lock: {}", key);
    let result = f();

    drop(guard);
    info!("Released lock: {}", key);

    Ok(result)
}
