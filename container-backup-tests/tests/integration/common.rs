//! Common utilities for integration tests
//!
//! Cleanup guards and helpers to set up origin containers.

use anyhow::{bail, Result};
use container_backup::utils::docker::ORIGIN_LABEL;
use std::process::Command;

pub const IMAGE: &str = "alpine:3.9";

/// Guard that removes a container, its anonymous volumes and any temporary
/// containers spawned from it on drop (even on panic)
pub struct ContainerGuard {
    name: String,
}

impl ContainerGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        cleanup_surrogates(&self.name);
        let _ = Command::new("docker").args(["rm", "-f", "-v", &self.name]).output();
    }
}

fn cleanup_surrogates(origin: &str) {
    let filter = format!("label={}={}", ORIGIN_LABEL, origin);
    let Ok(output) = Command::new("docker").args(["ps", "-aq", "--filter", &filter]).output() else {
        return;
    };
    for id in String::from_utf8_lossy(&output.stdout).split_whitespace() {
        let _ = Command::new("docker").args(["rm", "-f", id]).output();
    }
}

/// Helper to check if Docker is available
pub fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Start a long-running container with an anonymous volume at `/var/www`
pub fn start_origin(name: &str) -> Result<ContainerGuard> {
    let guard = ContainerGuard::new(name);
    let output = Command::new("docker")
        .args(["run", "-d", "--name", name, "-v", "/var/www", IMAGE, "sleep", "3600"])
        .output()?;
    if !output.status.success() {
        bail!("docker run failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(guard)
}

/// Run a shell command inside `container` and return its stdout
pub fn exec(container: &str, script: &str) -> Result<String> {
    let output = Command::new("docker")
        .args(["exec", container, "sh", "-c", script])
        .output()?;
    if !output.status.success() {
        bail!("docker exec failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn is_running(container: &str) -> bool {
    Command::new("docker")
        .args(["inspect", "--format", "{{.State.Running}}", container])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim() == "true")
        .unwrap_or(false)
}
