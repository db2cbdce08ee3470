//! Container lifecycle operations abstraction for testability
//!
//! [`ContainerOperations`] is everything the handlers need from a container
//! engine: stop, start, spawn a temporary container sharing another one's
//! volumes, and kill it again. `DockerCli` in `docker.rs` is the real one.

use super::docker::EngineBin;
use crate::error::Result;
use std::fmt;

/// Engine-assigned identifier of a temporary container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurrogateId(String);

impl SurrogateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurrogateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened when tearing down a temporary container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    Killed(SurrogateId),
    /// The container may still be running; an operational leak, not a failed backup
    Failed { surrogate: SurrogateId, reason: String },
    /// Nothing was spawned, nothing to kill
    NotSpawned,
}

impl KillOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, KillOutcome::Failed { .. })
    }

    /// Warning text for a failed kill
    pub fn warning(&self) -> Option<String> {
        match self {
            KillOutcome::Failed { surrogate, reason } => Some(format!(
                "Cannot kill temporary container \"{}\": {}",
                surrogate, reason
            )),
            _ => None,
        }
    }
}

/// Abstraction for container engine operations, enabling mocking in tests
pub trait ContainerOperations: Send + Sync {
    /// Stop a container. Stopping an already stopped container succeeds.
    fn stop(&self, engine: &EngineBin, container: &str) -> Result<()>;

    /// Start a stopped container again
    fn start(&self, engine: &EngineBin, container: &str) -> Result<()>;

    /// Run `run_cmd` in a new detached container of `image` that mounts all
    /// volumes of `origin`
    fn spawn_temporary(
        &self,
        engine: &EngineBin,
        origin: &str,
        image: &str,
        run_cmd: &str,
    ) -> Result<SurrogateId>;

    /// Force-stop and remove a temporary container. Never fails the caller.
    fn kill(&self, engine: &EngineBin, surrogate: &SurrogateId) -> KillOutcome;

    fn is_running(&self, engine: &EngineBin, container: &str) -> Result<bool>;
}

/// Mock implementation for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use crate::error::BackupError;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// Recorded container operation call
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum ContainerCall {
        Stop { container: String },
        Start { container: String },
        Spawn { origin: String, image: String, cmd: String },
        Kill { surrogate: String },
        IsRunning { container: String },
    }

    /// Mock container engine for testing
    ///
    /// Tracks which containers are running, so tests can probe the origin's
    /// state after an invocation.
    #[derive(Clone, Default)]
    pub struct MockContainerOps {
        /// Recorded operation calls
        pub calls: Arc<Mutex<Vec<ContainerCall>>>,
        running: Arc<Mutex<HashMap<String, bool>>>,
        failing: Arc<Mutex<HashSet<&'static str>>>,
        spawned: Arc<Mutex<u32>>,
    }

    impl MockContainerOps {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a container in the running state
        pub fn with_running(self, container: &str) -> Self {
            self.running
                .lock()
                .unwrap()
                .insert(container.to_string(), true);
            self
        }

        /// Register a container in the stopped state
        pub fn with_stopped(self, container: &str) -> Self {
            self.running
                .lock()
                .unwrap()
                .insert(container.to_string(), false);
            self
        }

        pub fn with_failing_stop(self) -> Self {
            self.fail("stop")
        }

        pub fn with_failing_start(self) -> Self {
            self.fail("start")
        }

        pub fn with_failing_spawn(self) -> Self {
            self.fail("spawn")
        }

        pub fn with_failing_kill(self) -> Self {
            self.fail("kill")
        }

        fn fail(self, operation: &'static str) -> Self {
            self.failing.lock().unwrap().insert(operation);
            self
        }

        fn should_fail(&self, operation: &str) -> bool {
            self.failing.lock().unwrap().contains(operation)
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<ContainerCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Recorded stop/spawn/kill/start calls only, dropping state probes
        pub fn lifecycle_calls(&self) -> Vec<ContainerCall> {
            self.get_calls()
                .into_iter()
                .filter(|c| !matches!(c, ContainerCall::IsRunning { .. }))
                .collect()
        }

        pub fn count(&self, predicate: impl Fn(&ContainerCall) -> bool) -> usize {
            self.get_calls().iter().filter(|c| predicate(c)).count()
        }

        /// Current state of a container, as far as the mock knows
        pub fn is_running_now(&self, container: &str) -> bool {
            self.running
                .lock()
                .unwrap()
                .get(container)
                .copied()
                .unwrap_or(false)
        }

        fn record_call(&self, call: ContainerCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn set_running(&self, container: &str, running: bool) {
            self.running
                .lock()
                .unwrap()
                .insert(container.to_string(), running);
        }
    }

    impl ContainerOperations for MockContainerOps {
        fn stop(&self, _engine: &EngineBin, container: &str) -> Result<()> {
            self.record_call(ContainerCall::Stop {
                container: container.to_string(),
            });
            if self.should_fail("stop") {
                return Err(BackupError::WorkloadStop {
                    container: container.to_string(),
                    reason: "Mock stop failure".to_string(),
                });
            }
            self.set_running(container, false);
            Ok(())
        }

        fn start(&self, _engine: &EngineBin, container: &str) -> Result<()> {
            self.record_call(ContainerCall::Start {
                container: container.to_string(),
            });
            if self.should_fail("start") {
                return Err(BackupError::OriginRestart {
                    container: container.to_string(),
                    reason: "Mock start failure".to_string(),
                    previous: None,
                });
            }
            self.set_running(container, true);
            Ok(())
        }

        fn spawn_temporary(
            &self,
            _engine: &EngineBin,
            origin: &str,
            image: &str,
            run_cmd: &str,
        ) -> Result<SurrogateId> {
            self.record_call(ContainerCall::Spawn {
                origin: origin.to_string(),
                image: image.to_string(),
                cmd: run_cmd.to_string(),
            });
            if self.should_fail("spawn") {
                return Err(BackupError::Spawn {
                    origin: origin.to_string(),
                    reason: "Mock spawn failure".to_string(),
                });
            }

            let mut spawned = self.spawned.lock().unwrap();
            *spawned += 1;
            let id = format!("surrogate-{}", *spawned);
            self.set_running(&id, true);
            Ok(SurrogateId::new(id))
        }

        fn kill(&self, _engine: &EngineBin, surrogate: &SurrogateId) -> KillOutcome {
            self.record_call(ContainerCall::Kill {
                surrogate: surrogate.to_string(),
            });
            if self.should_fail("kill") {
                return KillOutcome::Failed {
                    surrogate: surrogate.clone(),
                    reason: "Mock kill failure".to_string(),
                };
            }
            self.running.lock().unwrap().remove(surrogate.as_str());
            KillOutcome::Killed(surrogate.clone())
        }

        fn is_running(&self, _engine: &EngineBin, container: &str) -> Result<bool> {
            self.record_call(ContainerCall::IsRunning {
                container: container.to_string(),
            });
            Ok(self.is_running_now(container))
        }
    }
}
