pub mod cancel;
pub mod command;
pub mod docker;
pub mod locker;
pub mod retry;

// Trait-based abstractions for testability
pub mod docker_ops;
pub mod executor;

// Re-export commonly used types and traits (used by test crate)
pub use cancel::CancellationToken;
pub use docker::{DockerCli, EngineBin};
pub use docker_ops::{ContainerOperations, KillOutcome, SurrogateId};
pub use executor::{CommandExecutor, RealExecutor};
pub use retry::RetryPolicy;
