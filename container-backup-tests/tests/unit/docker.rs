//! Unit tests for the container engine client
//!
//! `DockerCli` is driven through `MockExecutor`, so the exact engine command
//! lines can be asserted.

use container_backup::utils::docker::{DockerCli, EngineBin, ORIGIN_LABEL};
use container_backup::utils::docker_ops::{KillOutcome, SurrogateId};
use container_backup::utils::RetryPolicy;
use container_backup::BackupError;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{ContainerOperations, MockExecutor, MockResponse};

fn docker(executor: &MockExecutor, attempts: u32) -> DockerCli {
    DockerCli::new(
        Arc::new(executor.clone()),
        RetryPolicy::new(attempts, Duration::ZERO),
    )
}

#[test]
fn test_prefixed_engine_is_used_for_every_call() {
    let executor = MockExecutor::new().expect("run -d", MockResponse::ok("f00d\n"));
    let engine = EngineBin::parse("sudo docker").unwrap();
    let cli = docker(&executor, 1);

    cli.stop(&engine, "test_www").unwrap();
    let id = cli
        .spawn_temporary(&engine, "test_www", "alpine:3.9", "sleep 3600")
        .unwrap();
    cli.kill(&engine, &id);
    cli.start(&engine, "test_www").unwrap();

    let lines = executor.command_lines();
    assert_eq!(lines.len(), 5);
    assert!(lines.iter().all(|l| l.starts_with("sudo docker ")), "{:?}", lines);
}

#[test]
fn test_spawn_labels_origin() {
    let executor = MockExecutor::new().expect("run -d", MockResponse::ok("f00d\n"));

    docker(&executor, 1)
        .spawn_temporary(&EngineBin::default(), "test_www", "alpine:3.9", "sleep 3600")
        .unwrap();

    let line = &executor.command_lines()[0];
    assert!(line.contains(&format!("--label {}=test_www", ORIGIN_LABEL)));
}

#[test]
fn test_spawn_takes_last_line_as_id() {
    let executor = MockExecutor::new().expect(
        "run -d",
        MockResponse::ok("Pulling from library/alpine\nStatus: Downloaded\n4e1f2c9a\n"),
    );

    let id = docker(&executor, 1)
        .spawn_temporary(&EngineBin::default(), "test_www", "alpine:3.9", "sleep 3600")
        .unwrap();

    assert_eq!(id, SurrogateId::new("4e1f2c9a"));
}

#[test]
fn test_spawn_without_id_is_error() {
    let executor = MockExecutor::new().expect("run -d", MockResponse::ok("\n"));

    let err = docker(&executor, 1)
        .spawn_temporary(&EngineBin::default(), "test_www", "alpine:3.9", "sleep 3600")
        .unwrap_err();

    assert!(matches!(err, BackupError::Spawn { .. }));
}

#[test]
fn test_start_failure_is_origin_restart() {
    let executor = MockExecutor::new().expect("start", MockResponse::fail(1, "No such container: test_www"));

    let err = docker(&executor, 3)
        .start(&EngineBin::default(), "test_www")
        .unwrap_err();

    assert!(err.is_origin_down());
    // Permanent failures are not retried
    assert_eq!(executor.call_count("start test_www"), 1);
}

#[test]
fn test_start_retried_on_transient_failure() {
    let executor = MockExecutor::new().expect_sequence(
        "start",
        vec![
            MockResponse::fail(1, "Cannot connect to the Docker daemon at unix:///var/run/docker.sock"),
            MockResponse::fail(1, "Cannot connect to the Docker daemon at unix:///var/run/docker.sock"),
            MockResponse::ok("test_www"),
        ],
    );

    docker(&executor, 3)
        .start(&EngineBin::default(), "test_www")
        .unwrap();

    assert_eq!(executor.call_count("start test_www"), 3);
}

#[test]
fn test_kill_of_exited_surrogate_still_removes_it() {
    let executor = MockExecutor::new()
        .expect("kill", MockResponse::fail(1, "Container f00d is not running"));

    let outcome = docker(&executor, 1).kill(&EngineBin::default(), &SurrogateId::new("f00d"));

    assert_eq!(outcome, KillOutcome::Killed(SurrogateId::new("f00d")));
    assert!(executor.was_called("rm -f f00d"));
}

#[test]
fn test_engine_missing_is_reported() {
    let executor = MockExecutor::new().with_default_response(MockResponse::Unavailable);

    let err = docker(&executor, 1)
        .is_running(&EngineBin::default(), "test_www")
        .unwrap_err();

    assert!(matches!(err, BackupError::Precondition(_)));
}
