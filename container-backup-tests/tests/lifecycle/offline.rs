//! Offline volume backups: stop, substitute, restart

use super::{handler, read_all};
use container_backup::handler::lifecycle::LifecycleAction;
use container_backup::utils::docker::DockerCli;
use container_backup::utils::docker_ops::KillOutcome;
use container_backup::utils::{CancellationToken, RetryPolicy};
use container_backup::{BackupError, BackupManager};
use rstest::rstest;
use std::io::Cursor;
use std::sync::Arc;
use test_utils::{ConfigBuilder, ContainerCall, MockContainerOps, MockExecutor, MockResponse, RecordingAccess};

const ORIGIN: &str = "test_www";

fn offline_config() -> test_utils::Config {
    ConfigBuilder::minimal().add_offline_backup("www", ORIGIN).build()
}

fn stop() -> ContainerCall {
    ContainerCall::Stop {
        container: ORIGIN.to_string(),
    }
}

fn start() -> ContainerCall {
    ContainerCall::Start {
        container: ORIGIN.to_string(),
    }
}

#[test]
fn test_backup_cycle_order_and_restart() {
    let ops = MockContainerOps::new().with_running(ORIGIN);
    let executor = MockExecutor::new().expect("tar -czf", MockResponse::ok(b"ARCHIVE".to_vec()));
    let access = RecordingAccess::new();

    let outcome = handler(&offline_config(), "www", &executor, &ops)
        .receive_backup_stream(&CancellationToken::new(), |stream| {
            use container_backup::transport::Access;
            access
                .upload("collection-1", Box::new(stream))
                .map_err(BackupError::transfer)
        })
        .unwrap();

    assert_eq!(outcome.value.bytes, Some(7));
    assert_eq!(access.uploads()[0].1, b"ARCHIVE");
    assert!(ops.is_running_now(ORIGIN));

    let calls = ops.lifecycle_calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0], stop());
    assert!(matches!(calls[1], ContainerCall::Spawn { ref origin, ref image, .. } if origin == ORIGIN && image == "alpine:3.9"));
    assert_eq!(
        calls[2],
        ContainerCall::Kill {
            surrogate: "surrogate-1".to_string()
        }
    );
    assert_eq!(calls[3], start());

    let report = outcome.finalize.unwrap();
    assert_eq!(report.action, LifecycleAction::Backup);
    assert_eq!(report.kill, KillOutcome::Killed(container_backup::utils::SurrogateId::new("surrogate-1")));
}

#[rstest]
#[case::pack_fails(MockResponse::fail(2, "tar: /var/www: Cannot stat"), false)]
#[case::upload_fails(MockResponse::ok(b"ARCHIVE".to_vec()), true)]
fn test_origin_running_after_failed_backup(#[case] pack: MockResponse, #[case] failing_upload: bool) {
    let ops = MockContainerOps::new().with_running(ORIGIN);
    let executor = MockExecutor::new().expect("tar -czf", pack);
    let access = if failing_upload {
        RecordingAccess::failing()
    } else {
        RecordingAccess::new()
    };

    let result = handler(&offline_config(), "www", &executor, &ops).receive_backup_stream(
        &CancellationToken::new(),
        |stream| {
            use container_backup::transport::Access;
            access
                .upload("collection-1", Box::new(stream))
                .map_err(BackupError::transfer)
        },
    );

    match result {
        Err(BackupError::PackExecution { .. }) => assert!(!failing_upload),
        Err(BackupError::Transfer(_)) => assert!(failing_upload),
        other => panic!("unexpected result: {:?}", other.map(|o| o.value)),
    }
    assert!(ops.is_running_now(ORIGIN), "origin must be started again");
    assert_eq!(ops.count(|c| *c == start()), 1);
    assert!(access.uploads().is_empty());
}

#[test]
fn test_spawn_failure_stops_and_starts_once() {
    let ops = MockContainerOps::new().with_running(ORIGIN).with_failing_spawn();
    let executor = MockExecutor::new();

    let err = handler(&offline_config(), "www", &executor, &ops)
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap_err();

    assert!(matches!(err, BackupError::Spawn { .. }));
    assert_eq!(ops.count(|c| *c == stop()), 1);
    assert_eq!(ops.count(|c| *c == start()), 1);
    assert_eq!(ops.count(|c| matches!(c, ContainerCall::Kill { .. })), 0);
    assert!(executor.get_calls().is_empty(), "nothing may run without a surrogate");
    assert!(ops.is_running_now(ORIGIN));
}

#[test]
fn test_stop_failure_still_attempts_start() {
    let ops = MockContainerOps::new().with_running(ORIGIN).with_failing_stop();

    let err = handler(&offline_config(), "www", &MockExecutor::new(), &ops)
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap_err();

    assert!(matches!(err, BackupError::WorkloadStop { .. }));
    assert_eq!(ops.lifecycle_calls(), vec![stop(), start()]);
}

#[test]
fn test_kill_failure_is_a_warning() {
    let ops = MockContainerOps::new().with_running(ORIGIN).with_failing_kill();
    let executor = MockExecutor::new().expect("tar -czf", MockResponse::ok(b"ARCHIVE".to_vec()));

    let outcome = handler(&offline_config(), "www", &executor, &ops)
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap();

    assert_eq!(outcome.value, b"ARCHIVE");
    let report = outcome.finalize.unwrap();
    assert!(report.kill.is_failed());
    assert!(report.kill.warning().unwrap().contains("surrogate-1"));
    assert!(report.origin_restarted);
    assert_eq!(ops.lifecycle_calls().last(), Some(&start()));
}

#[test]
fn test_restart_failure_carries_previous_error() {
    let ops = MockContainerOps::new().with_running(ORIGIN).with_failing_start();
    let executor = MockExecutor::new().expect("tar -czf", MockResponse::fail(2, "tar: broken"));

    let err = handler(&offline_config(), "www", &executor, &ops)
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap_err();

    match err {
        BackupError::OriginRestart {
            container, previous, ..
        } => {
            assert_eq!(container, ORIGIN);
            assert!(matches!(previous.as_deref(), Some(BackupError::PackExecution { .. })));
        }
        other => panic!("expected OriginRestart, got {:?}", other),
    }
}

#[test]
fn test_restart_failure_after_successful_backup() {
    let ops = MockContainerOps::new().with_running(ORIGIN).with_failing_start();

    let err = handler(&offline_config(), "www", &MockExecutor::new(), &ops)
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap_err();

    assert!(matches!(err, BackupError::OriginRestart { previous: None, .. }));
}

#[test]
fn test_restore_feeds_archive_to_surrogate() {
    let ops = MockContainerOps::new().with_running(ORIGIN);
    let executor = MockExecutor::new();

    let outcome = handler(&offline_config(), "www", &executor, &ops)
        .restore_backup_from_stream(Box::new(Cursor::new(b"ARCHIVE".to_vec())), &CancellationToken::new())
        .unwrap();

    assert_eq!(outcome.command.bytes_fed, Some(7));
    assert_eq!(executor.received_input(), vec![b"ARCHIVE".to_vec()]);
    assert_eq!(outcome.finalize.unwrap().action, LifecycleAction::Restore);
    assert!(ops.is_running_now(ORIGIN));
}

#[test]
fn test_failed_restore_restarts_origin() {
    let ops = MockContainerOps::new().with_running(ORIGIN);
    let executor = MockExecutor::new().expect("tar -xzf", MockResponse::fail(2, "gzip: stdin: not in gzip format"));

    let err = handler(&offline_config(), "www", &executor, &ops)
        .restore_backup_from_stream(Box::new(Cursor::new(b"garbage".to_vec())), &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, BackupError::RestoreExecution { .. }));
    assert!(ops.is_running_now(ORIGIN));
}

/// The whole sequence as the engine sees it
#[test]
fn test_engine_command_sequence() {
    let executor = MockExecutor::new().expect("run -d", MockResponse::ok("f00d\n"));
    let docker = DockerCli::new(Arc::new(executor.clone()), RetryPolicy::none());
    let config = offline_config();
    let factory = container_backup::DefinitionFactory::from_config(&config).unwrap();
    let handler = container_backup::BackupHandler::for_definition(
        factory.get("www").unwrap(),
        Arc::new(executor.clone()),
        Arc::new(docker),
    )
    .unwrap();

    handler
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap();

    assert_eq!(
        executor.command_lines(),
        vec![
            "docker stop test_www".to_string(),
            "docker run -d --volumes-from test_www --label container-backup.origin=test_www alpine:3.9 sh -c apk add --update xz bzip2 && sleep 3600".to_string(),
            "docker exec f00d sh -c tar -czf - /var/www /var/log/nginx/access.log".to_string(),
            "docker kill f00d".to_string(),
            "docker rm -f f00d".to_string(),
            "docker start test_www".to_string(),
        ]
    );
}

#[test]
fn test_manager_backup_then_restore_through_local_store() {
    let (config, dir) = ConfigBuilder::minimal().add_offline_backup("www", ORIGIN).persist();
    let ops = MockContainerOps::new().with_running(ORIGIN);
    let executor = MockExecutor::new().expect("tar -czf", MockResponse::ok(b"ARCHIVE".to_vec()));
    let manager = BackupManager::with_operations(config, Arc::new(executor.clone()), Arc::new(ops.clone())).unwrap();

    let report = manager.backup("www", None).unwrap();
    assert_eq!(report.bytes, Some(7));
    assert!(dir
        .path()
        .join("store/collection-1")
        .join(format!("{}.tar", report.version))
        .exists());

    manager.restore("www", None, None).unwrap();
    assert_eq!(executor.received_input(), vec![b"ARCHIVE".to_vec()]);
    assert_eq!(ops.count(|c| *c == start()), 2);
    assert!(ops.is_running_now(ORIGIN));
}
