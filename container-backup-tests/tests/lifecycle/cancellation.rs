//! Cancellation and timeouts still end with the origin running

use super::{handler, read_all};
use container_backup::utils::CancellationToken;
use container_backup::{BackupError, BackupManager};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{ConfigBuilder, ContainerCall, MockContainerOps, MockExecutor, MockResponse};

#[test]
fn test_cancelled_before_start_touches_nothing() {
    let config = ConfigBuilder::minimal().add_offline_backup("www", "test_www").build();
    let ops = MockContainerOps::new().with_running("test_www");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = handler(&config, "www", &MockExecutor::new(), &ops)
        .receive_backup_stream(&cancel, read_all)
        .unwrap_err();

    assert!(matches!(err, BackupError::Cancelled));
    assert!(ops.lifecycle_calls().is_empty());
    assert!(ops.is_running_now("test_www"));
}

#[test]
fn test_cancelled_while_streaming_restarts_origin() {
    let config = ConfigBuilder::minimal().add_offline_backup("www", "test_www").build();
    let ops = MockContainerOps::new().with_running("test_www");
    let executor = MockExecutor::new().expect("tar -czf", MockResponse::ok(b"ARCHIVE".to_vec()));
    let cancel = CancellationToken::new();

    let err = handler(&config, "www", &executor, &ops)
        .receive_backup_stream(&cancel, |mut stream| {
            let mut first = [0u8; 3];
            stream.read_exact(&mut first).map_err(BackupError::transfer)?;
            cancel.cancel();
            Err::<(), _>(BackupError::Transfer("upload aborted".to_string()))
        })
        .unwrap_err();

    assert!(matches!(err, BackupError::Cancelled));
    assert_eq!(
        ops.lifecycle_calls().last(),
        Some(&ContainerCall::Start {
            container: "test_www".to_string()
        })
    );
    assert!(ops.is_running_now("test_www"));
}

#[test]
fn test_manager_timeout_zero_cancels() {
    let (config, _dir) = ConfigBuilder::minimal()
        .add_offline_backup("www", "test_www")
        .persist();
    let ops = MockContainerOps::new().with_running("test_www");
    let manager = BackupManager::with_operations(
        config,
        Arc::new(MockExecutor::new()),
        Arc::new(ops.clone()),
    )
    .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel_after(Duration::ZERO);
    std::thread::sleep(Duration::from_millis(200));

    let err = manager.backup_with("www", &cancel).unwrap_err();

    assert!(matches!(err, BackupError::Cancelled));
    assert!(ops.is_running_now("test_www"));
}
