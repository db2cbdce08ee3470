//! Hot volume and directory backups never touch the container lifecycle

use super::{handler, read_all};
use container_backup::utils::CancellationToken;
use container_backup::BackupError;
use std::io::Cursor;
use test_utils::{directory_backup, ConfigBuilder, MockContainerOps, MockExecutor, MockResponse};

#[test]
fn test_hot_backup_execs_in_running_container() {
    let config = ConfigBuilder::minimal().add_hot_backup("www", "test_www").build();
    let ops = MockContainerOps::new().with_running("test_www");
    let executor = MockExecutor::new().expect("tar -czf", MockResponse::ok(b"ARCHIVE".to_vec()));
    let handler = handler(&config, "www", &executor, &ops);

    handler.validate_before_creating_backup().unwrap();
    let outcome = handler
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap();

    assert_eq!(outcome.value, b"ARCHIVE");
    assert!(outcome.finalize.is_none());
    assert!(ops.lifecycle_calls().is_empty(), "hot backups must not stop or spawn anything");
    assert_eq!(
        executor.command_lines(),
        vec!["docker exec test_www sh -c tar -czf - /var/www /var/log/nginx/access.log"]
    );
}

#[test]
fn test_hot_backup_refuses_stopped_container() {
    let config = ConfigBuilder::minimal().add_hot_backup("www", "test_www").build();
    let ops = MockContainerOps::new().with_stopped("test_www");
    let executor = MockExecutor::new();

    let err = handler(&config, "www", &executor, &ops)
        .validate_before_creating_backup()
        .unwrap_err();

    assert!(matches!(err, BackupError::Precondition(_)));
    assert!(executor.get_calls().is_empty());
}

#[test]
fn test_hot_restore_is_interactive_exec() {
    let config = ConfigBuilder::minimal().add_hot_backup("www", "test_www").build();
    let ops = MockContainerOps::new().with_running("test_www");
    let executor = MockExecutor::new();

    let outcome = handler(&config, "www", &executor, &ops)
        .restore_backup_from_stream(Box::new(Cursor::new(b"ARCHIVE".to_vec())), &CancellationToken::new())
        .unwrap();

    assert!(outcome.finalize.is_none());
    assert_eq!(
        executor.command_lines(),
        vec!["docker exec -i test_www sh -c tar -xzf - -C /"]
    );
    assert!(ops.lifecycle_calls().is_empty());
}

#[test]
fn test_directory_inside_container_uses_exec() {
    let mut backup = directory_backup(vec!["/etc/nginx".to_string()]);
    backup.container = Some("test_www".to_string());
    backup.docker_bin = Some("sudo docker".to_string());
    let config = ConfigBuilder::minimal().add_backup("nginx", backup).build();
    let ops = MockContainerOps::new().with_running("test_www");
    let executor = MockExecutor::new();
    let handler = handler(&config, "nginx", &executor, &ops);

    assert!(handler.is_using_container());
    handler
        .receive_backup_stream(&CancellationToken::new(), read_all)
        .unwrap();

    assert_eq!(
        executor.command_lines(),
        vec!["sudo docker exec test_www sh -c tar -czf - /etc/nginx"]
    );
    assert!(ops.lifecycle_calls().is_empty());
}
