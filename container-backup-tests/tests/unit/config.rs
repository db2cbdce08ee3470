//! Unit tests for configuration loading and validation

use container_backup::config::{load_config, parse_config, AccessConfig, ConfigError};
use rstest::rstest;
use serial_test::serial;
use test_utils::{ConfigBuilder, ResultAssertions, TestContext};

#[test]
fn test_config_loading_valid() {
    let (config_path, _, _dir) = ConfigBuilder::minimal()
        .add_offline_backup("www_docker_offline", "test_www")
        .add_directory_backup("etc", vec!["/etc".to_string()])
        .write();

    let loaded = load_config(&config_path);
    assert!(loaded.is_ok(), "Config should load successfully: {:?}", loaded.err());

    let config = loaded.unwrap();
    assert_eq!(config.backups.len(), 2);
    assert_eq!(
        config.backups["www_docker_offline"].temp_image_name.as_deref(),
        Some("alpine:3.9")
    );
}

#[test]
fn test_config_without_backups_rejected() {
    let ctx = TestContext::new();
    let path = ctx.create_file(
        "config.toml",
        r#"
[accesses.local]
type = "local"
path = "/tmp"
"#,
    );

    load_config(&path).assert_err_contains("No backups defined");
}

#[test]
fn test_missing_file_is_read_error() {
    let ctx = TestContext::new();
    let result = load_config(ctx.temp_dir().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::ReadError(_))));
}

#[test]
fn test_http_access_parsed() {
    let config = parse_config(
        r#"
[accesses.backup_one]
type = "http"
url = "https://backups.example.org"
token = "t0k3n"

[backups.www]
type = "docker_hot_volumes"
container = "test_www"
access = "backup_one"
collection_id = "abc"
paths = ["/var/www"]
"#,
    )
    .assert_ok();

    match &config.accesses["backup_one"] {
        AccessConfig::Http { url, token } => {
            assert_eq!(url, "https://backups.example.org");
            assert_eq!(token.expose(), "t0k3n");
            assert!(!format!("{:?}", token).contains("t0k3n"));
        }
        other => panic!("expected http access, got {:?}", other),
    }
}

#[rstest]
#[case("access = \"nowhere\"", "Access 'nowhere' not found")]
#[case("access = \"local\"\nencryption = \"enc9\"", "Encryption 'enc9' not found")]
fn test_dangling_references_rejected(#[case] reference: &str, #[case] expected: &str) {
    let text = format!(
        r#"
[accesses.local]
type = "local"
path = "/tmp"

[backups.www]
type = "directory"
{}
collection_id = "abc"
paths = ["/etc"]
"#,
        reference
    );

    parse_config(&text).assert_err_contains(expected);
}

#[test]
#[serial]
fn test_env_reference_expands_collection_id() {
    std::env::set_var("CB_TEST_COLLECTION_ID", "7f3c2a");

    let config = parse_config(
        r#"
[accesses.local]
type = "local"
path = "/tmp"

[backups.www]
type = "directory"
access = "local"
collection_id = "${CB_TEST_COLLECTION_ID}"
paths = ["/etc"]
"#,
    )
    .assert_ok();

    std::env::remove_var("CB_TEST_COLLECTION_ID");
    assert_eq!(config.backups["www"].collection_id, "7f3c2a");
}

#[test]
#[serial]
fn test_unset_env_reference_rejected() {
    std::env::remove_var("CB_TEST_UNSET_TOKEN");

    let result = parse_config(
        r#"
[accesses.remote]
type = "http"
url = "https://backups.example.org"
token = "${CB_TEST_UNSET_TOKEN}"

[backups.www]
type = "directory"
access = "remote"
collection_id = "abc"
paths = ["/etc"]
"#,
    );

    assert!(matches!(result, Err(ConfigError::MissingVariable(ref name)) if name == "CB_TEST_UNSET_TOKEN"));
}
