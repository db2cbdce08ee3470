//! Unit tests for backup definitions and command templates

use container_backup::definition::template::{CommandTemplate, DEFAULT_PACK_CMD, DEFAULT_UNPACK_CMD};
use container_backup::definition::{DefinitionFactory, DefinitionKind, DEFAULT_TEMP_IMAGE_CMD};
use container_backup::BackupError;
use rstest::rstest;
use test_utils::{hot_backup, offline_backup, BackupConfig, ConfigBuilder};

fn factory_with(name: &str, backup: BackupConfig) -> Result<DefinitionFactory, String> {
    let config = ConfigBuilder::minimal().add_backup(name, backup).build();
    DefinitionFactory::from_config(&config).map_err(|e| e.to_string())
}

#[rstest]
#[case("directory", DefinitionKind::Directory)]
#[case("docker_hot_volumes", DefinitionKind::HotVolumes)]
#[case("docker_volumes", DefinitionKind::OfflineVolumes)]
fn test_kind_names(#[case] name: &str, #[case] kind: DefinitionKind) {
    assert_eq!(DefinitionKind::parse(name), Some(kind));
    assert_eq!(kind.as_str(), name);
}

#[test]
fn test_unknown_kind_is_none() {
    assert_eq!(DefinitionKind::parse("docker_offline"), None);
}

#[rstest]
#[case("tar -czf %stdin% %paths%", &["/var/www"], "tar -czf - /var/www")]
#[case("tar -cJf %stdin% %paths%", &["/etc", "/var/lib/mysql"], "tar -cJf - /etc /var/lib/mysql")]
#[case("tar -czf %stdin% %paths%", &["/srv/my files"], "tar -czf - '/srv/my files'")]
fn test_pack_rendering(#[case] template: &str, #[case] paths: &[&str], #[case] expected: &str) {
    let paths: Vec<String> = paths.iter().map(|p| p.to_string()).collect();
    let template = CommandTemplate::pack(template).unwrap();
    assert_eq!(template.render_pack(&paths), expected);
}

#[test]
fn test_default_unpack_targets_root() {
    let template = CommandTemplate::unpack(DEFAULT_UNPACK_CMD).unwrap();
    assert_eq!(template.render_unpack(&[], "/"), "tar -xzf - -C /");
}

#[rstest]
#[case("tar -czf - %paths%")]
#[case("tar -czf %stdin%")]
#[case("tar -czf %stdin% %paths% %target%")]
#[case("tar -czf %stdin% %paths% %bogus%")]
fn test_invalid_pack_templates(#[case] template: &str) {
    assert!(CommandTemplate::pack(template).is_err());
}

#[test]
fn test_unpack_may_use_paths() {
    let template = CommandTemplate::unpack("tar -xzf %stdin% %target% %paths%").unwrap();
    let rendered = template.render_unpack(&["/var/www".to_string()], "/srv");
    assert_eq!(rendered, "tar -xzf - -C /srv /var/www");
}

#[test]
fn test_offline_definition_from_builder() {
    let factory = factory_with("www", offline_backup("test_www")).unwrap();
    let definition = factory.get("www").unwrap();

    assert_eq!(definition.kind, DefinitionKind::OfflineVolumes);
    assert!(definition.is_using_container());
    assert_eq!(definition.container().unwrap().name, "test_www");
    assert_eq!(definition.source.pack.as_str(), DEFAULT_PACK_CMD);
    assert_eq!(
        definition.offline.as_ref().unwrap().temp_image_cmd,
        "apk add --update xz bzip2 && sleep 3600"
    );
}

#[test]
fn test_offline_defaults_when_unset() {
    let mut backup = offline_backup("test_www");
    backup.temp_image_cmd = None;

    let factory = factory_with("www", backup).unwrap();
    let offline = factory.get("www").unwrap().offline.clone().unwrap();
    assert_eq!(offline.temp_image_cmd, DEFAULT_TEMP_IMAGE_CMD);
}

#[test]
fn test_temp_image_only_for_offline() {
    let mut backup = hot_backup("test_www");
    backup.temp_image_name = Some("alpine:3.9".to_string());

    let err = factory_with("www", backup).unwrap_err();
    assert!(err.contains("backups.www"), "unexpected error: {}", err);
}

#[test]
fn test_blank_docker_bin_rejected() {
    let mut backup = hot_backup("test_www");
    backup.docker_bin = Some("  ".to_string());

    assert!(factory_with("www", backup).is_err());
}

#[test]
fn test_missing_definition_lists_known_names() {
    let factory = factory_with("www", hot_backup("test_www")).unwrap();

    match factory.get("db") {
        Err(BackupError::Configuration(msg)) => {
            assert!(msg.contains("'db'"));
            assert!(msg.contains("www"));
        }
        other => panic!("expected configuration error, got {:?}", other.map(|d| d.name.clone())),
    }
}
