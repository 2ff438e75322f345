#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::fs;

use tempfile::TempDir;

use super::*;

#[test]
fn empty_document_yields_defaults() {
    let config = BluezConfig::from_toml_str("").unwrap();

    assert_eq!(config, BluezConfig::default());
    assert_eq!(config.service, "org.bluez");
    assert_eq!(config.obex_bus, BusKind::Session);
}

#[test]
fn partial_document_overrides_only_given_keys() {
    let config = BluezConfig::from_toml_str(
        r#"
bus = "session"
channel_capacity = 8
log_level = "debug"
"#,
    )
    .unwrap();

    assert_eq!(config.bus, BusKind::Session);
    assert_eq!(config.channel_capacity, 8);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.service, BLUEZ_SERVICE);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = BluezConfig::from_toml_str("adapter = \"hci0\"");

    assert!(matches!(result, Err(BluezError::Config(_))));
}

#[test]
fn zero_capacity_is_rejected() {
    let result = BluezConfig::from_toml_str("channel_capacity = 0");

    assert!(matches!(result, Err(BluezError::Config(msg)) if msg.contains("channel_capacity")));
}

#[test]
fn loads_from_file_and_reports_path_on_error() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.toml");
    let bad = dir.path().join("bad.toml");
    fs::write(&good, "service = \"org.bluez.test\"").unwrap();
    fs::write(&bad, "service = ").unwrap();

    let config = BluezConfig::load(&good).unwrap();
    assert_eq!(config.service, "org.bluez.test");

    let error = BluezConfig::load(&bad).unwrap_err();
    assert!(error.to_string().contains("bad.toml"));
}

#[test]
fn missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();

    let result = BluezConfig::load(&dir.path().join("absent.toml"));

    assert!(matches!(result, Err(BluezError::Io(_))));
}

#[test]
fn schema_lists_every_field() {
    let schema = BluezConfig::schema_json().unwrap();

    for field in ["service", "bus", "obex_service", "obex_bus", "channel_capacity", "log_level"] {
        assert!(schema.contains(field), "schema is missing {field}");
    }
}
