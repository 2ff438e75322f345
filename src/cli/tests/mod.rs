//! Unit tests for the CLI module
//!
//! Covers argument parsing, value parsing and formatting. No bus access.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![allow(clippy::panic)]

use std::collections::HashMap;

use clap::Parser;
use zbus::zvariant::{OwnedObjectPath, Value};

use super::{Cli, Command, commands::endpoint, formatting::*, parse_value_like};
use crate::{
    BluezError,
    config::{BluezConfig, BusKind, LogLevel},
    object_manager::ObjectEvent,
};

#[test]
fn parses_get_with_global_flags() {
    let cli = Cli::try_parse_from([
        "bluez-props",
        "get",
        "/org/bluez/hci0/dev_A",
        "org.bluez.Battery1",
        "Percentage",
        "--log-level",
        "debug",
        "--session",
    ])
    .unwrap();

    assert!(cli.session);
    assert_eq!(cli.log_level, Some(LogLevel::Debug));
    match cli.command {
        Command::Get {
            path,
            interface,
            name,
        } => {
            assert_eq!(path, "/org/bluez/hci0/dev_A");
            assert_eq!(interface, "org.bluez.Battery1");
            assert_eq!(name.as_deref(), Some("Percentage"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_log_level_overrides_config() {
    let config = BluezConfig::default();
    let cli = Cli::try_parse_from(["bluez-props", "objects"]).unwrap();
    assert_eq!(cli.effective_log_level(&config), LogLevel::Info);

    let cli = Cli::try_parse_from(["bluez-props", "--log-level", "trace", "config-schema"]).unwrap();
    assert_eq!(cli.effective_log_level(&config), LogLevel::Trace);
}

#[test]
fn set_requires_a_value() {
    let result = Cli::try_parse_from([
        "bluez-props",
        "set",
        "/org/bluez/hci0/message1",
        "org.bluez.obex.Message1",
        "Read",
    ]);

    assert!(result.is_err());
}

#[test]
fn obex_interfaces_use_the_obex_daemon() {
    let config = BluezConfig::default();

    assert_eq!(
        endpoint(&config, false, "org.bluez.obex.Message1"),
        ("org.bluez.obex".to_string(), BusKind::Session)
    );
    assert_eq!(
        endpoint(&config, false, "org.bluez.Battery1"),
        ("org.bluez".to_string(), BusKind::System)
    );
    assert_eq!(
        endpoint(&config, true, "org.bluez.Battery1"),
        ("org.bluez".to_string(), BusKind::Session)
    );
}

#[test]
fn values_parse_as_the_current_type() {
    let parsed = parse_value_like(&Value::from(true), "off").unwrap();
    assert_eq!(*parsed, Value::from(false));

    let parsed = parse_value_like(&Value::from(7u8), "42").unwrap();
    assert_eq!(*parsed, Value::from(42u8));

    let parsed = parse_value_like(&Value::from("old"), "new name").unwrap();
    assert_eq!(*parsed, Value::from("new name"));

    let nested = Value::Value(Box::new(Value::from(1u16)));
    let parsed = parse_value_like(&nested, "512").unwrap();
    assert_eq!(*parsed, Value::from(512u16));
}

#[test]
fn invalid_values_are_rejected() {
    assert!(matches!(
        parse_value_like(&Value::from(7u8), "300"),
        Err(BluezError::InvalidValue(_))
    ));
    assert!(matches!(
        parse_value_like(&Value::from(true), "maybe"),
        Err(BluezError::InvalidValue(_))
    ));
    assert!(matches!(
        parse_value_like(&Value::from(vec!["a"]), "b"),
        Err(BluezError::InvalidValue(_))
    ));
}

#[test]
fn format_value_scalars_and_arrays() {
    assert_eq!(format_value(&Value::from(true)), "true");
    assert_eq!(format_value(&Value::from(-3i32)), "-3");
    assert_eq!(format_value(&Value::from("text")), "\"text\"");

    let paths = vec![
        OwnedObjectPath::try_from("/org/bluez/hci0/service1").unwrap(),
        OwnedObjectPath::try_from("/org/bluez/hci0/service2").unwrap(),
    ];
    assert_eq!(
        format_value(&Value::from(paths)),
        "[/org/bluez/hci0/service1, /org/bluez/hci0/service2]"
    );
}

#[test]
fn format_object_event_lists_interfaces() {
    let event = ObjectEvent::Removed {
        path: OwnedObjectPath::try_from("/org/bluez/hci0/dev_A").unwrap(),
        interfaces: vec!["org.bluez.Battery1".to_string()],
    };
    let line = format_object_event(&event);

    assert!(line.contains("/org/bluez/hci0/dev_A"));
    assert!(line.contains("[org.bluez.Battery1]"));

    let event = ObjectEvent::Added {
        path: OwnedObjectPath::try_from("/org/bluez/hci0/dev_B").unwrap(),
        interfaces: HashMap::new(),
    };
    assert!(format_object_event(&event).contains("[]"));
}
