//! Integration tests for the property store.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use bluez_props::{
    BluezError, RejectionKind, Result, bluez_properties,
    bus::{
        ManagedObjects, MemoryTransport, PropertyMap, RegistrationId, RemoteTarget, SignalEvent,
        SignalRule, Transport,
    },
    profiles::{Battery1Properties, GattService1Properties},
    properties::{PropertySet, PropertyStore},
};
use common::*;
use tokio::sync::mpsc;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

bluez_properties! {
    /// Every supported field type plus one internal field.
    pub struct Everything: "org.example.Everything1" {
        "Flag" => flag: bool,
        "Byte" => byte: u8,
        "Short" => short: i16,
        "UShort" => ushort: u16,
        "Int" => int: i32,
        "UInt" => uint: u32,
        "Long" => long: i64,
        "ULong" => ulong: u64,
        "Name" => name: String,
        "Object" => object: OwnedObjectPath,
        "Bytes" => bytes: Vec<u8>,
        "Names" => names: Vec<String>,
        "Objects" => objects: Vec<OwnedObjectPath>,
        "Scratch" => scratch: String [ignore],
    }
}

fn battery_target() -> RemoteTarget {
    RemoteTarget::new("org.bluez", BATTERY, DEVICE_PATH).unwrap()
}

fn gatt_target() -> RemoteTarget {
    RemoteTarget::new("org.bluez", GATT_SERVICE, SERVICE_PATH).unwrap()
}

mod generic_map {
    use super::*;

    #[test]
    fn round_trip_reconstructs_every_wire_field() {
        let original = Everything {
            flag: true,
            byte: 200,
            short: -12,
            ushort: 65000,
            int: -70000,
            uint: 4_000_000_000,
            long: -9_000_000_000,
            ulong: 18_000_000_000,
            name: "speaker".to_string(),
            object: path(DEVICE_PATH),
            bytes: vec![1, 2, 3],
            names: vec!["a".to_string(), "b".to_string()],
            objects: vec![path(SERVICE_PATH)],
            scratch: "local only".to_string(),
        };

        let map = PropertyStore::from_properties(original.clone())
            .to_generic_map()
            .unwrap();
        let rebuilt = PropertyStore::<Everything>::from_generic_map(map)
            .unwrap()
            .snapshot();

        assert_eq!(
            rebuilt,
            Everything {
                scratch: String::new(),
                ..original
            }
        );
    }

    #[test]
    fn internal_fields_never_reach_the_wire() {
        let store = PropertyStore::from_properties(Everything {
            scratch: "secret".to_string(),
            ..Everything::default()
        });

        let map = store.to_generic_map().unwrap();

        assert!(!map.contains_key("Scratch"));
        assert_eq!(map.len(), Everything::FIELDS.len() - 1);
    }

    #[test]
    fn internal_fields_are_not_decoded_from_the_wire() {
        let map = props(vec![("Scratch", owned("injected")), ("Byte", owned(7u8))]);

        let store = PropertyStore::<Everything>::from_generic_map(map).unwrap();

        assert_eq!(store.snapshot().scratch, "");
        assert_eq!(store.snapshot().byte, 7);
    }

    #[test]
    fn mismatched_type_fails_the_whole_conversion() {
        let map = props(vec![("Percentage", owned("full"))]);

        let result = PropertyStore::<Battery1Properties>::from_generic_map(map);

        match result {
            Err(BluezError::Decode {
                property, found, ..
            }) => {
                assert_eq!(property, "Percentage");
                assert_eq!(found, "s");
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let map = props(vec![("Percentage", owned(80u8)), ("Source", owned("usb"))]);

        let store = PropertyStore::<Battery1Properties>::from_generic_map(map).unwrap();

        assert_eq!(store.snapshot().percentage, 80);
    }

    #[test]
    fn omit_empty_and_conditional_exclusion() {
        let remote = PropertyStore::from_properties(GattService1Properties {
            uuid: "180f".to_string(),
            device: vec![path(DEVICE_PATH)],
            ..GattService1Properties::default()
        });
        let map = remote.to_generic_map().unwrap();
        assert!(map.contains_key("Device"));
        assert!(!map.contains_key("Includes"));
        assert!(map.contains_key("Characteristics"));
        assert!(!map.contains_key("IsService"));

        let local = PropertyStore::from_properties(GattService1Properties {
            uuid: "180f".to_string(),
            device: vec![path(DEVICE_PATH)],
            includes: vec![path(SERVICE_PATH)],
            is_service: true,
            ..GattService1Properties::default()
        });
        let map = local.to_generic_map().unwrap();
        assert!(!map.contains_key("Device"));
        assert!(map.contains_key("Includes"));
    }
}

mod loading {
    use super::*;

    #[tokio::test]
    async fn load_populates_every_field() {
        let daemon = battery_daemon();
        let store = PropertyStore::<Battery1Properties>::new();

        let loaded = store.load(daemon.as_ref(), &battery_target()).await.unwrap();

        assert_eq!(loaded.percentage, 42);
        assert_eq!(store.get_typed::<u8>("Percentage").unwrap(), 42);
        assert_eq!(daemon.calls(), vec![format!("GetAll {DEVICE_PATH}")]);
    }

    #[tokio::test]
    async fn failed_decode_leaves_previous_values() {
        let daemon = battery_daemon();
        let store = PropertyStore::<Battery1Properties>::new();
        store.load(daemon.as_ref(), &battery_target()).await.unwrap();

        daemon.insert_object(DEVICE_PATH, BATTERY, props(vec![("Percentage", owned("full"))]));
        let result = store.load(daemon.as_ref(), &battery_target()).await;

        assert!(matches!(result, Err(BluezError::Decode { .. })));
        assert_eq!(store.snapshot().percentage, 42);
    }

    #[tokio::test]
    async fn transport_failure_leaves_previous_values() {
        let daemon = battery_daemon();
        let store = PropertyStore::<Battery1Properties>::new();
        store.load(daemon.as_ref(), &battery_target()).await.unwrap();

        daemon.set_connected(false);
        let error = store
            .load(daemon.as_ref(), &battery_target())
            .await
            .unwrap_err();

        assert!(error.is_transport());
        assert_eq!(store.snapshot().percentage, 42);
    }

    #[tokio::test]
    async fn load_keeps_internal_fields() {
        let daemon = gatt_daemon();
        let store = PropertyStore::from_properties(GattService1Properties {
            is_service: true,
            ..GattService1Properties::default()
        });

        let loaded = store.load(daemon.as_ref(), &gatt_target()).await.unwrap();

        assert!(loaded.is_service);
        assert_eq!(loaded.device, vec![path(DEVICE_PATH)]);
    }

    /// Transport whose `GetAll` reply is overtaken by local writes to `store`.
    #[derive(Debug)]
    struct RacingTransport {
        inner: Arc<MemoryTransport>,
        store: PropertyStore<GattService1Properties>,
    }

    #[async_trait]
    impl Transport for RacingTransport {
        async fn get_all(&self, target: &RemoteTarget) -> Result<PropertyMap> {
            let reply = self.inner.get_all(target).await;
            self.store.apply_changes(&props(vec![("Primary", owned(true))]));
            self.store
                .set_local("Characteristics", owned(vec![path(SERVICE_PATH)]))
                .unwrap();
            reply
        }

        async fn get(&self, target: &RemoteTarget, name: &str) -> Result<OwnedValue> {
            self.inner.get(target, name).await
        }

        async fn set(&self, target: &RemoteTarget, name: &str, value: OwnedValue) -> Result<()> {
            self.inner.set(target, name, value).await
        }

        async fn call(
            &self,
            target: &RemoteTarget,
            method: &str,
            args: Vec<OwnedValue>,
        ) -> Result<Vec<OwnedValue>> {
            self.inner.call(target, method, args).await
        }

        async fn managed_objects(
            &self,
            service: &str,
            root: &OwnedObjectPath,
        ) -> Result<ManagedObjects> {
            self.inner.managed_objects(service, root).await
        }

        async fn subscribe(
            &self,
            rule: SignalRule,
            sink: mpsc::Sender<SignalEvent>,
        ) -> Result<RegistrationId> {
            self.inner.subscribe(rule, sink).await
        }

        fn unsubscribe(&self, id: RegistrationId) -> bool {
            self.inner.unsubscribe(id)
        }

        fn registration_count(&self) -> usize {
            self.inner.registration_count()
        }
    }

    #[tokio::test]
    async fn writes_during_load_survive_the_reply() {
        let store = PropertyStore::<GattService1Properties>::new();
        let transport = RacingTransport {
            inner: gatt_daemon(),
            store: store.clone(),
        };

        let loaded = store.load(&transport, &gatt_target()).await.unwrap();

        assert!(loaded.primary);
        assert_eq!(loaded.characteristics, vec![path(SERVICE_PATH)]);
        assert_eq!(loaded.device, vec![path(DEVICE_PATH)]);
        assert!(store.snapshot().primary);

        let reloaded = store.load(transport.inner.as_ref(), &gatt_target()).await.unwrap();
        assert!(!reloaded.primary);
        assert!(reloaded.characteristics.is_empty());
    }

    #[tokio::test]
    async fn fetch_refreshes_one_property() {
        let daemon = battery_daemon();
        let store = PropertyStore::<Battery1Properties>::new();

        let value = store
            .fetch(daemon.as_ref(), &battery_target(), "Percentage")
            .await
            .unwrap();

        assert_eq!(value, owned(42u8));
        assert_eq!(store.snapshot().percentage, 42);
    }
}

mod cache_reads {
    use super::*;

    #[test]
    fn get_reads_the_cache_only() {
        let store = PropertyStore::from_properties(Battery1Properties { percentage: 12 });

        assert_eq!(store.get("Percentage").unwrap(), owned(12u8));
        assert!(matches!(
            store.get("Voltage"),
            Err(BluezError::PropertyNotFound(name)) if name == "Voltage"
        ));
        assert!(matches!(
            store.get_typed::<String>("Percentage"),
            Err(BluezError::Decode { .. })
        ));
    }

    #[test]
    fn set_local_reports_emit_policy() {
        let store = PropertyStore::<GattService1Properties>::new();

        assert!(!store.set_local("IsService", owned(true)).unwrap());
        assert!(
            store
                .set_local("Characteristics", owned(vec![path(SERVICE_PATH)]))
                .unwrap()
        );
        assert!(store.set_local("Primary", owned("yes")).is_err());

        let snapshot = store.snapshot();
        assert!(snapshot.is_service);
        assert!(!snapshot.primary);
        assert_eq!(snapshot.characteristics, vec![path(SERVICE_PATH)]);
    }

    #[test]
    fn apply_changes_skips_bad_values() {
        let store = PropertyStore::<GattService1Properties>::new();
        let changed = props(vec![
            ("Primary", owned(true)),
            ("UUID", owned(5u32)),
            ("IsService", owned(true)),
            ("Unknown", owned(1u8)),
        ]);

        let applied = store.apply_changes(&changed);

        assert_eq!(applied, vec!["Primary".to_string()]);
        let snapshot = store.snapshot();
        assert!(snapshot.primary);
        assert_eq!(snapshot.uuid, "");
        assert!(!snapshot.is_service);
    }

    #[test]
    fn field_names_follow_declaration_order() {
        let store = PropertyStore::<GattService1Properties>::new();

        assert_eq!(
            store.field_names(),
            vec!["UUID", "Primary", "Device", "Includes", "IsService", "Characteristics"]
        );
    }
}

mod remote_writes {
    use super::*;

    #[tokio::test]
    async fn accepted_write_does_not_touch_the_cache() {
        let daemon = gatt_daemon();
        let store = PropertyStore::<GattService1Properties>::new();
        store.load(daemon.as_ref(), &gatt_target()).await.unwrap();

        store
            .set_remote(daemon.as_ref(), &gatt_target(), "Primary", owned(true))
            .await
            .unwrap();

        assert_eq!(
            daemon.remote_value(SERVICE_PATH, GATT_SERVICE, "Primary"),
            Some(owned(true))
        );
        assert!(!store.snapshot().primary);

        store.load(daemon.as_ref(), &gatt_target()).await.unwrap();
        assert!(store.snapshot().primary);
    }

    #[tokio::test]
    async fn rejected_write_keeps_symbolic_name() {
        let daemon = gatt_daemon();
        daemon.reject_set(
            SERVICE_PATH,
            GATT_SERVICE,
            "Primary",
            "org.bluez.Error.NotPermitted",
        );
        let store = PropertyStore::<GattService1Properties>::new();
        store.load(daemon.as_ref(), &gatt_target()).await.unwrap();

        let error = store
            .set_remote(daemon.as_ref(), &gatt_target(), "Primary", owned(true))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), Some(RejectionKind::NotPermitted));
        assert!(!store.snapshot().primary);
        assert_eq!(
            daemon.remote_value(SERVICE_PATH, GATT_SERVICE, "Primary"),
            Some(owned(false))
        );
    }

    #[tokio::test]
    async fn mistyped_write_never_reaches_the_daemon() {
        let daemon = gatt_daemon();
        let store = PropertyStore::<GattService1Properties>::new();

        let result = store
            .set_remote(daemon.as_ref(), &gatt_target(), "Primary", owned(1u8))
            .await;

        assert!(matches!(result, Err(BluezError::Decode { .. })));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn internal_fields_cannot_be_written_remotely() {
        let daemon = gatt_daemon();
        let store = PropertyStore::<GattService1Properties>::new();

        let result = store
            .set_remote(daemon.as_ref(), &gatt_target(), "IsService", owned(true))
            .await;

        assert!(matches!(result, Err(BluezError::PropertyNotFound(_))));
    }
}
