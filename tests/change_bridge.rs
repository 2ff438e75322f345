//! Integration tests for change notifications.

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod common;

use std::pin::pin;

use bluez_props::{
    BluezError,
    bus::Transport,
    profiles::{Battery1, GattService1},
};
use common::*;
use futures::StreamExt;

mod raw_subscription {
    use super::*;

    #[tokio::test]
    async fn repeated_subscribe_shares_one_registration() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();

        let first = battery.properties_signal().await.unwrap();
        let second = battery.properties_signal().await.unwrap();

        assert!(first.same_channel(&second));
        assert_eq!(daemon.registration_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_subscribe_shares_one_registration() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();

        let (first, second, third) = tokio::join!(
            battery.properties_signal(),
            battery.properties_signal(),
            battery.properties_signal(),
        );
        let (first, second, third) = (first.unwrap(), second.unwrap(), third.unwrap());

        assert!(first.same_channel(&second));
        assert!(first.same_channel(&third));
        assert_eq!(daemon.registration_count(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_releases_and_resubscribe_starts_fresh() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let first = battery.properties_signal().await.unwrap();

        assert!(battery.unregister_properties_signal().await);
        assert!(!battery.unregister_properties_signal().await);
        assert_eq!(daemon.registration_count(), 0);
        assert!(first.is_cancelled());
        assert!(within(first.recv()).await.is_none());

        let second = battery.properties_signal().await.unwrap();
        assert!(!first.same_channel(&second));
        assert_eq!(daemon.registration_count(), 1);
    }

    #[tokio::test]
    async fn refused_subscription_leaves_nothing_registered() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        daemon.set_connected(false);

        let result = battery.properties_signal().await;

        assert!(matches!(result, Err(BluezError::NotConnected)));
        assert_eq!(daemon.registration_count(), 0);
        assert!(!battery.unregister_properties_signal().await);
    }

    #[tokio::test]
    async fn cancelling_the_channel_releases_the_registration() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let raw = battery.properties_signal().await.unwrap();
        let watch = battery.watch_properties().await.unwrap();

        assert!(raw.cancel());

        eventually(|| daemon.registration_count() == 0).await;
        assert!(within(watch.recv()).await.is_none());
        assert!(!watch.is_active());
    }

    #[tokio::test]
    async fn dropping_the_binding_releases_the_registration() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();
        assert_eq!(daemon.registration_count(), 1);

        drop(battery);

        assert_eq!(daemon.registration_count(), 0);
        assert!(within(watch.recv()).await.is_none());
    }
}

mod typed_watch {
    use super::*;

    #[tokio::test]
    async fn change_updates_cache_and_notifies() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        assert_eq!(battery.properties().percentage, 42);
        let watch = battery.watch_properties().await.unwrap();

        daemon
            .change_properties(
                DEVICE_PATH,
                BATTERY,
                props(vec![("Percentage", owned(55u8))]),
                vec![],
            )
            .await
            .unwrap();

        let change = within(watch.recv()).await.unwrap();
        assert_eq!(change.path, path(DEVICE_PATH));
        assert_eq!(change.interface, BATTERY);
        assert_eq!(change.get::<u8>("Percentage").unwrap(), Some(55));
        assert_eq!(battery.properties().percentage, 55);
    }

    #[tokio::test]
    async fn invalidated_properties_are_refetched() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();

        daemon.insert_object(DEVICE_PATH, BATTERY, props(vec![("Percentage", owned(70u8))]));
        daemon
            .change_properties(DEVICE_PATH, BATTERY, props(vec![]), vec!["Percentage".to_string()])
            .await
            .unwrap();

        let change = within(watch.recv()).await.unwrap();
        assert!(change.touches("Percentage"));
        assert!(change.changed.is_empty());
        assert_eq!(battery.properties().percentage, 70);
        assert!(daemon.calls().contains(&format!("Get {DEVICE_PATH}")));
    }

    #[tokio::test]
    async fn other_interfaces_are_ignored() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();

        daemon
            .change_properties(
                DEVICE_PATH,
                "org.bluez.Device1",
                props(vec![("Percentage", owned(10u8))]),
                vec![],
            )
            .await
            .unwrap();
        daemon
            .change_properties(
                DEVICE_PATH,
                BATTERY,
                props(vec![("Percentage", owned(60u8))]),
                vec![],
            )
            .await
            .unwrap();

        let change = within(watch.recv()).await.unwrap();
        assert_eq!(change.interface, BATTERY);
        assert_eq!(change.get::<u8>("Percentage").unwrap(), Some(60));
        assert!(watch.try_recv().is_none());
    }

    #[tokio::test]
    async fn mistyped_change_is_delivered_but_not_cached() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();

        daemon
            .change_properties(
                DEVICE_PATH,
                BATTERY,
                props(vec![("Percentage", owned("full"))]),
                vec![],
            )
            .await
            .unwrap();

        let change = within(watch.recv()).await.unwrap();
        assert!(change.get::<u8>("Percentage").is_err());
        assert_eq!(battery.properties().percentage, 42);
    }

    #[tokio::test]
    async fn stream_yields_notifications() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();
        let mut changes = pin!(watch.stream());

        for level in [50u8, 49] {
            daemon
                .change_properties(
                    DEVICE_PATH,
                    BATTERY,
                    props(vec![("Percentage", owned(level))]),
                    vec![],
                )
                .await
                .unwrap();
        }

        let first = within(changes.next()).await.unwrap();
        let second = within(changes.next()).await.unwrap();
        assert_eq!(first.get::<u8>("Percentage").unwrap(), Some(50));
        assert_eq!(second.get::<u8>("Percentage").unwrap(), Some(49));

        battery.unregister_properties_signal().await;
        assert!(within(changes.next()).await.is_none());
    }

    #[tokio::test]
    async fn remote_write_reaches_the_cache_through_the_watch() {
        let daemon = gatt_daemon();
        let service = GattService1::new(as_transport(&daemon), SERVICE_PATH)
            .await
            .unwrap();
        let watch = service.watch_properties().await.unwrap();

        service.set_primary(true).await.unwrap();

        let change = within(watch.recv()).await.unwrap();
        assert_eq!(change.get::<bool>("Primary").unwrap(), Some(true));
        assert!(service.properties().primary);
    }
}

mod watch_lifecycle {
    use super::*;

    #[tokio::test]
    async fn only_one_watch_per_object() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let _watch = battery.watch_properties().await.unwrap();

        let second = battery.watch_properties().await;

        assert!(matches!(second, Err(BluezError::WatchActive { .. })));
        assert_eq!(daemon.registration_count(), 1);
    }

    #[tokio::test]
    async fn unwatch_rejects_foreign_watch() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let other = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let mine = battery.watch_properties().await.unwrap();
        let foreign = other.watch_properties().await.unwrap();

        let result = battery.unwatch_properties(foreign).await;

        assert!(matches!(result, Err(BluezError::UnknownWatch { .. })));
        assert!(mine.is_active());
        assert_eq!(daemon.registration_count(), 2);
    }

    #[tokio::test]
    async fn unwatch_stops_delivery_and_allows_a_new_watch() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();

        battery.unwatch_properties(watch.clone()).await.unwrap();

        assert!(!watch.is_active());
        assert!(within(watch.recv()).await.is_none());
        assert_eq!(daemon.registration_count(), 0);

        let again = battery.watch_properties().await.unwrap();
        assert!(again.is_active());
        assert_eq!(daemon.registration_count(), 1);
    }

    #[tokio::test]
    async fn dropped_watch_allows_a_new_watch() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();
        let clone = watch.clone();

        drop(watch);
        assert!(clone.is_active());
        drop(clone);

        let again = battery.watch_properties().await.unwrap();
        assert!(again.is_active());
        assert_eq!(daemon.registration_count(), 1);

        daemon
            .change_properties(
                DEVICE_PATH,
                BATTERY,
                props(vec![("Percentage", owned(55u8))]),
                vec![],
            )
            .await
            .unwrap();

        let change = within(again.recv()).await.unwrap();
        assert_eq!(change.get::<u8>("Percentage").unwrap(), Some(55));
        assert_eq!(battery.properties().percentage, 55);
    }

    #[tokio::test]
    async fn stream_keeps_the_watch_alive() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let mut changes = {
            let watch = battery.watch_properties().await.unwrap();
            Box::pin(watch.stream())
        };

        assert!(matches!(
            battery.watch_properties().await,
            Err(BluezError::WatchActive { .. })
        ));

        daemon
            .change_properties(
                DEVICE_PATH,
                BATTERY,
                props(vec![("Percentage", owned(30u8))]),
                vec![],
            )
            .await
            .unwrap();

        let change = within(changes.next()).await.unwrap();
        assert_eq!(change.get::<u8>("Percentage").unwrap(), Some(30));

        drop(changes);
        assert!(battery.watch_properties().await.is_ok());
    }

    #[tokio::test]
    async fn close_tears_everything_down() {
        let daemon = battery_daemon();
        let battery = Battery1::new(as_transport(&daemon), DEVICE_PATH).await.unwrap();
        let watch = battery.watch_properties().await.unwrap();

        battery.close().await;

        assert_eq!(daemon.registration_count(), 0);
        assert!(within(watch.recv()).await.is_none());
    }
}

mod local_changes {
    use super::*;

    #[tokio::test]
    async fn emit_fields_publish_local_writes() {
        let daemon = gatt_daemon();
        let service = GattService1::new(as_transport(&daemon), SERVICE_PATH)
            .await
            .unwrap();
        let watch = service.watch_properties().await.unwrap();

        service
            .update_local_characteristics(vec![path(SERVICE_PATH)])
            .await
            .unwrap();

        let change = within(watch.recv()).await.unwrap();
        assert_eq!(change.changed_names(), vec!["Characteristics"]);
        assert_eq!(service.properties().characteristics, vec![path(SERVICE_PATH)]);
        assert!(!daemon.calls().iter().any(|call| call.starts_with("Set")));
    }

    #[tokio::test]
    async fn silent_fields_update_only_the_cache() {
        let daemon = gatt_daemon();
        let service = GattService1::new(as_transport(&daemon), SERVICE_PATH)
            .await
            .unwrap();
        let watch = service.watch_properties().await.unwrap();

        service.mark_local_service(true).await.unwrap();

        assert!(service.properties().is_service);
        assert!(watch.try_recv().is_none());
    }

    #[tokio::test]
    async fn local_writes_without_a_watch_still_apply() {
        let daemon = gatt_daemon();
        let service = GattService1::new(as_transport(&daemon), SERVICE_PATH)
            .await
            .unwrap();

        service
            .update_local_characteristics(vec![path(SERVICE_PATH)])
            .await
            .unwrap();

        assert_eq!(service.properties().characteristics, vec![path(SERVICE_PATH)]);
        assert_eq!(daemon.registration_count(), 0);
    }
}
