//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::{future::Future, sync::Arc, time::Duration};

use bluez_props::bus::{MemoryTransport, PropertyMap, Transport};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

pub const DEVICE_PATH: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55";
pub const SERVICE_PATH: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55/service0010";
pub const MESSAGE_PATH: &str = "/org/bluez/obex/client/session0/message1";

pub const BATTERY: &str = "org.bluez.Battery1";
pub const GATT_SERVICE: &str = "org.bluez.GattService1";

const WAIT: Duration = Duration::from_secs(2);

pub fn owned<'a>(value: impl Into<Value<'a>>) -> OwnedValue {
    OwnedValue::try_from(value.into()).unwrap()
}

pub fn path(p: &str) -> OwnedObjectPath {
    OwnedObjectPath::try_from(p).unwrap()
}

pub fn props(entries: Vec<(&str, OwnedValue)>) -> PropertyMap {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Fake daemon exporting a battery at `DEVICE_PATH` reporting 42%.
pub fn battery_daemon() -> Arc<MemoryTransport> {
    let daemon = Arc::new(MemoryTransport::new());
    daemon.insert_object(DEVICE_PATH, BATTERY, props(vec![("Percentage", owned(42u8))]));
    daemon
}

/// Fake daemon exporting a remote GATT service at `SERVICE_PATH`.
pub fn gatt_daemon() -> Arc<MemoryTransport> {
    let daemon = Arc::new(MemoryTransport::new());
    daemon.insert_object(
        SERVICE_PATH,
        GATT_SERVICE,
        props(vec![
            ("UUID", owned("0000180f-0000-1000-8000-00805f9b34fb")),
            ("Primary", owned(false)),
            ("Device", owned(vec![path(DEVICE_PATH)])),
            ("Includes", owned(Vec::<OwnedObjectPath>::new())),
            ("Characteristics", owned(Vec::<OwnedObjectPath>::new())),
        ]),
    );
    daemon
}

pub fn as_transport(daemon: &Arc<MemoryTransport>) -> Arc<dyn Transport> {
    Arc::clone(daemon) as Arc<dyn Transport>
}

/// Awaits `future`, failing the test if it takes too long.
pub async fn within<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(WAIT, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out waiting for event"),
    }
}

/// Polls `condition` until it holds, failing the test on timeout.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}
