use std::sync::Arc;

use zbus::zvariant::OwnedObjectPath;

use crate::{
    Result, binding::Binding, bluez_properties, bus::Transport, config::BluezConfig,
    remote_getters,
};

bluez_properties! {
    /// Properties of `org.bluez.GattService1`.
    ///
    /// The same set describes remote services discovered on a device and
    /// local services exported by an application; `is_service` tells them
    /// apart and is never sent over the bus.
    pub struct GattService1Properties: "org.bluez.GattService1" {
        /// 128-bit service UUID.
        "UUID" => uuid: String,
        /// Whether this is a primary service. If false, the service is
        /// secondary.
        "Primary" => primary: bool,
        /// Device the service belongs to. Only present on services from
        /// remote devices.
        "Device" => device: Vec<OwnedObjectPath> [ignore_when("IsService")],
        /// Included services of this service.
        "Includes" => includes: Vec<OwnedObjectPath> [omit_empty],
        /// Marks a locally exported service.
        "IsService" => is_service: bool [ignore],
        /// Characteristics of the service.
        "Characteristics" => characteristics: Vec<OwnedObjectPath> [emit],
    }
}

/// GATT service, remote or locally exported.
pub type GattService1 = Binding<GattService1Properties>;

impl GattService1 {
    /// Binds to the service at `path` on the default daemon.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::InvalidTarget` for a malformed path, or the error
    /// of the initial property load.
    pub async fn new(transport: Arc<dyn Transport>, path: &str) -> Result<Self> {
        Self::with_config(transport, &BluezConfig::default(), path).await
    }

    /// Binds using the daemon name and channel capacity from `config`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub async fn with_config(
        transport: Arc<dyn Transport>,
        config: &BluezConfig,
        path: &str,
    ) -> Result<Self> {
        Self::open(transport, &config.service, path, config.channel_capacity).await
    }

    remote_getters! {
        /// Service UUID.
        uuid => "UUID": String,
        /// Primary flag.
        primary => "Primary": bool,
        /// Owning devices.
        device => "Device": Vec<OwnedObjectPath>,
        /// Included services.
        includes => "Includes": Vec<OwnedObjectPath>,
        /// Characteristics of the service.
        characteristics => "Characteristics": Vec<OwnedObjectPath>,
    }

    /// Writes the service UUID.
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection or a transport error.
    pub async fn set_uuid(&self, uuid: &str) -> Result<()> {
        self.set_remote("UUID", &uuid.to_string()).await
    }

    /// Writes the primary flag.
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection or a transport error.
    pub async fn set_primary(&self, primary: bool) -> Result<()> {
        self.set_remote("Primary", &primary).await
    }

    /// Writes the owning devices.
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection or a transport error.
    pub async fn set_device(&self, device: Vec<OwnedObjectPath>) -> Result<()> {
        self.set_remote("Device", &device).await
    }

    /// Writes the included services.
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection or a transport error.
    pub async fn set_includes(&self, includes: Vec<OwnedObjectPath>) -> Result<()> {
        self.set_remote("Includes", &includes).await
    }

    /// Writes the characteristics.
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection or a transport error.
    pub async fn set_characteristics(&self, characteristics: Vec<OwnedObjectPath>) -> Result<()> {
        self.set_remote("Characteristics", &characteristics).await
    }

    /// Flags the cached set as describing a locally exported service.
    ///
    /// # Errors
    ///
    /// Fails only if the value cannot be encoded.
    pub async fn mark_local_service(&self, local: bool) -> Result<()> {
        self.set_local_value("IsService", &local).await
    }

    /// Updates the characteristics of a local service and notifies the
    /// property watch.
    ///
    /// # Errors
    ///
    /// Fails only if the value cannot be encoded.
    pub async fn update_local_characteristics(
        &self,
        characteristics: Vec<OwnedObjectPath>,
    ) -> Result<()> {
        self.set_local_value("Characteristics", &characteristics)
            .await
    }
}
