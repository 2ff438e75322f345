use std::sync::Arc;

use crate::{
    Result, binding::Binding, bluez_properties, bus::Transport, config::BluezConfig,
    remote_getters,
};

bluez_properties! {
    /// Properties of `org.bluez.Battery1`.
    pub struct Battery1Properties: "org.bluez.Battery1" {
        /// Percentage of battery left, 0 to 100.
        "Percentage" => percentage: u8,
    }
}

/// Battery level of a connected device.
pub type Battery1 = Binding<Battery1Properties>;

impl Battery1 {
    /// Binds to the battery of the device at `path` on the default daemon.
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
        /// Current battery percentage.
        percentage => "Percentage": u8,
    }
}
