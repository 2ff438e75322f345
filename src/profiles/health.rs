use std::sync::Arc;

use zbus::zvariant::OwnedObjectPath;

use crate::{
    Result,
    binding::{Binding, expect_reply, reply_value},
    bluez_properties,
    bus::Transport,
    config::BluezConfig,
    properties::PropertyValue,
    remote_getters,
};

bluez_properties! {
    /// Properties of `org.bluez.HealthDevice1`.
    pub struct HealthDevice1Properties: "org.bluez.HealthDevice1" {
        /// The first reliable channel opened, used by upper applications for
        /// control messages.
        "MainChannel" => main_channel: OwnedObjectPath,
    }
}

/// Health device (HDP) of a remote peer.
pub type HealthDevice1 = Binding<HealthDevice1Properties>;

impl HealthDevice1 {
    /// Binds to the health device at `path` on the default daemon.
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
        /// Main data channel of the device.
        main_channel => "MainChannel": OwnedObjectPath,
    }

    /// Sends an echo request to the remote device.
    ///
    /// Returns `true` if the device answered correctly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` or `OutOfRange` rejections from the daemon,
    /// or a transport error.
    pub async fn echo(&self) -> Result<bool> {
        reply_value("Echo", self.call("Echo", Vec::new()).await?)
    }

    /// Opens a data channel for `application` with the given configuration
    /// (`Reliable`, `Streaming` or `Any`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` or `HealthError` rejections, or a transport
    /// error.
    pub async fn create_channel(
        &self,
        application: &OwnedObjectPath,
        configuration: &str,
    ) -> Result<OwnedObjectPath> {
        let args = vec![
            application.to_value()?,
            configuration.to_string().to_value()?,
        ];
        reply_value("CreateChannel", self.call("CreateChannel", args).await?)
    }

    /// Destroys a data channel.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments`, `NotFound` or `NotAllowed` rejections, or a
    /// transport error.
    pub async fn destroy_channel(&self, channel: &OwnedObjectPath) -> Result<()> {
        let reply = self
            .call("DestroyChannel", vec![channel.to_value()?])
            .await?;
        expect_reply("DestroyChannel", reply, 0)?;
        Ok(())
    }
}
