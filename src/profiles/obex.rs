use std::sync::Arc;

use zbus::zvariant::{OwnedObjectPath, Value};

use crate::{
    BluezError, Result,
    binding::{Binding, expect_reply},
    bluez_properties,
    bus::{PropertyMap, Transport},
    config::BluezConfig,
    properties::{PropertyValue, decode},
    remote_getters,
};

bluez_properties! {
    /// Properties of `org.bluez.obex.Message1`.
    pub struct Message1Properties: "org.bluez.obex.Message1" {
        /// Message timestamp.
        "Timestamp" => timestamp: String,
        /// Message recipient name.
        "Recipient" => recipient: String,
        /// Message recipient address.
        "RecipientAddress" => recipient_address: String,
        /// Reception status: `complete`, `fractioned` or `notification`.
        "Status" => status: String,
        /// Protected flag.
        "Protected" => protected: bool,
        /// Folder the message belongs to.
        "Folder" => folder: String,
        /// Message subject.
        "Subject" => subject: String,
        /// Reply-To address.
        "ReplyTo" => reply_to: String,
        /// Sent flag.
        "Sent" => sent: bool,
        /// Sender address.
        "SenderAddress" => sender_address: String,
        /// Message type: `email`, `sms-gsm`, `sms-cdma` or `mms`.
        "Type" => message_type: String,
        /// Read flag.
        "Read" => read: bool,
        /// Deleted flag.
        "Deleted" => deleted: bool,
        /// Sender name.
        "Sender" => sender: String,
        /// Priority flag.
        "Priority" => priority: bool,
    }
}

/// Message of a message access (MAP) session, served by `obexd`.
///
/// `obexd` lives on the session bus; the transport handed in must be
/// connected there.
pub type Message1 = Binding<Message1Properties>;

impl Message1 {
    /// Binds to the message at `path` on the default OBEX daemon.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::InvalidTarget` for a malformed path, or the error
    /// of the initial property load.
    pub async fn new(transport: Arc<dyn Transport>, path: &str) -> Result<Self> {
        Self::with_config(transport, &BluezConfig::default(), path).await
    }

    /// Binds using the OBEX daemon name and channel capacity from `config`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub async fn with_config(
        transport: Arc<dyn Transport>,
        config: &BluezConfig,
        path: &str,
    ) -> Result<Self> {
        Self::open(
            transport,
            &config.obex_service,
            path,
            config.channel_capacity,
        )
        .await
    }

    remote_getters! {
        /// Message timestamp.
        timestamp => "Timestamp": String,
        /// Recipient name.
        recipient => "Recipient": String,
        /// Recipient address.
        recipient_address => "RecipientAddress": String,
        /// Reception status.
        status => "Status": String,
        /// Protected flag.
        protected => "Protected": bool,
        /// Folder.
        folder => "Folder": String,
        /// Subject.
        subject => "Subject": String,
        /// Reply-To address.
        reply_to => "ReplyTo": String,
        /// Sent flag.
        sent => "Sent": bool,
        /// Sender address.
        sender_address => "SenderAddress": String,
        /// Message type.
        message_type => "Type": String,
        /// Read flag.
        read => "Read": bool,
        /// Deleted flag.
        deleted => "Deleted": bool,
        /// Sender name.
        sender => "Sender": String,
        /// Priority flag.
        priority => "Priority": bool,
    }

    /// Marks the message read or unread.
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection or a transport error.
    pub async fn set_read(&self, read: bool) -> Result<()> {
        self.set_remote("Read", &read).await
    }

    /// Marks the message deleted or undeleted.
    ///
    /// # Errors
    ///
    /// Returns the daemon's rejection or a transport error.
    pub async fn set_deleted(&self, deleted: bool) -> Result<()> {
        self.set_remote("Deleted", &deleted).await
    }

    /// Downloads the message into `target_file`, or a temporary file if
    /// empty.
    ///
    /// Returns the transfer object and its initial properties.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArguments` or `Failed` rejections, a transport error,
    /// or `BluezError::UnexpectedReply` for a malformed reply.
    pub async fn get(
        &self,
        target_file: &str,
        attachment: bool,
    ) -> Result<(OwnedObjectPath, PropertyMap)> {
        let args = vec![target_file.to_string().to_value()?, attachment.to_value()?];
        let reply = expect_reply("Get", self.call("Get", args).await?, 2)?;

        let mut values = reply.into_iter();
        let (Some(transfer), Some(properties)) = (values.next(), values.next()) else {
            return Err(BluezError::UnexpectedReply {
                method: "Get".to_string(),
                details: "missing transfer or properties".to_string(),
            });
        };

        let transfer = decode::<OwnedObjectPath>("Get", transfer)?;
        let properties =
            PropertyMap::try_from(Value::from(properties)).map_err(|e| BluezError::UnexpectedReply {
                method: "Get".to_string(),
                details: format!("transfer properties: {e}"),
            })?;

        Ok((transfer, properties))
    }
}
