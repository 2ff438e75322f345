use std::fmt;

use thiserror::Error;
use zbus::{DBusError, fdo};

/// Error types for BlueZ property bindings.
///
/// Every failure is returned to the immediate caller. Remote domain errors
/// keep their symbolic D-Bus name so callers can match on them through
/// [`BluezError::kind`].
#[derive(Error, Debug)]
pub enum BluezError {
    /// Connection lost, call timeout or any other transport-level failure
    #[error("D-Bus operation failed: {0}")]
    Transport(zbus::Error),

    /// Value could not be converted to or from its D-Bus representation
    #[error("value conversion failed: {0}")]
    Value(#[from] zbus::zvariant::Error),

    /// Remote value does not have the type declared for the field
    #[error("cannot decode property '{property}': expected {expected}, found signature '{found}'")]
    Decode {
        /// Property whose value failed to decode
        property: String,
        /// Declared type of the field
        expected: &'static str,
        /// Signature of the value that was received
        found: String,
    },

    /// The daemon refused the request with a domain error
    #[error("{name}: {message}")]
    Rejected {
        /// Fully qualified D-Bus error name, e.g. `org.bluez.Error.NotPermitted`
        name: String,
        /// Human readable message sent along with the error
        message: String,
    },

    /// Property name is not part of the cached property set
    #[error("property '{0}' not found")]
    PropertyNotFound(String),

    /// Bus name, interface name or object path is malformed
    #[error("invalid remote target: {0}")]
    InvalidTarget(String),

    /// Transport is not connected to the bus
    #[error("transport is not connected")]
    NotConnected,

    /// A typed property watch is already active for this object
    #[error("property watch already active on {path}")]
    WatchActive {
        /// Object path of the watched object
        path: String,
    },

    /// The watch handed to `unwatch` does not belong to this object
    #[error("watch is not active on {path}")]
    UnknownWatch {
        /// Object path of the object
        path: String,
    },

    /// Method reply did not have the expected shape
    #[error("unexpected reply to {method}: {details}")]
    UnexpectedReply {
        /// Method that was called
        method: String,
        /// What was wrong with the reply
        details: String,
    },

    /// Text could not be parsed into a property value
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Configuration could not be parsed
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while reading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for BlueZ binding operations.
pub type Result<T> = std::result::Result<T, BluezError>;

impl BluezError {
    /// Creates a remote-rejected error from a D-Bus error name and message.
    pub fn rejected(name: impl Into<String>, message: Option<impl Into<String>>) -> Self {
        Self::Rejected {
            name: name.into(),
            message: message.map(Into::into).unwrap_or_default(),
        }
    }

    /// Symbolic kind of a remote-rejected error.
    ///
    /// Returns `None` for every other error variant.
    pub fn kind(&self) -> Option<RejectionKind> {
        match self {
            Self::Rejected { name, .. } => Some(RejectionKind::from_name(name)),
            _ => None,
        }
    }

    /// Whether this is a transport-level failure the caller may retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotConnected)
    }
}

/// D-Bus error names that report a missing peer or a failed delivery rather
/// than a refusal by the daemon.
const TRANSPORT_ERROR_NAMES: &[&str] = &[
    "org.freedesktop.DBus.Error.ServiceUnknown",
    "org.freedesktop.DBus.Error.NameHasNoOwner",
    "org.freedesktop.DBus.Error.NoReply",
    "org.freedesktop.DBus.Error.Timeout",
    "org.freedesktop.DBus.Error.TimedOut",
    "org.freedesktop.DBus.Error.Disconnected",
    "org.freedesktop.DBus.Error.NoServer",
];

fn is_transport_error_name(name: &str) -> bool {
    TRANSPORT_ERROR_NAMES.contains(&name)
}

impl From<zbus::Error> for BluezError {
    fn from(error: zbus::Error) -> Self {
        let undelivered = matches!(
            &error,
            zbus::Error::MethodError(name, ..) if is_transport_error_name(name.as_str())
        );
        if undelivered {
            return Self::Transport(error);
        }

        match error {
            zbus::Error::MethodError(name, message, _) => Self::rejected(name.as_str(), message),
            zbus::Error::FDO(inner) => Self::from(*inner),
            zbus::Error::Variant(inner) => Self::Value(inner),
            other => Self::Transport(other),
        }
    }
}

impl From<fdo::Error> for BluezError {
    fn from(error: fdo::Error) -> Self {
        match error {
            fdo::Error::ZBus(inner) => Self::from(inner),
            fdo::Error::NoReply(_)
            | fdo::Error::Timeout(_)
            | fdo::Error::TimedOut(_)
            | fdo::Error::Disconnected(_)
            | fdo::Error::NoServer(_)
            | fdo::Error::ServiceUnknown(_)
            | fdo::Error::NameHasNoOwner(_) => Self::Transport(zbus::Error::FDO(Box::new(error))),
            other => Self::rejected(other.name().as_str(), other.description()),
        }
    }
}

impl From<zbus::names::Error> for BluezError {
    fn from(error: zbus::names::Error) -> Self {
        Self::InvalidTarget(error.to_string())
    }
}

/// Symbolic names of the errors BlueZ returns from method calls and
/// property writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// `org.bluez.Error.NotReady`
    NotReady,
    /// `org.bluez.Error.InvalidArguments`
    InvalidArguments,
    /// `org.bluez.Error.Failed`
    Failed,
    /// `org.bluez.Error.NotPermitted`
    NotPermitted,
    /// `org.bluez.Error.DoesNotExist`
    DoesNotExist,
    /// `org.bluez.Error.Rejected`
    Rejected,
    /// `org.bluez.Error.NotConnected`
    NotConnected,
    /// `org.bluez.Error.NotAcquired`
    NotAcquired,
    /// `org.bluez.Error.NotSupported`
    NotSupported,
    /// `org.bluez.Error.NotAuthorized`
    NotAuthorized,
    /// `org.bluez.Error.NotAvailable`
    NotAvailable,
    /// Any other error name, kept verbatim
    Other(String),
}

impl RejectionKind {
    /// Classifies a D-Bus error name by its last segment.
    ///
    /// Both `org.bluez.Error.*` and `org.bluez.obex.Error.*` map onto the
    /// same kinds.
    pub fn from_name(name: &str) -> Self {
        let symbol = name.rsplit('.').next().unwrap_or(name);
        match symbol {
            "NotReady" => Self::NotReady,
            "InvalidArguments" => Self::InvalidArguments,
            "Failed" => Self::Failed,
            "NotPermitted" => Self::NotPermitted,
            "DoesNotExist" => Self::DoesNotExist,
            "Rejected" => Self::Rejected,
            "NotConnected" => Self::NotConnected,
            "NotAcquired" => Self::NotAcquired,
            "NotSupported" => Self::NotSupported,
            "NotAuthorized" => Self::NotAuthorized,
            "NotAvailable" => Self::NotAvailable,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Short symbolic name, e.g. `NotPermitted`.
    pub fn symbol(&self) -> &str {
        match self {
            Self::NotReady => "NotReady",
            Self::InvalidArguments => "InvalidArguments",
            Self::Failed => "Failed",
            Self::NotPermitted => "NotPermitted",
            Self::DoesNotExist => "DoesNotExist",
            Self::Rejected => "Rejected",
            Self::NotConnected => "NotConnected",
            Self::NotAcquired => "NotAcquired",
            Self::NotSupported => "NotSupported",
            Self::NotAuthorized => "NotAuthorized",
            Self::NotAvailable => "NotAvailable",
            Self::Other(name) => name.rsplit('.').next().unwrap_or(name),
        }
    }

    /// Fully qualified BlueZ error name for this kind.
    pub fn bluez_name(&self) -> String {
        match self {
            Self::Other(name) => name.clone(),
            known => format!("org.bluez.Error.{}", known.symbol()),
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
