//! Transport seam between the bindings and the message bus.
//!
//! The bindings never talk to zbus directly; they go through [`Transport`],
//! which covers property Get/GetAll/Set, method calls, the object-manager
//! snapshot and signal subscriptions. [`DbusTransport`] is the real
//! implementation, [`MemoryTransport`] an in-process stand-in for the daemon.

mod dbus;
mod memory;

use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use tokio::sync::mpsc;
use zbus::{
    names::{OwnedBusName, OwnedInterfaceName},
    zvariant::{OwnedObjectPath, OwnedValue},
};

pub use dbus::DbusTransport;
pub use memory::{MemoryTransport, MethodHandler};

use crate::{BluezError, Result};

/// Standard interface carrying `PropertiesChanged`.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Standard interface carrying `InterfacesAdded` / `InterfacesRemoved`.
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";

/// Untyped property set as it travels on the wire.
pub type PropertyMap = HashMap<String, OwnedValue>;

/// Objects below a root path, keyed by path then interface name.
pub type ManagedObjects = HashMap<OwnedObjectPath, HashMap<String, PropertyMap>>;

/// Identity of a remote object interface: bus name, interface, object path.
///
/// Validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTarget {
    service: OwnedBusName,
    interface: OwnedInterfaceName,
    path: OwnedObjectPath,
}

impl RemoteTarget {
    /// Creates a target from its three string components.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::InvalidTarget` if any component is malformed.
    pub fn new(service: &str, interface: &str, path: &str) -> Result<Self> {
        let service = OwnedBusName::try_from(service)?;
        let interface = OwnedInterfaceName::try_from(interface)?;
        let path = OwnedObjectPath::try_from(path)
            .map_err(|e| BluezError::InvalidTarget(format!("object path '{path}': {e}")))?;

        Ok(Self {
            service,
            interface,
            path,
        })
    }

    /// Bus name of the daemon exporting the object.
    pub fn service(&self) -> &OwnedBusName {
        &self.service
    }

    /// Interface this target addresses.
    pub fn interface(&self) -> &OwnedInterfaceName {
        &self.interface
    }

    /// Object path of the remote object.
    pub fn path(&self) -> &OwnedObjectPath {
        &self.path
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}[{}]", self.service, self.path.as_str(), self.interface)
    }
}

/// Filter for a signal subscription: signals of `interface` emitted at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRule {
    /// Object path the signal is emitted from.
    pub path: OwnedObjectPath,
    /// Interface the signal belongs to.
    pub interface: String,
}

impl SignalRule {
    /// `PropertiesChanged` signals of a single object.
    pub fn properties(path: OwnedObjectPath) -> Self {
        Self {
            path,
            interface: PROPERTIES_INTERFACE.to_string(),
        }
    }

    /// Object-manager signals emitted at `root`.
    pub fn object_manager(root: OwnedObjectPath) -> Self {
        Self {
            path: root,
            interface: OBJECT_MANAGER_INTERFACE.to_string(),
        }
    }

    /// Whether a decoded event is covered by this rule.
    ///
    /// Object-manager events carry the path of the affected object, not the
    /// root they were emitted from, so only the interface is compared.
    pub fn matches(&self, event: &SignalEvent) -> bool {
        match event {
            SignalEvent::PropertiesChanged { path, .. } => {
                self.interface == PROPERTIES_INTERFACE && &self.path == path
            }
            SignalEvent::InterfacesAdded { .. } | SignalEvent::InterfacesRemoved { .. } => {
                self.interface == OBJECT_MANAGER_INTERFACE
            }
        }
    }
}

/// Signal decoded from the bus.
#[derive(Debug, PartialEq)]
pub enum SignalEvent {
    /// `org.freedesktop.DBus.Properties.PropertiesChanged`
    PropertiesChanged {
        /// Object whose properties changed.
        path: OwnedObjectPath,
        /// Interface the properties belong to.
        interface: String,
        /// New values by property name.
        changed: PropertyMap,
        /// Properties whose value must be re-fetched.
        invalidated: Vec<String>,
    },

    /// `org.freedesktop.DBus.ObjectManager.InterfacesAdded`
    InterfacesAdded {
        /// Object that gained interfaces.
        path: OwnedObjectPath,
        /// Added interfaces with their initial properties.
        interfaces: HashMap<String, PropertyMap>,
    },

    /// `org.freedesktop.DBus.ObjectManager.InterfacesRemoved`
    InterfacesRemoved {
        /// Object that lost interfaces.
        path: OwnedObjectPath,
        /// Names of the removed interfaces.
        interfaces: Vec<String>,
    },
}

impl SignalEvent {
    /// Object path the event is about.
    pub fn path(&self) -> &OwnedObjectPath {
        match self {
            Self::PropertiesChanged { path, .. }
            | Self::InterfacesAdded { path, .. }
            | Self::InterfacesRemoved { path, .. } => path,
        }
    }

    /// Deep copy of the event.
    ///
    /// # Errors
    ///
    /// Fails only for values carrying file descriptors.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(match self {
            Self::PropertiesChanged {
                path,
                interface,
                changed,
                invalidated,
            } => Self::PropertiesChanged {
                path: path.clone(),
                interface: interface.clone(),
                changed: clone_map(changed)?,
                invalidated: invalidated.clone(),
            },
            Self::InterfacesAdded { path, interfaces } => Self::InterfacesAdded {
                path: path.clone(),
                interfaces: interfaces
                    .iter()
                    .map(|(name, props)| Ok((name.clone(), clone_map(props)?)))
                    .collect::<Result<_>>()?,
            },
            Self::InterfacesRemoved { path, interfaces } => Self::InterfacesRemoved {
                path: path.clone(),
                interfaces: interfaces.clone(),
            },
        })
    }
}

/// Handle of a signal registration held by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection-oriented access to a message bus daemon.
///
/// All calls are addressed by [`RemoteTarget`]. Errors are surfaced verbatim;
/// nothing is retried.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Fetches every property of the target interface.
    async fn get_all(&self, target: &RemoteTarget) -> Result<PropertyMap>;

    /// Fetches a single property.
    async fn get(&self, target: &RemoteTarget, name: &str) -> Result<OwnedValue>;

    /// Writes a single property.
    async fn set(&self, target: &RemoteTarget, name: &str, value: OwnedValue) -> Result<()>;

    /// Invokes a method on the target interface and returns the reply values
    /// in order.
    async fn call(
        &self,
        target: &RemoteTarget,
        method: &str,
        args: Vec<OwnedValue>,
    ) -> Result<Vec<OwnedValue>>;

    /// Snapshot of every object the daemon exports below `root`.
    async fn managed_objects(&self, service: &str, root: &OwnedObjectPath)
    -> Result<ManagedObjects>;

    /// Starts delivering signals matching `rule` into `sink`.
    ///
    /// Fails without leaving a registration behind if the bus refuses the
    /// subscription.
    async fn subscribe(
        &self,
        rule: SignalRule,
        sink: mpsc::Sender<SignalEvent>,
    ) -> Result<RegistrationId>;

    /// Stops a registration. Returns `false` if it was already released.
    fn unsubscribe(&self, id: RegistrationId) -> bool;

    /// Number of live registrations.
    fn registration_count(&self) -> usize;
}

/// Deep copy of a property map.
///
/// # Errors
///
/// Fails only for values carrying file descriptors.
pub fn clone_map(map: &PropertyMap) -> Result<PropertyMap> {
    map.iter()
        .map(|(name, value)| Ok((name.clone(), value.try_clone()?)))
        .collect()
}
