//! Composition of a remote object handle, its property store and its
//! change-notification bridge.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use crate::{
    BluezError, Result,
    bus::{PropertyMap, RemoteTarget, SignalEvent, Transport},
    object_manager::{ObjectManagerHub, ObjectRegistration},
    properties::{PropertySet, PropertyStore, PropertyValue, decode},
    signals::{ChangeBridge, EventChannel, PropertiesChanged, PropertyWatch},
};

/// Address of a remote object plus the transport used to reach it.
#[derive(Debug, Clone)]
pub struct RemoteObject {
    target: RemoteTarget,
    transport: Arc<dyn Transport>,
}

impl RemoteObject {
    /// Creates a handle for `target`.
    pub fn new(transport: Arc<dyn Transport>, target: RemoteTarget) -> Self {
        Self { target, transport }
    }

    /// Remote identity of the object.
    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// Transport the handle talks through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Invokes a method on the object's interface.
    ///
    /// # Errors
    ///
    /// Returns the transport error or the daemon's rejection.
    #[instrument(skip(self, args), fields(object = %self.target), err)]
    pub async fn call(&self, method: &str, args: Vec<OwnedValue>) -> Result<Vec<OwnedValue>> {
        self.transport.call(&self.target, method, args).await
    }
}

/// Typed binding to one interface of a remote object.
///
/// Owns the [`PropertyStore`] mirroring the interface's properties, the
/// [`ChangeBridge`] delivering its change notifications and, once requested,
/// a registration on a shared [`ObjectManagerHub`].
#[derive(Debug)]
pub struct Binding<P: PropertySet> {
    object: RemoteObject,
    store: PropertyStore<P>,
    bridge: ChangeBridge,
    object_manager: Mutex<Option<(Arc<ObjectManagerHub>, ObjectRegistration)>>,
}

impl<P: PropertySet> Binding<P> {
    /// Binds to `path` on `service` and performs the initial property load.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::InvalidTarget` for malformed names, or the error
    /// of the initial load.
    pub async fn open(
        transport: Arc<dyn Transport>,
        service: &str,
        path: &str,
        capacity: usize,
    ) -> Result<Self> {
        let binding = Self::unloaded(transport, service, path, capacity)?;
        binding.reload().await?;

        Ok(binding)
    }

    /// Binds to `path` on `service` without touching the bus.
    ///
    /// The store holds default values until [`reload`](Self::reload).
    ///
    /// # Errors
    ///
    /// Returns `BluezError::InvalidTarget` for malformed names.
    pub fn unloaded(
        transport: Arc<dyn Transport>,
        service: &str,
        path: &str,
        capacity: usize,
    ) -> Result<Self> {
        let target = RemoteTarget::new(service, P::INTERFACE, path)?;
        let bridge = ChangeBridge::new(Arc::clone(&transport), target.clone(), capacity);

        Ok(Self {
            object: RemoteObject::new(transport, target),
            store: PropertyStore::new(),
            bridge,
            object_manager: Mutex::new(None),
        })
    }

    /// Object path of the bound object.
    pub fn path(&self) -> &OwnedObjectPath {
        self.object.target().path()
    }

    /// Interface name of the binding.
    pub fn interface(&self) -> &'static str {
        P::INTERFACE
    }

    /// Remote identity of the bound object.
    pub fn target(&self) -> &RemoteTarget {
        self.object.target()
    }

    /// Underlying remote object handle.
    pub fn object(&self) -> &RemoteObject {
        &self.object
    }

    /// Copy of the cached properties.
    pub fn properties(&self) -> P {
        self.store.snapshot()
    }

    /// The property store backing this binding.
    pub fn store(&self) -> &PropertyStore<P> {
        &self.store
    }

    /// Re-reads every property from the remote object.
    ///
    /// # Errors
    ///
    /// Returns the transport or decode error; the cache is unchanged then.
    pub async fn reload(&self) -> Result<P> {
        self.store
            .load(self.object.transport().as_ref(), self.object.target())
            .await
    }

    /// Cached value of a property.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` for names the interface does
    /// not declare.
    pub fn cached(&self, name: &str) -> Result<OwnedValue> {
        self.store.get(name)
    }

    /// Reads a property from the remote object, refreshing the cache.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound`, the transport error or a
    /// decode error.
    pub async fn get_property(&self, name: &str) -> Result<OwnedValue> {
        self.store
            .fetch(self.object.transport().as_ref(), self.object.target(), name)
            .await
    }

    /// Reads a property from the remote object as `T`.
    ///
    /// # Errors
    ///
    /// Same as [`get_property`](Self::get_property).
    pub async fn get_remote<T: PropertyValue>(&self, name: &str) -> Result<T> {
        decode(name, self.get_property(name).await?)
    }

    /// Writes a property on the remote object.
    ///
    /// The cache follows once the daemon reports the change.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound`, `BluezError::Decode` for a
    /// value of the wrong type, or the transport / rejection error.
    pub async fn set_property(&self, name: &str, value: OwnedValue) -> Result<()> {
        self.store
            .set_remote(
                self.object.transport().as_ref(),
                self.object.target(),
                name,
                value,
            )
            .await
    }

    /// Typed variant of [`set_property`](Self::set_property).
    ///
    /// # Errors
    ///
    /// Same as [`set_property`](Self::set_property).
    pub async fn set_remote<T: PropertyValue>(&self, name: &str, value: &T) -> Result<()> {
        self.set_property(name, value.to_value()?).await
    }

    /// Writes a property into the cache only.
    ///
    /// Fields declared emit-on-change publish a notification to the active
    /// property watch.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` or `BluezError::Decode`.
    pub async fn set_local(&self, name: &str, value: OwnedValue) -> Result<()> {
        if !self.store.set_local(name, value.try_clone()?)? {
            return Ok(());
        }

        let change = PropertiesChanged {
            path: self.path().clone(),
            interface: P::INTERFACE.to_string(),
            changed: PropertyMap::from([(name.to_string(), value)]),
            invalidated: Vec::new(),
        };
        if !self.bridge.publish(change).await {
            debug!(property = name, "no watcher for local change");
        }

        Ok(())
    }

    /// Typed variant of [`set_local`](Self::set_local).
    ///
    /// # Errors
    ///
    /// Same as [`set_local`](Self::set_local).
    pub async fn set_local_value<T: PropertyValue>(&self, name: &str, value: &T) -> Result<()> {
        self.set_local(name, value.to_value()?).await
    }

    /// Raw `PropertiesChanged` channel of the object.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the subscription is refused.
    pub async fn properties_signal(&self) -> Result<EventChannel<SignalEvent>> {
        self.bridge.subscribe().await
    }

    /// Releases the raw change subscription and any watch fed from it.
    pub async fn unregister_properties_signal(&self) -> bool {
        self.bridge.unsubscribe().await
    }

    /// Starts the typed property watch, keeping the cache in sync.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::WatchActive` if a watch is already running, or
    /// the transport error.
    pub async fn watch_properties(&self) -> Result<PropertyWatch> {
        self.bridge.watch(self.store.clone()).await
    }

    /// Stops the typed property watch.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::UnknownWatch` for a watch of another binding.
    pub async fn unwatch_properties(&self, watch: PropertyWatch) -> Result<()> {
        self.bridge.unwatch(watch).await
    }

    /// Registration of this binding on `hub`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the hub cannot start its feed.
    pub async fn object_manager_events(
        &self,
        hub: &Arc<ObjectManagerHub>,
    ) -> Result<ObjectRegistration> {
        let mut slot = self.object_manager.lock().await;

        if let Some((current, registration)) = slot.as_ref() {
            if Arc::ptr_eq(current, hub) && registration.is_active() {
                return Ok(registration.clone());
            }
            current.unregister(registration);
        }

        let registration = hub.register().await?;
        *slot = Some((Arc::clone(hub), registration.clone()));

        Ok(registration)
    }

    /// Drops this binding's object-manager registration.
    pub async fn release_object_manager(&self) -> bool {
        match self.object_manager.lock().await.take() {
            Some((hub, registration)) => hub.unregister(&registration),
            None => false,
        }
    }

    /// Invokes a method on the bound interface.
    ///
    /// # Errors
    ///
    /// Returns the transport error or the daemon's rejection.
    pub async fn call(&self, method: &str, args: Vec<OwnedValue>) -> Result<Vec<OwnedValue>> {
        self.object.call(method, args).await
    }

    /// Tears down every subscription and releases the transport handle.
    pub async fn close(self) {
        self.bridge.unsubscribe().await;
        self.release_object_manager().await;
        debug!(object = %self.object.target(), "binding closed");
    }
}

/// Checks that a method reply carries exactly `count` values.
pub(crate) fn expect_reply(
    method: &str,
    reply: Vec<OwnedValue>,
    count: usize,
) -> Result<Vec<OwnedValue>> {
    if reply.len() != count {
        return Err(BluezError::UnexpectedReply {
            method: method.to_string(),
            details: format!("expected {count} values, got {}", reply.len()),
        });
    }
    Ok(reply)
}

/// Decodes a single-value method reply.
pub(crate) fn reply_value<T: PropertyValue>(method: &str, reply: Vec<OwnedValue>) -> Result<T> {
    let mut values = expect_reply(method, reply, 1)?;
    match values.pop() {
        Some(value) => decode(method, value),
        None => Err(BluezError::UnexpectedReply {
            method: method.to_string(),
            details: "empty reply".to_string(),
        }),
    }
}
