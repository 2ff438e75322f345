use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use super::{
    ManagedObjects, PropertyMap, RegistrationId, RemoteTarget, SignalEvent, SignalRule, Transport,
    clone_map,
};
use crate::{BluezError, Result};

/// Handler invoked for a method call on a [`MemoryTransport`] object.
pub type MethodHandler = Arc<dyn Fn(Vec<OwnedValue>) -> Result<Vec<OwnedValue>> + Send + Sync>;

type ObjectKey = (String, String);
type MemberKey = (String, String, String);

#[derive(Default)]
struct State {
    disconnected: bool,
    objects: HashMap<ObjectKey, PropertyMap>,
    rejections: HashMap<MemberKey, String>,
    methods: HashMap<MemberKey, MethodHandler>,
    subscriptions: HashMap<RegistrationId, (SignalRule, mpsc::Sender<SignalEvent>)>,
    calls: Vec<String>,
}

/// In-process stand-in for the Bluetooth daemon.
///
/// Holds objects and their properties, answers Get/GetAll/Set and scripted
/// method calls, and delivers signals to subscribers. An accepted `Set`
/// updates the stored value and emits `PropertiesChanged`, like the daemon.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
    next_id: AtomicU64,
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryTransport")
            .field("connected", &!state.disconnected)
            .field("objects", &state.objects.len())
            .field("subscriptions", &state.subscriptions.len())
            .finish()
    }
}

impl MemoryTransport {
    /// Creates an empty, connected transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(path: &str, interface: &str) -> ObjectKey {
        (path.to_string(), interface.to_string())
    }

    fn member_key(path: &str, interface: &str, member: &str) -> MemberKey {
        (path.to_string(), interface.to_string(), member.to_string())
    }

    fn check_connected(state: &State) -> Result<()> {
        if state.disconnected {
            return Err(BluezError::NotConnected);
        }
        Ok(())
    }

    /// Simulates losing or regaining the bus connection.
    pub fn set_connected(&self, connected: bool) {
        self.lock().disconnected = !connected;
    }

    /// Exports an interface on an object without emitting any signal.
    pub fn insert_object(&self, path: &str, interface: &str, properties: PropertyMap) {
        self.lock()
            .objects
            .insert(Self::key(path, interface), properties);
    }

    /// Exports an interface and announces it with `InterfacesAdded`.
    ///
    /// # Errors
    ///
    /// Fails if the path is malformed or a value cannot be copied.
    pub async fn add_object(
        &self,
        path: &str,
        interface: &str,
        properties: PropertyMap,
    ) -> Result<()> {
        let announced = clone_map(&properties)?;
        self.insert_object(path, interface, properties);

        let event = SignalEvent::InterfacesAdded {
            path: object_path(path)?,
            interfaces: HashMap::from([(interface.to_string(), announced)]),
        };
        self.emit(event).await
    }

    /// Removes an interface and announces it with `InterfacesRemoved`.
    ///
    /// # Errors
    ///
    /// Fails if the path is malformed.
    pub async fn remove_object(&self, path: &str, interface: &str) -> Result<()> {
        self.lock().objects.remove(&Self::key(path, interface));

        let event = SignalEvent::InterfacesRemoved {
            path: object_path(path)?,
            interfaces: vec![interface.to_string()],
        };
        self.emit(event).await
    }

    /// Makes every `Set` of `property` fail with the given D-Bus error name.
    pub fn reject_set(&self, path: &str, interface: &str, property: &str, error_name: &str) {
        self.lock().rejections.insert(
            Self::member_key(path, interface, property),
            error_name.to_string(),
        );
    }

    /// Installs a handler for a method.
    pub fn handle_method(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        handler: MethodHandler,
    ) {
        self.lock()
            .methods
            .insert(Self::member_key(path, interface, method), handler);
    }

    /// Current remote value of a property.
    pub fn remote_value(&self, path: &str, interface: &str, property: &str) -> Option<OwnedValue> {
        self.lock()
            .objects
            .get(&Self::key(path, interface))
            .and_then(|props| props.get(property))
            .and_then(|value| value.try_clone().ok())
    }

    /// Remote calls served so far, as `Member path` strings.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Updates stored values and emits `PropertiesChanged` for them.
    ///
    /// # Errors
    ///
    /// Fails if the path is malformed or a value cannot be copied.
    pub async fn change_properties(
        &self,
        path: &str,
        interface: &str,
        changed: PropertyMap,
        invalidated: Vec<String>,
    ) -> Result<()> {
        {
            let mut state = self.lock();
            let props = state
                .objects
                .entry(Self::key(path, interface))
                .or_default();
            for (name, value) in &changed {
                props.insert(name.clone(), value.try_clone()?);
            }
        }

        let event = SignalEvent::PropertiesChanged {
            path: object_path(path)?,
            interface: interface.to_string(),
            changed,
            invalidated,
        };
        self.emit(event).await
    }

    /// Delivers an event to every matching subscriber, in registration order.
    ///
    /// # Errors
    ///
    /// Fails only if the event cannot be copied for a subscriber.
    pub async fn emit(&self, event: SignalEvent) -> Result<()> {
        let mut sinks: Vec<_> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|(_, (rule, _))| rule.matches(&event))
            .map(|(id, (_, sink))| (*id, sink.clone()))
            .collect();
        sinks.sort_by_key(|(id, _)| *id);

        trace!(path = %event.path().as_str(), subscribers = sinks.len(), "emitting signal");
        for (id, sink) in sinks {
            if sink.send(event.try_clone()?).await.is_err() {
                debug!("subscriber {id} went away");
            }
        }

        Ok(())
    }

    fn record(&self, member: &str, target: &RemoteTarget) {
        self.lock()
            .calls
            .push(format!("{member} {}", target.path().as_str()));
    }

    fn unknown_object(target: &RemoteTarget) -> BluezError {
        BluezError::rejected(
            "org.freedesktop.DBus.Error.UnknownObject",
            Some(format!("no {} at {}", target.interface(), target.path().as_str())),
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get_all(&self, target: &RemoteTarget) -> Result<PropertyMap> {
        self.record("GetAll", target);
        let state = self.lock();
        Self::check_connected(&state)?;

        let props = state
            .objects
            .get(&Self::key(target.path().as_str(), target.interface().as_str()))
            .ok_or_else(|| Self::unknown_object(target))?;
        clone_map(props)
    }

    async fn get(&self, target: &RemoteTarget, name: &str) -> Result<OwnedValue> {
        self.record("Get", target);
        let state = self.lock();
        Self::check_connected(&state)?;

        let props = state
            .objects
            .get(&Self::key(target.path().as_str(), target.interface().as_str()))
            .ok_or_else(|| Self::unknown_object(target))?;
        let value = props.get(name).ok_or_else(|| {
            BluezError::rejected(
                "org.freedesktop.DBus.Error.UnknownProperty",
                Some(format!("no property {name}")),
            )
        })?;
        Ok(value.try_clone()?)
    }

    async fn set(&self, target: &RemoteTarget, name: &str, value: OwnedValue) -> Result<()> {
        self.record("Set", target);
        let path = target.path().as_str();
        let interface = target.interface().as_str();

        let changed = {
            let mut state = self.lock();
            Self::check_connected(&state)?;

            if let Some(error_name) = state
                .rejections
                .get(&Self::member_key(path, interface, name))
            {
                let symbol = error_name.rsplit('.').next().unwrap_or(error_name).to_string();
                return Err(BluezError::rejected(error_name.clone(), Some(symbol)));
            }

            let props = state
                .objects
                .get_mut(&Self::key(path, interface))
                .ok_or_else(|| Self::unknown_object(target))?;
            props.insert(name.to_string(), value.try_clone()?);
            PropertyMap::from([(name.to_string(), value)])
        };

        self.emit(SignalEvent::PropertiesChanged {
            path: target.path().clone(),
            interface: interface.to_string(),
            changed,
            invalidated: Vec::new(),
        })
        .await
    }

    async fn call(
        &self,
        target: &RemoteTarget,
        method: &str,
        args: Vec<OwnedValue>,
    ) -> Result<Vec<OwnedValue>> {
        self.record(method, target);
        let handler = {
            let state = self.lock();
            Self::check_connected(&state)?;
            state
                .methods
                .get(&Self::member_key(
                    target.path().as_str(),
                    target.interface().as_str(),
                    method,
                ))
                .cloned()
                .ok_or_else(|| {
                    BluezError::rejected(
                        "org.freedesktop.DBus.Error.UnknownMethod",
                        Some(format!("no method {method}")),
                    )
                })?
        };

        handler(args)
    }

    async fn managed_objects(
        &self,
        _service: &str,
        root: &OwnedObjectPath,
    ) -> Result<ManagedObjects> {
        let state = self.lock();
        Self::check_connected(&state)?;

        let mut objects = ManagedObjects::new();
        for ((path, interface), props) in &state.objects {
            if !is_below(root.as_str(), path) {
                continue;
            }
            objects
                .entry(object_path(path)?)
                .or_default()
                .insert(interface.clone(), clone_map(props)?);
        }

        Ok(objects)
    }

    async fn subscribe(
        &self,
        rule: SignalRule,
        sink: mpsc::Sender<SignalEvent>,
    ) -> Result<RegistrationId> {
        let mut state = self.lock();
        Self::check_connected(&state)?;

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        state.subscriptions.insert(id, (rule, sink));
        Ok(id)
    }

    fn unsubscribe(&self, id: RegistrationId) -> bool {
        self.lock().subscriptions.remove(&id).is_some()
    }

    fn registration_count(&self) -> usize {
        self.lock().subscriptions.len()
    }
}

fn object_path(path: &str) -> Result<OwnedObjectPath> {
    OwnedObjectPath::try_from(path)
        .map_err(|e| BluezError::InvalidTarget(format!("object path '{path}': {e}")))
}

fn is_below(root: &str, path: &str) -> bool {
    root == "/"
        || path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}
