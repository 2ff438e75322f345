//! Shared object-manager feed.
//!
//! One [`ObjectManagerHub`] per daemon connection multiplexes the
//! `InterfacesAdded` / `InterfacesRemoved` signals to any number of
//! registrants. The hub is created by the caller and handed to every binding
//! that wants hierarchy events; its bus subscription is started lazily on
//! the first registration and kept for the lifetime of the hub.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_stream::stream;
use futures::Stream;
use tokio::{
    sync::{OnceCell, mpsc},
    task::JoinHandle,
};
use tracing::{debug, instrument, trace, warn};
use zbus::zvariant::{ObjectPath, OwnedObjectPath};

use crate::{
    BluezError, Result,
    bus::{ManagedObjects, PropertyMap, RegistrationId, SignalEvent, SignalRule, Transport, clone_map},
    config::BluezConfig,
    signals::{EventChannel, EventSink},
};

type Registrants = Arc<Mutex<HashMap<u64, EventSink<ObjectEvent>>>>;

/// Object added to or removed from the daemon's hierarchy.
#[derive(Debug, PartialEq)]
pub enum ObjectEvent {
    /// Interfaces were added to an object.
    Added {
        /// Object that gained interfaces.
        path: OwnedObjectPath,
        /// Added interfaces with their initial properties.
        interfaces: HashMap<String, PropertyMap>,
    },
    /// Interfaces were removed from an object.
    Removed {
        /// Object that lost interfaces.
        path: OwnedObjectPath,
        /// Names of the removed interfaces.
        interfaces: Vec<String>,
    },
}

impl ObjectEvent {
    /// Converts an object-manager signal; other signals yield `None`.
    pub fn from_signal(event: SignalEvent) -> Option<Self> {
        match event {
            SignalEvent::InterfacesAdded { path, interfaces } => {
                Some(Self::Added { path, interfaces })
            }
            SignalEvent::InterfacesRemoved { path, interfaces } => {
                Some(Self::Removed { path, interfaces })
            }
            SignalEvent::PropertiesChanged { .. } => None,
        }
    }

    /// Object the event is about.
    pub fn path(&self) -> &OwnedObjectPath {
        match self {
            Self::Added { path, .. } | Self::Removed { path, .. } => path,
        }
    }

    /// Whether the event adds or removes `interface`.
    pub fn concerns(&self, interface: &str) -> bool {
        match self {
            Self::Added { interfaces, .. } => interfaces.contains_key(interface),
            Self::Removed { interfaces, .. } => interfaces.iter().any(|name| name == interface),
        }
    }

    /// Deep copy of the event.
    ///
    /// # Errors
    ///
    /// Fails only for values carrying file descriptors.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(match self {
            Self::Added { path, interfaces } => Self::Added {
                path: path.clone(),
                interfaces: interfaces
                    .iter()
                    .map(|(name, props)| Ok((name.clone(), clone_map(props)?)))
                    .collect::<Result<_>>()?,
            },
            Self::Removed { path, interfaces } => Self::Removed {
                path: path.clone(),
                interfaces: interfaces.clone(),
            },
        })
    }
}

struct Feed {
    registration: RegistrationId,
    task: JoinHandle<()>,
}

/// Process-wide multiplexer of object-manager events.
pub struct ObjectManagerHub {
    transport: Arc<dyn Transport>,
    service: String,
    root: OwnedObjectPath,
    capacity: usize,
    feed: OnceCell<Feed>,
    registrants: Registrants,
}

impl fmt::Debug for ObjectManagerHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectManagerHub")
            .field("service", &self.service)
            .field("root", &self.root.as_str())
            .field("started", &self.is_started())
            .field("registrants", &self.registrant_count())
            .finish()
    }
}

impl ObjectManagerHub {
    /// Hub for the Bluetooth daemon named in `config`, rooted at `/`.
    pub fn new(transport: Arc<dyn Transport>, config: &BluezConfig) -> Self {
        Self {
            transport,
            service: config.service.clone(),
            root: ObjectPath::from_static_str_unchecked("/").into(),
            capacity: config.channel_capacity.max(1),
            feed: OnceCell::new(),
            registrants: Arc::default(),
        }
    }

    /// Hub for an arbitrary service and root path.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::InvalidTarget` if `root` is not an object path.
    pub fn with_root(
        transport: Arc<dyn Transport>,
        service: &str,
        root: &str,
        capacity: usize,
    ) -> Result<Self> {
        let root = OwnedObjectPath::try_from(root)
            .map_err(|e| BluezError::InvalidTarget(format!("object path '{root}': {e}")))?;

        Ok(Self {
            transport,
            service: service.to_string(),
            root,
            capacity: capacity.max(1),
            feed: OnceCell::new(),
            registrants: Arc::default(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, EventSink<ObjectEvent>>> {
        self.registrants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a registrant, starting the shared feed on first use.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the feed cannot be started; a later
    /// call retries.
    #[instrument(skip(self), fields(service = %self.service, root = %self.root.as_str()), err)]
    pub async fn register(&self) -> Result<ObjectRegistration> {
        self.feed.get_or_try_init(|| self.start_feed()).await?;

        let channel = EventChannel::new(self.capacity);
        self.lock().insert(channel.id(), channel.sink());
        debug!("object-manager registrant {} added", channel.id());

        Ok(ObjectRegistration { channel })
    }

    /// Registers and returns the events as a stream.
    ///
    /// The registrant is dropped from the hub once the stream is dropped and
    /// the next event finds it gone.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub async fn events(&self) -> Result<impl Stream<Item = ObjectEvent> + Send + 'static> {
        Ok(self.register().await?.stream())
    }

    /// Removes a registrant and ends its event channel.
    ///
    /// Returns `false` if it was not registered. The shared feed keeps
    /// running.
    pub fn unregister(&self, registration: &ObjectRegistration) -> bool {
        let removed = self.lock().remove(&registration.id()).is_some();
        registration.channel.cancel();
        removed
    }

    /// Number of live registrants.
    pub fn registrant_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether the shared bus subscription has been started.
    pub fn is_started(&self) -> bool {
        self.feed.initialized()
    }

    /// Snapshot of every object below the hub's root.
    ///
    /// # Errors
    ///
    /// Returns the transport error.
    pub async fn managed_objects(&self) -> Result<ManagedObjects> {
        self.transport
            .managed_objects(&self.service, &self.root)
            .await
    }

    async fn start_feed(&self) -> Result<Feed> {
        let (tx, mut rx) = mpsc::channel(self.capacity);
        let rule = SignalRule::object_manager(self.root.clone());
        let registration = self.transport.subscribe(rule, tx).await?;
        debug!("object-manager feed started as {registration}");

        let registrants = Arc::clone(&self.registrants);
        let task = tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let Some(event) = ObjectEvent::from_signal(signal) else {
                    continue;
                };
                dispatch(&registrants, &event).await;
            }
            debug!("object-manager feed ended");
        });

        Ok(Feed { registration, task })
    }
}

async fn dispatch(registrants: &Registrants, event: &ObjectEvent) {
    let mut sinks: Vec<_> = registrants
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(id, sink)| (*id, sink.clone()))
        .collect();
    sinks.sort_unstable_by_key(|(id, _)| *id);

    trace!(path = %event.path().as_str(), registrants = sinks.len(), "dispatching object event");
    for (id, mut sink) in sinks {
        let copy = match event.try_clone() {
            Ok(copy) => copy,
            Err(e) => {
                warn!("Cannot copy object event: {e}");
                return;
            }
        };

        if !sink.send(copy).await {
            registrants
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            debug!("object-manager registrant {id} went away");
        }
    }
}

impl Drop for ObjectManagerHub {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.task.abort();
            self.transport.unsubscribe(feed.registration);
        }
    }
}

/// One registrant's view of the object-manager feed.
#[derive(Debug, Clone)]
pub struct ObjectRegistration {
    channel: EventChannel<ObjectEvent>,
}

impl ObjectRegistration {
    /// Identity of the registration within its hub.
    pub fn id(&self) -> u64 {
        self.channel.id()
    }

    /// Waits for the next event. Returns `None` once unregistered.
    pub async fn recv(&self) -> Option<ObjectEvent> {
        self.channel.recv().await
    }

    /// Takes a pending event without waiting. Returns `None` while another
    /// task is parked in [`recv`](Self::recv).
    pub fn try_recv(&self) -> Option<ObjectEvent> {
        self.channel.try_recv()
    }

    /// Whether the registration still receives events.
    pub fn is_active(&self) -> bool {
        !self.channel.is_cancelled()
    }

    /// Events as a stream, ending when unregistered.
    pub fn stream(&self) -> impl Stream<Item = ObjectEvent> + Send + use<> {
        let channel = self.channel.clone();
        stream! {
            while let Some(event) = channel.recv().await {
                yield event;
            }
        }
    }
}
