use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, instrument, trace, warn};

use super::{EventChannel, PropertiesChanged};
use crate::{
    BluezError, Result,
    bus::{RegistrationId, RemoteTarget, SignalEvent, SignalRule, Transport},
    properties::{PropertySet, PropertyStore},
};

/// Change-notification bridge for one remote object.
///
/// Holds at most one raw `PropertiesChanged` subscription and at most one
/// typed watcher fed from it. A second [`watch`](Self::watch) while a watcher
/// is active fails with `BluezError::WatchActive`; stopping the sole watcher
/// also releases the raw subscription.
#[derive(Debug)]
pub struct ChangeBridge {
    transport: Arc<dyn Transport>,
    target: RemoteTarget,
    capacity: usize,
    state: Mutex<BridgeState>,
}

#[derive(Debug, Default)]
struct BridgeState {
    subscription: Option<Subscription>,
    watcher: Option<Watcher>,
}

#[derive(Debug)]
struct Subscription {
    channel: EventChannel<SignalEvent>,
    registration: RegistrationId,
}

#[derive(Debug)]
struct Watcher {
    channel: EventChannel<PropertiesChanged>,
    task: JoinHandle<()>,
}

impl Watcher {
    fn is_live(&self) -> bool {
        !self.channel.is_cancelled() && !self.task.is_finished()
    }
}

impl ChangeBridge {
    /// Creates an idle bridge for `target`.
    pub fn new(transport: Arc<dyn Transport>, target: RemoteTarget, capacity: usize) -> Self {
        Self {
            transport,
            target,
            capacity: capacity.max(1),
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Object the bridge listens on.
    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// Raw change channel of the object, registering it on first use.
    ///
    /// Repeated calls return the same channel until it is cancelled or
    /// [`unsubscribe`](Self::unsubscribe) is called.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the registration is refused; nothing is
    /// left registered in that case.
    pub async fn subscribe(&self) -> Result<EventChannel<SignalEvent>> {
        let mut state = self.state.lock().await;
        self.subscribe_locked(&mut state).await
    }

    async fn subscribe_locked(&self, state: &mut BridgeState) -> Result<EventChannel<SignalEvent>> {
        if let Some(subscription) = &state.subscription {
            if !subscription.channel.is_cancelled() {
                return Ok(subscription.channel.clone());
            }
            self.transport.unsubscribe(subscription.registration);
            state.subscription = None;
        }

        let channel = EventChannel::new(self.capacity);
        let rule = SignalRule::properties(self.target.path().clone());
        let registration = self.transport.subscribe(rule, channel.sender()).await?;
        debug!(target_object = %self.target, "subscribed to property changes as {registration}");

        let transport = Arc::clone(&self.transport);
        let sentinel = channel.clone();
        tokio::spawn(async move {
            sentinel.cancelled().await;
            if transport.unsubscribe(registration) {
                debug!("released property subscription {registration} after cancellation");
            }
        });

        state.subscription = Some(Subscription {
            channel: channel.clone(),
            registration,
        });

        Ok(channel)
    }

    /// Cancels the raw subscription and any watcher fed from it.
    ///
    /// Returns `false` if nothing was subscribed.
    pub async fn unsubscribe(&self) -> bool {
        let mut state = self.state.lock().await;
        Self::teardown(self.transport.as_ref(), &mut state)
    }

    fn teardown(transport: &dyn Transport, state: &mut BridgeState) -> bool {
        if let Some(watcher) = state.watcher.take() {
            watcher.channel.cancel();
        }

        let Some(subscription) = state.subscription.take() else {
            return false;
        };
        subscription.channel.cancel();
        transport.unsubscribe(subscription.registration);
        debug!("released property subscription {}", subscription.registration);

        true
    }

    /// Starts the typed watcher.
    ///
    /// Each raw change for `P::INTERFACE` is applied to `store`, invalidated
    /// properties are re-read from the remote object, and the decoded
    /// notification is published on the returned watch.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::WatchActive` if a watcher is already running, or
    /// the transport error from the raw subscription.
    #[instrument(skip(self, store), fields(object = %self.target), err)]
    pub async fn watch<P: PropertySet>(&self, store: PropertyStore<P>) -> Result<PropertyWatch> {
        let mut state = self.state.lock().await;
        if state.watcher.as_ref().is_some_and(Watcher::is_live) {
            return Err(BluezError::WatchActive {
                path: self.target.path().to_string(),
            });
        }
        state.watcher = None;

        let raw = self.subscribe_locked(&mut state).await?;
        let typed = EventChannel::new(self.capacity);
        let forwarder = Forwarder {
            transport: Arc::clone(&self.transport),
            target: self.target.clone(),
            store,
            raw,
            typed: typed.clone(),
        };

        let task = tokio::spawn(forwarder.run());
        state.watcher = Some(Watcher {
            channel: typed.clone(),
            task,
        });

        Ok(PropertyWatch::new(typed))
    }

    /// Stops the typed watcher and releases the raw subscription feeding it.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::UnknownWatch` if `watch` is not this bridge's
    /// active watcher.
    pub async fn unwatch(&self, watch: PropertyWatch) -> Result<()> {
        let mut state = self.state.lock().await;

        let Some(watcher) = state
            .watcher
            .take_if(|watcher| watcher.channel.same_channel(&watch.channel))
        else {
            return Err(BluezError::UnknownWatch {
                path: self.target.path().to_string(),
            });
        };

        watcher.channel.cancel();
        if let Err(e) = watcher.task.await {
            warn!("Property forwarder for {} ended abnormally: {e}", self.target);
        }
        Self::teardown(self.transport.as_ref(), &mut state);

        Ok(())
    }

    /// Whether a typed watcher is running.
    pub async fn is_watching(&self) -> bool {
        self.state
            .lock()
            .await
            .watcher
            .as_ref()
            .is_some_and(Watcher::is_live)
    }

    /// Publishes a locally produced notification to the active watcher.
    ///
    /// Returns `false` if no watcher is running.
    pub async fn publish(&self, change: PropertiesChanged) -> bool {
        let mut sink = {
            let state = self.state.lock().await;
            match &state.watcher {
                Some(watcher) if watcher.is_live() => watcher.channel.sink(),
                _ => return false,
            }
        };

        sink.send(change).await
    }
}

impl Drop for ChangeBridge {
    fn drop(&mut self) {
        Self::teardown(self.transport.as_ref(), self.state.get_mut());
    }
}

struct Forwarder<P: PropertySet> {
    transport: Arc<dyn Transport>,
    target: RemoteTarget,
    store: PropertyStore<P>,
    raw: EventChannel<SignalEvent>,
    typed: EventChannel<PropertiesChanged>,
}

impl<P: PropertySet> Forwarder<P> {
    async fn run(self) {
        let mut sink = self.typed.sink();

        loop {
            let event = tokio::select! {
                biased;
                () = self.typed.cancelled() => break,
                event = self.raw.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let SignalEvent::PropertiesChanged {
                path,
                interface,
                changed,
                invalidated,
            } = event
            else {
                continue;
            };

            if interface != P::INTERFACE {
                trace!(%interface, "ignoring change of another interface");
                continue;
            }

            let applied = self.store.apply_changes(&changed);
            trace!(?applied, invalidated = invalidated.len(), "applied property change");

            for name in &invalidated {
                if let Err(e) = self
                    .store
                    .fetch(self.transport.as_ref(), &self.target, name)
                    .await
                {
                    warn!("Failed to refresh invalidated property {name}: {e}");
                }
            }

            let change = PropertiesChanged {
                path,
                interface,
                changed,
                invalidated,
            };
            if !sink.send(change).await {
                break;
            }
        }

        self.typed.cancel();
        debug!(target_object = %self.target, "property forwarder stopped");
    }
}

/// Consumer side of a typed property watch.
///
/// Clones and streams share one consumer. Once the last of them is dropped
/// the watch is cancelled, the forwarder stops and the object can be watched
/// again.
#[derive(Debug, Clone)]
pub struct PropertyWatch {
    channel: EventChannel<PropertiesChanged>,
    _consumer: Arc<ConsumerGuard>,
}

#[derive(Debug)]
struct ConsumerGuard(EventChannel<PropertiesChanged>);

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        if self.0.cancel() {
            debug!("property watch dropped without unwatch");
        }
    }
}

impl PropertyWatch {
    fn new(channel: EventChannel<PropertiesChanged>) -> Self {
        Self {
            _consumer: Arc::new(ConsumerGuard(channel.clone())),
            channel,
        }
    }

    /// Waits for the next notification. Returns `None` once the watch has
    /// been stopped.
    pub async fn recv(&self) -> Option<PropertiesChanged> {
        self.channel.recv().await
    }

    /// Takes a pending notification without waiting. Returns `None` while
    /// another task is parked in [`recv`](Self::recv).
    pub fn try_recv(&self) -> Option<PropertiesChanged> {
        self.channel.try_recv()
    }

    /// Whether the watch still delivers notifications.
    pub fn is_active(&self) -> bool {
        !self.channel.is_cancelled()
    }

    /// Notifications as a stream, ending when the watch stops.
    pub fn stream(&self) -> impl Stream<Item = PropertiesChanged> + Send + use<> {
        let watch = self.clone();
        stream! {
            while let Some(change) = watch.recv().await {
                yield change;
            }
        }
    }
}
