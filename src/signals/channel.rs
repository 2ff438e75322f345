use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{Mutex, mpsc, watch};

static NEXT_CHANNEL: AtomicU64 = AtomicU64::new(1);

/// Bounded event channel with a cancellation token.
///
/// Clones share the same queue. Cancelling is the sentinel: once
/// [`cancel`](Self::cancel) has been called, [`recv`](Self::recv) returns
/// `None` even if events are still queued, and senders obtained through
/// [`sink`](Self::sink) stop delivering.
pub struct EventChannel<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    id: u64,
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    cancel: watch::Sender<bool>,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl<T> EventChannel<T> {
    /// Creates a channel buffering up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (cancel, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                id: NEXT_CHANNEL.fetch_add(1, Ordering::Relaxed),
                tx,
                rx: Mutex::new(rx),
                cancel,
            }),
        }
    }

    /// Process-unique identity of the channel.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Raw sender, for producers that do not observe cancellation.
    pub fn sender(&self) -> mpsc::Sender<T> {
        self.inner.tx.clone()
    }

    /// Sender that stops delivering once the channel is cancelled.
    pub fn sink(&self) -> EventSink<T> {
        EventSink {
            tx: self.inner.tx.clone(),
            cancel: self.inner.cancel.subscribe(),
        }
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the channel is cancelled. Cancellation wins over
    /// queued events.
    pub async fn recv(&self) -> Option<T> {
        let mut cancelled = self.inner.cancel.subscribe();
        if *cancelled.borrow_and_update() {
            return None;
        }

        let mut rx = self.inner.rx.lock().await;
        tokio::select! {
            biased;
            _ = cancelled.wait_for(|cancelled| *cancelled) => None,
            event = rx.recv() => event,
        }
    }

    /// Takes a queued event without waiting.
    ///
    /// Returns `None` while another task is parked in [`recv`](Self::recv)
    /// on the same channel, even if events are queued; that task receives
    /// them instead.
    pub fn try_recv(&self) -> Option<T> {
        if self.is_cancelled() {
            return None;
        }
        self.inner.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Sends the cancellation sentinel. Returns `false` if the channel was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.cancel.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Whether the sentinel has been sent.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel.borrow()
    }

    /// Resolves once the channel is cancelled.
    pub async fn cancelled(&self) {
        let mut cancelled = self.inner.cancel.subscribe();
        let _ = cancelled.wait_for(|cancelled| *cancelled).await;
    }

    /// Whether both handles refer to the same channel.
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Producer half of an [`EventChannel`] that honours its cancellation.
pub struct EventSink<T> {
    tx: mpsc::Sender<T>,
    cancel: watch::Receiver<bool>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> EventSink<T> {
    /// Delivers an event, waiting for room in the queue.
    ///
    /// Returns `false` without delivering if the channel is cancelled before
    /// or while waiting.
    pub async fn send(&mut self, event: T) -> bool {
        if *self.cancel.borrow_and_update() {
            return false;
        }

        tokio::select! {
            biased;
            _ = self.cancel.wait_for(|cancelled| *cancelled) => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Whether the channel no longer accepts events.
    pub fn is_closed(&self) -> bool {
        *self.cancel.borrow() || self.tx.is_closed()
    }
}
