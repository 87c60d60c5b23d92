use super::frame::Frame;
use super::stomp_client::ClientInner;
use super::transport::{MessageCallback, ProtocolClient, ProtocolSubscription};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Logical subscription tracked by the client.
///
/// Survives reconnects; only the live handle is tied to a session.
pub(crate) struct SubscriptionEntry {
    pub(crate) id: u64,
    pub(crate) destination: String,
    callback: MessageCallback,
    /// Cleared on unsubscribe/disconnect; gates every delivery
    open: AtomicBool,
    live: Mutex<Option<Box<dyn ProtocolSubscription>>>,
}

impl SubscriptionEntry {
    pub(crate) fn new(id: u64, destination: String, callback: MessageCallback) -> Self {
        Self {
            id,
            destination,
            callback,
            open: AtomicBool::new(true),
            live: Mutex::new(None),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn is_live(&self) -> bool {
        lock(&self.live).is_some()
    }

    /// Create the live subscription unless one already exists.
    ///
    /// `is_current` is checked after subscribing; a handle created on a
    /// session that has since closed is discarded so replay picks the entry
    /// up again on the next connect.
    pub(crate) fn materialize(
        self: &Arc<Self>,
        protocol: &dyn ProtocolClient,
        is_current: impl Fn() -> bool,
    ) -> bool {
        let mut live = lock(&self.live);
        if live.is_some() || !self.is_open() {
            return false;
        }

        let entry = Arc::downgrade(self);
        let callback: MessageCallback = Arc::new(move |frame: &Frame| {
            if let Some(entry) = entry.upgrade() {
                entry.deliver(frame);
            }
        });

        let handle = protocol.subscribe(&self.destination, callback);
        if !is_current() {
            debug!(destination = %self.destination, id = self.id, "Session ended while subscribing");
            return false;
        }

        *live = Some(handle);
        debug!(destination = %self.destination, id = self.id, "Subscription materialized");
        true
    }

    fn deliver(&self, frame: &Frame) {
        if self.is_open() {
            (self.callback)(frame);
        }
    }

    /// Forget the live handle after the session it belonged to ended
    pub(crate) fn detach(&self) {
        lock(&self.live).take();
    }

    /// Stop deliveries for good and release the live handle
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
        if let Some(live) = lock(&self.live).take() {
            live.unsubscribe();
        }
    }
}

/// Handle returned by [`StompClient::subscribe`](super::StompClient::subscribe).
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    entry: Option<Arc<SubscriptionEntry>>,
    client: Weak<ClientInner>,
}

impl Subscription {
    pub(crate) fn new(entry: Arc<SubscriptionEntry>, client: Weak<ClientInner>) -> Self {
        Self {
            entry: Some(entry),
            client,
        }
    }

    /// Handle that is not attached to any client; `unsubscribe` does nothing
    pub fn noop() -> Self {
        Self {
            entry: None,
            client: Weak::new(),
        }
    }

    /// Remove this subscription only. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let Some(entry) = &self.entry else {
            return;
        };

        entry.close();
        if let Some(client) = self.client.upgrade() {
            client.remove_subscription(entry.id);
        }
    }

    pub fn destination(&self) -> Option<&str> {
        self.entry.as_ref().map(|entry| entry.destination.as_str())
    }

    /// False once unsubscribed, after disconnect, or for a no-op handle
    pub fn is_active(&self) -> bool {
        self.entry.as_ref().is_some_and(|entry| entry.is_open())
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("destination", &self.destination())
            .field("active", &self.is_active())
            .finish()
    }
}
