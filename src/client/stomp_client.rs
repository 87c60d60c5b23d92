use super::frame::Frame;
use super::options::{ClientOptions, ConnectCallback, DisconnectCallback, ErrorCallback};
use super::subscription::{lock, Subscription, SubscriptionEntry};
use super::transport::{ConnectionHandler, MessageCallback, ProtocolClient, Transport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info, warn};

/// Reconnecting STOMP client wrapper.
///
/// Owns exactly one underlying protocol client. Subscriptions may be declared
/// before or after the connection comes up; every one of them is live once
/// connected, and they are replayed after each automatic reconnect.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct StompClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    broker_url: String,
    protocol: Arc<dyn ProtocolClient>,
    /// Set between `connect()` and `disconnect()`
    active: AtomicBool,
    subscriptions: Mutex<Vec<Arc<SubscriptionEntry>>>,
    next_subscription_id: AtomicU64,
    /// Bumped on every transport close
    session: AtomicU64,
    on_connect: Option<ConnectCallback>,
    on_error: Option<ErrorCallback>,
    on_disconnect: Option<DisconnectCallback>,
}

/// Lifecycle events from the protocol client
struct Events {
    client: Weak<ClientInner>,
}

impl StompClient {
    /// Create the client and its underlying protocol client (not yet connected)
    pub fn new(options: ClientOptions, transport: &dyn Transport) -> Self {
        let ClientOptions {
            config,
            on_connect,
            on_error,
            on_disconnect,
        } = options;

        let inner = Arc::new_cyclic(|client: &Weak<ClientInner>| {
            let events = Arc::new(Events {
                client: client.clone(),
            });
            let protocol = transport.open(config.transport_settings(), events);

            ClientInner {
                broker_url: config.broker_url.clone(),
                protocol,
                active: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
                next_subscription_id: AtomicU64::new(1),
                session: AtomicU64::new(0),
                on_connect,
                on_error,
                on_disconnect,
            }
        });

        Self { inner }
    }

    /// Start connecting. No-op while already active.
    pub fn connect(&self) {
        if self.inner.active.swap(true, Ordering::AcqRel) {
            debug!(broker_url = %self.inner.broker_url, "Already connecting or connected");
            return;
        }

        info!(broker_url = %self.inner.broker_url, "Connecting to STOMP broker");
        self.inner.protocol.activate();
    }

    /// Drop every subscription and close the connection. No-op when not active.
    ///
    /// No subscription callback fires after this returns.
    pub fn disconnect(&self) {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let subscriptions = std::mem::take(&mut *lock(&self.inner.subscriptions));
        for entry in &subscriptions {
            entry.close();
        }

        info!(
            broker_url = %self.inner.broker_url,
            dropped_subscriptions = subscriptions.len(),
            "Disconnecting from STOMP broker"
        );
        self.inner.protocol.deactivate();
    }

    /// Subscribe to a destination (e.g. `/topic/live-data`).
    ///
    /// Registered immediately. Goes live now if connected, otherwise on the
    /// next connect.
    pub fn subscribe<F>(&self, destination: &str, callback: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let callback: MessageCallback = Arc::new(callback);
        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(SubscriptionEntry::new(id, destination.to_string(), callback));

        lock(&self.inner.subscriptions).push(Arc::clone(&entry));
        debug!(destination = %destination, id = id, "Subscription registered");

        if self.inner.protocol.connected() {
            self.inner.apply_subscriptions();
        }

        Subscription::new(entry, Arc::downgrade(&self.inner))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.protocol.connected()
    }

    pub fn broker_url(&self) -> &str {
        &self.inner.broker_url
    }

    /// Number of logical subscriptions currently tracked
    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.subscriptions).len()
    }
}

impl std::fmt::Debug for StompClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StompClient")
            .field("broker_url", &self.inner.broker_url)
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl ClientInner {
    /// Materialize every tracked subscription lacking a live handle
    fn apply_subscriptions(&self) {
        let session = self.session.load(Ordering::Acquire);
        if !self.protocol.connected() {
            return;
        }

        // Never call into the protocol client with the collection locked
        let pending: Vec<Arc<SubscriptionEntry>> = lock(&self.subscriptions)
            .iter()
            .filter(|entry| !entry.is_live())
            .cloned()
            .collect();

        let mut applied = 0;
        for entry in &pending {
            let is_current = || {
                self.session.load(Ordering::Acquire) == session && self.protocol.connected()
            };
            if entry.materialize(self.protocol.as_ref(), is_current) {
                applied += 1;
            }
        }

        if applied > 0 {
            debug!(applied = applied, "Applied subscriptions");
        }
    }

    pub(crate) fn remove_subscription(&self, id: u64) {
        lock(&self.subscriptions).retain(|entry| entry.id != id);
    }

    fn handle_connect(&self) {
        info!(broker_url = %self.broker_url, "Connected to STOMP broker");
        self.apply_subscriptions();

        if let Some(on_connect) = &self.on_connect {
            on_connect();
        }
    }

    fn handle_error(&self, frame: &Frame) {
        let message = frame.error_message();
        warn!(broker_url = %self.broker_url, error = %message, "STOMP error");

        if let Some(on_error) = &self.on_error {
            on_error(message.as_str());
        }
    }

    fn handle_close(&self) {
        self.session.fetch_add(1, Ordering::AcqRel);

        let subscriptions: Vec<Arc<SubscriptionEntry>> =
            lock(&self.subscriptions).iter().cloned().collect();
        for entry in &subscriptions {
            entry.detach();
        }

        info!(broker_url = %self.broker_url, "STOMP connection closed");

        if let Some(on_disconnect) = &self.on_disconnect {
            on_disconnect();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if *self.active.get_mut() {
            let subscriptions = self
                .subscriptions
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner);
            for entry in subscriptions.drain(..) {
                entry.close();
            }
            self.protocol.deactivate();
        }
    }
}

impl ConnectionHandler for Events {
    fn on_connect(&self) {
        if let Some(client) = self.client.upgrade() {
            client.handle_connect();
        }
    }

    fn on_stomp_error(&self, frame: &Frame) {
        if let Some(client) = self.client.upgrade() {
            client.handle_error(frame);
        }
    }

    fn on_web_socket_close(&self) {
        if let Some(client) = self.client.upgrade() {
            client.handle_close();
        }
    }
}
