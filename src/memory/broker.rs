use crate::client::{
    ConnectionHandler, Frame, MessageCallback, ProtocolClient, ProtocolSubscription, Transport,
    TransportSettings,
};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// In-process STOMP broker simulation.
///
/// Protocol clients opened through [`MemoryBroker::transport`] follow the
/// lifecycle of a real auto-reconnecting client: `activate()` only starts
/// connecting, the connect event arrives later, subscriptions die with the
/// session, and a dropped connection is retried after `reconnect_delay`.
///
/// In manual mode (the default) nothing happens until the owner calls
/// [`accept_all`](Self::accept_all), [`drop_all`](Self::drop_all) and friends.
/// In auto-accept mode connections are accepted on the tokio runtime.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    connections: DashMap<u64, Arc<Connection>>,
    next_connection_id: AtomicU64,
    auto_accept: bool,
    last_settings: Mutex<Option<TransportSettings>>,
}

struct Connection {
    id: u64,
    settings: TransportSettings,
    handler: Arc<dyn ConnectionHandler>,
    state: Mutex<ConnectionState>,
    auto_accept: bool,
}

#[derive(Default)]
struct ConnectionState {
    active: bool,
    connected: bool,
    /// Incremented for every established session
    session: u64,
    /// subscription id -> (destination, callback)
    subscriptions: HashMap<String, (String, MessageCallback)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBroker {
    /// Broker driven entirely by explicit calls
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker that accepts connections on its own (requires a tokio runtime)
    pub fn auto_accept() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                auto_accept: true,
                ..BrokerInner::default()
            }),
        }
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
        }
    }

    fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Establish every activated connection that is not yet connected.
    ///
    /// Returns the number of connect events emitted.
    pub fn accept_all(&self) -> usize {
        self.connections()
            .iter()
            .filter(|connection| connection.establish())
            .count()
    }

    /// Close the transport of every connected client.
    ///
    /// Returns the number of close events emitted.
    pub fn drop_all(&self) -> usize {
        self.connections()
            .iter()
            .filter(|connection| connection.drop_transport())
            .count()
    }

    /// Send an ERROR frame carrying a `message` header to every connected client
    pub fn send_error(&self, message: &str) -> usize {
        let mut headers = BTreeMap::new();
        headers.insert("message".to_string(), message.to_string());
        self.send_error_frame(&Frame::error(headers, ""))
    }

    pub fn send_error_frame(&self, frame: &Frame) -> usize {
        let mut sent = 0;
        for connection in self.connections() {
            if connection.is_connected() {
                connection.handler.on_stomp_error(frame);
                sent += 1;
            }
        }
        sent
    }

    /// Capture the current recipients of a message without delivering it.
    ///
    /// Models a frame already in flight: the returned [`Delivery`] reaches
    /// its recipients even if they unsubscribe before it is dispatched.
    pub fn prepare(&self, destination: &str, body: &str) -> Delivery {
        let mut recipients = Vec::new();
        for connection in self.connections() {
            let state = lock(&connection.state);
            if !state.connected {
                continue;
            }
            for (id, (subscribed, callback)) in &state.subscriptions {
                if subscribed == destination {
                    let frame = Frame::message(destination, body)
                        .with_header("subscription", id.clone())
                        .with_header("message-id", Uuid::now_v7().to_string());
                    recipients.push((frame, Arc::clone(callback)));
                }
            }
        }
        Delivery { recipients }
    }

    /// Deliver a MESSAGE to every live subscription on `destination`.
    ///
    /// Destinations match exactly. Returns the number of deliveries.
    pub fn publish(&self, destination: &str, body: &str) -> usize {
        let delivered = self.prepare(destination, body).dispatch();
        debug!(destination = %destination, delivered = delivered, "Published message");
        delivered
    }

    /// Live subscriptions on `destination` across all connected clients
    pub fn subscription_count(&self, destination: &str) -> usize {
        self.connections()
            .iter()
            .map(|connection| {
                let state = lock(&connection.state);
                state
                    .subscriptions
                    .values()
                    .filter(|(subscribed, _)| subscribed == destination)
                    .count()
            })
            .sum()
    }

    /// Protocol clients opened and not yet dropped
    pub fn client_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn connected_count(&self) -> usize {
        self.connections()
            .iter()
            .filter(|connection| connection.is_connected())
            .count()
    }

    /// Settings of the most recently opened client
    pub fn last_settings(&self) -> Option<TransportSettings> {
        lock(&self.inner.last_settings).clone()
    }
}

/// Messages captured by [`MemoryBroker::prepare`]
pub struct Delivery {
    recipients: Vec<(Frame, MessageCallback)>,
}

impl Delivery {
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Invoke every captured callback. Returns the number invoked.
    pub fn dispatch(self) -> usize {
        let count = self.recipients.len();
        for (frame, callback) in self.recipients {
            callback(&frame);
        }
        count
    }
}

impl Connection {
    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    /// Start a session if active and not connected; emits the connect event
    fn establish(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if !state.active || state.connected {
                return false;
            }
            state.connected = true;
            state.session += 1;
            debug!(connection = self.id, session = state.session, "Session established");
        }

        self.handler.on_connect();
        true
    }

    /// End the current session; emits the close event
    fn drop_transport(self: &Arc<Self>) -> bool {
        let reconnect = {
            let mut state = lock(&self.state);
            if !state.connected {
                return false;
            }
            state.connected = false;
            state.subscriptions.clear();
            state.active
        };

        self.handler.on_web_socket_close();

        if reconnect && self.auto_accept {
            schedule_accept(self, self.settings.reconnect_delay);
        }
        true
    }
}

fn schedule_accept(connection: &Arc<Connection>, delay: Duration) {
    let Ok(runtime) = Handle::try_current() else {
        warn!(connection = connection.id, "No tokio runtime, connection left pending");
        return;
    };

    let connection = Arc::clone(connection);
    runtime.spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        connection.establish();
    });
}

/// [`Transport`] backed by a [`MemoryBroker`]
#[derive(Clone)]
pub struct MemoryTransport {
    broker: MemoryBroker,
}

impl Transport for MemoryTransport {
    fn open(
        &self,
        settings: TransportSettings,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Arc<dyn ProtocolClient> {
        let inner = &self.broker.inner;
        let id = inner.next_connection_id.fetch_add(1, Ordering::Relaxed);

        info!(
            connection = id,
            broker_url = %settings.broker_url,
            reconnect_delay_ms = settings.reconnect_delay.as_millis() as u64,
            "Opening in-memory STOMP client"
        );

        *lock(&inner.last_settings) = Some(settings.clone());

        let connection = Arc::new(Connection {
            id,
            settings,
            handler,
            state: Mutex::new(ConnectionState::default()),
            auto_accept: inner.auto_accept,
        });
        inner.connections.insert(id, Arc::clone(&connection));

        Arc::new(MemoryClient {
            connection,
            broker: Arc::downgrade(inner),
        })
    }
}

/// Protocol client handed to the wrapper
struct MemoryClient {
    connection: Arc<Connection>,
    broker: Weak<BrokerInner>,
}

impl ProtocolClient for MemoryClient {
    fn activate(&self) {
        {
            let mut state = lock(&self.connection.state);
            if state.active {
                return;
            }
            state.active = true;
        }

        if self.connection.auto_accept {
            schedule_accept(&self.connection, Duration::ZERO);
        }
    }

    fn deactivate(&self) {
        let was_connected = {
            let mut state = lock(&self.connection.state);
            state.active = false;
            let was_connected = state.connected;
            state.connected = false;
            state.subscriptions.clear();
            was_connected
        };

        if was_connected {
            self.connection.handler.on_web_socket_close();
        }
    }

    fn connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn subscribe(
        &self,
        destination: &str,
        callback: MessageCallback,
    ) -> Box<dyn ProtocolSubscription> {
        let id = format!("sub-{}", Uuid::now_v7());
        let session = {
            let mut state = lock(&self.connection.state);
            if state.connected {
                state
                    .subscriptions
                    .insert(id.clone(), (destination.to_string(), callback));
            } else {
                warn!(destination = %destination, "Subscribe without a session, ignored");
            }
            state.session
        };

        Box::new(MemorySubscription {
            connection: Arc::downgrade(&self.connection),
            id,
            session,
        })
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.connections.remove(&self.connection.id);
        }
    }
}

struct MemorySubscription {
    connection: Weak<Connection>,
    id: String,
    session: u64,
}

impl ProtocolSubscription for MemorySubscription {
    fn unsubscribe(&self) {
        let Some(connection) = self.connection.upgrade() else {
            return;
        };

        let mut state = lock(&connection.state);
        // A handle from an earlier session has nothing left to remove
        if state.session == self.session {
            state.subscriptions.remove(&self.id);
        }
    }
}
