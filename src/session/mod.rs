//! Mount-scoped binding of a [`StompClient`] to UI state.
//!
//! A [`StompSession`] is created when a view mounts and dropped (or
//! explicitly unmounted) when it goes away. While mounted it owns exactly one
//! client and publishes its connection status as a [`SessionState`] through a
//! `tokio::sync::watch` channel, which render loops can await.
//!
//! ```no_run
//! use stomp_live::client::{ClientConfig, ClientOptions};
//! use stomp_live::live_data::LIVE_DATA_TOPIC;
//! use stomp_live::memory::MemoryBroker;
//! use stomp_live::session::StompSession;
//! use std::sync::Arc;
//!
//! let broker = MemoryBroker::new();
//! let session = StompSession::mount(
//!     ClientOptions::new(ClientConfig::default()),
//!     Arc::new(broker.transport()),
//! );
//!
//! let subscribe = session.subscriber();
//! let sub = subscribe.subscribe(LIVE_DATA_TOPIC, |frame| println!("{}", frame.body));
//!
//! // ... on teardown
//! sub.unsubscribe();
//! session.unmount();
//! ```

use crate::client::{ClientOptions, Frame, StompClient, Subscription, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};

/// Shown when the broker reports an error without any text
pub const GENERIC_ERROR: &str = "Connection error";

/// Connection status exposed to the rendering layer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    pub error: Option<String>,
}

type ClientSlot = Arc<RwLock<Option<StompClient>>>;

/// Stable subscribe function.
///
/// Every clone obtained from the same session is the same function. It
/// delegates to whatever client the session currently holds and hands back a
/// no-op [`Subscription`] when there is none.
#[derive(Clone)]
pub struct Subscriber {
    slot: ClientSlot,
}

impl Subscriber {
    pub fn subscribe<F>(&self, destination: &str, callback: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let client = self
            .slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match client {
            Some(client) => client.subscribe(destination, callback),
            None => {
                debug!(destination = %destination, "No client mounted, subscription ignored");
                Subscription::noop()
            }
        }
    }

    /// True if both come from the same session
    pub fn same_as(&self, other: &Subscriber) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").finish_non_exhaustive()
    }
}

/// Client lifecycle bound to a mount/unmount scope
pub struct StompSession {
    slot: ClientSlot,
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    state_tx: Arc<watch::Sender<SessionState>>,
    /// Bumped on every (re)mount; events from older clients are ignored
    generation: Arc<AtomicU64>,
}

impl StompSession {
    /// Create the client, wire its events to session state and connect
    pub fn mount(options: ClientOptions, transport: Arc<dyn Transport>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());

        let session = Self {
            slot: Arc::new(RwLock::new(None)),
            transport,
            options,
            state_tx: Arc::new(state_tx),
            generation: Arc::new(AtomicU64::new(0)),
        };
        session.attach();
        session
    }

    /// Build and connect a client for the current options
    fn attach(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let client = StompClient::new(self.wired_options(generation), self.transport.as_ref());

        info!(
            broker_url = %client.broker_url(),
            generation = generation,
            "Session mounted"
        );

        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(client.clone());
        client.connect();
    }

    /// Release the held client, disconnecting it
    fn detach(&self) {
        let client = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(client) = client {
            client.disconnect();
            info!(broker_url = %client.broker_url(), "Session unmounted");
        }
    }

    fn wired_options(&self, generation: u64) -> ClientOptions {
        let user = self.options.clone();
        let mut wired = ClientOptions::new(user.config.clone());

        let (tx, current) = (Arc::clone(&self.state_tx), Arc::clone(&self.generation));
        let on_connect = user.on_connect.clone();
        wired = wired.on_connect(move || {
            if current.load(Ordering::Acquire) != generation {
                return;
            }
            tx.send_modify(|state| {
                state.connected = true;
                state.error = None;
            });
            if let Some(callback) = &on_connect {
                callback();
            }
        });

        let (tx, current) = (Arc::clone(&self.state_tx), Arc::clone(&self.generation));
        let on_error = user.on_error.clone();
        wired = wired.on_error(move |message: &str| {
            if current.load(Ordering::Acquire) != generation {
                return;
            }
            let message = if message.is_empty() {
                GENERIC_ERROR
            } else {
                message
            };
            tx.send_modify(|state| state.error = Some(message.to_string()));
            if let Some(callback) = &on_error {
                callback(message);
            }
        });

        let (tx, current) = (Arc::clone(&self.state_tx), Arc::clone(&self.generation));
        let on_disconnect = user.on_disconnect;
        wired.on_disconnect(move || {
            if current.load(Ordering::Acquire) != generation {
                return;
            }
            tx.send_modify(|state| state.connected = false);
            if let Some(callback) = &on_disconnect {
                callback();
            }
        })
    }

    /// Remount against a different broker URL.
    ///
    /// Same URL is a no-op. Otherwise the current client is disconnected,
    /// state resets to its initial value and a new client connects.
    /// Existing [`Subscriber`] clones follow the new client.
    pub fn reconfigure(&mut self, options: ClientOptions) {
        if options.config.broker_url == self.options.config.broker_url {
            return;
        }

        self.detach();
        self.options = options;
        // Invalidate events from the old client before resetting
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.state_tx.send_replace(SessionState::default());
        self.attach();
    }

    /// Disconnect and release the client
    pub fn unmount(self) {
        drop(self);
    }

    /// The stable subscribe function
    pub fn subscriber(&self) -> Subscriber {
        Subscriber {
            slot: Arc::clone(&self.slot),
        }
    }

    pub fn subscribe<F>(&self, destination: &str, callback: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.subscriber().subscribe(destination, callback)
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn connected(&self) -> bool {
        self.state_tx.borrow().connected
    }

    pub fn error(&self) -> Option<String> {
        self.state_tx.borrow().error.clone()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// The currently held client
    pub fn client(&self) -> Option<StompClient> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn broker_url(&self) -> &str {
        &self.options.config.broker_url
    }
}

impl Drop for StompSession {
    fn drop(&mut self) {
        self.detach();
    }
}
