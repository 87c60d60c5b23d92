//! Seam between the client wrapper and the underlying STOMP library.
//!
//! The wrapper never speaks the wire protocol itself. A [`Transport`] opens
//! one [`ProtocolClient`] per wrapper and reports lifecycle events back
//! through a [`ConnectionHandler`]. The transport owns reconnection and
//! heartbeats; the wrapper only reacts to the events it is given.

use super::frame::Frame;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked once per delivered MESSAGE frame
pub type MessageCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Settings handed to the transport when a protocol client is opened
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportSettings {
    pub broker_url: String,
    /// Delay before the transport retries a dropped connection
    pub reconnect_delay: Duration,
    pub heartbeat_incoming: Duration,
    pub heartbeat_outgoing: Duration,
}

/// Receives connection lifecycle events from a protocol client.
///
/// Events for one client arrive in transport order: connect before any
/// message of a session, close after the last one.
pub trait ConnectionHandler: Send + Sync {
    /// Connection established (CONNECTED received)
    fn on_connect(&self);

    /// ERROR frame received
    fn on_stomp_error(&self, frame: &Frame);

    /// Underlying WebSocket closed
    fn on_web_socket_close(&self);
}

/// A live subscription on the underlying client
pub trait ProtocolSubscription: Send {
    fn unsubscribe(&self);
}

/// The underlying auto-reconnecting STOMP client
pub trait ProtocolClient: Send + Sync {
    /// Start connecting (and reconnecting until deactivated)
    fn activate(&self);

    /// Stop reconnecting and close the connection
    fn deactivate(&self);

    /// True while a STOMP session is established
    fn connected(&self) -> bool;

    /// Subscribe on the current session.
    ///
    /// Only meaningful while connected; the subscription does not survive
    /// the session it was created on.
    fn subscribe(&self, destination: &str, callback: MessageCallback)
        -> Box<dyn ProtocolSubscription>;
}

/// Opens protocol clients
pub trait Transport: Send + Sync {
    fn open(
        &self,
        settings: TransportSettings,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Arc<dyn ProtocolClient>;
}
