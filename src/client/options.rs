use super::transport::TransportSettings;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default STOMP endpoint of the backend
pub const DEFAULT_BROKER_URL: &str = "ws://localhost:8080/ws";

/// Broker connection configuration
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_incoming_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_outgoing_ms: u64,
}

fn default_broker_url() -> String {
    std::env::var("STOMP_BROKER_URL").unwrap_or_else(|_| DEFAULT_BROKER_URL.to_string())
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_heartbeat_ms() -> u64 {
    10000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_incoming_ms: default_heartbeat_ms(),
            heartbeat_outgoing_ms: default_heartbeat_ms(),
        }
    }
}

impl ClientConfig {
    /// Config for a specific broker URL, other settings default
    pub fn with_broker_url(broker_url: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            ..Self::default()
        }
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            broker_url: self.broker_url.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            heartbeat_incoming: Duration::from_millis(self.heartbeat_incoming_ms),
            heartbeat_outgoing: Duration::from_millis(self.heartbeat_outgoing_ms),
        }
    }
}

pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Configuration plus optional lifecycle callbacks
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub config: ClientConfig,
    pub on_connect: Option<ConnectCallback>,
    pub on_error: Option<ErrorCallback>,
    pub on_disconnect: Option<DisconnectCallback>,
}

impl ClientOptions {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn on_connect(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_disconnect(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("config", &self.config)
            .field("on_connect", &self.on_connect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}
