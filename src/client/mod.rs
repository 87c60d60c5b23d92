// STOMP broker client wrapper

mod frame;
mod options;
mod stomp_client;
mod subscription;
pub mod transport;

pub use frame::{Command, Frame};
pub use options::{
    ClientConfig, ClientOptions, ConnectCallback, DisconnectCallback, ErrorCallback,
    DEFAULT_BROKER_URL,
};
pub use stomp_client::StompClient;
pub use subscription::Subscription;
pub use transport::{
    ConnectionHandler, MessageCallback, ProtocolClient, ProtocolSubscription, Transport,
    TransportSettings,
};

#[cfg(test)]
mod tests;
