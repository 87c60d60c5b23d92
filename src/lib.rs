// Reconnecting STOMP client wrapper
pub mod client;

// Mount-scoped session state
pub mod session;

// Live data topic contract and publisher
pub mod live_data;

// Text rendering of session state and live data
pub mod view;

// Configuration loading
pub mod config;

// In-process broker simulation
pub mod memory;
