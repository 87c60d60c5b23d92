// In-process broker simulation (tests and the demo binary)

mod broker;

pub use broker::{Delivery, MemoryBroker, MemoryTransport};
