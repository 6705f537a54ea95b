//! Stock events and their in-process distribution.
//!
//! The ledger publishes committed facts through these abstractions; consumers
//! such as low-stock notifiers live outside the ledger core.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
