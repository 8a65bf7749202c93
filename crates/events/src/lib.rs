//! `accord-events` — event mechanics (trait, bus, handlers).
//!
//! Domain event *types* live next to the aggregates that emit them; this
//! crate only provides the plumbing for describing and distributing them.

pub mod bus;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use handler::{EventHandler, execute};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
