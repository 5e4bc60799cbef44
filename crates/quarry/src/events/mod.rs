//! Typed publish/subscribe events for the excavation loop.

mod bus;
mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::QuarryEvent;
