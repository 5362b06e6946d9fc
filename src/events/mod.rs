//! Progress, lifecycle and notification publishing.

pub mod bus;
pub mod emitter;

pub use bus::{BroadcastEventBus, BusMessage, TracingNotifier};
pub use emitter::{Emitter, EventBus, Notifier};
