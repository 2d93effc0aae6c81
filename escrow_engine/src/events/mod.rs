//! Engine events and the hooks that subscribe to them.
//!
//! Outside collaborators (webhook delivery, notifications) register async hooks in [`EventHooks`]. The engine APIs
//! publish through [`EventProducers`] and never wait for a hook to finish.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
