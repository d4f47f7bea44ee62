//! Lifecycle events and the propagation handler contract.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod registry;

pub use bus::{EventBus, Subscription};
pub use envelope::{DeliveryAttempt, EnvelopeError, EventEnvelope};
pub use event::EventKind;
pub use handler::{HandlerError, PropagationHandler};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use registry::{Binding, HandlerRegistry, RegistryError};
