//! Propagation handlers for the watched collections.
//!
//! | binding            | handler                 |
//! |--------------------|-------------------------|
//! | `users:created`    | [`UserCreatedHandler`]  |
//! | `courses:updated`  | [`CourseUpdatedHandler`]|
//! | `users:deleted`    | [`UserDeletedHandler`]  |

pub mod course_updated;
pub mod user_created;
pub mod user_deleted;

pub use course_updated::{CourseUpdatedHandler, changed_fields};
pub use user_created::UserCreatedHandler;
pub use user_deleted::UserDeletedHandler;

use edutrack_core::collections;
use edutrack_events::{EventKind, HandlerRegistry, RegistryError};

/// Register the standard bindings into `registry`.
pub fn register_defaults(registry: &mut HandlerRegistry) -> Result<(), RegistryError> {
    registry.register(collections::USERS, EventKind::Created, UserCreatedHandler)?;
    registry.register(collections::COURSES, EventKind::Updated, CourseUpdatedHandler)?;
    registry.register(collections::USERS, EventKind::Deleted, UserDeletedHandler)?;
    Ok(())
}

/// A registry holding exactly the standard bindings.
pub fn default_registry() -> Result<HandlerRegistry, RegistryError> {
    let mut registry = HandlerRegistry::new();
    register_defaults(&mut registry)?;
    Ok(registry)
}
