//! Binding table: (collection, kind) → handler.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::{EventKind, PropagationHandler};

/// A watched (collection, event kind) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Binding {
    pub collection: String,
    pub kind: EventKind,
}

impl Binding {
    pub fn new(collection: impl Into<String>, kind: EventKind) -> Self {
        Self {
            collection: collection.into(),
            kind,
        }
    }
}

impl core::fmt::Display for Binding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.collection, self.kind)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("binding {binding} already has handler '{existing}'")]
    DuplicateBinding {
        binding: Binding,
        existing: &'static str,
    },
}

/// Registry of propagation handlers.
///
/// Exactly one handler per binding: a second registration for the same pair is
/// rejected, so dispatch is never ambiguous. The registry is built once at
/// startup and then shared read-only (`Arc<HandlerRegistry>`).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Binding, Arc<dyn PropagationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(
        &mut self,
        collection: impl Into<String>,
        kind: EventKind,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: PropagationHandler + 'static,
    {
        let binding = Binding::new(collection, kind);
        if let Some(existing) = self.handlers.get(&binding) {
            return Err(RegistryError::DuplicateBinding {
                binding,
                existing: existing.name(),
            });
        }
        self.handlers.insert(binding, Arc::new(handler));
        Ok(())
    }

    /// Handler bound to (collection, kind), if any.
    pub fn resolve(&self, collection: &str, kind: EventKind) -> Option<Arc<dyn PropagationHandler>> {
        self.handlers
            .get(&Binding::new(collection, kind))
            .cloned()
    }

    /// All registered bindings, sorted.
    pub fn bindings(&self) -> Vec<Binding> {
        let mut out: Vec<Binding> = self.handlers.keys().cloned().collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl core::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map()
            .entries(
                self.bindings()
                    .into_iter()
                    .filter_map(|b| self.handlers.get(&b).map(|h| (b.to_string(), h.name()))),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventEnvelope, HandlerError};
    use edutrack_core::Mutation;

    struct Noop(&'static str);

    impl PropagationHandler for Noop {
        fn name(&self) -> &'static str {
            self.0
        }

        fn plan(&self, _envelope: &EventEnvelope) -> Result<Vec<Mutation>, HandlerError> {
            Ok(vec![])
        }
    }

    #[test]
    fn resolves_registered_binding_only() {
        let mut registry = HandlerRegistry::new();
        registry.register("users", EventKind::Created, Noop("a")).unwrap();

        assert_eq!(registry.resolve("users", EventKind::Created).unwrap().name(), "a");
        assert!(registry.resolve("users", EventKind::Updated).is_none());
        assert!(registry.resolve("courses", EventKind::Created).is_none());
    }

    #[test]
    fn rejects_second_handler_for_same_binding() {
        let mut registry = HandlerRegistry::new();
        registry.register("users", EventKind::Deleted, Noop("first")).unwrap();

        let err = registry
            .register("users", EventKind::Deleted, Noop("second"))
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::DuplicateBinding {
                binding: Binding::new("users", EventKind::Deleted),
                existing: "first",
            }
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("users", EventKind::Deleted).unwrap().name(), "first");
    }
}
