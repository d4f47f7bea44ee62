use thiserror::Error;

use edutrack_core::Mutation;

use crate::EventEnvelope;

/// Failure to turn an envelope into mutations.
///
/// Planning is deterministic, so a planning error never goes away on retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The envelope lacks data the handler needs (wrong kind, missing snapshot, ...).
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

impl HandlerError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Turns a lifecycle envelope into derived mutations (propagation handler abstraction).
///
/// Handlers are **pure**: no IO, no clock, no randomness beyond what the
/// envelope carries. The dispatcher owns execution (applying the mutations,
/// retrying, timing out), which keeps every handler trivially testable.
///
/// Because delivery is at-least-once, the plan for an envelope must be safe to
/// apply more than once. Derived records that map 1:1 to the event should be
/// keyed with [`EventEnvelope::derived_record_id`], or written with a mode that
/// is naturally idempotent.
pub trait PropagationHandler: Send + Sync {
    /// Stable handler name for logs.
    fn name(&self) -> &'static str;

    /// Compute the ordered mutation list for `envelope`.
    ///
    /// An empty list means "nothing to do" and is a successful outcome.
    fn plan(&self, envelope: &EventEnvelope) -> Result<Vec<Mutation>, HandlerError>;
}
