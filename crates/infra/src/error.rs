//! Failure classification for propagation.

use thiserror::Error;

use edutrack_events::HandlerError;

use crate::document_store::StoreError;

/// Error raised while propagating one envelope.
///
/// The dispatcher retries only `TransientStore`. Everything else is terminal
/// for this delivery and is logged as a failed event.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropagationError {
    /// Network/contention failure; may succeed on retry.
    #[error("transient store error: {0}")]
    TransientStore(StoreError),

    /// Logic bug, malformed envelope, or a store error retrying cannot fix.
    #[error("permanent handler error: {0}")]
    PermanentHandler(String),
}

impl PropagationError {
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::PermanentHandler(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PropagationError::TransientStore(_))
    }
}

impl From<StoreError> for PropagationError {
    fn from(value: StoreError) -> Self {
        if value.is_transient() {
            PropagationError::TransientStore(value)
        } else {
            PropagationError::PermanentHandler(value.to_string())
        }
    }
}

impl From<HandlerError> for PropagationError {
    fn from(value: HandlerError) -> Self {
        PropagationError::PermanentHandler(value.to_string())
    }
}
