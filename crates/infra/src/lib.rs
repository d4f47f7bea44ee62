//! Infrastructure layer: document store client, propagation handlers,
//! dispatch pipeline and background worker.

pub mod applier;
pub mod cleanup;
pub mod config;
pub mod dispatcher;
pub mod document_store;
pub mod error;
pub mod propagation;
pub mod retry;
pub mod worker;

#[cfg(test)]
mod testing;


pub use applier::{ApplyReport, MutationApplier};
pub use cleanup::{CleanupExecutor, CleanupReport};
pub use config::{ConfigError, PropagationConfig};
pub use dispatcher::{Dispatcher, Outcome};
pub use error::PropagationError;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use worker::{PropagationWorker, WorkerHandle, WorkerStats};
