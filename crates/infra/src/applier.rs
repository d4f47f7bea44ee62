//! Applies planned mutations to the document store.

use tracing::debug;

use edutrack_core::{Mutation, WriteMode};

use crate::cleanup::{CleanupExecutor, CleanupReport};
use crate::document_store::{DocumentStore, StoreError};
use crate::error::PropagationError;

/// What applying one mutation list did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Writes that changed a document.
    pub writes: usize,
    /// Writes that left the stored document as it was (already applied).
    pub unchanged: usize,
    /// Inserts skipped because the derived record already exists.
    pub duplicates: usize,
    pub deletes: usize,
    pub cleanup: Option<CleanupReport>,
}

impl ApplyReport {
    fn absorb_cleanup(&mut self, report: CleanupReport) {
        match &mut self.cleanup {
            Some(acc) => {
                acc.deleted += report.deleted;
                acc.failed += report.failed;
                acc.failed_ids.extend(report.failed_ids);
            }
            None => self.cleanup = Some(report),
        }
    }
}

/// Executes mutation lists in order, one store operation per mutation.
///
/// Application is **replay-safe**: running the same list twice leaves the
/// store as running it once, which is what lets the dispatcher retry a
/// partially applied list from the top.
/// - `Insert` hitting an existing document counts as a duplicate, not an error
///   (derived records are immutable once written).
/// - `UpdateMissing` never overwrites, so a replay changes nothing.
/// - Deletes of missing documents succeed.
#[derive(Debug)]
pub struct MutationApplier<S> {
    store: S,
    cleanup: CleanupExecutor<S>,
}

impl<S> MutationApplier<S>
where
    S: DocumentStore + Clone,
{
    pub fn new(store: S, cleanup_page_size: usize) -> Self {
        Self {
            cleanup: CleanupExecutor::new(store.clone(), cleanup_page_size),
            store,
        }
    }

    pub async fn apply(&self, mutations: &[Mutation]) -> Result<ApplyReport, PropagationError> {
        let mut report = ApplyReport::default();

        for mutation in mutations {
            match mutation {
                Mutation::Write {
                    collection,
                    id,
                    fields,
                    mode,
                } => match self.store.write(collection, id, fields.clone(), *mode).await {
                    Ok(res) if res.changed => report.writes += 1,
                    Ok(_) => report.unchanged += 1,
                    Err(StoreError::AlreadyExists { .. }) if *mode == WriteMode::Insert => {
                        debug!(collection = %collection, id = %id, "derived record already present");
                        report.duplicates += 1;
                    }
                    Err(e) => return Err(e.into()),
                },
                Mutation::Delete { collection, id } => {
                    self.store.delete(collection, id).await?;
                    report.deletes += 1;
                }
                Mutation::CascadeDelete(spec) => {
                    let cleanup = self.cleanup.cleanup_dependents(spec).await?;
                    report.absorb_cleanup(cleanup);
                }
            }
        }

        Ok(report)
    }
}
