//! Cascading cleanup of dependent documents.

use tracing::{debug, info, warn};

use edutrack_core::{CascadeSpec, DocumentId, FieldValue};

use crate::document_store::{DocumentStore, Filter, Query, StoreError, WriteBatch};

pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Outcome of one cleanup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub failed: usize,
    /// Dependents left behind; candidates for a reconciliation sweep.
    pub failed_ids: Vec<DocumentId>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Paginated bulk deletion of the dependents of one parent document.
///
/// - Dependents are read in pages of at most `page_size`, never all at once.
/// - Each page is deleted as one atomic batch; if that batch fails, the page
///   falls back to per-document deletes so one bad dependent cannot block the
///   others.
/// - Per-dependent failures are counted, not returned as errors. Only a failed
///   page *query* aborts the run (the triggering event is then retried as a
///   whole; deletes are idempotent, so re-running is safe).
#[derive(Debug)]
pub struct CleanupExecutor<S> {
    store: S,
    page_size: usize,
}

impl<S> CleanupExecutor<S> {
    pub fn new(store: S, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl<S> CleanupExecutor<S>
where
    S: DocumentStore,
{
    pub async fn cleanup_dependents(&self, spec: &CascadeSpec) -> Result<CleanupReport, StoreError> {
        let mut report = CleanupReport::default();
        let base = Query::filtered(Filter::eq(
            spec.foreign_key.clone(),
            FieldValue::from(&spec.parent_id),
        ))
        .with_limit(self.page_size);

        let mut token = None;
        let mut pages = 0usize;
        loop {
            let page = self
                .store
                .query(&spec.dependent_collection, &base.clone().with_page_token(token))
                .await?;
            if page.documents.is_empty() {
                break;
            }
            pages += 1;

            let ids: Vec<DocumentId> = page.documents.into_iter().map(|d| d.id).collect();
            self.delete_page(&spec.dependent_collection, ids, &mut report)
                .await;

            token = page.next_page_token;
            if token.is_none() {
                break;
            }
        }

        if report.is_complete() {
            info!(
                parent = %format!("{}/{}", spec.parent_collection, spec.parent_id),
                dependents = %spec.dependent_collection,
                deleted = report.deleted,
                pages,
                "cleaned up dependents"
            );
        } else {
            warn!(
                parent = %format!("{}/{}", spec.parent_collection, spec.parent_id),
                dependents = %spec.dependent_collection,
                deleted = report.deleted,
                failed = report.failed,
                "cleanup left dependents behind"
            );
        }

        Ok(report)
    }

    async fn delete_page(&self, collection: &str, ids: Vec<DocumentId>, report: &mut CleanupReport) {
        let mut batch = WriteBatch::new();
        for id in &ids {
            batch.delete(collection, id.clone());
        }

        match self.store.commit(batch).await {
            Ok(_) => {
                report.deleted += ids.len();
                return;
            }
            Err(e) => {
                debug!(error = %e, size = ids.len(), "batch delete failed; deleting one by one");
            }
        }

        for id in ids {
            match self.store.delete(collection, &id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!(collection, id = %id, error = %e, "failed to delete dependent");
                    report.failed += 1;
                    report.failed_ids.push(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use edutrack_core::{WriteMode, collections, fields};

    use crate::document_store::{DocumentStore, InMemoryDocumentStore};
    use crate::testing::{FailingDeletes, FlakyStore};

    fn spec(parent: &str) -> CascadeSpec {
        CascadeSpec {
            parent_collection: collections::USERS.to_string(),
            parent_id: DocumentId::new(parent).unwrap(),
            dependent_collection: collections::ACTIVITIES.to_string(),
            foreign_key: "userId".to_string(),
        }
    }

    async fn seed(store: &InMemoryDocumentStore, owner: &str, n: usize) {
        for i in 0..n {
            store
                .write(
                    collections::ACTIVITIES,
                    &DocumentId::new(format!("{owner}-act-{i:04}")).unwrap(),
                    fields([("userId", owner), ("activityType", "login")]),
                    WriteMode::Insert,
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn deletes_across_page_boundaries() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let page_size = 4;
        seed(&store, "u1", 2 * page_size + 1).await;
        seed(&store, "u2", 3).await;

        let executor = CleanupExecutor::new(store.clone(), page_size);
        let report = executor.cleanup_dependents(&spec("u1")).await.unwrap();

        assert_eq!(report.deleted, 2 * page_size + 1);
        assert!(report.is_complete());
        assert_eq!(store.count(collections::ACTIVITIES), 3);
        assert!(
            store
                .documents(collections::ACTIVITIES)
                .iter()
                .all(|d| d.get_str("userId") == Some("u2"))
        );
    }

    #[tokio::test]
    async fn no_dependents_is_a_clean_noop() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let executor = CleanupExecutor::new(store, 10);

        let report = executor.cleanup_dependents(&spec("ghost")).await.unwrap();
        assert_eq!(report, CleanupReport::default());
    }

    #[tokio::test]
    async fn one_failing_dependent_does_not_block_the_rest() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        seed(&inner, "u1", 7).await;
        let poisoned = DocumentId::new("u1-act-0002").unwrap();
        let store = FailingDeletes::new(inner.clone(), [poisoned.clone()]);

        let executor = CleanupExecutor::new(store, 3);
        let report = executor.cleanup_dependents(&spec("u1")).await.unwrap();

        assert_eq!(report.deleted, 6);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_ids, vec![poisoned.clone()]);
        let left: Vec<_> = inner
            .documents(collections::ACTIVITIES)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(left, vec![poisoned]);
    }

    #[tokio::test]
    async fn query_failure_aborts_with_store_error() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        seed(&inner, "u1", 2).await;
        let store = FlakyStore::new(inner.clone(), 1);

        let executor = CleanupExecutor::new(store, 10);
        let err = executor.cleanup_dependents(&spec("u1")).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(inner.count(collections::ACTIVITIES), 2);
    }
}
