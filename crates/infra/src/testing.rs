//! Fault-injecting store wrappers for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use edutrack_core::{Document, DocumentId, Fields, WriteMode};

use crate::document_store::{
    BatchOp, DocumentStore, Query, QueryPage, StoreError, WriteBatch, WriteResult,
};

/// Fails the first `failures` calls (any operation) with `Unavailable`.
pub struct FlakyStore<S> {
    inner: S,
    failures_left: AtomicU32,
    calls: AtomicU32,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S, failures: u32) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn trip(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tripped = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Unavailable("injected outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for FlakyStore<S> {
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.trip()?;
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, StoreError> {
        self.trip()?;
        self.inner.query(collection, query).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<WriteResult, StoreError> {
        self.trip()?;
        self.inner.write(collection, id, fields, mode).await
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        self.trip()?;
        self.inner.delete(collection, id).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<DateTime<Utc>, StoreError> {
        self.trip()?;
        self.inner.commit(batch).await
    }
}

/// Refuses to delete the given documents (alone or inside a batch).
pub struct FailingDeletes<S> {
    inner: S,
    poisoned: HashSet<DocumentId>,
}

impl<S> FailingDeletes<S> {
    pub fn new(inner: S, poisoned: impl IntoIterator<Item = DocumentId>) -> Self {
        Self {
            inner,
            poisoned: poisoned.into_iter().collect(),
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for FailingDeletes<S> {
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, StoreError> {
        self.inner.query(collection, query).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<WriteResult, StoreError> {
        self.inner.write(collection, id, fields, mode).await
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        if self.poisoned.contains(id) {
            return Err(StoreError::Contention(format!("{collection}/{id} is locked")));
        }
        self.inner.delete(collection, id).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<DateTime<Utc>, StoreError> {
        let blocked = batch.ops().iter().any(|op| match op {
            BatchOp::Delete { id, .. } => self.poisoned.contains(id),
            BatchOp::Write { .. } => false,
        });
        if blocked {
            return Err(StoreError::Contention("batch touches a locked document".to_string()));
        }
        self.inner.commit(batch).await
    }
}
