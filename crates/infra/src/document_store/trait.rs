use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use edutrack_core::{Document, DocumentId, FieldValue, Fields, WriteMode};

/// Document store operation error.
///
/// These are **infrastructure errors**. The split that matters to callers is
/// [`StoreError::is_transient`]: transient errors may succeed on retry,
/// everything else is deterministic for the same request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: DocumentId },

    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: DocumentId },

    /// Backend unreachable, timed out, or overloaded.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Write contention (concurrent transaction on the same documents).
    #[error("write contention: {0}")]
    Contention(String),

    /// Malformed request (bad page token, invalid field value, ...).
    #[error("invalid request: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Contention(_))
    }
}

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// Opaque continuation token returned by a paginated query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Query over one collection.
///
/// Results are ordered by document id; `page_token` resumes after the last
/// document of the previous page.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
    pub page_token: Option<PageToken>,
}

impl Query {
    pub fn all() -> Self {
        Self {
            filter: None,
            limit: None,
            page_token: None,
        }
    }

    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            ..Self::all()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_page_token(mut self, token: Option<PageToken>) -> Self {
        self.page_token = token;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPage {
    pub documents: Vec<Document>,
    /// Present when more matching documents may follow.
    pub next_page_token: Option<PageToken>,
}

/// Result of a committed write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Commit time; every `ServerTimestamp` in the write resolved to this.
    pub update_time: DateTime<Utc>,
    /// Whether the stored document actually changed.
    pub changed: bool,
}

/// Single operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Write {
        collection: String,
        id: DocumentId,
        fields: Fields,
        mode: WriteMode,
    },
    Delete {
        collection: String,
        id: DocumentId,
    },
}

/// Ordered operations committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(
        &mut self,
        collection: impl Into<String>,
        id: DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> &mut Self {
        self.ops.push(BatchOp::Write {
            collection: collection.into(),
            id,
            fields,
            mode,
        });
        self
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: DocumentId) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            collection: collection.into(),
            id,
        });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Collection-oriented document store client.
///
/// ## Design Principles
///
/// - **Injected, never global**: the dispatcher, handlers' applier and the RPC
///   gateway all receive a store value, so tests substitute the in-memory one.
/// - **Single-document atomicity**: every `write`/`delete` is atomic on its own;
///   `commit` extends that to an ordered batch.
/// - **Server time**: `FieldValue::ServerTimestamp` is resolved by the store at
///   commit, never by the caller.
/// - **Idempotent delete**: deleting a missing document succeeds.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, StoreError>;

    async fn write(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<WriteResult, StoreError>;

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError>;

    async fn commit(&self, batch: WriteBatch) -> Result<DateTime<Utc>, StoreError>;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        (**self).get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, StoreError> {
        (**self).query(collection, query).await
    }

    async fn write(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<WriteResult, StoreError> {
        (**self).write(collection, id, fields, mode).await
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        (**self).delete(collection, id).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<DateTime<Utc>, StoreError> {
        (**self).commit(batch).await
    }
}
