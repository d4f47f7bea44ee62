use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use edutrack_core::{Document, DocumentId, Fields, WriteMode, fields_same};
use edutrack_events::{EventBus, EventEnvelope, InMemoryEventBus};

use super::r#trait::{
    BatchOp, DocumentStore, PageToken, Query, QueryPage, StoreError, WriteBatch, WriteResult,
};

#[derive(Debug, Clone, PartialEq)]
struct StoredDoc {
    fields: Fields,
    update_time: DateTime<Utc>,
}

type Collections = HashMap<String, BTreeMap<DocumentId, StoredDoc>>;

/// A committed document change, before it is turned into an envelope.
#[derive(Debug)]
struct Change {
    collection: String,
    id: DocumentId,
    before: Option<Fields>,
    after: Option<Fields>,
}

/// In-memory document store.
///
/// Intended for tests/dev. Not optimized for performance: a batch commit
/// stages its ops on a copy of the data and swaps it in on success.
///
/// When built with a change feed, every committed change publishes a
/// lifecycle envelope (insert → created, update → updated, delete → deleted;
/// writes that change nothing publish nothing).
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<Collections>,
    change_feed: Option<Arc<InMemoryEventBus<EventEnvelope>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change_feed(change_feed: Arc<InMemoryEventBus<EventEnvelope>>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            change_feed: Some(change_feed),
        }
    }

    /// Number of documents currently in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    /// Snapshot of every document in `collection`, ordered by id.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let Ok(collections) = self.collections.read() else {
            return vec![];
        };
        collections
            .get(collection)
            .map(|docs| docs.iter().map(|(id, d)| to_document(id, d)).collect())
            .unwrap_or_default()
    }

    fn commit_ops(&self, ops: Vec<BatchOp>) -> Result<(DateTime<Utc>, Vec<Change>), StoreError> {
        let now = Utc::now();
        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        let changes = if ops.len() == 1 {
            // Single op: apply in place (it either fully succeeds or leaves no trace).
            let mut changes = Vec::new();
            if let Some(op) = ops.into_iter().next() {
                changes.extend(apply_op(&mut collections, op, now)?);
            }
            changes
        } else {
            let mut staged = collections.clone();
            let mut changes = Vec::new();
            for op in ops {
                changes.extend(apply_op(&mut staged, op, now)?);
            }
            *collections = staged;
            changes
        };

        Ok((now, changes))
    }

    fn publish(&self, changes: Vec<Change>, occurred_at: DateTime<Utc>) {
        let Some(feed) = &self.change_feed else {
            return;
        };

        for change in changes {
            let envelope = match (change.before, change.after) {
                (None, Some(after)) => {
                    EventEnvelope::created(change.collection, change.id, after, occurred_at)
                }
                (Some(before), Some(after)) => {
                    EventEnvelope::updated(change.collection, change.id, before, after, occurred_at)
                }
                (Some(before), None) => {
                    EventEnvelope::deleted(change.collection, change.id, before, occurred_at)
                }
                (None, None) => continue,
            };

            if let Err(e) = feed.publish(envelope) {
                warn!(error = ?e, "change feed publish failed");
            }
        }
    }
}

fn to_document(id: &DocumentId, stored: &StoredDoc) -> Document {
    Document {
        id: id.clone(),
        fields: stored.fields.clone(),
        update_time: stored.update_time,
    }
}

fn resolve(mut fields: Fields, now: DateTime<Utc>) -> Result<Fields, StoreError> {
    if fields.keys().any(|k| k.is_empty()) {
        return Err(StoreError::InvalidArgument("empty field name".to_string()));
    }
    fields
        .values_mut()
        .for_each(|v| v.resolve_server_timestamps(now));
    Ok(fields)
}

fn apply_op(
    collections: &mut Collections,
    op: BatchOp,
    now: DateTime<Utc>,
) -> Result<Option<Change>, StoreError> {
    match op {
        BatchOp::Write {
            collection,
            id,
            fields,
            mode,
        } => {
            let fields = resolve(fields, now)?;
            let docs = collections.entry(collection.clone()).or_default();
            let before = docs.get(&id).map(|d| d.fields.clone());

            let after = match (mode, &before) {
                (WriteMode::Insert, Some(_)) => {
                    return Err(StoreError::AlreadyExists { collection, id });
                }
                (WriteMode::Update | WriteMode::UpdateMissing, None) => {
                    return Err(StoreError::NotFound { collection, id });
                }
                (WriteMode::Insert | WriteMode::Upsert, _) => fields,
                (WriteMode::Update, Some(existing)) => {
                    let mut merged = existing.clone();
                    merged.extend(fields);
                    merged
                }
                (WriteMode::UpdateMissing, Some(existing)) => {
                    let mut merged = existing.clone();
                    for (k, v) in fields {
                        merged.entry(k).or_insert(v);
                    }
                    merged
                }
            };

            if before.as_ref().is_some_and(|b| fields_same(b, &after)) {
                return Ok(None);
            }

            docs.insert(
                id.clone(),
                StoredDoc {
                    fields: after.clone(),
                    update_time: now,
                },
            );
            Ok(Some(Change {
                collection,
                id,
                before,
                after: Some(after),
            }))
        }
        BatchOp::Delete { collection, id } => {
            let removed = collections
                .get_mut(&collection)
                .and_then(|docs| docs.remove(&id));
            Ok(removed.map(|d| Change {
                collection,
                id,
                before: Some(d.fields),
                after: None,
            }))
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|d| to_document(id, d)))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<QueryPage, StoreError> {
        if query.limit == Some(0) {
            return Err(StoreError::InvalidArgument("limit must be positive".to_string()));
        }

        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let Some(docs) = collections.get(collection) else {
            return Ok(QueryPage {
                documents: vec![],
                next_page_token: None,
            });
        };

        let after = query.page_token.as_ref().map(PageToken::as_str);
        let mut matching = docs
            .iter()
            .filter(|(id, _)| after.is_none_or(|t| id.as_str() > t))
            .filter(|(_, d)| query.filter.as_ref().is_none_or(|f| f.matches(&d.fields)));

        let limit = query.limit.unwrap_or(usize::MAX);
        let documents: Vec<Document> = matching
            .by_ref()
            .take(limit)
            .map(|(id, d)| to_document(id, d))
            .collect();

        let next_page_token = match (matching.next(), documents.last()) {
            (Some(_), Some(last)) => Some(PageToken::new(last.id.as_str())),
            _ => None,
        };

        Ok(QueryPage {
            documents,
            next_page_token,
        })
    }

    async fn write(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> Result<WriteResult, StoreError> {
        let op = BatchOp::Write {
            collection: collection.to_string(),
            id: id.clone(),
            fields,
            mode,
        };
        let (update_time, changes) = self.commit_ops(vec![op])?;
        let changed = !changes.is_empty();
        self.publish(changes, update_time);
        Ok(WriteResult {
            update_time,
            changed,
        })
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        let op = BatchOp::Delete {
            collection: collection.to_string(),
            id: id.clone(),
        };
        let (at, changes) = self.commit_ops(vec![op])?;
        self.publish(changes, at);
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<DateTime<Utc>, StoreError> {
        let (at, changes) = self.commit_ops(batch.into_ops())?;
        self.publish(changes, at);
        Ok(at)
    }
}
