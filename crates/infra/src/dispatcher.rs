//! Envelope dispatch pipeline.
//!
//! ```text
//! EventEnvelope
//!   ↓
//! 1. Resolve handler for (collection, kind)      : none bound → Unbound (no-op)
//!   ↓
//! 2. Plan mutations (pure)                       : error → Failed (permanent)
//!   ↓
//! 3. Apply mutations via the document store      : transient error → backoff + retry
//!   ↓                                              permanent error → Failed
//! Outcome
//! ```
//!
//! The whole pipeline runs under the dispatch deadline. Exceeding it yields
//! `DeadlineExceeded`: the envelope is left for the event source to redeliver.
//! The dispatcher never schedules redelivery itself.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, error, info, info_span, warn};

use edutrack_events::{EventEnvelope, HandlerRegistry};

use crate::applier::{ApplyReport, MutationApplier};
use crate::config::PropagationConfig;
use crate::document_store::DocumentStore;
use crate::error::PropagationError;
use crate::retry::RetryPolicy;

/// Terminal result of dispatching one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// No handler bound for (collection, kind). Expected for unwatched kinds.
    Unbound,
    /// All mutations applied.
    Completed { attempts: u32, report: ApplyReport },
    /// Gave up: permanent error, or transient errors outlasted the retry budget.
    Failed { attempts: u32, error: PropagationError },
    /// The dispatch deadline elapsed; eligible for redelivery.
    DeadlineExceeded,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    /// Whether redelivering the same envelope could succeed.
    pub fn is_redeliverable(&self) -> bool {
        match self {
            Outcome::DeadlineExceeded => true,
            Outcome::Failed { error, .. } => error.is_transient(),
            Outcome::Unbound | Outcome::Completed { .. } => false,
        }
    }
}

/// Routes envelopes to their propagation handler and applies the result.
///
/// Stateless across invocations: any number of `dispatch` calls may run
/// concurrently on a shared `Dispatcher` (one per incoming envelope).
#[derive(Debug)]
pub struct Dispatcher<S> {
    registry: Arc<HandlerRegistry>,
    applier: MutationApplier<S>,
    config: PropagationConfig,
}

impl<S> Dispatcher<S>
where
    S: DocumentStore + Clone,
{
    pub fn new(registry: Arc<HandlerRegistry>, store: S, config: PropagationConfig) -> Self {
        Self {
            applier: MutationApplier::new(store, config.cleanup_page_size),
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    pub async fn dispatch(&self, envelope: &EventEnvelope) -> Outcome {
        let span = info_span!(
            "dispatch",
            event_id = %envelope.event_id(),
            collection = %envelope.collection(),
            entity_id = %envelope.entity_id(),
            kind = %envelope.kind(),
            delivery_attempt = envelope.delivery().attempt,
        );

        async {
            match timeout(self.config.dispatch_deadline, self.run(envelope)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        deadline_ms = self.config.dispatch_deadline.as_millis() as u64,
                        "dispatch deadline exceeded; leaving envelope for redelivery"
                    );
                    Outcome::DeadlineExceeded
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, envelope: &EventEnvelope) -> Outcome {
        let Some(handler) = self.registry.resolve(envelope.collection(), envelope.kind()) else {
            debug!("no handler bound; ignoring");
            return Outcome::Unbound;
        };

        let mutations = match handler.plan(envelope) {
            Ok(m) => m,
            Err(e) => {
                error!(handler = handler.name(), error = %e, "handler rejected envelope");
                return Outcome::Failed {
                    attempts: 1,
                    error: e.into(),
                };
            }
        };

        let policy = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.applier.apply(&mutations).await {
                Ok(report) => {
                    info!(
                        handler = handler.name(),
                        attempts = attempt,
                        mutations = mutations.len(),
                        writes = report.writes,
                        duplicates = report.duplicates,
                        "envelope propagated"
                    );
                    return Outcome::Completed {
                        attempts: attempt,
                        report,
                    };
                }
                Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        handler = handler.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying"
                    );
                    sleep(delay).await;
                }
                Err(err) => {
                    error!(
                        handler = handler.name(),
                        attempts = attempt,
                        error = %err,
                        "propagation failed"
                    );
                    return Outcome::Failed {
                        attempts: attempt,
                        error: err,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use edutrack_core::{
        Document, DocumentId, FieldValue, Fields, WriteMode, collections, fields,
    };

    use crate::document_store::{
        Filter, InMemoryDocumentStore, Query, QueryPage, StoreError, WriteBatch, WriteResult,
    };
    use crate::propagation::default_registry;
    use crate::testing::FlakyStore;

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    fn fast_config() -> PropagationConfig {
        PropagationConfig::default()
            .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)))
            .with_cleanup_page_size(2)
    }

    fn dispatcher<S: DocumentStore + Clone>(store: S) -> Dispatcher<S> {
        Dispatcher::new(Arc::new(default_registry().unwrap()), store, fast_config())
    }

    async fn seed_user(store: &InMemoryDocumentStore, uid: &str, email: &str) -> EventEnvelope {
        let data = fields([("email", email)]);
        let res = store
            .write(collections::USERS, &id(uid), data.clone(), WriteMode::Insert)
            .await
            .unwrap();
        EventEnvelope::created(collections::USERS, id(uid), data, res.update_time)
    }

    async fn user_activities(store: &InMemoryDocumentStore, uid: &str) -> Vec<Document> {
        store
            .query(collections::ACTIVITIES, &Query::filtered(Filter::eq("userId", uid)))
            .await
            .unwrap()
            .documents
    }

    #[tokio::test]
    async fn unbound_events_are_a_noop() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());

        let env = EventEnvelope::created(collections::COURSES, id("c1"), fields([("title", "A")]), Utc::now());
        assert_eq!(d.dispatch(&env).await, Outcome::Unbound);
        assert_eq!(store.count(collections::COURSE_CHANGES), 0);
        assert_eq!(store.count(collections::ACTIVITIES), 0);
    }

    #[tokio::test]
    async fn user_creation_initializes_profile_and_logs_activity() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());
        let env = seed_user(&store, "u1", "a@x.com").await;

        let outcome = d.dispatch(&env).await;
        assert!(outcome.is_completed(), "{outcome:?}");

        let user = store.get(collections::USERS, &id("u1")).await.unwrap().unwrap();
        assert_eq!(user.get("profileComplete"), Some(&FieldValue::Bool(false)));
        assert_eq!(user.get("activityCount"), Some(&FieldValue::Integer(0)));
        assert_eq!(user.get("lastLogin"), Some(&FieldValue::Null));
        assert_eq!(user.get_str("status"), Some("active"));
        assert!(user.get("createdAt").and_then(FieldValue::as_timestamp).is_some());

        let acts = user_activities(&store, "u1").await;
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].get_str("activityType"), Some("account_created"));
        assert_eq!(acts[0].get_str("userEmail"), Some("a@x.com"));
        assert!(acts[0].get("timestamp").and_then(FieldValue::as_timestamp).is_some());
    }

    #[tokio::test]
    async fn duplicate_creation_delivery_is_idempotent() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());
        let env = seed_user(&store, "u1", "a@x.com").await;

        assert!(d.dispatch(&env).await.is_completed());
        let user_once = store.get(collections::USERS, &id("u1")).await.unwrap().unwrap();
        let acts_once = store.documents(collections::ACTIVITIES);

        let outcome = d.dispatch(&env.redelivered()).await;
        let Outcome::Completed { report, .. } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(report.writes, 0);
        assert_eq!(report.duplicates, 1);

        let user_twice = store.get(collections::USERS, &id("u1")).await.unwrap().unwrap();
        assert_eq!(user_once, user_twice);
        assert_eq!(acts_once, store.documents(collections::ACTIVITIES));
    }

    #[tokio::test]
    async fn concurrent_duplicate_deliveries_converge() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = Arc::new(dispatcher(store.clone()));
        let env = seed_user(&store, "u1", "a@x.com").await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let d = d.clone();
                let env = env.redelivered();
                tokio::spawn(async move { d.dispatch(&env).await })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap().is_completed());
        }

        assert_eq!(user_activities(&store, "u1").await.len(), 1);
    }

    #[tokio::test]
    async fn identical_course_snapshots_write_nothing() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());
        let snap = fields([("title", "Intro"), ("name", "CS101")]);
        let env = EventEnvelope::updated(collections::COURSES, id("c1"), snap.clone(), snap, Utc::now());

        let outcome = d.dispatch(&env).await;
        assert!(outcome.is_completed());
        assert_eq!(store.count(collections::COURSE_CHANGES), 0);
    }

    #[tokio::test]
    async fn course_title_change_is_logged_once_per_event() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());
        let before = fields([("title", "Intro"), ("description", "Basics"), ("name", "CS101")]);
        let mut after = before.clone();
        after.insert("title".into(), FieldValue::from("Introduction"));
        let env = EventEnvelope::updated(collections::COURSES, id("c1"), before, after, Utc::now());

        assert!(d.dispatch(&env).await.is_completed());
        assert!(d.dispatch(&env.redelivered()).await.is_completed());

        let changes = store.documents(collections::COURSE_CHANGES);
        assert_eq!(changes.len(), 1);
        let rec = &changes[0];
        assert_eq!(rec.get_str("courseId"), Some("c1"));
        assert_eq!(rec.get_str("courseName"), Some("CS101"));
        let diff = rec.get("changes").and_then(FieldValue::as_map).unwrap();
        assert_eq!(diff["titleChanged"], FieldValue::Bool(true));
        assert_eq!(diff["descriptionChanged"], FieldValue::Bool(false));
        assert_eq!(diff["updatedFields"], FieldValue::Array(vec![FieldValue::from("title")]));
    }

    #[tokio::test]
    async fn user_deletion_cleans_up_and_leaves_one_tombstone() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());
        let created = seed_user(&store, "u1", "a@x.com").await;
        assert!(d.dispatch(&created).await.is_completed());

        // page size is 2 → 5 extra rows span three pages
        for n in 0..5 {
            store
                .write(
                    collections::ACTIVITIES,
                    &id(&format!("extra-{n}")),
                    fields([("userId", "u1"), ("activityType", "login")]),
                    WriteMode::Insert,
                )
                .await
                .unwrap();
        }
        store
            .write(collections::ACTIVITIES, &id("other"), fields([("userId", "u2")]), WriteMode::Insert)
            .await
            .unwrap();

        let before = store.get(collections::USERS, &id("u1")).await.unwrap().unwrap().fields;
        store.delete(collections::USERS, &id("u1")).await.unwrap();
        let deleted = EventEnvelope::deleted(collections::USERS, id("u1"), before, Utc::now());

        let outcome = d.dispatch(&deleted).await;
        let Outcome::Completed { report, .. } = &outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(report.cleanup.as_ref().map(|c| c.deleted), Some(6));
        assert!(d.dispatch(&deleted.redelivered()).await.is_completed());

        assert!(user_activities(&store, "u1").await.is_empty());
        assert_eq!(user_activities(&store, "u2").await.len(), 1);

        let tombstones = store
            .query(collections::DELETED_USERS, &Query::filtered(Filter::eq("userId", "u1")))
            .await
            .unwrap()
            .documents;
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].get_str("email"), Some("a@x.com"));
        assert_eq!(tombstones[0].get_str("name"), Some("Unknown"));
        assert!(tombstones[0].get("deletedAt").and_then(FieldValue::as_timestamp).is_some());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        let env = seed_user(&inner, "u1", "a@x.com").await;
        let store = Arc::new(FlakyStore::new(inner.clone(), 2));
        let d = dispatcher(store.clone());

        let outcome = d.dispatch(&env).await;
        let Outcome::Completed { attempts, .. } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(attempts, 3);
        assert_eq!(inner.count(collections::ACTIVITIES), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        let env = seed_user(&inner, "u1", "a@x.com").await;
        let store = Arc::new(FlakyStore::new(inner.clone(), 100));
        let d = dispatcher(store.clone());

        let outcome = d.dispatch(&env).await;
        let Outcome::Failed { attempts, error } = &outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(*attempts, 3);
        assert!(error.is_transient());
        assert!(outcome.is_redeliverable());
        assert_eq!(store.calls(), 3);
        assert_eq!(inner.count(collections::ACTIVITIES), 0);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());
        // The user is already gone when the creation event shows up.
        let env = EventEnvelope::created(collections::USERS, id("ghost"), fields([("email", "g@x.com")]), Utc::now());

        let outcome = d.dispatch(&env).await;
        let Outcome::Failed { attempts, error } = &outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(*attempts, 1);
        assert!(!error.is_transient());
        assert!(!outcome.is_redeliverable());
        assert_eq!(store.count(collections::ACTIVITIES), 0);
    }

    #[tokio::test]
    async fn late_creation_of_a_complete_user_leaves_no_orphan_activity() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let d = dispatcher(store.clone());

        // Creator supplied every profile default, so nothing is left to fill in.
        let data = fields([
            ("email", FieldValue::from("full@x.com")),
            ("createdAt", FieldValue::Timestamp(Utc::now())),
            ("profileComplete", FieldValue::Bool(true)),
            ("activityCount", FieldValue::Integer(4)),
            ("lastLogin", FieldValue::Null),
            ("status", FieldValue::from("active")),
        ]);
        let res = store
            .write(collections::USERS, &id("u7"), data.clone(), WriteMode::Insert)
            .await
            .unwrap();
        let created = EventEnvelope::created(collections::USERS, id("u7"), data.clone(), res.update_time);

        store.delete(collections::USERS, &id("u7")).await.unwrap();
        let deleted = EventEnvelope::deleted(collections::USERS, id("u7"), data, Utc::now());

        // Deletion is observed before creation.
        assert!(d.dispatch(&deleted).await.is_completed());
        let outcome = d.dispatch(&created).await;
        let Outcome::Failed { attempts, error } = &outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(*attempts, 1);
        assert!(!error.is_transient());

        assert!(user_activities(&store, "u7").await.is_empty());
        assert!(store.get(collections::USERS, &id("u7")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_envelope_fails_permanently() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let mut registry = edutrack_events::HandlerRegistry::new();
        registry
            .register(
                collections::USERS,
                edutrack_events::EventKind::Updated,
                crate::propagation::UserCreatedHandler,
            )
            .unwrap();
        let d = Dispatcher::new(Arc::new(registry), store, fast_config());

        let env = EventEnvelope::updated(collections::USERS, id("u1"), Fields::new(), Fields::new(), Utc::now());
        let outcome = d.dispatch(&env).await;
        assert!(matches!(outcome, Outcome::Failed { attempts: 1, .. }), "{outcome:?}");
    }

    /// Store whose writes never finish.
    #[derive(Clone)]
    struct HangingStore;

    #[async_trait]
    impl DocumentStore for HangingStore {
        async fn get(&self, _: &str, _: &DocumentId) -> Result<Option<Document>, StoreError> {
            std::future::pending().await
        }
        async fn query(&self, _: &str, _: &Query) -> Result<QueryPage, StoreError> {
            std::future::pending().await
        }
        async fn write(&self, _: &str, _: &DocumentId, _: Fields, _: WriteMode) -> Result<WriteResult, StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str, _: &DocumentId) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn commit(&self, _: WriteBatch) -> Result<DateTime<Utc>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn deadline_bounds_a_dispatch() {
        let d = Dispatcher::new(
            Arc::new(default_registry().unwrap()),
            HangingStore,
            fast_config().with_dispatch_deadline(Duration::from_millis(20)),
        );
        let env = EventEnvelope::created(collections::USERS, id("u1"), fields([("email", "a@x.com")]), Utc::now());

        let outcome = d.dispatch(&env).await;
        assert_eq!(outcome, Outcome::DeadlineExceeded);
        assert!(outcome.is_redeliverable());
    }
}
