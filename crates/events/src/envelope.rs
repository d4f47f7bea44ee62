use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use edutrack_core::{DocumentId, Fields};

use crate::EventKind;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("{kind} event must not carry a before snapshot")]
    UnexpectedBefore { kind: EventKind },

    #[error("{kind} event must carry a before snapshot")]
    MissingBefore { kind: EventKind },

    #[error("{kind} event must not carry an after snapshot")]
    UnexpectedAfter { kind: EventKind },

    #[error("{kind} event must carry an after snapshot")]
    MissingAfter { kind: EventKind },

    #[error("delivery attempt numbers start at 1")]
    ZeroAttempt,
}

/// Delivery metadata for one hand-off of an envelope to a consumer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// 1 for the first delivery, incremented on every redelivery.
    pub attempt: u32,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    pub fn first(delivered_at: DateTime<Utc>) -> Self {
        Self {
            attempt: 1,
            delivered_at,
        }
    }
}

/// Normalized lifecycle event for one document.
///
/// Notes:
/// - `Created` carries only `after`, `Deleted` only `before`, `Updated` both.
///   Every constructor (and deserialization) enforces this.
/// - Delivery is **at-least-once**: the same `event_id` may arrive several
///   times, possibly out of order with other events for the same document.
/// - `occurred_at` is the commit time of the primary change, stable across
///   redeliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EnvelopeParts")]
pub struct EventEnvelope {
    event_id: Uuid,
    collection: String,
    entity_id: DocumentId,
    kind: EventKind,
    before: Option<Fields>,
    after: Option<Fields>,
    occurred_at: DateTime<Utc>,
    delivery: DeliveryAttempt,
}

#[derive(Deserialize)]
struct EnvelopeParts {
    event_id: Uuid,
    collection: String,
    entity_id: DocumentId,
    kind: EventKind,
    before: Option<Fields>,
    after: Option<Fields>,
    occurred_at: DateTime<Utc>,
    delivery: DeliveryAttempt,
}

impl TryFrom<EnvelopeParts> for EventEnvelope {
    type Error = EnvelopeError;

    fn try_from(p: EnvelopeParts) -> Result<Self, Self::Error> {
        if p.delivery.attempt == 0 {
            return Err(EnvelopeError::ZeroAttempt);
        }
        let mut envelope = EventEnvelope::new(
            p.event_id,
            p.collection,
            p.entity_id,
            p.kind,
            p.before,
            p.after,
            p.occurred_at,
        )?;
        envelope.delivery = p.delivery;
        Ok(envelope)
    }
}

impl EventEnvelope {
    /// Build an envelope, checking the snapshot invariant for `kind`.
    pub fn new(
        event_id: Uuid,
        collection: impl Into<String>,
        entity_id: DocumentId,
        kind: EventKind,
        before: Option<Fields>,
        after: Option<Fields>,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, EnvelopeError> {
        match (kind, &before, &after) {
            (EventKind::Created, Some(_), _) => return Err(EnvelopeError::UnexpectedBefore { kind }),
            (EventKind::Created, None, None) => return Err(EnvelopeError::MissingAfter { kind }),
            (EventKind::Updated, None, _) => return Err(EnvelopeError::MissingBefore { kind }),
            (EventKind::Updated, _, None) => return Err(EnvelopeError::MissingAfter { kind }),
            (EventKind::Deleted, _, Some(_)) => return Err(EnvelopeError::UnexpectedAfter { kind }),
            (EventKind::Deleted, None, None) => return Err(EnvelopeError::MissingBefore { kind }),
            _ => {}
        }

        Ok(Self {
            event_id,
            collection: collection.into(),
            entity_id,
            kind,
            before,
            after,
            occurred_at,
            delivery: DeliveryAttempt::first(Utc::now()),
        })
    }

    pub fn created(
        collection: impl Into<String>,
        entity_id: DocumentId,
        after: Fields,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            collection: collection.into(),
            entity_id,
            kind: EventKind::Created,
            before: None,
            after: Some(after),
            occurred_at,
            delivery: DeliveryAttempt::first(Utc::now()),
        }
    }

    pub fn updated(
        collection: impl Into<String>,
        entity_id: DocumentId,
        before: Fields,
        after: Fields,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            collection: collection.into(),
            entity_id,
            kind: EventKind::Updated,
            before: Some(before),
            after: Some(after),
            occurred_at,
            delivery: DeliveryAttempt::first(Utc::now()),
        }
    }

    pub fn deleted(
        collection: impl Into<String>,
        entity_id: DocumentId,
        before: Fields,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            collection: collection.into(),
            entity_id,
            kind: EventKind::Deleted,
            before: Some(before),
            after: None,
            occurred_at,
            delivery: DeliveryAttempt::first(Utc::now()),
        }
    }

    /// The same event handed over again (next delivery attempt).
    pub fn redelivered(&self) -> Self {
        let mut next = self.clone();
        next.delivery = DeliveryAttempt {
            attempt: self.delivery.attempt.saturating_add(1),
            delivered_at: Utc::now(),
        };
        next
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn entity_id(&self) -> &DocumentId {
        &self.entity_id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn before(&self) -> Option<&Fields> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Fields> {
        self.after.as_ref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn delivery(&self) -> DeliveryAttempt {
        self.delivery
    }

    /// Deterministic id for a record derived 1:1 from this event.
    ///
    /// Built from the event id, the event coordinates (collection, entity,
    /// kind, occurrence time) and `purpose`. Redeliveries keep the event id,
    /// so they map to the same document; two events that share a timestamp
    /// do not.
    pub fn derived_record_id(&self, purpose: &str) -> DocumentId {
        let event_id = self.event_id.hyphenated().to_string();
        let occurred = self.occurred_at.timestamp_micros().to_string();
        DocumentId::derived(&[
            &event_id,
            &self.collection,
            self.entity_id.as_str(),
            self.kind.as_str(),
            &occurred,
            purpose,
        ])
    }
}
