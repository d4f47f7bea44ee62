use edutrack_core::{CascadeSpec, FieldValue, Mutation, collections, fields};
use edutrack_events::{EventEnvelope, EventKind, HandlerError, PropagationHandler};

/// `users` deleted → remove the user's activities, then leave a tombstone.
///
/// The tombstone is keyed by the user id (one per user), so redeliveries and
/// retries never produce a second one.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserDeletedHandler;

impl PropagationHandler for UserDeletedHandler {
    fn name(&self) -> &'static str {
        "user_deleted"
    }

    fn plan(&self, envelope: &EventEnvelope) -> Result<Vec<Mutation>, HandlerError> {
        if envelope.kind() != EventKind::Deleted {
            return Err(HandlerError::malformed(format!(
                "user_deleted got a {} event",
                envelope.kind()
            )));
        }
        let before = envelope
            .before()
            .ok_or_else(|| HandlerError::malformed("deleted event without before snapshot"))?;
        let user_id = envelope.entity_id();

        let last_known = |field: &str, fallback: &'static str| {
            before
                .get(field)
                .and_then(FieldValue::as_str)
                .unwrap_or(fallback)
                .to_string()
        };

        Ok(vec![
            Mutation::cascade(CascadeSpec {
                parent_collection: collections::USERS.to_string(),
                parent_id: user_id.clone(),
                dependent_collection: collections::ACTIVITIES.to_string(),
                foreign_key: "userId".to_string(),
            }),
            Mutation::insert(
                collections::DELETED_USERS,
                user_id.clone(),
                fields([
                    ("userId", FieldValue::from(user_id)),
                    ("email", FieldValue::from(last_known("email", "unknown"))),
                    ("name", FieldValue::from(last_known("name", "Unknown"))),
                    ("deletedAt", FieldValue::ServerTimestamp),
                ]),
            ),
        ])
    }
}
