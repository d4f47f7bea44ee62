use edutrack_core::{FieldValue, Fields, Mutation, WriteMode, collections, fields};
use edutrack_events::{EventEnvelope, EventKind, HandlerError, PropagationHandler};

pub const ACCOUNT_CREATED: &str = "account_created";

/// `users` created → initialize profile defaults + welcome activity.
///
/// Defaults are written with `UpdateMissing`, so neither a field the creator
/// supplied nor a value set by an earlier delivery is ever overwritten. That
/// write always runs first and fails if the user no longer exists. The
/// welcome activity is keyed by the event, so a duplicate delivery hits the
/// same document.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserCreatedHandler;

fn profile_defaults() -> Fields {
    fields([
        ("createdAt", FieldValue::ServerTimestamp),
        ("profileComplete", FieldValue::Bool(false)),
        ("activityCount", FieldValue::Integer(0)),
        ("lastLogin", FieldValue::Null),
        ("status", FieldValue::from("active")),
    ])
}

impl PropagationHandler for UserCreatedHandler {
    fn name(&self) -> &'static str {
        "user_created"
    }

    fn plan(&self, envelope: &EventEnvelope) -> Result<Vec<Mutation>, HandlerError> {
        if envelope.kind() != EventKind::Created {
            return Err(HandlerError::malformed(format!(
                "user_created got a {} event",
                envelope.kind()
            )));
        }
        let after = envelope
            .after()
            .ok_or_else(|| HandlerError::malformed("created event without after snapshot"))?;
        let user_id = envelope.entity_id();

        let mut plan = Vec::with_capacity(2);

        let missing: Fields = profile_defaults()
            .into_iter()
            .filter(|(k, _)| !after.contains_key(k))
            .collect();
        // Pushed even when empty: it fails with NotFound once the user is gone,
        // which keeps the activity below from outliving its user.
        plan.push(Mutation::write(
            collections::USERS,
            user_id.clone(),
            missing,
            WriteMode::UpdateMissing,
        ));

        let email = after
            .get("email")
            .and_then(FieldValue::as_str)
            .unwrap_or("unknown");
        plan.push(Mutation::insert(
            collections::ACTIVITIES,
            envelope.derived_record_id(ACCOUNT_CREATED),
            fields([
                ("userId", FieldValue::from(user_id)),
                ("activityType", FieldValue::from(ACCOUNT_CREATED)),
                ("description", FieldValue::from("User account created")),
                ("timestamp", FieldValue::ServerTimestamp),
                ("userEmail", FieldValue::from(email)),
            ]),
        ));

        Ok(plan)
    }
}
