use std::collections::BTreeSet;

use edutrack_core::{FieldValue, Fields, Mutation, collections, fields};
use edutrack_events::{EventEnvelope, EventKind, HandlerError, PropagationHandler};

fn field_differs(before: &Fields, after: &Fields, field: &str) -> bool {
    match (before.get(field), after.get(field)) {
        (Some(a), Some(b)) => !a.same_as(b),
        (None, None) => false,
        _ => true,
    }
}

/// Names of fields whose value differs between two snapshots.
///
/// Compares over the union of keys: a key present on one side only counts as
/// changed. Values compare with [`FieldValue::same_as`]. The result is sorted.
pub fn changed_fields(before: &Fields, after: &Fields) -> Vec<String> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|k| field_differs(before, after, k))
        .cloned()
        .collect()
}

/// `courses` updated → one `course_changes` record.
///
/// A delivery whose snapshots are field-for-field identical writes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct CourseUpdatedHandler;

impl PropagationHandler for CourseUpdatedHandler {
    fn name(&self) -> &'static str {
        "course_updated"
    }

    fn plan(&self, envelope: &EventEnvelope) -> Result<Vec<Mutation>, HandlerError> {
        let (Some(before), Some(after)) = (envelope.before(), envelope.after()) else {
            return Err(HandlerError::malformed(format!(
                "course_updated needs both snapshots, got a {} event",
                envelope.kind()
            )));
        };
        if envelope.kind() != EventKind::Updated {
            return Err(HandlerError::malformed(format!(
                "course_updated got a {} event",
                envelope.kind()
            )));
        }

        let updated = changed_fields(before, after);
        if updated.is_empty() {
            return Ok(vec![]);
        }

        let differs = |field: &str| field_differs(before, after, field);
        let course_name = after
            .get("name")
            .and_then(FieldValue::as_str)
            .unwrap_or("Unknown");

        let changes = fields([
            ("titleChanged", FieldValue::Bool(differs("title"))),
            ("descriptionChanged", FieldValue::Bool(differs("description"))),
            (
                "updatedFields",
                FieldValue::Array(updated.into_iter().map(FieldValue::String).collect()),
            ),
        ]);

        Ok(vec![Mutation::insert(
            collections::COURSE_CHANGES,
            envelope.derived_record_id("course_change"),
            fields([
                ("courseId", FieldValue::from(envelope.entity_id())),
                ("courseName", FieldValue::from(course_name)),
                ("changes", FieldValue::Map(changes)),
                ("timestamp", FieldValue::ServerTimestamp),
            ]),
        )])
    }
}
