//! RPC gateway: the callable operations, independent of HTTP.
//!
//! Each operation takes its decoded request (and caller identity where it
//! matters) and returns a result or an [`RpcError`]. Transport framing lives in
//! `app::routes::rpc`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use edutrack_auth::CallerIdentity;
use edutrack_core::{DocumentId, FieldValue, WriteMode, collections, fields};
use edutrack_infra::document_store::DocumentStore;

use crate::app::errors::RpcError;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SayHelloRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SayHelloResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogActivityRequest {
    pub activity_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActivityResponse {
    pub success: bool,
    pub message: String,
    pub activity_id: String,
    pub timestamp: String,
}

fn rfc3339(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Treat an empty string the same as an absent value.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Greeting; no identity required, no side effects.
pub fn say_hello(request: SayHelloRequest, now: DateTime<Utc>) -> SayHelloResponse {
    let name = non_empty(request.name).unwrap_or_else(|| "User".to_string());
    SayHelloResponse {
        success: true,
        message: format!("Hello, {name}! Welcome to EduTrack!"),
        timestamp: rfc3339(now),
    }
}

/// Append one activity for the calling user.
///
/// Rejections (`Unauthenticated`, `InvalidArgument`) happen before any store
/// access. The record gets a fresh random id: the caller receives it
/// synchronously, so a retried call is a new activity.
pub async fn log_activity<S>(
    store: &S,
    caller: Option<&CallerIdentity>,
    request: LogActivityRequest,
    now: DateTime<Utc>,
) -> Result<LogActivityResponse, RpcError>
where
    S: DocumentStore + ?Sized,
{
    let caller = caller.ok_or_else(|| {
        RpcError::Unauthenticated("User must be authenticated to log activity".to_string())
    })?;
    let activity_type = non_empty(request.activity_type)
        .ok_or_else(|| RpcError::InvalidArgument("activityType is required".to_string()))?;

    let activity_id = DocumentId::generate();
    let record = fields([
        ("userId", FieldValue::from(caller.uid.as_str())),
        ("activityType", FieldValue::from(activity_type.as_str())),
        ("description", FieldValue::from(request.description.unwrap_or_default())),
        ("timestamp", FieldValue::ServerTimestamp),
        (
            "userEmail",
            FieldValue::from(caller.email.as_deref().unwrap_or("unknown")),
        ),
    ]);

    store
        .write(collections::ACTIVITIES, &activity_id, record, WriteMode::Insert)
        .await
        .map_err(|e| {
            error!(user_id = %caller.uid, error = %e, "activity write failed");
            RpcError::Internal("failed to log activity".to_string())
        })?;

    info!(user_id = %caller.uid, activity_type = %activity_type, "activity logged");

    Ok(LogActivityResponse {
        success: true,
        message: "Activity logged successfully".to_string(),
        activity_id: activity_id.to_string(),
        timestamp: rfc3339(now),
    })
}
