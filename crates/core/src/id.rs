//! Strongly-typed document identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Namespace for ids derived from event coordinates (UUIDv5).
const DERIVED_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d3c_0f51_9a8e_4b7e_b1d2_5e0c_7a44_e2f1);

/// Identifier of a document inside a collection.
///
/// Ids are opaque strings: client-chosen ids (`"u1"`) and store-assigned ids
/// share the same type. An id must be non-empty and must not contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_id("DocumentId: empty"));
        }
        if value.contains('/') {
            return Err(DomainError::invalid_id(format!(
                "DocumentId: '{value}' contains '/'"
            )));
        }
        Ok(Self(value))
    }

    /// Fresh random id (UUIDv7, time-ordered) for append-only records.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    /// Deterministic id for a record derived 1:1 from some source coordinates.
    ///
    /// The same `parts` always produce the same id, so replaying the source
    /// event targets the same document.
    pub fn derived(parts: &[&str]) -> Self {
        let name = parts.join("/");
        Self(Uuid::new_v5(&DERIVED_ID_NAMESPACE, name.as_bytes()).simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DocumentId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}
