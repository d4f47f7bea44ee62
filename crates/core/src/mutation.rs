//! Derived mutations computed by propagation handlers.
//!
//! A handler never touches the store directly: it returns an ordered list of
//! `Mutation`s which the infrastructure layer applies.

use serde::{Deserialize, Serialize};

use crate::document::Fields;
use crate::id::DocumentId;

/// How a write treats an existing (or missing) document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Create; fails with "already exists" if the document is present.
    Insert,
    /// Merge fields into an existing document; fails if it is missing.
    Update,
    /// Create or replace the whole document.
    Upsert,
    /// Merge only the fields the stored document does not have yet; fails if
    /// the document is missing. Fields already present are left untouched.
    UpdateMissing,
}

/// Delete every document in `dependent_collection` whose `foreign_key` field
/// equals `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSpec {
    pub parent_collection: String,
    pub parent_id: DocumentId,
    pub dependent_collection: String,
    pub foreign_key: String,
}

/// One derived state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
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
    CascadeDelete(CascadeSpec),
}

impl Mutation {
    pub fn write(
        collection: impl Into<String>,
        id: DocumentId,
        fields: Fields,
        mode: WriteMode,
    ) -> Self {
        Self::Write {
            collection: collection.into(),
            id,
            fields,
            mode,
        }
    }

    pub fn insert(collection: impl Into<String>, id: DocumentId, fields: Fields) -> Self {
        Self::write(collection, id, fields, WriteMode::Insert)
    }

    pub fn delete(collection: impl Into<String>, id: DocumentId) -> Self {
        Self::Delete {
            collection: collection.into(),
            id,
        }
    }

    pub fn cascade(spec: CascadeSpec) -> Self {
        Self::CascadeDelete(spec)
    }

    /// Collection targeted by this mutation (dependents for a cascade).
    pub fn collection(&self) -> &str {
        match self {
            Mutation::Write { collection, .. } | Mutation::Delete { collection, .. } => collection,
            Mutation::CascadeDelete(spec) => &spec.dependent_collection,
        }
    }
}
