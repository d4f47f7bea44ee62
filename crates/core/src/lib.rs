//! `edutrack-core`: document model building blocks.
//!
//! This crate contains **pure** data types (no store or transport concerns).

pub mod collections;
pub mod document;
pub mod error;
pub mod id;
pub mod mutation;

pub use document::{Document, FieldValue, Fields, fields, fields_same, fields_to_json};
pub use error::{DomainError, DomainResult};
pub use id::DocumentId;
pub use mutation::{CascadeSpec, Mutation, WriteMode};
