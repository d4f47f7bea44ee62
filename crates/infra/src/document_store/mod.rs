//! Document store client: trait, query types, and the in-memory backend.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use r#trait::{
    BatchOp, DocumentStore, Filter, PageToken, Query, QueryPage, StoreError, WriteBatch,
    WriteResult,
};
