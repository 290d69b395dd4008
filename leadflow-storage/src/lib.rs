//! Leadflow Storage - Document Store Seam
//!
//! Defines the narrow interface the pipeline engine needs from a remote
//! document database, the codec between loose stored documents and typed
//! leads, and an in-memory store for tests and local development.

pub mod codec;
pub mod memory;

pub use codec::{
    decode_lead, encode_activities, encode_new_lead, encode_numeric_id, encode_patch,
    encode_position, encode_status_move, fields, numeric_id_value, position_value,
    stored_numeric_id, timestamp_value,
};
pub use memory::InMemoryDocumentStore;

use async_trait::async_trait;
use leadflow_core::LeadflowResult;
use serde_json::Value;

/// Top-level fields of a stored document.
pub type Fields = serde_json::Map<String, Value>;

// ============================================================================
// DOCUMENT TYPES
// ============================================================================

/// A document as returned by the store: its key plus untyped fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    pub fields: Fields,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// How a write inside a batch treats the target document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Patch an existing document; a missing target rejects the whole batch.
    Update,
    /// Patch or create; never fails on a missing target.
    Merge,
}

/// One entry of a batched write.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub id: String,
    pub fields: Fields,
    pub mode: WriteMode,
}

impl DocumentWrite {
    pub fn update(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            mode: WriteMode::Update,
        }
    }

    pub fn merge(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            mode: WriteMode::Merge,
        }
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Remote key-document store.
///
/// Implementations own their timeouts. A `batch_write` is all-or-nothing:
/// either every entry lands or the call returns an error and none do.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in a collection.
    async fn get_all(&self, collection: &str) -> LeadflowResult<Vec<RawDocument>>;

    /// A single document, or `None` if it does not exist.
    async fn get_by_id(&self, collection: &str, id: &str) -> LeadflowResult<Option<RawDocument>>;

    /// Documents whose top-level `field` equals `value`.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> LeadflowResult<Vec<RawDocument>>;

    /// Insert a new document and return the key the store assigned.
    async fn insert(&self, collection: &str, fields: Fields) -> LeadflowResult<String>;

    /// Patch top-level fields of an existing document.
    async fn update_fields(&self, collection: &str, id: &str, fields: Fields) -> LeadflowResult<()>;

    /// Apply several writes atomically.
    async fn batch_write(&self, collection: &str, writes: Vec<DocumentWrite>) -> LeadflowResult<()>;

    /// Number of documents in a collection.
    async fn count(&self, collection: &str) -> LeadflowResult<usize>;

    /// Remove a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> LeadflowResult<()>;
}
