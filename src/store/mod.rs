//! Remote document collection store.
//!
//! The feed screens treat their backend as an opaque collection API: run a
//! filtered/ordered/limited query, get one document by key, or list a whole
//! collection. [`DocumentStore`] captures that surface; the backends are:
//!
//! - [`FirestoreStore`] - the hosted Firestore REST API
//! - [`MemoryStore`] - in-process collections
//! - [`LocalStore`] - an SQLite mirror for offline browsing
//!
//! All backends share the query semantics documented on [`Query`].

mod firestore;
mod memory;
mod query;
mod sqlite;
mod value;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

pub use firestore::{FirestoreOptions, FirestoreStore};
pub use memory::MemoryStore;
pub use query::{FieldFilter, Query};
pub use sqlite::{DatabaseError, LocalStore};
pub use value::{decode_fields, encode_value, DecodeError};

// ============================================================================
// Error Types
// ============================================================================

/// Failures of the remote collaborator.
///
/// The feed loader never propagates these as faults: they are logged and
/// turned into a state transition (see [`crate::feed::FeedPageState::apply`]).
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response could not be decoded into documents
    #[error("Decode error: {0}")]
    Decode(String),
    /// Local mirror database failure
    #[error("Database error: {0}")]
    Database(String),
    /// Backend cannot serve requests right now
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<DecodeError> for RemoteError {
    fn from(err: DecodeError) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

// ============================================================================
// Document
// ============================================================================

/// A raw document: its key plus an untyped JSON object of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a document from a JSON object. Returns `None` for non-objects.
    pub fn from_value(id: impl Into<String>, value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self::new(id, fields)),
            _ => None,
        }
    }

    /// Field lookup where an explicit `null` reads the same as absence.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Async document collection API consumed by the feed loaders.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a query, returning documents in the query's order.
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, RemoteError>;

    /// Fetch one document by key. `Ok(None)` when it does not exist.
    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, RemoteError>;

    /// Every document of a collection, in key order.
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, RemoteError>;
}

/// A backend chosen at runtime, shared by every loader of a session.
pub type SharedStore = Arc<dyn DocumentStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_treats_null_as_absent() {
        let doc = Document::from_value("c1", json!({ "name": null, "logo": "x" })).unwrap();
        assert!(doc.get("name").is_none());
        assert!(doc.get("missing").is_none());
        assert_eq!(doc.get("logo"), Some(&json!("x")));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Document::from_value("c1", json!([1, 2])).is_none());
    }
}
