use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Document, DocumentStore, Query, RemoteError};

/// In-process document store.
///
/// Collections keep documents in insertion order, which is the store's
/// "natural" order for queries without key ordering. Cloning shares the
/// underlying collections.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
    offline: Arc<RwLock<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document. A replaced document keeps its position.
    pub async fn insert(&self, collection: &str, doc: Document) {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|existing| existing.id == doc.id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    /// Insert a document given as a JSON object; non-objects are ignored.
    pub async fn insert_value(&self, collection: &str, id: &str, value: Value) {
        match Document::from_value(id, value) {
            Some(doc) => self.insert(collection, doc).await,
            None => tracing::warn!(collection, id, "Ignoring non-object document"),
        }
    }

    /// Make every subsequent request fail with [`RemoteError::Unavailable`]
    /// (or succeed again with `None`).
    pub async fn set_offline(&self, reason: Option<&str>) {
        *self.offline.write().await = reason.map(str::to_string);
    }

    async fn check_online(&self) -> Result<(), RemoteError> {
        match self.offline.read().await.as_deref() {
            Some(reason) => Err(RemoteError::Unavailable(reason.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, RemoteError> {
        self.check_online().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&query.collection)
            .map(|docs| query.evaluate(docs))
            .unwrap_or_default())
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, RemoteError> {
        self.check_online().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .cloned())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, RemoteError> {
        self.check_online().await?;
        let collections = self.collections.read().await;
        let mut docs = collections.get(collection).cloned().unwrap_or_default();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }
}
