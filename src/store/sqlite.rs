use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    QueryBuilder, Sqlite, SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use super::{Document, DocumentStore, Query, RemoteError};

// ============================================================================
// Error Types
// ============================================================================

/// Errors opening the local mirror database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of tymax appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    fn is_lock_message(message: &str) -> bool {
        let message = message.to_lowercase();
        message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("sqlite_busy")
            || message.contains("sqlite_locked")
    }

    /// Classify a sqlx error, recognizing SQLite lock conditions.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let message = err.to_string();
        if Self::is_lock_message(&message)
            || message.to_lowercase().contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

fn remote(err: sqlx::Error) -> RemoteError {
    RemoteError::Database(err.to_string())
}

// ============================================================================
// Local Store
// ============================================================================

/// SQLite mirror of remote collections.
///
/// Each document is stored whole as a JSON object, keyed by
/// `(collection, id)`. Collections are replaced atomically by
/// [`LocalStore::mirror_collection`], so offline browsing always sees a
/// consistent snapshot. Queries follow the shared [`Query`] semantics: field
/// filters compare `json_type` and `json_extract`, key ordering uses SQLite's
/// binary collation (byte order, same as the other backends).
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Open (creating if needed) the mirror database and run migrations.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock, `DatabaseError::Migration` if the schema cannot be
    /// created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::OpenOptionsExt;
            let db_path = std::path::Path::new(path);
            if !db_path.exists() && db_path.parent().is_some_and(|p| p.exists()) {
                // Create user-only before SQLite touches it; failures surface at connect.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // Every connection to ":memory:" is a separate database, so keep exactly one alive.
        let in_memory = path == ":memory:";
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .min_connections(if in_memory { 1 } else { 0 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let store = Self { pool };
        store.migrate().await.map_err(|e| {
            if DatabaseError::is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                collection TEXT PRIMARY KEY,
                synced_at INTEGER NOT NULL,
                document_count INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Replace every document of `collection` in one transaction.
    ///
    /// Documents are inserted in the given order, which becomes the natural
    /// order for queries without key ordering.
    pub async fn replace_collection(&self, collection: &str, docs: &[Document]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM documents WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;

        for doc in docs {
            let body = serde_json::to_string(&doc.fields)?;
            sqlx::query("INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(&doc.id)
                .bind(body)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO sync_state (collection, synced_at, document_count)
            VALUES (?, ?, ?)
            ON CONFLICT(collection) DO UPDATE SET
                synced_at = excluded.synced_at,
                document_count = excluded.document_count
        "#,
        )
        .bind(collection)
        .bind(Utc::now().timestamp())
        .bind(docs.len() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(docs.len())
    }

    /// Copy a whole collection from `source` into the mirror.
    pub async fn mirror_collection(
        &self,
        source: &dyn DocumentStore,
        collection: &str,
    ) -> Result<usize> {
        let docs = source
            .list_documents(collection)
            .await
            .with_context(|| format!("Failed to list remote collection '{collection}'"))?;
        let count = self
            .replace_collection(collection, &docs)
            .await
            .with_context(|| format!("Failed to store collection '{collection}'"))?;
        tracing::info!(collection, documents = count, "Mirrored collection");
        Ok(count)
    }

    /// When `collection` was last mirrored, if ever.
    pub async fn last_synced(&self, collection: &str) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT synced_at FROM sync_state WHERE collection = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(ts,)| Utc.timestamp_opt(ts, 0).single()))
    }
}

fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

fn row_to_document((id, body): (String, String)) -> Result<Document, RemoteError> {
    let fields: Map<String, Value> =
        serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(Document::new(id, fields))
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, RemoteError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, body FROM documents WHERE collection = ");
        builder.push_bind(query.collection.clone());

        // json_extract alone equates true with 1 and 10.0 with 10.
        for filter in &query.filters {
            let path = json_path(&filter.field);
            let value = filter.value.to_string();
            builder
                .push(" AND json_type(body, ")
                .push_bind(path.clone())
                .push(") = json_type(")
                .push_bind(value.clone())
                .push(") AND json_extract(body, ")
                .push_bind(path)
                .push(") = json_extract(")
                .push_bind(value)
                .push(", '$')");
        }

        if let Some(after) = &query.start_after {
            builder.push(" AND id > ").push_bind(after.clone());
        }

        builder.push(if query.order_by_key {
            " ORDER BY id ASC"
        } else {
            " ORDER BY rowid"
        });

        if let Some(limit) = query.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = builder
            .build_query_as::<(String, String)>()
            .fetch_all(&self.pool)
            .await
            .map_err(remote)?;

        rows.into_iter().map(row_to_document).collect()
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, RemoteError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, body FROM documents WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(remote)?;

        row.map(row_to_document).transpose()
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, RemoteError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, body FROM documents WHERE collection = ? ORDER BY id")
                .bind(collection)
                .fetch_all(&self.pool)
                .await
                .map_err(remote)?;

        rows.into_iter().map(row_to_document).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn test_store() -> LocalStore {
        LocalStore::open(":memory:").await.unwrap()
    }

    fn channel(id: &str, category: &str) -> Document {
        Document::from_value(id, json!({ "name": format!("Channel {id}"), "category": category }))
            .unwrap()
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_query_filters_and_paginates_by_key() {
        let store = test_store().await;
        let docs = vec![
            channel("c03", "1"),
            channel("c01", "1"),
            channel("c02", "2"),
            channel("c04", "1"),
        ];
        store.replace_collection("channels", &docs).await.unwrap();

        let first = Query::collection("channels")
            .filter_eq("category", "1")
            .order_by_key()
            .limit(2);
        let page = store.run_query(&first).await.unwrap();
        assert_eq!(ids(&page), vec!["c01", "c03"]);

        let next = first.clone().start_after("c03");
        let page = store.run_query(&next).await.unwrap();
        assert_eq!(ids(&page), vec!["c04"]);
    }

    #[tokio::test]
    async fn test_query_without_ordering_uses_insertion_order() {
        let store = test_store().await;
        store
            .replace_collection("channels", &[channel("b", "1"), channel("a", "1")])
            .await
            .unwrap();

        let page = store
            .run_query(&Query::collection("channels"))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_filter_on_boolean_and_number_fields() {
        let store = test_store().await;
        let live = Document::from_value("c1", json!({ "isLive": true, "viewers": 10 })).unwrap();
        let off = Document::from_value("c2", json!({ "isLive": false, "viewers": 10 })).unwrap();
        store.replace_collection("channels", &[live, off]).await.unwrap();

        let query = Query::collection("channels")
            .filter_eq("isLive", true)
            .filter_eq("viewers", 10);
        let page = store.run_query(&query).await.unwrap();
        assert_eq!(ids(&page), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_filter_equality_matches_memory_store() {
        let store = test_store().await;
        let memory = MemoryStore::new();
        let live = Document::from_value("c1", json!({ "isLive": true, "viewers": 10 })).unwrap();
        store
            .replace_collection("channels", std::slice::from_ref(&live))
            .await
            .unwrap();
        memory.insert("channels", live).await;

        let cases = [
            (Query::collection("channels").filter_eq("isLive", 1), 0),
            (Query::collection("channels").filter_eq("viewers", 10.0), 0),
            (Query::collection("channels").filter_eq("viewers", "10"), 0),
            (Query::collection("channels").filter_eq("viewers", 10), 1),
        ];
        for (query, expected) in cases {
            assert_eq!(store.run_query(&query).await.unwrap().len(), expected);
            assert_eq!(memory.run_query(&query).await.unwrap().len(), expected);
        }
    }

    #[tokio::test]
    async fn test_get_document_round_trips_fields() {
        let store = test_store().await;
        let doc = Document::from_value(
            "c1",
            json!({ "name": "Arte", "tags": ["culture"], "rating": 4.5 }),
        )
        .unwrap();
        store
            .replace_collection("channels", std::slice::from_ref(&doc))
            .await
            .unwrap();

        let loaded = store.get_document("channels", "c1").await.unwrap();
        assert_eq!(loaded, Some(doc));
        assert!(store.get_document("channels", "c9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_collection_drops_stale_documents() {
        let store = test_store().await;
        store
            .replace_collection("channels", &[channel("c1", "1"), channel("c2", "1")])
            .await
            .unwrap();
        store
            .replace_collection("channels", &[channel("c3", "1")])
            .await
            .unwrap();

        let docs = store.list_documents("channels").await.unwrap();
        assert_eq!(ids(&docs), vec!["c3"]);
    }

    #[tokio::test]
    async fn test_mirror_collection_from_memory_store() {
        let remote = MemoryStore::new();
        remote
            .insert_value("categories", "2", json!({ "title": "Sports" }))
            .await;
        remote
            .insert_value("categories", "1", json!({ "title": "Popular" }))
            .await;

        let store = test_store().await;
        assert!(store.last_synced("categories").await.unwrap().is_none());

        let count = store.mirror_collection(&remote, "categories").await.unwrap();
        assert_eq!(count, 2);
        assert!(store.last_synced("categories").await.unwrap().is_some());

        let docs = store.list_documents("categories").await.unwrap();
        assert_eq!(ids(&docs), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_mirror_collection_keeps_snapshot_on_remote_failure() {
        let remote = MemoryStore::new();
        remote.insert_value("channels", "c1", json!({})).await;

        let store = test_store().await;
        store.mirror_collection(&remote, "channels").await.unwrap();

        remote.set_offline(Some("network down")).await;
        assert!(store.mirror_collection(&remote, "channels").await.is_err());

        let docs = store.list_documents("channels").await.unwrap();
        assert_eq!(ids(&docs), vec!["c1"]);
    }
}
