use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::value::{decode_fields, encode_value};
use super::{Document, DocumentStore, Query, RemoteError};

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Connection settings for [`FirestoreStore`].
#[derive(Debug)]
pub struct FirestoreOptions {
    /// API root, `https://firestore.googleapis.com` in production.
    pub base_url: Url,
    pub project_id: String,
    pub database_id: String,
    /// Web API key, sent as the `key` query parameter when present.
    pub api_key: Option<SecretString>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries for 429 and 5xx responses.
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry.
    pub retry_base_delay: Duration,
    /// Page size used when listing a whole collection.
    pub list_page_size: usize,
}

impl FirestoreOptions {
    pub fn new(base_url: Url, project_id: impl Into<String>) -> Self {
        Self {
            base_url,
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            list_page_size: 300,
        }
    }
}

/// Document store backed by the Firestore REST API (v1).
///
/// Queries map onto `documents:runQuery` structured queries; key ordering and
/// cursors use the special `__name__` field so pagination follows document
/// keys exactly like the other backends.
#[derive(Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    options: Arc<FirestoreOptions>,
}

#[derive(Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// One element of a `runQuery` response stream. Elements without a document
/// only carry progress metadata (`readTime`, `skippedResults`).
#[derive(Deserialize)]
struct RunQueryItem {
    document: Option<RawDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

impl RawDocument {
    fn into_document(self) -> Result<Document, RemoteError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RemoteError::Decode(format!("invalid document name: {}", self.name)))?
            .to_string();
        Ok(Document::new(id, decode_fields(&self.fields)?))
    }
}

impl FirestoreStore {
    pub fn new(client: reqwest::Client, options: FirestoreOptions) -> Self {
        if options.base_url.scheme() != "https" {
            tracing::warn!(base_url = %options.base_url, "Using non-HTTPS Firestore endpoint");
        }
        Self {
            client,
            options: Arc::new(options),
        }
    }

    /// Resource name of the database's document root.
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.options.project_id, self.options.database_id
        )
    }

    /// Full resource name of a document, as used in `referenceValue` cursors.
    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    /// Build an endpoint URL below `/v1/projects/{p}/databases/{db}/`.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.options.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::Unavailable(format!("invalid base URL: {}", self.options.base_url))
            })?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.options.project_id.as_str(),
                "databases",
                self.options.database_id.as_str(),
            ])
            .extend(segments);

        if let Some(key) = &self.options.api_key {
            url.query_pairs_mut()
                .append_pair("key", key.expose_secret());
        }
        Ok(url)
    }

    /// Translate a [`Query`] into a Firestore `structuredQuery`.
    fn structured_query(&self, query: &Query) -> Value {
        let mut structured = Map::new();
        structured.insert(
            "from".to_string(),
            json!([{ "collectionId": query.collection }]),
        );

        let filters: Vec<Value> = query
            .filters
            .iter()
            .map(|filter| {
                json!({
                    "fieldFilter": {
                        "field": { "fieldPath": filter.field },
                        "op": "EQUAL",
                        "value": encode_value(&filter.value),
                    }
                })
            })
            .collect();
        match filters.len() {
            0 => {}
            1 => {
                structured.insert("where".to_string(), filters[0].clone());
            }
            _ => {
                structured.insert(
                    "where".to_string(),
                    json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
                );
            }
        }

        if query.order_by_key {
            structured.insert(
                "orderBy".to_string(),
                json!([{ "field": { "fieldPath": "__name__" }, "direction": "ASCENDING" }]),
            );
        }

        if let Some(after) = &query.start_after {
            structured.insert(
                "startAt".to_string(),
                json!({
                    "values": [{ "referenceValue": self.document_name(&query.collection, after) }],
                    "before": false,
                }),
            );
        }

        if let Some(limit) = query.limit {
            structured.insert("limit".to_string(), json!(limit));
        }

        json!({ "structuredQuery": structured })
    }

    /// Send a request, retrying 429 and 5xx responses with exponential backoff.
    ///
    /// Any other status is returned to the caller, which decides what a 404
    /// means for its operation.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, RemoteError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(self.options.timeout, build().send())
                .await
                .map_err(|_| RemoteError::Timeout)?
                .map_err(RemoteError::Network)?;

            let status = response.status();
            let retryable =
                status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable {
                return Ok(response);
            }

            if retry_count >= self.options.max_retries {
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return Err(RemoteError::RateLimited(self.options.max_retries));
                }
                return Err(RemoteError::HttpStatus(status.as_u16()));
            }

            let delay = self.options.retry_base_delay * 2u32.pow(retry_count);
            tracing::warn!(
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Firestore request failed, retrying after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status().as_u16()));
        }
        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, RemoteError> {
        let url = self.endpoint(&["documents:runQuery"])?;
        let body = serde_json::to_vec(&self.structured_query(query))
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let response = self
            .send_with_retry(|| {
                self.client
                    .post(url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone())
            })
            .await?;

        let items: Vec<RunQueryItem> = Self::read_json(response).await?;
        let docs = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(RawDocument::into_document)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            collection = %query.collection,
            returned = docs.len(),
            "Firestore query completed"
        );
        Ok(docs)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, RemoteError> {
        let url = self.endpoint(&["documents", collection, id])?;
        let response = self.send_with_retry(|| self.client.get(url.clone())).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: RawDocument = Self::read_json(response).await?;
        raw.into_document().map(Some)
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, RemoteError> {
        let mut docs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.endpoint(&["documents", collection])?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("pageSize", &self.options.list_page_size.to_string());
                if let Some(token) = &page_token {
                    pairs.append_pair("pageToken", token);
                }
            }

            let response = self.send_with_retry(|| self.client.get(url.clone())).await?;
            let page: ListResponse = Self::read_json(response).await?;
            for raw in page.documents {
                docs.push(raw.into_document()?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(docs)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, RemoteError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(RemoteError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(RemoteError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(RemoteError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{
        body_partial_json, method, path, path_regex, query_param, query_param_is_missing,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> FirestoreStore {
        let mut options = FirestoreOptions::new(Url::parse(&server.uri()).unwrap(), "demo");
        options.max_retries = 2;
        options.retry_base_delay = Duration::from_millis(1);
        FirestoreStore::new(reqwest::Client::new(), options)
    }

    fn channel_doc(id: &str, name: &str) -> Value {
        json!({
            "name": format!("projects/demo/databases/(default)/documents/channels/{id}"),
            "fields": {
                "name": { "stringValue": name },
                "category": { "stringValue": "1" }
            }
        })
    }

    #[test]
    fn test_structured_query_for_continuation() {
        let store = FirestoreStore::new(
            reqwest::Client::new(),
            FirestoreOptions::new(Url::parse("https://firestore.googleapis.com").unwrap(), "demo"),
        );
        let query = Query::collection("channels")
            .filter_eq("category", "1")
            .order_by_key()
            .start_after("c10")
            .limit(10);

        assert_eq!(
            store.structured_query(&query),
            json!({
                "structuredQuery": {
                    "from": [{ "collectionId": "channels" }],
                    "where": { "fieldFilter": {
                        "field": { "fieldPath": "category" },
                        "op": "EQUAL",
                        "value": { "stringValue": "1" }
                    } },
                    "orderBy": [{ "field": { "fieldPath": "__name__" }, "direction": "ASCENDING" }],
                    "startAt": {
                        "values": [{ "referenceValue":
                            "projects/demo/databases/(default)/documents/channels/c10" }],
                        "before": false
                    },
                    "limit": 10
                }
            })
        );
    }

    #[test]
    fn test_structured_query_combines_filters() {
        let store = FirestoreStore::new(
            reqwest::Client::new(),
            FirestoreOptions::new(Url::parse("https://firestore.googleapis.com").unwrap(), "demo"),
        );
        let query = Query::collection("channels")
            .filter_eq("category", "1")
            .filter_eq("isLive", true);

        let structured = store.structured_query(&query);
        assert_eq!(
            structured["structuredQuery"]["where"]["compositeFilter"]["op"],
            "AND"
        );
        assert!(structured["structuredQuery"].get("orderBy").is_none());
    }

    #[tokio::test]
    async fn test_run_query_decodes_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"/documents:runQuery$"))
            .and(body_partial_json(json!({ "structuredQuery": { "limit": 2 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "document": channel_doc("c1", "Arte"), "readTime": "2024-01-01T00:00:00Z" },
                { "document": channel_doc("c2", "BBC"), "readTime": "2024-01-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let query = Query::collection("channels")
            .filter_eq("category", "1")
            .order_by_key()
            .limit(2);
        let docs = store.run_query(&query).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "c1");
        assert_eq!(docs[1].fields["name"], "BBC");
    }

    #[tokio::test]
    async fn test_run_query_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "readTime": "2024-01-01T00:00:00Z" }])),
            )
            .mount(&server)
            .await;

        let store = store_for(&server);
        let docs = store
            .run_query(&Query::collection("channels"))
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_get_document_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let doc = store.get_document("channels", "missing").await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_get_document_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/demo/databases/(default)/documents/channels/c7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(channel_doc("c7", "Nova")))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let doc = store.get_document("channels", "c7").await.unwrap().unwrap();
        assert_eq!(doc.id, "c7");
        assert_eq!(doc.fields["name"], "Nova");
    }

    #[tokio::test]
    async fn test_list_documents_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [channel_doc("c1", "A")],
                "nextPageToken": "page-2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [channel_doc("c2", "B")]
            })))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let ids: Vec<String> = store
            .list_documents("channels")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn test_server_error_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // Initial request + 2 retries
            .mount(&server)
            .await;

        let store = store_for(&server);
        let result = store.run_query(&Query::collection("channels")).await;
        match result {
            Err(RemoteError::HttpStatus(500)) => {}
            other => panic!("Expected HttpStatus(500), got {:?}", other.map(|d| d.len())),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_retry_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "document": channel_doc("c1", "A") }
            ])))
            .mount(&server)
            .await;

        let store = store_for(&server);
        let docs = store.run_query(&Query::collection("channels")).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(matches!(
            store.run_query(&Query::collection("channels")).await,
            Err(RemoteError::HttpStatus(403))
        ));
    }

    #[tokio::test]
    async fn test_api_key_sent_as_query_parameter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "web-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(channel_doc("c1", "A")))
            .expect(1)
            .mount(&server)
            .await;

        let mut options = FirestoreOptions::new(Url::parse(&server.uri()).unwrap(), "demo");
        options.api_key = Some(SecretString::from("web-key".to_string()));
        let store = FirestoreStore::new(reqwest::Client::new(), options);

        assert!(store.get_document("channels", "c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(matches!(
            store.run_query(&Query::collection("channels")).await,
            Err(RemoteError::Decode(_))
        ));
    }
}
