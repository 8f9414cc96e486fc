use serde::Serialize;
use url::Url;

use crate::model::{Channel, RelatedShow};
use crate::store::SharedStore;

use super::projector::{project_channel, project_related_show};
use super::query_builder::{QueryBuilder, DEFAULT_RELATED_LIMIT};
use super::DetailError;

/// Everything the channel detail screen shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDetail {
    pub channel: Channel,
    pub related: Vec<RelatedShow>,
}

impl ChannelDetail {
    /// The channel's stream, if it has one with an http(s) URL.
    pub fn stream_url(&self) -> Option<Url> {
        let raw = self.channel.stream_url.as_deref()?;
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            Ok(url) => {
                tracing::debug!(channel = %self.channel.id, scheme = url.scheme(), "Ignoring non-http stream URL");
                None
            }
            Err(e) => {
                tracing::debug!(channel = %self.channel.id, error = %e, "Ignoring invalid stream URL");
                None
            }
        }
    }
}

/// Loads a single channel and the channels related to it.
#[derive(Clone)]
pub struct DetailLoader {
    store: SharedStore,
    queries: QueryBuilder,
    related_limit: usize,
}

impl DetailLoader {
    pub fn new(store: SharedStore, collection: impl Into<String>) -> Self {
        Self {
            store,
            queries: QueryBuilder::new(collection),
            related_limit: DEFAULT_RELATED_LIMIT,
        }
    }

    pub fn with_related_limit(mut self, limit: usize) -> Self {
        self.related_limit = limit;
        self
    }

    /// Load the channel keyed `id`.
    ///
    /// A missing channel is [`DetailError::NotFound`]. Related channels are
    /// best effort: a failed lookup leaves the list empty.
    pub async fn load(&self, id: &str) -> Result<ChannelDetail, DetailError> {
        if id.is_empty() {
            return Err(DetailError::NotFound { id: String::new() });
        }
        let doc = self
            .store
            .get_document(self.queries.collection(), id)
            .await?
            .ok_or_else(|| DetailError::NotFound { id: id.to_string() })?;

        let channel = project_channel(doc);
        let related = self.load_related(&channel).await;
        Ok(ChannelDetail { channel, related })
    }

    /// Up to `related_limit` channels of the same category, excluding `channel`.
    pub async fn load_related(&self, channel: &Channel) -> Vec<RelatedShow> {
        if channel.category.is_empty() || self.related_limit == 0 {
            return Vec::new();
        }
        let query = match self
            .queries
            .build_related_query(&channel.category, self.related_limit)
        {
            Ok(query) => query,
            Err(e) => {
                tracing::debug!(channel = %channel.id, error = %e, "No related query");
                return Vec::new();
            }
        };

        match self.store.run_query(&query).await {
            Ok(docs) => docs
                .iter()
                .filter(|doc| doc.id != channel.id)
                .take(self.related_limit)
                .map(project_related_show)
                .collect(),
            Err(e) => {
                tracing::warn!(
                    channel = %channel.id,
                    category = %channel.category,
                    error = %e,
                    "Failed to load related channels"
                );
                Vec::new()
            }
        }
    }
}
