use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::model::{Category, Channel};
use crate::store::{RemoteError, SharedStore};

use super::projector::{project_category, project_channel};
use super::query_builder::{QueryBuilder, DEFAULT_SECTION_SIZE};

/// Section queries in flight at once while building the home feed.
pub const DEFAULT_HOME_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct HomeSettings {
    pub categories_collection: String,
    pub channels_collection: String,
    pub section_size: usize,
    pub concurrency: usize,
}

impl Default for HomeSettings {
    fn default() -> Self {
        Self {
            categories_collection: "categories".to_string(),
            channels_collection: "channels".to_string(),
            section_size: DEFAULT_SECTION_SIZE,
            concurrency: DEFAULT_HOME_CONCURRENCY,
        }
    }
}

/// One row of the home feed: a category and its first few channels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySection {
    pub category: Category,
    pub channels: Vec<Channel>,
}

/// Builds the grouped home feed.
#[derive(Clone)]
pub struct HomeLoader {
    store: SharedStore,
    queries: QueryBuilder,
    settings: HomeSettings,
}

impl HomeLoader {
    pub fn new(store: SharedStore, settings: HomeSettings) -> Self {
        Self {
            store,
            queries: QueryBuilder::new(settings.channels_collection.clone()),
            settings,
        }
    }

    /// Every category, in key order.
    pub async fn load_categories(&self) -> Result<Vec<Category>, RemoteError> {
        let docs = self
            .store
            .list_documents(&self.settings.categories_collection)
            .await?;
        Ok(docs.into_iter().map(project_category).collect())
    }

    /// Load the home feed.
    ///
    /// Only a failure to list the categories is an error. Section queries run
    /// with bounded concurrency and come back in category order; a section
    /// whose query fails is logged and left out, as is any section with no
    /// channels.
    pub async fn load_sections(&self) -> Result<Vec<CategorySection>, RemoteError> {
        let categories = self.load_categories().await?;
        let total = categories.len();

        let sections: Vec<CategorySection> = stream::iter(categories)
            .map(|category| self.load_section(category))
            .buffered(self.settings.concurrency.max(1))
            .filter_map(|section| async move { section.filter(|s| !s.channels.is_empty()) })
            .collect()
            .await;

        tracing::info!(
            categories = total,
            sections = sections.len(),
            "Loaded home feed"
        );
        Ok(sections)
    }

    async fn load_section(&self, category: Category) -> Option<CategorySection> {
        let query = match self
            .queries
            .build_section_query(&category.id, self.settings.section_size)
        {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!(category = %category.id, error = %e, "Skipping home section");
                return None;
            }
        };

        match self.store.run_query(&query).await {
            Ok(docs) => Some(CategorySection {
                channels: docs.into_iter().map(project_channel).collect(),
                category,
            }),
            Err(e) => {
                tracing::warn!(
                    category = %category.id,
                    error = %e,
                    "Failed to load home section"
                );
                None
            }
        }
    }
}
