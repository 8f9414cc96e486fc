use crate::store::Query;

use super::PreconditionError;

/// Page size used by category feeds.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Channels shown per category section on the home feed.
pub const DEFAULT_SECTION_SIZE: usize = 5;

/// Related channels fetched for the detail screen.
pub const DEFAULT_RELATED_LIMIT: usize = 5;

/// Channel field holding the owning category's key.
pub const CATEGORY_FIELD: &str = "category";

/// Builds the category-scoped channel queries.
///
/// Every query it produces orders by document key ascending, so page one and
/// every continuation walk the same total order: the concatenated pages are
/// always a prefix of the category's key-ordered channel list.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    collection: String,
}

impl QueryBuilder {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// First page of a category feed.
    pub fn build_initial_query(
        &self,
        category_id: &str,
        page_size: usize,
    ) -> Result<Query, PreconditionError> {
        self.category_query(category_id, page_size)
    }

    /// The page after `after_key`, which must be a key returned by a prior fetch.
    pub fn build_continuation_query(
        &self,
        category_id: &str,
        page_size: usize,
        after_key: &str,
    ) -> Result<Query, PreconditionError> {
        if after_key.is_empty() {
            return Err(PreconditionError::EmptyCursor);
        }
        Ok(self
            .category_query(category_id, page_size)?
            .start_after(after_key))
    }

    /// One home-feed section: the first `section_size` channels of a category.
    pub fn build_section_query(
        &self,
        category_id: &str,
        section_size: usize,
    ) -> Result<Query, PreconditionError> {
        self.category_query(category_id, section_size)
    }

    /// Channels sharing a category with the one on the detail screen.
    ///
    /// Fetches one extra row so that dropping the channel itself still leaves
    /// `limit` related entries when the category is large enough.
    pub fn build_related_query(
        &self,
        category_id: &str,
        limit: usize,
    ) -> Result<Query, PreconditionError> {
        self.category_query(category_id, limit.saturating_add(1))
    }

    fn category_query(&self, category_id: &str, limit: usize) -> Result<Query, PreconditionError> {
        if category_id.is_empty() {
            return Err(PreconditionError::EmptyCategory);
        }
        if limit == 0 {
            return Err(PreconditionError::ZeroPageSize);
        }
        Ok(Query::collection(self.collection.as_str())
            .filter_eq(CATEGORY_FIELD, category_id)
            .order_by_key()
            .limit(limit))
    }
}
