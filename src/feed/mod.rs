//! Category and channel feed loading.
//!
//! A feed is the key-ordered, paginated list of channels in one category.
//! The pieces:
//!
//! - [`QueryBuilder`] - category-scoped queries, identical ordering for every page
//! - [`FeedPageState`] - items, cursor, exhaustion and the in-flight operation
//! - [`projector`] - raw documents to view models, client-side region filter
//! - [`FeedLoader`] - drives one feed screen against a [`DocumentStore`]
//! - [`HomeLoader`] - the grouped home feed, one section per category
//! - [`DetailLoader`] - a single channel plus its related channels
//!
//! # Example
//!
//! ```ignore
//! let loader = FeedLoader::new(Arc::new(store), FeedSettings::default());
//! let mut state = FeedPageState::new("1");
//!
//! loader.load_initial(&mut state).await?;
//! while state.cursor_key().is_some() && state.can_load_more() {
//!     loader.load_more(&mut state).await?;
//! }
//! ```
//!
//! [`DocumentStore`]: crate::store::DocumentStore

mod detail;
mod home;
mod loader;
pub mod projector;
mod query_builder;
mod state;

use thiserror::Error;

use crate::store::RemoteError;

pub use detail::{ChannelDetail, DetailLoader};
pub use home::{CategorySection, HomeLoader, HomeSettings, DEFAULT_HOME_CONCURRENCY};
pub use loader::{FeedLoader, FeedSettings, PageRequest, PageResponse};
pub use projector::{
    filter_by_region, project_category, project_channel, project_related_show,
};
pub use query_builder::{
    QueryBuilder, CATEGORY_FIELD, DEFAULT_PAGE_SIZE, DEFAULT_RELATED_LIMIT, DEFAULT_SECTION_SIZE,
};
pub use state::{FeedPageState, FeedStatus, Operation, PageOutcome, Ticket};

/// Invalid feed call. These indicate a caller bug and never reach the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("category id must not be empty")]
    EmptyCategory,
    #[error("page size must be greater than zero")]
    ZeroPageSize,
    #[error("continuation key must not be empty")]
    EmptyCursor,
    #[error("cannot continue a feed that has no loaded items")]
    MissingCursor,
}

/// Failure loading the channel detail screen.
#[derive(Debug, Error)]
pub enum DetailError {
    #[error("Channel not found: {id}")]
    NotFound { id: String },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}
