use crate::model::Channel;
use crate::store::{Query, RemoteError, SharedStore};

use super::projector::project_channel;
use super::query_builder::{QueryBuilder, DEFAULT_PAGE_SIZE};
use super::state::{FeedPageState, PageOutcome, Ticket};
use super::PreconditionError;

/// Collection and page size for one feed screen.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub collection: String,
    pub page_size: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            collection: "channels".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// A validated request, ready to run against the store.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub ticket: Ticket,
    pub query: Query,
}

/// A store response, ready to be applied to the state that issued it.
#[derive(Debug)]
pub struct PageResponse {
    pub ticket: Ticket,
    pub result: Result<Vec<Channel>, RemoteError>,
}

/// Drives a [`FeedPageState`] against a [`DocumentStore`].
///
/// Each operation runs in three phases: `prepare_*` validates and marks the
/// state in flight, [`execute`](Self::execute) talks to the store, and
/// [`apply`](Self::apply) writes the response back. `load_initial`,
/// `load_more` and `refresh` chain the three. Hosts that must stay responsive
/// can spawn `execute` on a cloned loader and send the [`PageResponse`] back
/// over a channel instead.
///
/// Store failures never escape as errors: they are logged and become a
/// [`PageOutcome::Failed`] transition. Only caller bugs surface, as
/// [`PreconditionError`].
#[derive(Clone)]
pub struct FeedLoader {
    store: SharedStore,
    queries: QueryBuilder,
    page_size: usize,
}

impl FeedLoader {
    pub fn new(store: SharedStore, settings: FeedSettings) -> Self {
        Self {
            store,
            queries: QueryBuilder::new(settings.collection),
            page_size: settings.page_size,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Validate and start an initial load. `Ok(None)` when the state is busy.
    pub fn prepare_initial(
        &self,
        state: &mut FeedPageState,
    ) -> Result<Option<PageRequest>, PreconditionError> {
        let query = self
            .queries
            .build_initial_query(state.category_id(), self.page_size)?;
        Ok(state
            .begin_initial()
            .map(|ticket| PageRequest { ticket, query }))
    }

    /// Validate and start a continuation.
    ///
    /// Fails with [`PreconditionError::MissingCursor`] when nothing is
    /// loaded, before any query is built. Otherwise `Ok(None)` when the state
    /// is busy or exhausted.
    pub fn prepare_load_more(
        &self,
        state: &mut FeedPageState,
    ) -> Result<Option<PageRequest>, PreconditionError> {
        let cursor = state
            .cursor_key()
            .ok_or(PreconditionError::MissingCursor)?;
        if !state.can_load_more() {
            return Ok(None);
        }
        let query =
            self.queries
                .build_continuation_query(state.category_id(), self.page_size, cursor)?;
        Ok(state
            .begin_load_more()?
            .map(|ticket| PageRequest { ticket, query }))
    }

    /// Validate and start a refresh. `Ok(None)` when the state is busy.
    pub fn prepare_refresh(
        &self,
        state: &mut FeedPageState,
    ) -> Result<Option<PageRequest>, PreconditionError> {
        let query = self
            .queries
            .build_initial_query(state.category_id(), self.page_size)?;
        Ok(state
            .begin_refresh()
            .map(|ticket| PageRequest { ticket, query }))
    }

    /// Run a prepared request and project the returned documents.
    pub async fn execute(&self, request: PageRequest) -> PageResponse {
        let PageRequest { ticket, query } = request;
        let result = self
            .store
            .run_query(&query)
            .await
            .map(|docs| docs.into_iter().map(project_channel).collect());
        PageResponse { ticket, result }
    }

    /// Apply a response to the state, logging failures and stale results.
    pub fn apply(&self, state: &mut FeedPageState, response: PageResponse) -> PageOutcome {
        let PageResponse { ticket, result } = response;

        if let Err(e) = &result {
            tracing::warn!(
                category = ticket.category_id(),
                operation = ticket.operation().as_str(),
                error = %e,
                "Feed request failed"
            );
        }

        let outcome = state.apply(&ticket, result);
        match outcome {
            PageOutcome::Stale => tracing::debug!(
                category = ticket.category_id(),
                generation = ticket.generation(),
                current_category = state.category_id(),
                "Discarded stale feed response"
            ),
            PageOutcome::Exhausted => tracing::debug!(
                category = ticket.category_id(),
                loaded = state.items().len(),
                "Feed exhausted"
            ),
            _ => {}
        }
        outcome
    }

    /// Load the first page of the state's category.
    pub async fn load_initial(
        &self,
        state: &mut FeedPageState,
    ) -> Result<PageOutcome, PreconditionError> {
        let request = self.prepare_initial(state)?;
        Ok(self.run(state, request).await)
    }

    /// Load the page after the current cursor.
    pub async fn load_more(
        &self,
        state: &mut FeedPageState,
    ) -> Result<PageOutcome, PreconditionError> {
        let request = self.prepare_load_more(state)?;
        Ok(self.run(state, request).await)
    }

    /// Reload page one, replacing the items once it arrives.
    pub async fn refresh(
        &self,
        state: &mut FeedPageState,
    ) -> Result<PageOutcome, PreconditionError> {
        let request = self.prepare_refresh(state)?;
        Ok(self.run(state, request).await)
    }

    async fn run(&self, state: &mut FeedPageState, request: Option<PageRequest>) -> PageOutcome {
        let Some(request) = request else {
            return PageOutcome::Skipped;
        };
        let response = self.execute(request).await;
        self.apply(state, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedStatus, Operation};
    use crate::model::Region;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    async fn seeded(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in (1..=count).rev() {
            store
                .insert_value(
                    "channels",
                    &format!("c{i:02}"),
                    json!({ "name": format!("Channel {i}"), "category": "1" }),
                )
                .await;
        }
        store
            .insert_value("channels", "x01", json!({ "category": "2" }))
            .await;
        store
    }

    fn loader(store: MemoryStore, page_size: usize) -> FeedLoader {
        FeedLoader::new(
            Arc::new(store),
            FeedSettings {
                collection: "channels".to_string(),
                page_size,
            },
        )
    }

    #[tokio::test]
    async fn test_initial_load_is_key_ordered_even_when_stored_out_of_order() {
        let loader = loader(seeded(5).await, 3);
        let mut state = FeedPageState::new("1");

        let outcome = loader.load_initial(&mut state).await.unwrap();
        assert_eq!(outcome, PageOutcome::Replaced { count: 3 });
        let ids: Vec<&str> = state.items().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c01", "c02", "c03"]);
        assert_eq!(state.items()[0].name, "Channel 1");
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let loader = loader(seeded(5).await, 3);
        let mut state = FeedPageState::new("1");
        loader.load_initial(&mut state).await.unwrap();

        assert_eq!(
            loader.load_more(&mut state).await.unwrap(),
            PageOutcome::Appended { added: 2 }
        );
        assert_eq!(
            loader.load_more(&mut state).await.unwrap(),
            PageOutcome::Exhausted
        );
        assert_eq!(
            loader.load_more(&mut state).await.unwrap(),
            PageOutcome::Skipped
        );
        assert_eq!(state.items().len(), 5);
        assert_eq!(state.cursor_key(), Some("c05"));
    }

    #[tokio::test]
    async fn test_load_more_before_initial_fails_fast() {
        let loader = loader(seeded(3).await, 3);
        let mut state = FeedPageState::new("1");
        assert_eq!(
            loader.load_more(&mut state).await,
            Err(PreconditionError::MissingCursor)
        );
        assert_eq!(state.in_flight(), None);
    }

    #[tokio::test]
    async fn test_load_more_on_empty_feed_fails_fast() {
        let store = MemoryStore::new();
        let loader = loader(store, 3);
        let mut state = FeedPageState::new("1");

        assert_eq!(
            loader.load_initial(&mut state).await.unwrap(),
            PageOutcome::Replaced { count: 0 }
        );
        assert!(!state.is_exhausted());
        assert_eq!(
            loader.load_more(&mut state).await,
            Err(PreconditionError::MissingCursor)
        );
        assert_eq!(state.in_flight(), None);
    }

    #[tokio::test]
    async fn test_empty_refresh_leaves_feed_open() {
        let store = seeded(0).await;
        store
            .insert_value("channels", "c01", json!({ "category": "1" }))
            .await;
        let loader = loader(store.clone(), 3);
        let mut state = FeedPageState::new("1");
        loader.load_initial(&mut state).await.unwrap();
        assert_eq!(loader.load_more(&mut state).await.unwrap(), PageOutcome::Exhausted);

        store
            .insert_value("channels", "c01", json!({ "category": "9" }))
            .await;
        assert_eq!(
            loader.refresh(&mut state).await.unwrap(),
            PageOutcome::Replaced { count: 0 }
        );
        assert!(!state.is_exhausted());
        assert_eq!(
            loader.load_more(&mut state).await,
            Err(PreconditionError::MissingCursor)
        );
    }

    #[tokio::test]
    async fn test_empty_category_is_rejected_without_state_change() {
        let loader = loader(seeded(3).await, 3);
        let mut state = FeedPageState::new("");
        assert_eq!(
            loader.load_initial(&mut state).await,
            Err(PreconditionError::EmptyCategory)
        );
        assert_eq!(state.in_flight(), None);
    }

    #[tokio::test]
    async fn test_remote_failure_becomes_failed_outcome() {
        let store = seeded(3).await;
        store.set_offline(Some("down")).await;
        let loader = loader(store, 3);
        let mut state = FeedPageState::new("1");

        let outcome = loader.load_initial(&mut state).await.unwrap();
        assert_eq!(outcome, PageOutcome::Failed(Operation::Loading));
        assert_eq!(state.status(), FeedStatus::Error);
    }

    #[tokio::test]
    async fn test_spawned_execute_applies_through_channel() {
        let loader = loader(seeded(4).await, 2);
        let mut state = FeedPageState::new("1");
        let request = loader.prepare_initial(&mut state).unwrap().unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let worker = loader.clone();
        tokio::spawn(async move {
            let response = worker.execute(request).await;
            let _ = tx.send(response).await;
        });

        // Busy until the response is applied.
        assert!(loader.prepare_refresh(&mut state).unwrap().is_none());

        let response = rx.recv().await.unwrap();
        assert_eq!(
            loader.apply(&mut state, response),
            PageOutcome::Replaced { count: 2 }
        );
    }

    #[tokio::test]
    async fn test_region_filter_does_not_refetch() {
        let store = MemoryStore::new();
        store
            .insert_value("channels", "a", json!({ "category": "1", "region": "Europe" }))
            .await;
        store
            .insert_value("channels", "b", json!({ "category": "1", "region": "Asia" }))
            .await;
        let loader = loader(store.clone(), 10);
        let mut state = FeedPageState::new("1");
        loader.load_initial(&mut state).await.unwrap();

        store.set_offline(Some("down")).await;
        state.set_region_filter(Region::Asia);
        assert_eq!(state.visible_items().len(), 1);
        assert_eq!(state.visible_items()[0].id, "b");
    }
}
