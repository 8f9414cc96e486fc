//! Feed page state and its transitions.
//!
//! [`FeedPageState`] is owned by the screen, not the loader. Every transition
//! is a plain method, so the whole lifecycle can be driven without a store:
//!
//! ```text
//! Idle -> Loading -> Ready(items, exhausted) -> LoadingMore -> Ready
//!                    Ready -> Refreshing -> Ready(new items)
//! ```
//!
//! At most one operation is in flight at a time. Starting an operation hands
//! out a [`Ticket`]; a result is only applied while its ticket still matches
//! the state (same category, same generation, same operation). [`reset`] and
//! [`switch_category`] bump the generation, so anything issued before them is
//! discarded on arrival.
//!
//! [`reset`]: FeedPageState::reset
//! [`switch_category`]: FeedPageState::switch_category
use std::borrow::Cow;
use std::collections::HashSet;

use super::projector::filter_by_region;
use super::PreconditionError;
use crate::model::{Channel, Region};
use crate::store::RemoteError;

/// The operation currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Loading,
    LoadingMore,
    Refreshing,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Loading => "initial load",
            Operation::LoadingMore => "load more",
            Operation::Refreshing => "refresh",
        }
    }
}

/// Identifies one issued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    category_id: String,
    generation: u64,
    operation: Operation,
}

impl Ticket {
    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

/// What a screen should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Nothing requested yet.
    Idle,
    Loading,
    /// Items are loaded (possibly none: the empty-result display).
    Ready,
    LoadingMore,
    Refreshing,
    /// The last request failed and there is nothing to show.
    Error,
}

/// Result of applying a response to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Initial load or refresh replaced the items.
    Replaced { count: usize },
    /// A continuation page added new items.
    Appended { added: usize },
    /// A continuation page brought nothing new; the feed is exhausted.
    Exhausted,
    /// The request failed; items are unchanged.
    Failed(Operation),
    /// The ticket no longer matches the state; the response was dropped.
    Stale,
    /// Another operation was in flight, or the feed is exhausted. Nothing was requested.
    Skipped,
}

/// Pagination state of one category feed.
#[derive(Debug, Clone)]
pub struct FeedPageState {
    category_id: String,
    items: Vec<Channel>,
    exhausted: bool,
    region_filter: Region,
    in_flight: Option<Operation>,
    generation: u64,
    loaded: bool,
    failed: bool,
}

impl FeedPageState {
    pub fn new(category_id: impl Into<String>) -> Self {
        Self {
            category_id: category_id.into(),
            items: Vec::new(),
            exhausted: false,
            region_filter: Region::All,
            in_flight: None,
            generation: 0,
            loaded: false,
            failed: false,
        }
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    /// Every loaded item, in key order, ignoring the region filter.
    pub fn items(&self) -> &[Channel] {
        &self.items
    }

    /// Key of the last loaded item. Continuations start strictly after it.
    pub fn cursor_key(&self) -> Option<&str> {
        self.items.last().map(|channel| channel.id.as_str())
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn in_flight(&self) -> Option<Operation> {
        self.in_flight
    }

    pub fn region_filter(&self) -> Region {
        self.region_filter
    }

    /// Change the client-side filter. Never triggers a fetch.
    pub fn set_region_filter(&mut self, region: Region) {
        self.region_filter = region;
    }

    /// Loaded items passing the region filter.
    pub fn visible_items(&self) -> Cow<'_, [Channel]> {
        filter_by_region(&self.items, self.region_filter)
    }

    pub fn status(&self) -> FeedStatus {
        match self.in_flight {
            Some(Operation::Loading) => FeedStatus::Loading,
            Some(Operation::LoadingMore) => FeedStatus::LoadingMore,
            Some(Operation::Refreshing) => FeedStatus::Refreshing,
            None if self.failed && self.items.is_empty() => FeedStatus::Error,
            None if self.loaded => FeedStatus::Ready,
            None => FeedStatus::Idle,
        }
    }

    /// Whether a continuation may be requested now.
    pub fn can_load_more(&self) -> bool {
        !self.exhausted && self.in_flight.is_none()
    }

    // ------------------------------------------------------------------------
    // Starting operations
    // ------------------------------------------------------------------------

    /// Start the initial load. `None` while another operation is in flight.
    pub fn begin_initial(&mut self) -> Option<Ticket> {
        self.begin(Operation::Loading)
    }

    /// Start a continuation.
    ///
    /// With no items loaded there is no cursor, which is a caller error.
    /// Otherwise `Ok(None)` when the request is dropped (in flight or
    /// exhausted).
    pub fn begin_load_more(&mut self) -> Result<Option<Ticket>, PreconditionError> {
        if self.items.is_empty() {
            return Err(PreconditionError::MissingCursor);
        }
        if !self.can_load_more() {
            return Ok(None);
        }
        Ok(self.begin(Operation::LoadingMore))
    }

    /// Start a refresh. Current items stay visible until the result lands.
    pub fn begin_refresh(&mut self) -> Option<Ticket> {
        self.begin(Operation::Refreshing)
    }

    fn begin(&mut self, operation: Operation) -> Option<Ticket> {
        if self.in_flight.is_some() {
            return None;
        }
        self.in_flight = Some(operation);
        Some(Ticket {
            category_id: self.category_id.clone(),
            generation: self.generation,
            operation,
        })
    }

    // ------------------------------------------------------------------------
    // Applying results
    // ------------------------------------------------------------------------

    /// Apply the result of the request identified by `ticket`.
    pub fn apply(
        &mut self,
        ticket: &Ticket,
        result: Result<Vec<Channel>, RemoteError>,
    ) -> PageOutcome {
        if !self.accepts(ticket) {
            return PageOutcome::Stale;
        }
        self.in_flight = None;

        let page = match result {
            Ok(page) => page,
            Err(_) => {
                self.failed = true;
                return PageOutcome::Failed(ticket.operation);
            }
        };
        self.failed = false;

        match ticket.operation {
            Operation::Loading | Operation::Refreshing => {
                self.replace(page);
                PageOutcome::Replaced {
                    count: self.items.len(),
                }
            }
            Operation::LoadingMore => match self.on_page_result(page) {
                0 => PageOutcome::Exhausted,
                added => PageOutcome::Appended { added },
            },
        }
    }

    fn accepts(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation
            && ticket.category_id == self.category_id
            && self.in_flight == Some(ticket.operation)
    }

    /// Append a continuation page, skipping keys already loaded.
    ///
    /// An empty page, or one holding only known keys, marks the feed
    /// exhausted and leaves items untouched. Releases a pending load-more, so
    /// it also completes a [`begin_load_more`](Self::begin_load_more) issued
    /// without going through [`apply`](Self::apply). Returns the number
    /// appended.
    pub fn on_page_result(&mut self, new_items: Vec<Channel>) -> usize {
        if self.in_flight == Some(Operation::LoadingMore) {
            self.in_flight = None;
        }
        let mut seen: HashSet<String> = self.items.iter().map(|c| c.id.clone()).collect();
        let before = self.items.len();
        self.items.extend(
            new_items
                .into_iter()
                .filter(|channel| seen.insert(channel.id.clone())),
        );

        let added = self.items.len() - before;
        if added == 0 {
            self.exhausted = true;
        }
        self.loaded = true;
        added
    }

    /// Page one replaces everything. Exhaustion is only ever decided by a
    /// continuation, so an empty first page leaves the feed open.
    fn replace(&mut self, page: Vec<Channel>) {
        let mut seen = HashSet::new();
        self.items = page
            .into_iter()
            .filter(|channel| seen.insert(channel.id.clone()))
            .collect();
        self.exhausted = false;
        self.loaded = true;
    }

    /// Drop all items and pagination progress, keeping the region filter.
    ///
    /// Any request still in flight becomes stale.
    pub fn reset(&mut self) {
        self.items.clear();
        self.exhausted = false;
        self.in_flight = None;
        self.loaded = false;
        self.failed = false;
        self.generation += 1;
    }

    /// Point the state at another category and start over with no filter.
    pub fn switch_category(&mut self, category_id: impl Into<String>) {
        self.reset();
        self.category_id = category_id.into();
        self.region_filter = Region::All;
    }
}
