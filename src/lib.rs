//! Streaming-guide feed loader.
//!
//! Browses a channel guide held in a document store: categories, the
//! key-ordered channel feed of each category, and single-channel detail.
//! [`feed`] holds the loaders and page state, [`store`] the backends,
//! [`model`] the view models they produce.

pub mod config;
pub mod feed;
pub mod model;
pub mod nav;
pub mod render;
pub mod store;
pub mod util;
