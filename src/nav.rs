//! Navigation targets emitted when the user selects something.
//!
//! The feed code never navigates; it only describes where to go. A target
//! renders as a route such as `/channel?id=c1&channelName=Arte&showName=Docs`.
use serde::Serialize;
use std::fmt;
use url::form_urlencoded;

use crate::model::{Category, Channel, RelatedShow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "camelCase")]
pub enum NavigationTarget {
    #[serde(rename_all = "camelCase")]
    Channel {
        id: String,
        channel_name: String,
        show_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Category {
        category_id: String,
        category_title: String,
    },
}

impl NavigationTarget {
    /// Open a channel from a feed row.
    pub fn channel(channel: &Channel) -> Self {
        NavigationTarget::Channel {
            id: channel.id.clone(),
            channel_name: channel.name.clone(),
            show_name: channel.current_show.clone(),
        }
    }

    /// Open a channel from a related-show card.
    pub fn related(show: &RelatedShow) -> Self {
        NavigationTarget::Channel {
            id: show.id.clone(),
            channel_name: show.channel_name.clone(),
            show_name: show.title.clone(),
        }
    }

    /// Open a category feed from its home section header.
    pub fn category(category: &Category) -> Self {
        NavigationTarget::Category {
            category_id: category.id.clone(),
            category_title: category.title.clone(),
        }
    }

    pub fn screen(&self) -> &'static str {
        match self {
            NavigationTarget::Channel { .. } => "/channel",
            NavigationTarget::Category { .. } => "/category",
        }
    }

    /// Route parameters in a stable order.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        match self {
            NavigationTarget::Channel {
                id,
                channel_name,
                show_name,
            } => vec![
                ("id", id.as_str()),
                ("channelName", channel_name.as_str()),
                ("showName", show_name.as_str()),
            ],
            NavigationTarget::Category {
                category_id,
                category_title,
            } => vec![
                ("categoryId", category_id.as_str()),
                ("categoryTitle", category_title.as_str()),
            ],
        }
    }
}

impl fmt::Display for NavigationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params())
            .finish();
        write!(f, "{}?{}", self.screen(), query)
    }
}
