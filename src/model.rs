//! View models for the streaming guide.
//!
//! These are the normalized shapes the screens render. Raw documents from the
//! store are mapped into them by [`crate::feed::projector`]; nothing here
//! performs I/O.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Placeholder Literals
// ============================================================================

/// Shown when a channel document has no `name`.
pub const UNNAMED_CHANNEL: &str = "Unnamed Channel";

/// Shown when a channel document has no `logo`.
pub const PLACEHOLDER_LOGO: &str = "https://via.placeholder.com/150x150?text=No+Logo";

/// Shown when a channel document has no `currentShow`.
pub const NO_SHOW_INFORMATION: &str = "No Show Information";

/// Shown when a category document has no `title`.
pub const UNTITLED_CATEGORY: &str = "Untitled Category";

/// Shown when a related channel has neither `currentShow` nor `name`.
pub const UNNAMED_SHOW: &str = "Unnamed Show";

// ============================================================================
// Region
// ============================================================================

/// Broadcast region of a channel.
///
/// The same closed set is used as a document field value and as the
/// client-side filter value. Documents carry the display label
/// (`"North America"`), which is also the serde representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
    #[default]
    #[serde(rename = "All Regions")]
    All,
    Europe,
    Asia,
    Africa,
    Oceania,
    #[serde(rename = "North America")]
    NorthAmerica,
    #[serde(rename = "South America")]
    SouthAmerica,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown region: {0}")]
pub struct RegionParseError(pub String);

impl Region {
    /// Every region, in the order the filter sheet lists them.
    pub const ALL_VARIANTS: [Region; 7] = [
        Region::All,
        Region::Europe,
        Region::Asia,
        Region::Africa,
        Region::Oceania,
        Region::NorthAmerica,
        Region::SouthAmerica,
    ];

    /// Display label, identical to the value stored in documents.
    pub fn label(self) -> &'static str {
        match self {
            Region::All => "All Regions",
            Region::Europe => "Europe",
            Region::Asia => "Asia",
            Region::Africa => "Africa",
            Region::Oceania => "Oceania",
            Region::NorthAmerica => "North America",
            Region::SouthAmerica => "South America",
        }
    }

    /// Lenient lookup accepting display labels (`"North America"`),
    /// upper-snake names (`"NORTH_AMERICA"`) and kebab-case (`"north-america"`).
    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "all" | "all regions" => Some(Region::All),
            "europe" => Some(Region::Europe),
            "asia" => Some(Region::Asia),
            "africa" => Some(Region::Africa),
            "oceania" => Some(Region::Oceania),
            "north america" => Some(Region::NorthAmerica),
            "south america" => Some(Region::SouthAmerica),
            _ => None,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Region {
    type Err = RegionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::from_label(s).ok_or_else(|| RegionParseError(s.to_string()))
    }
}

// ============================================================================
// Channel
// ============================================================================

/// One entry of a channel's programme schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub time: String,
    pub title: String,
}

/// Normalized channel as rendered by the feed and detail screens.
///
/// `id` is always the document key. Fields the source document did not carry
/// hold their placeholder defaults; fields this struct does not know about are
/// kept in `extra` and serialized back out alongside the known ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub logo: String,
    pub description: String,
    pub region: Region,
    pub is_live: bool,
    pub viewers: u64,
    pub current_show: String,
    pub tags: Vec<String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Vec<ScheduleEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Channel {
    /// A channel carrying only defaults, keyed by `id`.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: UNNAMED_CHANNEL.to_string(),
            logo: PLACEHOLDER_LOGO.to_string(),
            description: String::new(),
            region: Region::All,
            is_live: false,
            viewers: 0,
            current_show: NO_SHOW_INFORMATION.to_string(),
            tags: Vec::new(),
            category: String::new(),
            rating: None,
            schedule: None,
            stream_url: None,
            extra: Map::new(),
        }
    }

    /// Index of the schedule entry currently on air.
    ///
    /// An entry is on air when its title equals `current_show`.
    pub fn active_schedule_index(&self) -> Option<usize> {
        self.schedule
            .as_ref()?
            .iter()
            .position(|entry| entry.title == self.current_show)
    }

    /// Whether `current_show` carries real programme information.
    pub fn has_show_information(&self) -> bool {
        !self.current_show.is_empty() && self.current_show != NO_SHOW_INFORMATION
    }
}

// ============================================================================
// Category
// ============================================================================

/// A content category (Popular, Sports, News, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Related Show
// ============================================================================

/// A channel from the same category, shown as a card on the detail screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedShow {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub channel_name: String,
    pub is_live: bool,
    pub views: u64,
}
