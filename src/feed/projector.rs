//! Raw documents to view models.
//!
//! Every function here is pure. Fields are read defensively: a missing field,
//! an explicit `null` and a field of the wrong JSON type all read as absent
//! and fall back to the defaults in [`crate::model`].
use serde_json::{Map, Value};
use std::borrow::Cow;

use crate::model::{
    Category, Channel, Region, RelatedShow, ScheduleEntry, PLACEHOLDER_LOGO, UNNAMED_CHANNEL,
    UNNAMED_SHOW, UNTITLED_CATEGORY,
};
use crate::store::Document;

/// Project a channel document.
///
/// Known fields are taken out of the document and defaulted; whatever is left
/// is carried over in [`Channel::extra`].
pub fn project_channel(doc: Document) -> Channel {
    let Document { id, mut fields } = doc;
    fields.remove("id");

    let mut channel = Channel::placeholder(id);
    if let Some(name) = take_string(&mut fields, "name") {
        channel.name = name;
    }
    if let Some(logo) = take_string(&mut fields, "logo") {
        channel.logo = logo;
    }
    if let Some(description) = take_string(&mut fields, "description") {
        channel.description = description;
    }
    if let Some(region) = take_string(&mut fields, "region").and_then(|r| Region::from_label(&r)) {
        channel.region = region;
    }
    if let Some(Value::Bool(is_live)) = fields.remove("isLive") {
        channel.is_live = is_live;
    }
    if let Some(viewers) = fields.remove("viewers").as_ref().and_then(as_count) {
        channel.viewers = viewers;
    }
    if let Some(current_show) = take_string(&mut fields, "currentShow") {
        channel.current_show = current_show;
    }
    if let Some(Value::Array(tags)) = fields.remove("tags") {
        channel.tags = tags
            .into_iter()
            .filter_map(|tag| match tag {
                Value::String(tag) => Some(tag),
                _ => None,
            })
            .collect();
    }
    if let Some(category) = take_string(&mut fields, "category") {
        channel.category = category;
    }
    channel.rating = fields.remove("rating").as_ref().and_then(Value::as_f64);
    channel.schedule = match fields.remove("schedule") {
        Some(Value::Array(entries)) => Some(entries.iter().filter_map(schedule_entry).collect()),
        _ => None,
    };
    channel.stream_url = take_string(&mut fields, "streamUrl");

    fields.retain(|_, value| !value.is_null());
    channel.extra = fields;
    channel
}

/// Project a category document.
pub fn project_category(doc: Document) -> Category {
    let Document { id, mut fields } = doc;
    fields.remove("id");
    let title = take_string(&mut fields, "title").unwrap_or_else(|| UNTITLED_CATEGORY.to_string());
    fields.retain(|_, value| !value.is_null());
    Category {
        id,
        title,
        extra: fields,
    }
}

/// Project a channel document into a related-show card.
///
/// Unlike [`project_channel`], empty strings fall back too.
pub fn project_related_show(doc: &Document) -> RelatedShow {
    let text = |field: &str| {
        doc.get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    RelatedShow {
        id: doc.id.clone(),
        title: text("currentShow")
            .or_else(|| text("name"))
            .unwrap_or(UNNAMED_SHOW)
            .to_string(),
        thumbnail: text("logo").unwrap_or(PLACEHOLDER_LOGO).to_string(),
        channel_name: text("name").unwrap_or(UNNAMED_CHANNEL).to_string(),
        is_live: doc.get("isLive").and_then(Value::as_bool).unwrap_or(false),
        views: doc.get("viewers").and_then(as_count).unwrap_or(0),
    }
}

/// Client-side region filter.
///
/// [`Region::All`] hands back the input slice itself; any other region keeps
/// the matching items in their original order.
pub fn filter_by_region(items: &[Channel], region: Region) -> Cow<'_, [Channel]> {
    match region {
        Region::All => Cow::Borrowed(items),
        region => Cow::Owned(
            items
                .iter()
                .filter(|channel| channel.region == region)
                .cloned()
                .collect(),
        ),
    }
}

fn take_string(fields: &mut Map<String, Value>, field: &str) -> Option<String> {
    match fields.remove(field) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Non-negative integer count. Whole floats are accepted, since some writers
/// store counters as doubles.
fn as_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

fn schedule_entry(value: &Value) -> Option<ScheduleEntry> {
    Some(ScheduleEntry {
        time: value.get("time")?.as_str()?.to_string(),
        title: value.get("title")?.as_str()?.to_string(),
    })
}
