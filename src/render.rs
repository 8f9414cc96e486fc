//! Plain-text and JSON output for the CLI.
//!
//! Every string that came from a document is passed through
//! [`strip_control_chars`] before it reaches the terminal.
use serde::Serialize;
use std::io::{self, Write};

use crate::feed::{CategorySection, ChannelDetail, FeedPageState};
use crate::model::{Category, Channel, Region};
use crate::nav::NavigationTarget;
use crate::util::{fit_to_width, format_count, strip_control_chars, truncate_to_width};

const NAME_WIDTH: usize = 24;
const SHOW_WIDTH: usize = 28;
const REGION_WIDTH: usize = 13;
const LIVE_MARKER: &str = "●";

/// Write `value` as pretty JSON followed by a newline.
pub fn write_json<T: Serialize>(out: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

fn clean(s: &str) -> String {
    strip_control_chars(s).into_owned()
}

fn channel_row(out: &mut impl Write, channel: &Channel) -> io::Result<()> {
    let live = if channel.is_live { LIVE_MARKER } else { " " };
    writeln!(
        out,
        "{live} {} {} {} {:>9}  {}",
        fit_to_width(&clean(&channel.name), NAME_WIDTH),
        fit_to_width(&clean(&channel.current_show), SHOW_WIDTH),
        fit_to_width(channel.region.label(), REGION_WIDTH),
        format_count(channel.viewers),
        clean(&channel.id),
    )
}

/// Home feed: one block per category section.
pub fn render_home(out: &mut impl Write, sections: &[CategorySection]) -> io::Result<()> {
    if sections.is_empty() {
        return writeln!(out, "No channels available.");
    }
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(
            out,
            "{}  ({})",
            clean(&section.category.title),
            NavigationTarget::category(&section.category)
        )?;
        for channel in &section.channels {
            channel_row(out, channel)?;
        }
    }
    Ok(())
}

pub fn render_categories(out: &mut impl Write, categories: &[Category]) -> io::Result<()> {
    if categories.is_empty() {
        return writeln!(out, "No categories.");
    }
    for category in categories {
        writeln!(out, "{:>6}  {}", clean(&category.id), clean(&category.title))?;
    }
    Ok(())
}

/// JSON shape of a category feed.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedView<'a> {
    pub category_id: &'a str,
    pub region_filter: Region,
    pub loaded: usize,
    pub cursor_key: Option<&'a str>,
    pub exhausted: bool,
    pub items: Vec<&'a Channel>,
}

impl<'a> FeedView<'a> {
    pub fn new(state: &'a FeedPageState, visible: &'a [Channel]) -> Self {
        Self {
            category_id: state.category_id(),
            region_filter: state.region_filter(),
            loaded: state.items().len(),
            cursor_key: state.cursor_key(),
            exhausted: state.is_exhausted(),
            items: visible.iter().collect(),
        }
    }
}

/// Category feed: visible rows plus a pagination footer.
pub fn render_feed(out: &mut impl Write, state: &FeedPageState) -> io::Result<()> {
    let visible = state.visible_items();
    if state.items().is_empty() {
        writeln!(out, "No channels in this category.")?;
    } else if visible.is_empty() {
        writeln!(out, "No channels in {}.", state.region_filter())?;
    }
    for channel in visible.iter() {
        channel_row(out, channel)?;
    }

    let mut footer = format!("{} loaded", state.items().len());
    if state.region_filter() != Region::All {
        footer.push_str(&format!(", {} in {}", visible.len(), state.region_filter()));
    }
    // No cursor means nothing to continue from.
    footer.push_str(if state.is_exhausted() || state.cursor_key().is_none() {
        ", end of feed"
    } else {
        ", more available"
    });
    writeln!(out, "-- {footer}")
}

/// Channel detail: header, schedule, stream and related channels.
pub fn render_channel(out: &mut impl Write, detail: &ChannelDetail) -> io::Result<()> {
    let channel = &detail.channel;
    let live = if channel.is_live { " [LIVE]" } else { "" };
    writeln!(out, "{}{live}", clean(&channel.name))?;
    if channel.has_show_information() {
        writeln!(out, "Now: {}", clean(&channel.current_show))?;
    }
    writeln!(
        out,
        "{} viewers · {}",
        format_count(channel.viewers),
        channel.region
    )?;
    if let Some(rating) = channel.rating {
        writeln!(out, "Rating: {rating:.1}")?;
    }
    if !channel.tags.is_empty() {
        let tags: Vec<String> = channel.tags.iter().map(|t| clean(t)).collect();
        writeln!(out, "Tags: {}", tags.join(", "))?;
    }
    if !channel.description.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", clean(&channel.description))?;
    }

    if let Some(schedule) = &channel.schedule {
        writeln!(out)?;
        writeln!(out, "Schedule")?;
        let active = channel.active_schedule_index();
        for (i, entry) in schedule.iter().enumerate() {
            let marker = if Some(i) == active { ">" } else { " " };
            writeln!(out, "{marker} {}  {}", clean(&entry.time), clean(&entry.title))?;
        }
    }

    match detail.stream_url() {
        Some(url) => writeln!(out, "\nStream: {url}")?,
        None => writeln!(out, "\nNo stream available.")?,
    }

    if !detail.related.is_empty() {
        writeln!(out)?;
        writeln!(out, "Related")?;
        for show in &detail.related {
            let live = if show.is_live { LIVE_MARKER } else { " " };
            writeln!(
                out,
                "{live} {} {:>9}  {}",
                fit_to_width(&clean(&show.title), SHOW_WIDTH),
                format_count(show.views),
                truncate_to_width(&NavigationTarget::related(show).to_string(), 60),
            )?;
        }
    }
    Ok(())
}
