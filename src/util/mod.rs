//! Terminal text helpers used by the renderers.
//!
//! Everything printed from a remote document goes through
//! [`strip_control_chars`] first; column layout uses [`fit_to_width`], which
//! measures with `unicode-width` so CJK titles and emoji line up.

mod text;

pub use text::{display_width, fit_to_width, format_count, strip_control_chars, truncate_to_width};
