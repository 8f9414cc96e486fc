use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: char = '…';

/// Terminal columns occupied by `s`.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Shorten `s` to at most `max_width` columns, ending in `…` when cut.
///
/// Wide characters are never split. Returns the input unchanged when it fits.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    // One column is reserved for the ellipsis.
    let budget = max_width - 1;
    let mut used = 0;
    let mut out = String::with_capacity(s.len().min(max_width * 4));
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// Truncate or right-pad `s` to exactly `width` columns.
///
/// A wide character that would straddle the edge is replaced by padding.
pub fn fit_to_width(s: &str, width: usize) -> String {
    let mut out = truncate_to_width(s, width).into_owned();
    let used = display_width(&out);
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    out
}

/// Remove terminal control characters and escape sequences from remote text.
///
/// Tab and newline survive; carriage returns, other C0/C1 controls, DEL and
/// complete `ESC [ ... final` / `ESC ] ... BEL` sequences are dropped.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(needs_strip) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            if !needs_strip(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            // CSI: parameters and intermediates up to a final byte in @..~
            Some('[') => {
                chars.next();
                for next in chars.by_ref() {
                    if ('@'..='~').contains(&next) {
                        break;
                    }
                }
            }
            // OSC: terminated by BEL or ST (ESC \)
            Some(']') => {
                chars.next();
                while let Some(next) = chars.next() {
                    if next == '\u{7}' {
                        break;
                    }
                    if next == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

fn needs_strip(c: char) -> bool {
    c.is_control() && c != '\t' && c != '\n'
}

/// Integer with `,` thousands separators: `1234567` becomes `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, d) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(d);
    }
    out
}
