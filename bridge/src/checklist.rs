//! Checklist line tokenizer.
//!
//! Notes describe their to-do items as markdown checklist lines. Each line may
//! carry an assignee, a start date and tags next to the message:
//!
//! ```text
//! - [ ] @alice Buy milk //2024-05-01 +errand
//! - [x] Call the plumber +home
//! ```
//!
//! # Grammar
//!
//! ```text
//! line    := ws* bullet ' ' '[' state ']' (ws+ rest)? ws*
//! bullet  := '-' | '*' | '+'
//! state   := ' ' | 'x' | 'X'
//! rest    := token (ws+ token)*
//! token   := '@' name     assignee, first token only
//!          | '//' text    start date (the next token when the token is bare)
//!          | '+' name     tag
//!          | word         message
//! ```
//!
//! Message words are re-joined with single spaces. The first date token wins,
//! later ones are kept as message words.
//!
//! # Example
//!
//! ```
//! use dida_bridge::checklist::Checklist;
//!
//! let body = "intro\n- [ ] @alice Buy milk //2024-05-01 +errand\n- [x] Done thing\n";
//! let items: Vec<_> = Checklist::new(body).collect();
//!
//! assert_eq!(items.len(), 2);
//! assert_eq!(items[0].message, "Buy milk");
//! assert_eq!(items[0].assignee.as_deref(), Some("alice"));
//! assert_eq!(items[0].date.as_deref(), Some("2024-05-01"));
//! assert_eq!(items[0].tags, vec!["errand".to_string()]);
//! assert!(!items[0].done);
//! assert!(items[1].done);
//! ```

use std::ops::Range;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Host search query that finds notes likely to contain checklist lines.
pub const SEARCH_QUERY: &str = "\"- [\"";

/// Marker text for an open item.
pub const OPEN_MARKER: &str = "[ ]";

/// Marker text for a finished item.
pub const DONE_MARKER: &str = "[x]";

/// Length in bytes of `"- [ ]"`.
const PREFIX_LEN: usize = 5;

/// One checklist line matched in a note body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    /// Byte range of the line (without its line terminator) in the source text.
    pub span: Range<usize>,
    /// Byte range of the `[ ]` / `[x]` marker in the source text.
    pub marker: Range<usize>,
    /// Whether the marker is checked.
    pub done: bool,
    /// Message text.
    pub message: String,
    /// Assignee name without the leading `@`.
    pub assignee: Option<String>,
    /// Raw date token without the leading `//`.
    pub date: Option<String>,
    /// Tags without the leading `+`, in first-seen order.
    pub tags: Vec<String>,
}

/// Lazy iterator over the checklist lines of a text.
///
/// The iterator is cheap to clone, and cloning it before consuming restarts
/// the scan from the same position.
#[derive(Debug, Clone)]
pub struct Checklist<'a> {
    text: &'a str,
    offset: usize,
}

impl<'a> Checklist<'a> {
    /// Creates an iterator over the checklist lines of `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        Self { text, offset: 0 }
    }
}

impl Iterator for Checklist<'_> {
    type Item = ChecklistItem;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.text.len() {
            let start = self.offset;
            let end = self.text[start..]
                .find('\n')
                .map_or(self.text.len(), |i| start + i);
            self.offset = end + 1;

            let line = self.text[start..end].trim_end_matches('\r');
            if let Some(item) = parse_line(line, start) {
                return Some(item);
            }
        }
        None
    }
}

/// Parses a single line that starts at byte `base` of the source text.
fn parse_line(line: &str, base: usize) -> Option<ChecklistItem> {
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    let bytes = rest.as_bytes();

    if bytes.len() < PREFIX_LEN
        || !matches!(bytes[0], b'-' | b'*' | b'+')
        || bytes[1] != b' '
        || bytes[2] != b'['
        || bytes[4] != b']'
    {
        return None;
    }

    let done = match bytes[3] {
        b' ' => false,
        b'x' | b'X' => true,
        _ => return None,
    };

    let tail = &rest[PREFIX_LEN..];
    if !tail.is_empty() && !tail.starts_with(char::is_whitespace) {
        return None;
    }

    let marker_start = base + indent + 2;
    let mut item = ChecklistItem {
        span: base..base + line.len(),
        marker: marker_start..marker_start + 3,
        done,
        message: String::new(),
        assignee: None,
        date: None,
        tags: Vec::new(),
    };

    let mut words: Vec<&str> = Vec::new();
    let mut tokens = tail.split_whitespace().peekable();

    if let Some(name) = tokens.peek().and_then(|t| t.strip_prefix('@')) {
        if !name.is_empty() {
            item.assignee = Some(name.to_string());
            tokens.next();
        }
    }

    while let Some(token) = tokens.next() {
        if item.date.is_none() {
            if token == "//" {
                if let Some(date) = tokens.next() {
                    item.date = Some(date.to_string());
                }
                continue;
            }
            if let Some(date) = token.strip_prefix("//") {
                item.date = Some(date.to_string());
                continue;
            }
        }

        match token.strip_prefix('+') {
            Some(tag) if !tag.is_empty() => {
                if !item.tags.iter().any(|t| t == tag) {
                    item.tags.push(tag.to_string());
                }
            }
            _ => words.push(token),
        }
    }

    item.message = words.join(" ");
    Some(item)
}

/// Parses a free-text date token into a start date.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DDTHH:MM`, `YYYY-MM-DD` and
/// `YYYY/MM/DD`. Date-only values are taken as midnight UTC. Anything else
/// yields `None`.
#[must_use]
pub fn parse_start_date(token: &str) -> Option<DateTime<Utc>> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(token, "%Y-%m-%dT%H:%M") {
        return Some(dt.and_utc());
    }

    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
