//! Link field codec.
//!
//! A Joplin note's `source_url` field doubles as a small association record
//! linking the note to entries in other systems. The record is a list of
//! colon-separated segments, each one a reserved prefix followed by a value:
//!
//! ```text
//! papers_1234:dida_63f0c2e1a8b4
//! ```
//!
//! Only two prefixes are known here ([`PAPERS_PREFIX`] and [`DIDA_PREFIX`]).
//! Segments written by anyone else are kept verbatim and in position when the
//! field is rewritten, so a plain URL stored in the field survives a round trip.
//!
//! # Example
//!
//! ```
//! use dida_bridge::link::{decode, encode, DIDA_PREFIX, PAPERS_PREFIX};
//!
//! let raw = encode("papers_42", DIDA_PREFIX, "abc");
//! assert_eq!(raw, "papers_42:dida_abc");
//!
//! let info = decode(&raw);
//! assert_eq!(info.get(PAPERS_PREFIX).map(String::as_str), Some("42"));
//! assert_eq!(info.get(DIDA_PREFIX).map(String::as_str), Some("abc"));
//! ```

use std::collections::BTreeMap;

/// Prefix for the reference-manager namespace.
pub const PAPERS_PREFIX: &str = "papers_";

/// Prefix for the remote task id.
pub const DIDA_PREFIX: &str = "dida_";

/// Prefixes this codec understands.
pub const KNOWN_PREFIXES: [&str; 2] = [PAPERS_PREFIX, DIDA_PREFIX];

/// Segment separator.
const SEPARATOR: char = ':';

/// Returns the known prefix a segment starts with, if any.
fn known_prefix(segment: &str) -> Option<&'static str> {
    KNOWN_PREFIXES
        .iter()
        .copied()
        .find(|prefix| segment.starts_with(prefix))
}

/// Decodes a link field into a map of known prefix to value.
///
/// Segments that do not start with a known prefix are not part of the map.
/// When a prefix appears more than once, the last occurrence wins.
#[must_use]
pub fn decode(raw: &str) -> BTreeMap<&'static str, String> {
    let mut info = BTreeMap::new();
    for segment in raw.split(SEPARATOR) {
        if let Some(prefix) = known_prefix(segment) {
            info.insert(prefix, segment[prefix.len()..].to_string());
        }
    }
    info
}

/// Returns the remote task id stored in a link field.
///
/// A missing or empty `dida_` segment yields `None`.
#[must_use]
pub fn task_id(raw: &str) -> Option<String> {
    decode(raw)
        .remove(DIDA_PREFIX)
        .filter(|value| !value.is_empty())
}

/// Writes `value` under `prefix` and returns the new link field.
///
/// The first segment carrying `prefix` is replaced in place and later
/// duplicates are dropped. If the prefix is absent, the new segment is
/// appended. Every other segment is kept in order. Empty segments are dropped.
#[must_use]
pub fn encode(raw: &str, prefix: &str, value: &str) -> String {
    let replacement = format!("{prefix}{value}");
    let mut replaced = false;
    let mut segments: Vec<&str> = Vec::new();

    for segment in raw.split(SEPARATOR).filter(|s| !s.is_empty()) {
        if segment.starts_with(prefix) {
            if !replaced {
                segments.push(&replacement);
                replaced = true;
            }
            continue;
        }
        segments.push(segment);
    }

    if !replaced {
        segments.push(&replacement);
    }

    segments.join(":")
}
