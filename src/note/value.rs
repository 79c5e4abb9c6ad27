//! Value decoding shared by the parser, the renderer and the lookup engine.
//!
//! Values cross the [Note](super::Note) API as plain strings; multi valued values are joined with
//! `", "`.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{field::FieldType, paths::is_link_or_tag};

static BLOCK_SCALAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[|>][+-]?\d*[+-]?$").unwrap());
static BULLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-(\s+|$)").unwrap());

pub const ITEM_JOINER: &str = ", ";

/// Split a comma separated value, ignoring commas nested in brackets or quotes. Items are trimmed
/// and empty items dropped.
pub fn split_items(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for ch in value.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                // Apostrophes inside words are not quotes
                if ch == '"' || current.trim().is_empty() {
                    quote = Some(ch);
                }
                current.push(ch);
            }
            (None, '[') | (None, '(') | (None, '{') => {
                depth += 1;
                current.push(ch);
            }
            (None, ']') | (None, ')') | (None, '}') => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            (None, ',') if depth == 0 => {
                items.push(std::mem::take(&mut current));
            }
            (None, c) => current.push(c),
        }
    }
    items.push(current);
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn join_items<I: IntoIterator<Item = String>>(items: I) -> String {
    items.into_iter().collect::<Vec<_>>().join(ITEM_JOINER)
}

pub fn is_block_scalar_indicator(value: &str) -> bool {
    BLOCK_SCALAR_RE.is_match(value.trim())
}

pub fn is_bullet(row: &str) -> bool {
    BULLET_RE.is_match(row)
}

/// Strip a leading `- ` bullet marker.
pub fn strip_bullet(row: &str) -> &str {
    let trimmed = row.trim_start();
    trimmed
        .strip_prefix('-')
        .map(|rest| rest.trim_start())
        .unwrap_or(trimmed)
}

/// Decode one YAML scalar into its plain string form.
///
/// Link and tag syntax passes through untouched, quoted scalars are unquoted, flow mappings are
/// re-encoded as JSON. Anything else is returned trimmed, as written.
pub fn decode_scalar(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || is_link_or_tag(raw) {
        return raw.to_string();
    }
    if raw.starts_with('"') || raw.starts_with('\'') {
        if let Ok(serde_yaml::Value::String(s)) = serde_yaml::from_str::<serde_yaml::Value>(raw) {
            return s;
        }
    }
    if raw.starts_with('{') {
        if let Ok(value) = serde_yaml::from_str::<serde_yaml::Value>(raw) {
            if let Ok(json) = serde_json::to_string(&value) {
                return json;
            }
        }
    }
    raw.to_string()
}

/// Remove the common leading indentation of a block of rows.
pub fn dedent(rows: &[&str]) -> String {
    let common = rows
        .iter()
        .filter(|row| !row.trim().is_empty())
        .map(|row| row.len() - row.trim_start().len())
        .min()
        .unwrap_or(0);
    rows.iter()
        .map(|row| if row.len() >= common { &row[common..] } else { row.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode the value text of a header node (everything after `key:`).
///
/// `multi` forces list decoding (the declared type, or a reserved list attribute).
pub fn header_value(value_text: &str, kind: Option<FieldType>, multi: bool) -> String {
    let mut rows = value_text.split('\n').map(|row| row.trim_end_matches('\r'));
    let first = rows.next().unwrap_or("").trim();
    let rest: Vec<&str> = rows.collect();

    if !rest.is_empty() {
        let raw_object = kind.map(|k| k.is_raw_object()).unwrap_or(false);
        if raw_object || is_block_scalar_indicator(first) {
            return match first.is_empty() || is_block_scalar_indicator(first) {
                true => dedent(&rest),
                false => value_text.trim().to_string(),
            };
        }
        if first.is_empty() && rest.iter().all(|row| is_bullet(row)) {
            return join_items(rest.iter().map(|row| decode_scalar(strip_bullet(row))));
        }
        let mut words = vec![first];
        words.extend(rest.iter().map(|row| row.trim()));
        return words
            .into_iter()
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }

    let is_flow_sequence = first.starts_with('[') && !first.starts_with("[[") && first.ends_with(']');
    if is_flow_sequence {
        return join_items(
            split_items(&first[1..first.len() - 1])
                .iter()
                .map(|item| decode_scalar(item)),
        );
    }
    if multi {
        return join_items(split_items(first).iter().map(|item| decode_scalar(item)));
    }
    decode_scalar(first)
}

/// Decode the value text of a body node (everything after `name::`). Bullet rows folded under the
/// marker become list items.
pub fn body_value(value_text: &str) -> String {
    let mut rows = value_text.split('\n').map(|row| row.trim_end_matches('\r'));
    let first = rows.next().unwrap_or("").trim();
    let bullets: Vec<String> = rows
        .filter(|row| is_bullet(row))
        .map(|row| strip_bullet(row).to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if bullets.is_empty() {
        return first.to_string();
    }
    let mut items = split_items(first);
    items.extend(bullets);
    join_items(items)
}
