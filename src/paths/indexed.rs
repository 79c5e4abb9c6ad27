//! Indexed paths: per occurrence addresses of fields inside one document.
//!
//! A top level field occurrence is addressed by its bare field id. Nested occurrences append
//! `____<child id>` to the parent's indexed path, and occurrences inside an object list carry the
//! list item index on the list's own segment:
//!
//! ```text
//! status                 top level field
//! meta____author         child of the object field `meta`
//! refs[0]____title       `title` inside the first item of the object list `refs`
//! refs[1]____title       `title` inside the second item
//! status[1]              a second top level occurrence of `status`
//! ```
//!
//! Equality of indexed paths is plain string equality.
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

use crate::error::FieldnoteError;

pub const INDEXED_PATH_SEPARATOR: &str = "____";

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<id>[^\[\]]+?)(\[(?P<idx>\d+)\])?$").unwrap());

/// One level of an indexed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub field_id: String,
    /// Item index when this segment is an object list holding the next segment.
    pub occurrence: Option<usize>,
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.occurrence {
            Some(idx) => write!(f, "{}[{}]", self.field_id, idx),
            None => write!(f, "{}", self.field_id),
        }
    }
}

/// Whether an id can be embedded in an indexed path without ambiguity.
pub fn is_valid_field_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(INDEXED_PATH_SEPARATOR) && !id.contains(['[', ']'])
}

/// Build the indexed path of an occurrence of `field_id`.
///
/// `parent` is the indexed path of the enclosing occurrence, if any. `occurrence` is the index
/// of the enclosing object list item, and is ignored at the root.
pub fn build_indexed_path(field_id: &str, parent: Option<&str>, occurrence: Option<usize>) -> String {
    match (parent, occurrence) {
        (None, _) => field_id.to_string(),
        (Some(parent), None) => format!("{parent}{INDEXED_PATH_SEPARATOR}{field_id}"),
        (Some(parent), Some(idx)) => format!("{parent}[{idx}]{INDEXED_PATH_SEPARATOR}{field_id}"),
    }
}

pub fn parse_indexed_path(path: &str) -> Result<Vec<PathSegment>, FieldnoteError> {
    if path.is_empty() {
        return Err(FieldnoteError::MalformedIndexedPath(
            "empty indexed path".to_string(),
        ));
    }
    path.split(INDEXED_PATH_SEPARATOR)
        .map(|segment| {
            let caps = SEGMENT_RE
                .captures(segment)
                .ok_or_else(|| FieldnoteError::MalformedIndexedPath(path.to_string()))?;
            let occurrence = match caps.name("idx") {
                Some(idx) => Some(
                    idx.as_str()
                        .parse::<usize>()
                        .map_err(|_| FieldnoteError::MalformedIndexedPath(path.to_string()))?,
                ),
                None => None,
            };
            Ok(PathSegment {
                field_id: caps["id"].to_string(),
                occurrence,
            })
        })
        .collect()
}

/// The field id addressed by an indexed path (its last segment, without an occurrence index).
pub fn indexed_path_field_id(path: &str) -> &str {
    let last = path.rsplit(INDEXED_PATH_SEPARATOR).next().unwrap_or(path);
    last.split('[').next().unwrap_or(last)
}

/// Whether `path` addresses an occurrence nested (at any depth) below `ancestor`.
pub fn is_descendant_path(path: &str, ancestor: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some(rest) => {
            rest.starts_with(INDEXED_PATH_SEPARATOR)
                || (rest.starts_with('[')
                    && rest
                        .find(']')
                        .map(|idx| rest[idx + 1..].starts_with(INDEXED_PATH_SEPARATOR))
                        .unwrap_or(false))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_indexed_path() {
        assert_eq!(build_indexed_path("a1", None, Some(3)), "a1");
        assert_eq!(build_indexed_path("c2", Some("obj"), None), "obj____c2");
        assert_eq!(build_indexed_path("c2", Some("lst"), Some(0)), "lst[0]____c2");
        assert_eq!(
            build_indexed_path("leaf", Some("lst[1]____obj"), None),
            "lst[1]____obj____leaf"
        );
    }

    #[test]
    fn test_distinct_occurrences_do_not_collide() {
        let first = build_indexed_path("c2", Some("lst"), Some(0));
        let second = build_indexed_path("c2", Some("lst"), Some(1));
        assert_ne!(first, second);
        assert_eq!(indexed_path_field_id(&first), indexed_path_field_id(&second));
        assert_eq!(indexed_path_field_id("st[1]"), "st");
    }

    #[test]
    fn test_parse_indexed_path() {
        let segments = parse_indexed_path("lst[12]____obj____leaf").unwrap();
        assert_eq!(
            segments,
            vec![
                PathSegment {
                    field_id: "lst".to_string(),
                    occurrence: Some(12)
                },
                PathSegment {
                    field_id: "obj".to_string(),
                    occurrence: None
                },
                PathSegment {
                    field_id: "leaf".to_string(),
                    occurrence: None
                },
            ]
        );
        let rebuilt = segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(INDEXED_PATH_SEPARATOR);
        assert_eq!(rebuilt, "lst[12]____obj____leaf");

        assert!(parse_indexed_path("").is_err());
        assert!(parse_indexed_path("lst[x]____a").is_err());
        assert!(parse_indexed_path("a________b").is_err());
    }

    #[test]
    fn test_descendants() {
        assert!(is_descendant_path("lst[0]____c", "lst"));
        assert!(is_descendant_path("obj____c____d", "obj____c"));
        assert!(!is_descendant_path("objx____c", "obj"));
        assert!(!is_descendant_path("obj", "obj"));
        assert!(!is_valid_field_id("a____b"));
        assert!(!is_valid_field_id("a[0]"));
        assert!(is_valid_field_id("a_b"));
    }
}
