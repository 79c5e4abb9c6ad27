//! Line model and the parser that splits a document into lines and field nodes.
//!
//! A [Line] is one logical line: usually one physical row, but a header key's continuation rows
//! (block lists, block scalars, raw object bodies) and a bullet-list lookup's bullet rows fold
//! into the line that owns them. Joining every line's `raw_content` with `\n` reproduces the
//! document byte for byte.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    field::{Field, FieldType, RESERVED_MULTI_ATTRIBUTES},
    note::value::{body_value, header_value, is_block_scalar_indicator, is_bullet},
    paths::{build_indexed_path, PathSegment},
};

pub const HEADER_DELIMITER: &str = "---";
const HEADER_CLOSERS: &[&str] = &["---", "..."];

static HEADER_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<indent>[ \t]*)(?P<item>-[ \t]+)?(?P<key>[^\s:#"'\[\]{}&*!|>%@,`-][^:]*?)[ \t]*:(?:[ \t]+(?P<value>.*)|[ \t]*)$"#,
    )
    .unwrap()
});
static BODY_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)(?P<quote>(?:>[ \t]?)*)(?P<item>(?:[-*+]|\d+[.)])[ \t]+(?:\[.\][ \t]+)?)?")
        .unwrap()
});
static BARE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<name>[0-9\p{L}_][^:\[\]()]*?)::").unwrap());
static INLINE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[(](?P<name>[0-9\p{L}_][^:\[\]()]*?)::").unwrap());
static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(```|~~~)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Inside the leading `---` delimited block
    Header,
    Body,
}

/// How a body marker is written. Header nodes are always [Delimiter::Bare].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Delimiter {
    /// `name:: value` starting the line (after list or quote prefixes)
    Bare,
    /// `[name:: value]`
    Brackets,
    /// `(name:: value)`
    Parens,
}

/// One field occurrence inside a [Line].
#[derive(Debug, Clone, PartialEq)]
pub struct LineNode {
    /// Byte offset of the node inside the line's raw content
    pub offset: usize,
    /// The node text: `name<separator>[ value]`, excluding any surrounding brackets
    pub raw: String,
    pub name: String,
    /// Byte offset of the value text inside `raw`, just past the separator
    pub value_offset: usize,
    /// Column of the key; children of container fields sit deeper than this
    pub column: usize,
    pub delimiter: Delimiter,
    /// The definition this node resolved to. Unresolved nodes are kept verbatim.
    pub field: Option<Field>,
    pub indexed_path: Option<String>,
}

impl LineNode {
    /// A detached node used to render content for a line that doesn't exist yet.
    pub fn detached(name: &str, column: usize, delimiter: Delimiter, field: Option<&Field>) -> LineNode {
        LineNode {
            offset: 0,
            raw: String::new(),
            name: name.to_string(),
            value_offset: 0,
            column,
            delimiter,
            field: field.cloned(),
            indexed_path: None,
        }
    }

    pub fn value_text(&self) -> &str {
        self.raw.get(self.value_offset..).unwrap_or("")
    }

    pub fn end(&self) -> usize {
        self.offset + self.raw.len()
    }

    pub fn is_resolved(&self) -> bool {
        self.field.is_some()
    }

    pub fn field_id(&self) -> Option<&str> {
        self.field.as_ref().map(|f| f.id.as_str())
    }

    /// Whether an unresolved header key still holds a list (tags and the like).
    fn is_reserved_multi(&self, fileclass_alias: &str) -> bool {
        self.field.is_none()
            && (RESERVED_MULTI_ATTRIBUTES.contains(&self.name.as_str()) || self.name == fileclass_alias)
    }

    /// The decoded value of this node.
    pub fn value(&self, region: Region, fileclass_alias: &str) -> String {
        match region {
            Region::Header => {
                let kind = self.field.as_ref().map(|f| f.kind);
                let multi = kind.map(FieldType::is_multi).unwrap_or(false)
                    || self.is_reserved_multi(fileclass_alias);
                header_value(self.value_text(), kind, multi)
            }
            Region::Body => body_value(self.value_text()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Zero based number of the first physical row of this line
    pub number: usize,
    pub region: Region,
    pub raw_content: String,
    pub nodes: Vec<LineNode>,
}

impl Line {
    pub fn new(number: usize, region: Region, raw_content: String) -> Line {
        Line {
            number,
            region,
            raw_content,
            nodes: Vec::new(),
        }
    }

    /// Number of physical rows covered.
    pub fn span(&self) -> usize {
        self.raw_content.matches('\n').count() + 1
    }

    pub fn contains_row(&self, row: usize) -> bool {
        row >= self.number && row < self.number + self.span()
    }

    pub fn indentation(&self) -> &str {
        let trimmed = self.raw_content.trim_start_matches([' ', '\t']);
        &self.raw_content[..self.raw_content.len() - trimmed.len()]
    }

    /// Byte offset of the start of a physical row inside `raw_content`.
    pub fn row_offset(&self, row: usize) -> Option<usize> {
        if !self.contains_row(row) {
            return None;
        }
        let mut offset = 0;
        for _ in self.number..row {
            offset += self.raw_content[offset..].find('\n')? + 1;
        }
        Some(offset)
    }

    /// Splice new node text into this line in place of node `idx`.
    pub fn replace_node(&mut self, idx: usize, content: String) {
        let Some(node) = self.nodes.get(idx) else {
            return;
        };
        let (start, end) = (node.offset, node.end());
        let separator = match self.region {
            Region::Header => ":",
            Region::Body => "::",
        };
        self.raw_content.replace_range(start..end, &content);
        let old_len = end - start;
        let new_len = content.len();
        let node = &mut self.nodes[idx];
        node.value_offset = content
            .find(separator)
            .map(|idx| idx + separator.len())
            .unwrap_or(content.len());
        node.raw = content;
        for later in self.nodes.iter_mut().skip(idx + 1) {
            later.offset = later.offset + new_len - old_len;
        }
    }
}

/// Index of the row closing the header block, if the document opens with one.
pub fn header_closing_row(rows: &[&str]) -> Option<usize> {
    let first = rows.first()?.trim_start_matches('\u{feff}').trim_end();
    if first != HEADER_DELIMITER {
        return None;
    }
    rows.iter()
        .enumerate()
        .skip(1)
        .find(|(_, row)| HEADER_CLOSERS.contains(&row.trim_end()))
        .map(|(idx, _)| idx)
}

fn indent_of(row: &str) -> usize {
    row.len() - row.trim_start_matches([' ', '\t']).len()
}

/// Matching close bracket for the bracket at byte `open`.
fn matching_close(row: &str, open: usize) -> Option<usize> {
    let bytes = row.as_bytes();
    let opener = bytes[open];
    let closer = if opener == b'[' { b']' } else { b')' };
    let mut depth = 0usize;
    for (idx, byte) in bytes.iter().enumerate().skip(open) {
        if *byte == opener {
            depth += 1;
        } else if *byte == closer {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

/// Open nesting scope while walking down a document.
struct Scope {
    column: usize,
    field: Option<Field>,
    indexed_path: Option<String>,
    /// Current item of an object list scope
    item: Option<usize>,
}

/// Root occurrences seen so far in one document, counted across the header and the body.
///
/// The first occurrence of a root field is addressed by its bare id and later ones by
/// `id[n]`. A repeated object list keeps the bare list path and its items number on from the
/// earlier occurrences.
#[derive(Debug, Default)]
struct RootOccurrences {
    seen: HashMap<String, usize>,
    last_item: HashMap<String, usize>,
}

impl RootOccurrences {
    fn next_path(&mut self, field: &Field) -> String {
        let count = self.seen.entry(field.id.clone()).or_insert(0);
        let occurrence = *count;
        *count += 1;
        if occurrence == 0 || field.kind == FieldType::ObjectList {
            return build_indexed_path(&field.id, None, None);
        }
        PathSegment {
            field_id: field.id.clone(),
            occurrence: Some(occurrence),
        }
        .to_string()
    }
}

/// Pop scopes that `column` closes and resolve `name` against what remains.
fn resolve(
    stack: &mut Vec<Scope>,
    roots: &mut RootOccurrences,
    column: usize,
    is_item: bool,
    name: &str,
    fields: &[Field],
) -> (Option<Field>, Option<String>) {
    while stack.last().map(|s| s.column >= column).unwrap_or(false) {
        stack.pop();
    }
    let mut item_start = None;
    let resolved = match stack.last_mut() {
        None => fields
            .iter()
            .find(|f| f.name == name && f.is_root())
            .map(|f| {
                item_start = roots.last_item.get(&f.id).copied();
                (f.clone(), roots.next_path(f))
            }),
        Some(Scope {
            field: Some(parent),
            indexed_path: Some(parent_path),
            item,
            ..
        }) if parent.kind.is_container() => {
            let occurrence = match parent.kind {
                FieldType::ObjectList => {
                    if is_item || item.is_none() {
                        *item = Some(item.map(|i| i + 1).unwrap_or(0));
                    }
                    if let (Some(idx), true) = (*item, parent_path.as_str() == parent.id) {
                        roots.last_item.insert(parent.id.clone(), idx);
                    }
                    *item
                }
                _ => None,
            };
            let parent = &*parent;
            fields
                .iter()
                .find(|f| f.name == name && f.is_child_of(Some(parent)))
                .map(|f| {
                    (
                        f.clone(),
                        build_indexed_path(&f.id, Some(parent_path), occurrence),
                    )
                })
        }
        // Children of unresolved or scalar keys stay unresolved
        Some(_) => None,
    };
    let (field, indexed_path) = match resolved {
        Some((field, path)) => (Some(field), Some(path)),
        None => (None, None),
    };
    stack.push(Scope {
        column,
        field: field.clone(),
        indexed_path: indexed_path.clone(),
        item: item_start,
    });
    (field, indexed_path)
}

fn is_header_continuation(row: &str, column: usize, first_value: &str, field: Option<&Field>) -> bool {
    let row = row.trim_end_matches('\r');
    if row.trim().is_empty() {
        return false;
    }
    let kind = field.map(|f| f.kind);
    if kind.map(FieldType::is_container).unwrap_or(false) {
        return false;
    }
    let indent = indent_of(row);
    if kind.map(FieldType::is_raw_object).unwrap_or(false) || is_block_scalar_indicator(first_value) {
        return indent > column;
    }
    if HEADER_KEY_RE.is_match(row) {
        return false;
    }
    if first_value.is_empty() {
        return indent > column || (is_bullet(row) && indent >= column);
    }
    indent > column
}

fn is_bullet_lookup(field: Option<&Field>) -> bool {
    field
        .and_then(|f| f.lookup_options())
        .map(|o| o.output_type.is_bullet_list())
        .unwrap_or(false)
}

/// Split `content` into lines, resolving field nodes against `fields`.
pub fn parse_lines(content: &str, fields: &[Field]) -> Vec<Line> {
    let rows: Vec<&str> = content.split('\n').collect();
    let closing = header_closing_row(&rows);
    let mut lines = Vec::new();
    let mut header_stack: Vec<Scope> = Vec::new();
    let mut body_stack: Vec<Scope> = Vec::new();
    let mut roots = RootOccurrences::default();
    let mut in_fence = false;
    let mut idx = 0;

    while idx < rows.len() {
        let row = rows[idx].trim_end_matches('\r');
        let in_header = closing.map(|c| idx <= c).unwrap_or(false);

        if in_header {
            if idx == 0 || Some(idx) == closing {
                lines.push(Line::new(idx, Region::Header, rows[idx].to_string()));
                idx += 1;
                continue;
            }
            let Some(caps) = HEADER_KEY_RE.captures(row) else {
                lines.push(Line::new(idx, Region::Header, rows[idx].to_string()));
                idx += 1;
                continue;
            };
            let Some(key) = caps.name("key") else {
                lines.push(Line::new(idx, Region::Header, rows[idx].to_string()));
                idx += 1;
                continue;
            };
            let column = key.start();
            let name = key.as_str().trim_end().to_string();
            let is_item = caps.name("item").is_some();
            let (field, indexed_path) = resolve(&mut header_stack, &mut roots, column, is_item, &name, fields);
            let first_value = caps.name("value").map(|m| m.as_str().trim()).unwrap_or("");
            let stop = closing.unwrap_or(rows.len());
            let mut end = idx + 1;
            while end < stop && is_header_continuation(rows[end], column, first_value, field.as_ref()) {
                end += 1;
            }
            let raw_content = rows[idx..end].join("\n");
            let raw_end = raw_content.trim_end_matches('\r').len().max(column);
            let value_offset = row[key.end()..]
                .find(':')
                .map(|c| key.end() + c + 1 - column)
                .unwrap_or(raw_end - column);
            let mut line = Line::new(idx, Region::Header, raw_content);
            line.nodes.push(LineNode {
                offset: column,
                raw: line.raw_content[column..raw_end].to_string(),
                name,
                value_offset,
                column,
                delimiter: Delimiter::Bare,
                field,
                indexed_path,
            });
            lines.push(line);
            idx = end;
            continue;
        }

        if FENCE_RE.is_match(row) {
            in_fence = !in_fence;
        }
        if in_fence || FENCE_RE.is_match(row) {
            lines.push(Line::new(idx, Region::Body, rows[idx].to_string()));
            idx += 1;
            continue;
        }

        let prefix = BODY_PREFIX_RE.captures(row);
        let content_start = prefix
            .as_ref()
            .and_then(|p| p.get(0))
            .map(|m| m.end())
            .unwrap_or(0);
        let is_item = prefix.as_ref().and_then(|p| p.name("item")).is_some();
        if row.trim().is_empty() {
            body_stack.clear();
        }

        // Bracketed markers anywhere on the row
        let mut inline: Vec<(usize, usize, String)> = Vec::new();
        let mut pos = 0;
        while let Some(caps) = INLINE_MARKER_RE.captures(&row[pos..]) {
            let Some(whole) = caps.get(0) else { break };
            let open = pos + whole.start();
            match matching_close(row, open) {
                Some(close) => {
                    inline.push((open, close, caps["name"].trim().to_string()));
                    pos = close + 1;
                }
                None => pos = open + 1,
            }
            if pos >= row.len() {
                break;
            }
        }

        let mut nodes = Vec::new();
        let mut end = idx + 1;
        let mut raw_content = rows[idx].to_string();

        let bare = BARE_MARKER_RE
            .captures(&row[content_start..])
            .filter(|_| inline.first().map(|(open, _, _)| *open > content_start).unwrap_or(true));
        if let Some(caps) = bare {
            let name = caps["name"].trim().to_string();
            let value_offset = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let (field, indexed_path) = resolve(&mut body_stack, &mut roots, content_start, is_item, &name, fields);
            let bare_end = inline
                .first()
                .map(|(open, _, _)| *open)
                .unwrap_or(row.len());
            let mut raw = row[content_start..bare_end].trim_end().to_string();

            if inline.is_empty() && is_bullet_lookup(field.as_ref()) {
                let owner_indent = indent_of(row);
                while end < rows.len() {
                    let next = rows[end].trim_end_matches('\r');
                    let next_content = BODY_PREFIX_RE
                        .find(next)
                        .map(|m| &next[m.end()..])
                        .unwrap_or(next);
                    if is_bullet(next) && indent_of(next) > owner_indent && !BARE_MARKER_RE.is_match(next_content) {
                        end += 1;
                    } else {
                        break;
                    }
                }
                if end > idx + 1 {
                    raw_content = rows[idx..end].join("\n");
                    raw = raw_content[content_start..].trim_end_matches('\r').to_string();
                }
            }
            nodes.push(LineNode {
                offset: content_start,
                raw,
                name,
                value_offset,
                column: content_start,
                delimiter: Delimiter::Bare,
                field,
                indexed_path,
            });
        } else if !row.trim().is_empty() {
            while body_stack.last().map(|s| s.column >= content_start).unwrap_or(false) {
                body_stack.pop();
            }
        }

        for (open, close, name) in inline {
            let delimiter = if row.as_bytes()[open] == b'[' {
                Delimiter::Brackets
            } else {
                Delimiter::Parens
            };
            let raw = row[open + 1..close].to_string();
            let value_offset = raw.find("::").map(|c| c + 2).unwrap_or(raw.len());
            let field = fields.iter().find(|f| f.name == name && f.is_root()).cloned();
            let indexed_path = field.as_ref().map(|f| roots.next_path(f));
            nodes.push(LineNode {
                offset: open + 1,
                raw,
                name,
                value_offset,
                column: open + 1,
                delimiter,
                field,
                indexed_path,
            });
        }

        let mut line = Line::new(idx, Region::Body, raw_content);
        line.nodes = nodes;
        lines.push(line);
        idx = end;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{LookupOptions, LookupOutput};

    fn fields() -> Vec<Field> {
        let meta = Field::new("meta", FieldType::Object).with_id("meta");
        let refs = Field::new("refs", FieldType::ObjectList).with_id("refs");
        vec![
            Field::new("status", FieldType::Select).with_id("st"),
            Field::new("tags", FieldType::Multi).with_id("tg"),
            Field::new("author", FieldType::Input).with_id("au").child_of(&meta),
            Field::new("title", FieldType::Input).with_id("ti").child_of(&refs),
            Field::new("kids", FieldType::Lookup)
                .with_id("kd")
                .with_lookup(LookupOptions {
                    output_type: LookupOutput::LinksBulletList,
                    ..Default::default()
                }),
            meta,
            refs,
        ]
    }

    #[test]
    fn test_header_lines_and_folding() {
        let text = "---\nstatus: done\ntags:\n  - a\n  - b\nurl: http://x.org\n---\nbody";
        let lines = parse_lines(text, &fields());
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[2].number, 2);
        assert_eq!(lines[2].span(), 3);
        assert_eq!(lines[2].nodes[0].value(Region::Header, "fileClass"), "a, b");
        assert_eq!(lines[3].nodes[0].name, "url");
        assert!(!lines[3].nodes[0].is_resolved());
        assert_eq!(lines[3].nodes[0].value(Region::Header, "fileClass"), "http://x.org");
        assert_eq!(lines[5].region, Region::Body);
        let rebuilt: Vec<&str> = lines.iter().map(|l| l.raw_content.as_str()).collect();
        assert_eq!(rebuilt.join("\n"), text);
    }

    #[test]
    fn test_nested_indexed_paths() {
        let text = "---\nmeta:\n  author: Ann\nrefs:\n  - title: One\n  - title: Two\n---\n";
        let lines = parse_lines(text, &fields());
        let paths: Vec<String> = lines
            .iter()
            .flat_map(|l| l.nodes.iter())
            .filter_map(|n| n.indexed_path.clone())
            .collect();
        assert_eq!(paths, vec!["meta", "meta____au", "refs", "refs[0]____ti", "refs[1]____ti"]);
    }

    #[test]
    fn test_repeated_root_occurrences() {
        let text = "---\nstatus: a\nrefs:\n  - title: One\n---\nstatus:: b [status:: c]\nrefs::\n  - title:: Two";
        let lines = parse_lines(text, &fields());
        let paths: Vec<String> = lines
            .iter()
            .flat_map(|l| l.nodes.iter())
            .filter_map(|n| n.indexed_path.clone())
            .collect();
        assert_eq!(
            paths,
            vec!["st", "refs", "refs[0]____ti", "st[1]", "st[2]", "refs", "refs[1]____ti"]
        );
    }

    #[test]
    fn test_carriage_returns_stay_outside_nodes() {
        let text = "---\r\nstatus: a\r\ntags:\r\n  - x\r\n---\r\nstatus:: b\r\n";
        let lines = parse_lines(text, &fields());
        assert_eq!(lines[1].nodes[0].raw, "status: a");
        assert_eq!(lines[1].nodes[0].value(Region::Header, "fileClass"), "a");
        assert_eq!(lines[2].nodes[0].value(Region::Header, "fileClass"), "x");
        assert!(!lines[2].nodes[0].raw.ends_with('\r'));
        assert_eq!(lines[4].nodes[0].raw, "status:: b");
        let rebuilt: Vec<&str> = lines.iter().map(|l| l.raw_content.as_str()).collect();
        assert_eq!(rebuilt.join("\n"), text);
    }

    #[test]
    fn test_body_markers() {
        let text = "status:: done\n- tags:: a, b [status:: x] (other:: y)\ntext with no fields";
        let lines = parse_lines(text, &fields());
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].nodes[0].delimiter, Delimiter::Bare);
        assert_eq!(lines[0].nodes[0].value(Region::Body, ""), "done");
        let second = &lines[1].nodes;
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].raw, "tags:: a, b");
        assert_eq!(second[1].raw, "status:: x");
        assert_eq!(second[1].delimiter, Delimiter::Brackets);
        assert_eq!(second[2].delimiter, Delimiter::Parens);
        assert!(second[2].field.is_none());
        assert!(lines[2].nodes.is_empty());
    }

    #[test]
    fn test_bullet_lookup_folds_bullets() {
        let text = "kids::\n  - [[A]]\n  - [[B]]\n- unrelated";
        let lines = parse_lines(text, &fields());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].span(), 3);
        assert_eq!(lines[0].nodes[0].value(Region::Body, ""), "[[A]], [[B]]");
    }

    #[test]
    fn test_markers_in_code_fences_are_ignored() {
        let text = "```\nstatus:: nope\n```\nstatus:: yes";
        let lines = parse_lines(text, &fields());
        assert!(lines[1].nodes.is_empty());
        assert_eq!(lines[3].nodes[0].value(Region::Body, ""), "yes");
    }

    #[test]
    fn test_replace_node_shifts_later_nodes() {
        let text = "[status:: a] and [tags:: b]";
        let mut lines = parse_lines(text, &fields());
        let line = &mut lines[0];
        line.replace_node(0, "status:: longer".to_string());
        assert_eq!(line.raw_content, "[status:: longer] and [tags:: b]");
        let second = &line.nodes[1];
        assert_eq!(&line.raw_content[second.offset..second.end()], "tags:: b");
    }
}
