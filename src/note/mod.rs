//! In-memory model of one document's text.
//!
//! A [Note] is built from the full text of a document and the field definitions that apply to it.
//! It is discarded and rebuilt whenever the text changes; every edit it performs re-parses its own
//! rendered text, so lines, nodes and indexed paths always describe the current text.
//!
//! ```rust
//! use fieldnote_core::{config::Settings, field::{Field, FieldType}, note::{FieldPayload, InsertPosition, Note}};
//!
//! let settings = Settings::default();
//! let status = Field::new("status", FieldType::Select).with_id("st");
//! let mut note = Note::new("Task.md", "---\ntitle: X\n---\nbody", vec![status], &settings);
//! note.create_or_update_fields(&[FieldPayload::new("st", "done")], InsertPosition::Auto);
//! assert_eq!(note.render(), "---\ntitle: X\nstatus: done\n---\nbody");
//! ```
use serde::{Deserialize, Serialize};

use crate::{
    config::Settings,
    diagnostic::Diagnostic,
    error::FieldnoteError,
    field::{Field, FieldType},
    paths::{is_descendant_path, INDEXED_PATH_SEPARATOR},
};

pub mod line;
pub mod render;
pub mod value;

pub use line::{parse_lines, Delimiter, Line, LineNode, Region};
pub use render::render_node_content;

use line::HEADER_DELIMITER;
use value::{is_bullet, split_items};

/// Payload key prefix for a plain `name: value` pair that no definition claims.
pub const NEW_FIELD_PREFIX: &str = "new-field-";
/// Payload key prefix for the file class attribute, written as the first header row.
pub const FILECLASS_FIELD_PREFIX: &str = "fileclass-field-";

/// A zero based (row, column) position in the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

/// Where [Note::insert_field] puts a field that doesn't exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPosition {
    /// End of the header block when there is one, otherwise end of the document
    #[default]
    Auto,
    /// Before the line starting at this physical row
    Line(usize),
    /// End of the header block, creating an empty one if needed
    Header,
}

/// One value to write into a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPayload {
    /// Field id, or a `new-field-`/`fileclass-field-` synthetic key
    pub id: String,
    /// Target a specific occurrence; the first occurrence of `id` otherwise
    #[serde(default)]
    pub indexed_path: Option<String>,
    pub value: String,
    /// Number of related documents behind the previous value (lookup writes only)
    #[serde(default)]
    pub previous_items_count: usize,
}

impl FieldPayload {
    pub fn new(id: &str, value: &str) -> FieldPayload {
        FieldPayload {
            id: id.to_string(),
            indexed_path: None,
            value: value.to_string(),
            previous_items_count: 0,
        }
    }

    pub fn at(mut self, indexed_path: &str) -> FieldPayload {
        self.indexed_path = Some(indexed_path.to_string());
        self
    }
}

/// A resolved field occurrence present in the note.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingField {
    pub field: Field,
    pub value: String,
    pub indexed_path: String,
    pub region: Region,
    /// Physical row of the occurrence
    pub line: usize,
}

impl ExistingField {
    pub fn name(&self) -> &str {
        &self.field.name
    }

    /// The last segment of the indexed path.
    pub fn indexed_id(&self) -> &str {
        self.indexed_path
            .rsplit(INDEXED_PATH_SEPARATOR)
            .next()
            .unwrap_or(&self.indexed_path)
    }

    pub fn is_root(&self) -> bool {
        self.indexed_id() == self.indexed_path
    }
}

fn indent_of(text: &str) -> usize {
    text.len() - text.trim_start_matches([' ', '\t']).len()
}

/// Where a new child line goes below an existing or freshly written ancestor.
#[derive(Debug, Clone, Copy)]
struct ParentSlot {
    kind: FieldType,
    /// Indentation of the child rows (of the `- ` marker for object lists)
    child_indent: usize,
}

impl ParentSlot {
    fn new(kind: FieldType, column: usize) -> ParentSlot {
        ParentSlot {
            kind,
            child_indent: column + 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Note<'a> {
    path: String,
    fields: Vec<Field>,
    settings: &'a Settings,
    lines: Vec<Line>,
    /// The document ends its lines with `\r\n`
    crlf: bool,
}

impl<'a> Note<'a> {
    pub fn new(path: &str, content: &str, fields: Vec<Field>, settings: &'a Settings) -> Note<'a> {
        let lines = parse_lines(content, &fields);
        Note {
            path: path.to_string(),
            fields,
            settings,
            lines,
            crlf: content.contains("\r\n"),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// The full document text.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.raw_content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn reparse(&mut self) {
        let text = self.render();
        self.lines = parse_lines(&text, &self.fields);
    }

    /// Rendered text with its row breaks in the document's line ending.
    fn with_line_ending(&self, content: String) -> String {
        if self.crlf {
            content.replace('\n', "\r\n")
        } else {
            content
        }
    }

    /// Insert a synthesized line before line `at`, ending it the way the document does.
    fn insert_line(&mut self, at: usize, region: Region, content: String) {
        let content = self.with_line_ending(content);
        if !self.crlf {
            self.lines.insert(at, Line::new(0, region, content));
        } else if at < self.lines.len() {
            self.lines.insert(at, Line::new(0, region, format!("{content}\r")));
        } else {
            if let Some(last) = self.lines.last_mut() {
                if !last.raw_content.ends_with('\r') {
                    last.raw_content.push('\r');
                }
            }
            self.lines.push(Line::new(0, region, content));
        }
    }

    /// Index into `lines` of the header's closing delimiter.
    fn header_closing_index(&self) -> Option<usize> {
        match self.lines.first() {
            Some(first) if first.region == Region::Header => self
                .lines
                .iter()
                .rposition(|l| l.region == Region::Header),
            _ => None,
        }
    }

    pub fn has_header(&self) -> bool {
        self.header_closing_index().is_some()
    }

    /// Row of the header's closing delimiter.
    pub fn header_end(&self) -> Option<usize> {
        self.header_closing_index().map(|idx| self.lines[idx].number)
    }

    /// Every node with the line holding it.
    pub fn nodes(&self) -> impl Iterator<Item = (&Line, &LineNode)> {
        self.lines
            .iter()
            .flat_map(|line| line.nodes.iter().map(move |node| (line, node)))
    }

    fn locate<P: Fn(&LineNode) -> bool>(&self, predicate: P) -> Option<(usize, usize)> {
        self.lines.iter().enumerate().find_map(|(li, line)| {
            line.nodes
                .iter()
                .position(|node| predicate(node))
                .map(|ni| (li, ni))
        })
    }

    pub fn existing_fields(&self) -> Vec<ExistingField> {
        self.nodes()
            .filter_map(|(line, node)| {
                let field = node.field.clone()?;
                let indexed_path = node.indexed_path.clone()?;
                Some(ExistingField {
                    value: node.value(line.region, &self.settings.fileclass_alias),
                    field,
                    indexed_path,
                    region: line.region,
                    line: line.number,
                })
            })
            .collect()
    }

    pub fn existing_field_for_indexed_path(&self, indexed_path: &str) -> Option<ExistingField> {
        self.existing_fields()
            .into_iter()
            .find(|ef| ef.indexed_path == indexed_path)
    }

    /// Value of the first occurrence of a field.
    pub fn value_for_field_id(&self, id: &str) -> Option<String> {
        self.nodes()
            .find(|(_, node)| node.field_id() == Some(id))
            .map(|(line, node)| node.value(line.region, &self.settings.fileclass_alias))
    }

    pub fn node_for_field_name(&self, name: &str) -> Option<&LineNode> {
        self.nodes()
            .find(|(_, node)| node.name == name)
            .map(|(_, node)| node)
    }

    pub fn node_for_field_id(&self, id: &str) -> Option<&LineNode> {
        self.nodes()
            .find(|(_, node)| node.field_id() == Some(id))
            .map(|(_, node)| node)
    }

    pub fn node_for_indexed_path(&self, indexed_path: &str) -> Option<&LineNode> {
        self.nodes()
            .find(|(_, node)| node.indexed_path.as_deref() == Some(indexed_path))
            .map(|(_, node)| node)
    }

    /// The node covering a cursor position, if any.
    pub fn node_at_position(&self, position: Position) -> Option<&LineNode> {
        let line = self.lines.iter().find(|l| l.contains_row(position.line))?;
        let offset = line.row_offset(position.line)? + position.ch;
        line.nodes
            .iter()
            .find(|node| node.offset <= offset && offset <= node.end())
    }

    /// File classes declared in the header under the configured alias.
    pub fn file_classes(&self) -> Vec<String> {
        let alias = &self.settings.fileclass_alias;
        self.nodes()
            .find(|(line, node)| line.region == Region::Header && &node.name == alias && node.column == 0)
            .map(|(line, node)| split_items(&node.value(line.region, alias)))
            .unwrap_or_default()
    }

    /// Keys and markers no definition claims. They are preserved verbatim.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.nodes()
            .filter(|(_, node)| !node.is_resolved())
            .map(|(line, node)| Diagnostic::UnresolvedField {
                name: node.name.clone(),
                line: line.number,
            })
            .collect()
    }

    /// Apply a batch of values: existing occurrences are rewritten in place, missing fields are
    /// inserted at `position`. Returns what could not be applied.
    pub fn create_or_update_fields(
        &mut self,
        payload: &[FieldPayload],
        position: InsertPosition,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for item in payload.iter() {
            let target = match item.indexed_path.as_deref() {
                Some(path) => self.locate(|node| node.indexed_path.as_deref() == Some(path)),
                None => self.locate(|node| node.field_id() == Some(item.id.as_str())),
            };
            match target {
                Some((li, ni)) => {
                    let line = &self.lines[li];
                    let node = &line.nodes[ni];
                    let content = self.with_line_ending(render_node_content(
                        node,
                        None,
                        &item.value,
                        line.region,
                        self.settings,
                    ));
                    if content != node.raw {
                        tracing::debug!(
                            "[Note::create_or_update_fields] {}: rewriting '{}' at row {}",
                            self.path,
                            node.name,
                            line.number
                        );
                        self.lines[li].replace_node(ni, content);
                        self.reparse();
                    }
                }
                None => {
                    if let Err(e) = self.insert_field(&item.id, &item.value, position) {
                        tracing::warn!(
                            "[Note::create_or_update_fields] {}: could not insert '{}': {}",
                            self.path,
                            item.id,
                            e
                        );
                        diagnostics.push(Diagnostic::warning(format!(
                            "{}: could not insert '{}': {e}",
                            self.path, item.id
                        )));
                    }
                }
            }
        }
        diagnostics
    }

    fn open_header(&mut self) {
        self.insert_line(0, Region::Header, HEADER_DELIMITER.to_string());
        self.insert_line(0, Region::Header, HEADER_DELIMITER.to_string());
        self.reparse();
    }

    fn insert_index(&self, position: InsertPosition) -> usize {
        match (position, self.header_closing_index()) {
            (InsertPosition::Line(row), closing) => {
                let idx = self
                    .lines
                    .iter()
                    .position(|l| l.number >= row)
                    .unwrap_or(self.lines.len());
                // Never in front of the opening delimiter
                match closing {
                    Some(_) if idx == 0 => 1,
                    _ => idx,
                }
            }
            (_, Some(closing)) => closing,
            (_, None) => match self.lines.last() {
                Some(last) if last.raw_content.is_empty() => self.lines.len() - 1,
                _ => self.lines.len(),
            },
        }
    }

    fn region_for_index(&self, idx: usize) -> Region {
        match self.header_closing_index() {
            Some(closing) if idx >= 1 && idx <= closing => Region::Header,
            _ => Region::Body,
        }
    }

    /// First direct child occurrence of `field` below `parent_path` (or at the root).
    fn find_occurrence(&self, field: &Field, parent_path: Option<&str>) -> Option<(usize, usize)> {
        let depth = |path: &str| path.matches(INDEXED_PATH_SEPARATOR).count();
        self.locate(|node| {
            let Some(path) = node.indexed_path.as_deref() else {
                return false;
            };
            if node.field_id() != Some(field.id.as_str()) {
                return false;
            }
            match parent_path {
                None => path == field.id,
                Some(parent) => is_descendant_path(path, parent) && depth(path) == depth(parent) + 1,
            }
        })
    }

    /// Index of the first line after the nested block owned by line `li`.
    fn subtree_end(&self, li: usize, column: usize) -> usize {
        let closing = self.header_closing_index();
        let mut idx = li + 1;
        while idx < self.lines.len() && Some(idx) != closing {
            let raw = self.lines[idx].raw_content.trim_end_matches('\r');
            if raw.trim().is_empty() {
                break;
            }
            let indent = indent_of(raw);
            if indent > column || (indent == column && is_bullet(raw)) {
                idx += 1;
            } else {
                break;
            }
        }
        idx
    }

    /// The slot under an existing container, following the indentation its children already use.
    fn slot_below(&self, li: usize, kind: FieldType, column: usize) -> ParentSlot {
        let mut slot = ParentSlot::new(kind, column);
        if let Some(next) = self.lines.get(li + 1) {
            let raw = next.raw_content.trim_end_matches('\r');
            let indent = indent_of(raw);
            let nested = indent > column || (kind == FieldType::ObjectList && indent == column && is_bullet(raw));
            if !raw.trim().is_empty() && nested && Some(li + 1) != self.header_closing_index() {
                slot.child_indent = indent;
            }
        }
        slot
    }

    /// Render the line for `field` under `parent`, returning it with its key column.
    fn child_line(
        &self,
        field: &Field,
        parent: Option<ParentSlot>,
        region: Region,
        value: &str,
    ) -> (String, usize) {
        let (prefix, column) = match parent {
            None => (String::new(), 0),
            Some(slot) if slot.kind == FieldType::ObjectList => (
                format!("{}- ", " ".repeat(slot.child_indent)),
                slot.child_indent + 2,
            ),
            Some(slot) => (" ".repeat(slot.child_indent), slot.child_indent),
        };
        let node = LineNode::detached(&field.name, column, Delimiter::Bare, Some(field));
        let content = render_node_content(&node, Some(field), value, region, self.settings);
        (format!("{prefix}{content}"), column)
    }

    /// Insert a field that has no occurrence yet, materializing missing ancestors.
    ///
    /// `key` is a field id or one of the synthetic `new-field-<name>` and
    /// `fileclass-field-<alias>` keys.
    pub fn insert_field(
        &mut self,
        key: &str,
        value: &str,
        position: InsertPosition,
    ) -> Result<(), FieldnoteError> {
        if position == InsertPosition::Header && !self.has_header() {
            self.open_header();
        }

        if let Some(alias) = key.strip_prefix(FILECLASS_FIELD_PREFIX) {
            if !self.has_header() {
                self.open_header();
            }
            let as_input = Field::new(alias, FieldType::Input);
            let node = LineNode::detached(alias, 0, Delimiter::Bare, None);
            let content =
                render_node_content(&node, Some(&as_input), value, Region::Header, self.settings);
            self.insert_line(1, Region::Header, content);
            self.reparse();
            return Ok(());
        }

        let mut cursor = self.insert_index(position);
        let mut region = self.region_for_index(cursor);

        if let Some(name) = key.strip_prefix(NEW_FIELD_PREFIX) {
            let node = LineNode::detached(name, 0, Delimiter::Bare, None);
            let content = render_node_content(&node, None, value, region, self.settings);
            self.insert_line(cursor, region, content);
            self.reparse();
            return Ok(());
        }

        let field = self
            .fields
            .iter()
            .find(|f| f.id == key)
            .cloned()
            .ok_or_else(|| FieldnoteError::UnknownField(key.to_string()))?;
        let ancestors: Vec<Field> = field.ancestors(&self.fields).into_iter().cloned().collect();

        let mut parent: Option<ParentSlot> = None;
        let mut parent_path: Option<String> = None;
        let mut materializing = false;
        for ancestor in ancestors.iter() {
            if !materializing {
                if let Some((li, ni)) = self.find_occurrence(ancestor, parent_path.as_deref()) {
                    let line = &self.lines[li];
                    let node = &line.nodes[ni];
                    region = line.region;
                    parent_path = node.indexed_path.clone();
                    parent = Some(self.slot_below(li, ancestor.kind, node.column));
                    cursor = match ancestor.kind {
                        FieldType::ObjectList => self.subtree_end(li, node.column),
                        _ => li + 1,
                    };
                    continue;
                }
                materializing = true;
            }
            let (content, column) = self.child_line(ancestor, parent, region, "");
            tracing::debug!(
                "[Note::insert_field] {}: adding missing ancestor '{}'",
                self.path,
                ancestor.name
            );
            self.insert_line(cursor, region, content);
            cursor += 1;
            parent = Some(ParentSlot::new(ancestor.kind, column));
        }

        let (content, _) = self.child_line(&field, parent, region, value);
        self.insert_line(cursor, region, content);
        self.reparse();
        Ok(())
    }
}
