//! Tests for the note text model: round trips, targeted edits and insertion

use super::helpers::*;
use crate::{
    config::Settings,
    field::{Field, FieldType, LookupOutput, MultiDisplay},
    note::{FieldPayload, InsertPosition, Note, Position, Region, FILECLASS_FIELD_PREFIX, NEW_FIELD_PREFIX},
};
use test_log::test;

const READING_LIST: &str = "---
fileClass: [book, reading]
status: todo
rating: 4
tags:
  - scifi
  - \"classic\"
meta:
  author: Frank Herbert
refs:
  - title: Dune
    page: 12
  - title: Messiah
    page: 3
summary: |
  Sand.
  Worms.
---
# Dune

status:: [[Reading]] and later (rating:: 5) inline [tags:: a, b]
- item with [unknown:: value]

```
status:: inside a fence
```
> quoted:: line
";

#[test]
fn test_round_trip_is_byte_identical() {
    init_logging();
    let settings = Settings::default();
    let note = Note::new("Dune.md", READING_LIST, reading_fields(), &settings);
    assert_eq!(note.render(), READING_LIST);

    let empty = Note::new("Empty.md", "", reading_fields(), &settings);
    assert_eq!(empty.render(), "");
}

#[test]
fn test_round_trip_survives_unrelated_edit() {
    let settings = Settings::default();
    let mut note = Note::new("Dune.md", READING_LIST, reading_fields(), &settings);
    note.create_or_update_fields(&[FieldPayload::new("st", "done")], InsertPosition::Auto);
    let expected = READING_LIST.replacen("status: todo", "status: done", 1);
    assert_eq!(note.render(), expected);
}

#[test]
fn test_existing_fields_and_indexed_paths() {
    let settings = Settings::default();
    let note = Note::new("Dune.md", READING_LIST, reading_fields(), &settings);
    let paths: Vec<String> = note
        .existing_fields()
        .into_iter()
        .map(|ef| ef.indexed_path)
        .collect();
    assert_eq!(
        paths,
        vec![
            "st", "rt", "tg", "mt", "mt____au", "rf", "rf[0]____ti", "rf[0]____pg", "rf[1]____ti",
            "rf[1]____pg", "st[1]", "rt[1]", "tg[1]"
        ]
    );
    // Same field id, two occurrences, two nodes
    let first = note.existing_field_for_indexed_path("rf[0]____ti").unwrap();
    let second = note.existing_field_for_indexed_path("rf[1]____ti").unwrap();
    assert_eq!(first.field.id, second.field.id);
    assert_eq!(first.value, "Dune");
    assert_eq!(second.value, "Messiah");
    assert_eq!(second.indexed_id(), "ti");
    assert!(!second.is_root());
    assert!(note.existing_field_for_indexed_path("st").unwrap().is_root());
    assert_eq!(note.value_for_field_id("tg").unwrap(), "scifi, classic");
}

#[test]
fn test_repeated_root_field_is_addressable() {
    let settings = Settings::default();
    let text = "---\nstatus: a\n---\nstatus:: inline\n";
    let mut note = Note::new("N.md", text, reading_fields(), &settings);
    let paths: Vec<String> = note
        .existing_fields()
        .into_iter()
        .map(|ef| ef.indexed_path)
        .collect();
    assert_eq!(paths, vec!["st", "st[1]"]);
    let second = note.existing_field_for_indexed_path("st[1]").unwrap();
    assert!(second.is_root());
    assert_eq!(second.region, Region::Body);
    assert_eq!(second.value, "inline");
    assert_eq!(note.node_for_indexed_path("st[1]").unwrap().name, "status");

    note.create_or_update_fields(&[FieldPayload::new("st", "b").at("st[1]")], InsertPosition::Auto);
    assert_eq!(note.render(), "---\nstatus: a\n---\nstatus:: b\n");
    note.create_or_update_fields(&[FieldPayload::new("st", "c").at("st")], InsertPosition::Auto);
    assert_eq!(note.render(), "---\nstatus: c\n---\nstatus:: b\n");
}

#[test]
fn test_crlf_documents_keep_their_line_endings() {
    let settings = Settings::default();
    let text = "---\r\nstatus: a\r\ntitle: X\r\n---\r\nbody\r\n";
    let mut note = Note::new("N.md", text, reading_fields(), &settings);
    assert_eq!(note.render(), text);
    assert_eq!(note.value_for_field_id("st").unwrap(), "a");
    assert_eq!(note.node_for_field_id("st").unwrap().raw, "status: a");

    note.create_or_update_fields(&[FieldPayload::new("st", "b")], InsertPosition::Auto);
    assert_eq!(note.render(), "---\r\nstatus: b\r\ntitle: X\r\n---\r\nbody\r\n");

    note.create_or_update_fields(&[FieldPayload::new("rt", "4")], InsertPosition::Auto);
    assert_eq!(
        note.render(),
        "---\r\nstatus: b\r\ntitle: X\r\nrating: 4\r\n---\r\nbody\r\n"
    );
    assert_eq!(note.value_for_field_id("rt").unwrap(), "4");
}

#[test]
fn test_crlf_block_list_rows() {
    let settings = Settings {
        frontmatter_list_display: MultiDisplay::AsList,
        ..Default::default()
    };
    let text = "---\r\ntags: [a]\r\n---\r\n";
    let mut note = Note::new("N.md", text, reading_fields(), &settings);
    note.create_or_update_fields(&[FieldPayload::new("tg", "a, b")], InsertPosition::Auto);
    assert_eq!(note.render(), "---\r\ntags:\r\n  - a\r\n  - b\r\n---\r\n");
    assert_eq!(note.value_for_field_id("tg").unwrap(), "a, b");
}

#[test]
fn test_values_by_region() {
    let settings = Settings::default();
    let note = Note::new("Dune.md", READING_LIST, reading_fields(), &settings);
    let body_status = note
        .existing_fields()
        .into_iter()
        .find(|ef| ef.region == Region::Body && ef.field.id == "st")
        .unwrap();
    assert_eq!(body_status.value, "[[Reading]] and later");
    let node = note.node_for_indexed_path("rf[1]____pg").unwrap();
    assert_eq!(node.name, "page");
    assert_eq!(note.node_for_field_id("au").unwrap().value_text().trim(), "Frank Herbert");
    assert!(note.node_for_field_name("summary").is_some());
    assert_eq!(note.file_classes(), vec!["book", "reading"]);
}

#[test]
fn test_unresolved_fields_are_kept() {
    let settings = Settings::default();
    let note = Note::new("Dune.md", READING_LIST, reading_fields(), &settings);
    let unresolved: Vec<String> = note
        .diagnostics()
        .into_iter()
        .filter(|d| d.is_unresolved_field())
        .map(|d| d.to_string())
        .collect();
    assert_eq!(unresolved.len(), 4);
    assert!(unresolved.iter().any(|d| d.contains("'unknown'")));
    assert!(unresolved.iter().any(|d| d.contains("'quoted'")));
    assert!(!unresolved.iter().any(|d| d.contains("inside a fence")));
}

#[test]
fn test_node_at_position() {
    let settings = Settings::default();
    let note = Note::new("Dune.md", READING_LIST, reading_fields(), &settings);
    let row = READING_LIST
        .lines()
        .position(|l| l.starts_with("status:: [[Reading]]"))
        .unwrap();
    let line = READING_LIST.lines().nth(row).unwrap();
    let rating = line.find("rating").unwrap();
    let node = note
        .node_at_position(Position {
            line: row,
            ch: rating + 2,
        })
        .unwrap();
    assert_eq!(node.name, "rating");
    // Inside the multi-row tags line
    let node = note.node_at_position(Position { line: 5, ch: 4 }).unwrap();
    assert_eq!(node.name, "tags");
    assert!(note.node_at_position(Position { line: row + 1, ch: 0 }).is_none());
}

#[test]
fn test_insert_status_at_header_end() {
    let settings = Settings::default();
    let fields = vec![Field::new("status", FieldType::Select).with_id("st")];
    let mut note = Note::new("X.md", "---\ntitle: X\n---\nSome body.\n", fields, &settings);
    let diagnostics =
        note.create_or_update_fields(&[FieldPayload::new("st", "active")], InsertPosition::Auto);
    assert!(diagnostics.is_empty());
    assert_eq!(note.render(), "---\ntitle: X\nstatus: active\n---\nSome body.\n");
    assert_eq!(note.header_end(), Some(3));
}

#[test]
fn test_ancestor_materialization_in_empty_document() {
    let settings = Settings::default();

    let mut body = Note::new("Empty.md", "", nested_fields(), &settings);
    body.create_or_update_fields(&[FieldPayload::new("c", "deep")], InsertPosition::Auto);
    assert_eq!(body.render(), "a::\n  b::\n    c:: deep\n");
    assert_eq!(body.lines().len(), 4);
    let ef = body.existing_field_for_indexed_path("a____b____c").unwrap();
    assert_eq!(ef.value, "deep");
    assert_eq!(ef.region, Region::Body);

    let mut header = Note::new("Empty.md", "", nested_fields(), &settings);
    header
        .insert_field("c", "deep", InsertPosition::Header)
        .unwrap();
    assert_eq!(header.render(), "---\na:\n  b:\n    c: deep\n---\n");
    let ef = header.existing_field_for_indexed_path("a____b____c").unwrap();
    assert_eq!(ef.region, Region::Header);
    assert_eq!(ef.line, 3);
}

#[test]
fn test_insertion_reuses_existing_ancestors() {
    let settings = Settings::default();
    let text = "---\na:\n  other: 1\n---\n";
    let mut note = Note::new("N.md", text, nested_fields(), &settings);
    note.insert_field("c", "x", InsertPosition::Auto).unwrap();
    assert_eq!(note.render(), "---\na:\n  b:\n    c: x\n  other: 1\n---\n");

    // The grandchild now has a parent: a second value rewrites it in place
    note.create_or_update_fields(&[FieldPayload::new("c", "y")], InsertPosition::Auto);
    assert_eq!(note.render(), "---\na:\n  b:\n    c: y\n  other: 1\n---\n");
}

#[test]
fn test_insert_into_object_list_item() {
    let settings = Settings::default();
    let text = "---\nrefs:\n  - title: Dune\n---\n";
    let mut note = Note::new("N.md", text, reading_fields(), &settings);
    note.create_or_update_fields(
        &[FieldPayload::new("ti", "Dune Messiah").at("rf[0]____ti")],
        InsertPosition::Auto,
    );
    assert_eq!(note.render(), "---\nrefs:\n  - title: Dune Messiah\n---\n");
}

#[test]
fn test_synthetic_keys() {
    let settings = Settings::default();
    let mut note = Note::new("N.md", "---\ntitle: X\n---\nbody", Vec::new(), &settings);
    note.insert_field(&format!("{NEW_FIELD_PREFIX}mood"), "calm", InsertPosition::Auto)
        .unwrap();
    note.insert_field(
        &format!("{FILECLASS_FIELD_PREFIX}fileClass"),
        "book",
        InsertPosition::Auto,
    )
    .unwrap();
    note.insert_field(&format!("{NEW_FIELD_PREFIX}energy"), "low", InsertPosition::Line(99))
        .unwrap();
    assert_eq!(
        note.render(),
        "---\nfileClass: book\ntitle: X\nmood: calm\n---\nbody\nenergy:: low"
    );
    assert_eq!(note.file_classes(), vec!["book"]);
}

#[test]
fn test_unknown_field_is_reported() {
    let settings = Settings::default();
    let mut note = Note::new("N.md", "body", Vec::new(), &settings);
    let diagnostics =
        note.create_or_update_fields(&[FieldPayload::new("nope", "1")], InsertPosition::Auto);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(note.render(), "body");
}

#[test]
fn test_list_display_follows_settings() {
    let settings = Settings {
        frontmatter_list_display: MultiDisplay::AsList,
        ..Default::default()
    };
    let mut note = Note::new("N.md", "---\ntags: [a]\n---\n", reading_fields(), &settings);
    note.create_or_update_fields(&[FieldPayload::new("tg", "a, b")], InsertPosition::Auto);
    assert_eq!(note.render(), "---\ntags:\n  - a\n  - b\n---\n");
    assert_eq!(note.value_for_field_id("tg").unwrap(), "a, b");
}

#[test]
fn test_body_bullet_lookup_rewrite() {
    let settings = Settings::default();
    let fields = vec![lookup_field("kids", "kd", links(LookupOutput::LinksBulletList))];
    let text = "intro\nkids::\n  - [[A]]\nafter";
    let mut note = Note::new("P.md", text, fields, &settings);
    note.create_or_update_fields(
        &[FieldPayload::new("kd", "[[A]], [[B]], [[C]]")],
        InsertPosition::Auto,
    );
    assert_eq!(
        note.render(),
        "intro\nkids::\n  - [[A]]\n  - [[B]]\n  - [[C]]\nafter"
    );
    assert_eq!(note.value_for_field_id("kd").unwrap(), "[[A]], [[B]], [[C]]");
}
