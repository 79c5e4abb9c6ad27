//! Rendering of node content for a new value.
//!
//! The output replaces a node's `raw` text: it begins with the field name and may span several
//! physical rows (header lists, raw objects, bullet-list lookups). Indentation of continuation
//! rows is derived from the node's key column.
use crate::{
    config::Settings,
    field::{Field, FieldType, MultiDisplay, RESERVED_MULTI_ATTRIBUTES},
    note::{
        line::{Delimiter, LineNode, Region},
        value::split_items,
    },
};

/// Render `name<separator> value` for `node` holding `value`.
///
/// `field` overrides the node's own resolution; unresolved nodes render as plain input fields
/// (or as lists for reserved list attributes in the header).
pub fn render_node_content(
    node: &LineNode,
    field: Option<&Field>,
    value: &str,
    region: Region,
    settings: &Settings,
) -> String {
    let field = field.or(node.field.as_ref());
    match region {
        Region::Header => render_header(&node.name, node.column, field, value, settings),
        Region::Body => render_body(&node.name, node.column, node.delimiter, field, value),
    }
}

fn quote(item: &str) -> String {
    serde_json::Value::String(item.to_string()).to_string()
}

fn needs_quoting(item: &str, in_flow: bool) -> bool {
    if item.trim() != item {
        return true;
    }
    if in_flow && item.contains([',', '[', ']', '{', '}']) {
        return true;
    }
    match serde_yaml::from_str::<serde_yaml::Value>(item) {
        Ok(serde_yaml::Value::String(parsed)) => parsed != item,
        _ => true,
    }
}

/// Render one header scalar so that it reads back as the same string.
pub fn render_value_string(item: &str, kind: FieldType, in_flow: bool) -> String {
    if item.is_empty() {
        return String::new();
    }
    if item.starts_with("[[") {
        return format!("\"{item}\"");
    }
    if item.starts_with('#') {
        return item.to_string();
    }
    let bare = match kind {
        FieldType::Number => item.parse::<f64>().map(|n| n.is_finite()).unwrap_or(false),
        FieldType::Boolean => item == "true" || item == "false",
        _ => false,
    };
    if bare || !needs_quoting(item, in_flow) {
        item.to_string()
    } else {
        quote(item)
    }
}

fn header_kind(name: &str, field: Option<&Field>, settings: &Settings) -> FieldType {
    match field {
        Some(field) => field.kind,
        None if RESERVED_MULTI_ATTRIBUTES.contains(&name) || name == settings.fileclass_alias => {
            FieldType::Multi
        }
        None => FieldType::Input,
    }
}

fn render_header(
    name: &str,
    column: usize,
    field: Option<&Field>,
    value: &str,
    settings: &Settings,
) -> String {
    let kind = header_kind(name, field, settings);
    let child_indent = " ".repeat(column + 2);
    match kind {
        FieldType::Object | FieldType::ObjectList => format!("{name}:"),
        FieldType::Yaml | FieldType::Json => {
            let mut out = format!("{name}:");
            if value.trim().is_empty() {
                return out;
            }
            for row in value.trim_end().lines() {
                out.push('\n');
                out.push_str(&child_indent);
                out.push_str(row);
            }
            out
        }
        FieldType::Multi
        | FieldType::MultiFile
        | FieldType::MultiMedia
        | FieldType::Lookup
        | FieldType::Canvas => {
            let items = split_items(value);
            if items.is_empty() {
                return format!("{name}:");
            }
            let display = field
                .map(|f| f.multi_display(settings.frontmatter_list_display))
                .unwrap_or(settings.frontmatter_list_display);
            let in_flow = display == MultiDisplay::AsArray;
            let rendered: Vec<String> = items
                .iter()
                .map(|item| match kind {
                    FieldType::MultiFile if !item.starts_with('"') => format!("\"{item}\""),
                    _ => render_value_string(item, kind, in_flow),
                })
                .collect();
            match display {
                MultiDisplay::AsArray => format!("{name}: [{}]", rendered.join(", ")),
                MultiDisplay::AsList => {
                    let mut out = format!("{name}:");
                    for item in rendered {
                        out.push('\n');
                        out.push_str(&child_indent);
                        out.push_str("- ");
                        out.push_str(&item);
                    }
                    out
                }
            }
        }
        FieldType::Input
        | FieldType::Number
        | FieldType::Boolean
        | FieldType::Select
        | FieldType::Cycle
        | FieldType::File
        | FieldType::Media
        | FieldType::Date
        | FieldType::DateTime
        | FieldType::Time
        | FieldType::Formula => {
            let value = value.trim();
            if value.is_empty() {
                format!("{name}:")
            } else {
                format!("{name}: {}", render_value_string(value, kind, false))
            }
        }
    }
}

fn render_body(
    name: &str,
    column: usize,
    delimiter: Delimiter,
    field: Option<&Field>,
    value: &str,
) -> String {
    let value = value.trim();
    if value.is_empty() {
        return format!("{name}::");
    }
    let bullets = field
        .and_then(|f| f.lookup_options())
        .map(|o| o.output_type.is_bullet_list())
        .unwrap_or(false);
    if bullets && delimiter == Delimiter::Bare {
        let indent = " ".repeat(column + 2);
        let mut out = format!("{name}::");
        for item in split_items(value) {
            out.push('\n');
            out.push_str(&indent);
            out.push_str("- ");
            out.push_str(&item);
        }
        return out;
    }
    let kind = field.map(|f| f.kind).unwrap_or_default();
    let rendered = if kind.is_multi() {
        split_items(value).join(", ")
    } else if kind == FieldType::Json {
        serde_json::from_str::<serde_json::Value>(value)
            .map(|json| json.to_string())
            .unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    };
    // Body values are single line
    format!("{name}:: {}", rendered.replace('\n', " "))
}
