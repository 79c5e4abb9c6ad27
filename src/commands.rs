//! Host facing operations built on [Note], the registry and the document store.
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use crate::{
    config::Settings,
    diagnostic::Diagnostic,
    error::FieldnoteError,
    field::{Field, FieldType},
    note::{FieldPayload, InsertPosition, Note},
    paths::INDEXED_PATH_SEPARATOR,
    registry::{FieldRegistry, StaticRegistry},
    source::{DocumentStore, RelatedDocument},
};

/// Command interface between a host (editor plugin, CLI) and the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// List the resolved fields present in a document
    GetFields(String),
    /// Update or insert values in one document with a single write
    SetValues(String, Vec<FieldPayload>),
    /// Assign file classes from each document's file class header key
    IndexFileClasses,
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Op::GetFields(path) => write!(f, "GetFields({path})"),
            Op::SetValues(path, payload) => write!(
                f,
                "SetValues({path}: {})",
                payload
                    .iter()
                    .map(|p| p.id.clone())
                    .collect::<Vec<String>>()
                    .join(", ")
            ),
            Op::IndexFileClasses => write!(f, "IndexFileClasses"),
        }
    }
}

/// One field occurrence as reported to hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldReport {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub indexed_path: String,
    pub value: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpResult {
    Fields(Vec<FieldReport>, Vec<Diagnostic>),
    Written(String, Vec<Diagnostic>),
    Indexed(usize),
}

/// Apply an [Op] against a store and registry.
pub async fn execute<S: DocumentStore>(
    op: Op,
    store: &S,
    registry: &StaticRegistry,
    settings: &Settings,
) -> Result<OpResult, FieldnoteError> {
    tracing::debug!("[execute] {}", op);
    match op {
        Op::GetFields(path) => {
            let text = store.read(&path).await?;
            let note = Note::new(&path, &text, registry.fields_for_path(&path), settings);
            Ok(OpResult::Fields(field_reports(&note), note.diagnostics()))
        }
        Op::SetValues(path, payload) => {
            let (text, diagnostics) =
                post_values(store, registry, settings, &path, &payload, InsertPosition::Auto)
                    .await?;
            Ok(OpResult::Written(text, diagnostics))
        }
        Op::IndexFileClasses => Ok(OpResult::Indexed(
            index_file_classes(store, registry, settings).await?,
        )),
    }
}

pub fn field_reports(note: &Note) -> Vec<FieldReport> {
    note.existing_fields()
        .into_iter()
        .map(|ef| FieldReport {
            id: ef.field.id.clone(),
            name: ef.field.name.clone(),
            kind: ef.field.kind,
            indexed_path: ef.indexed_path,
            value: ef.value,
            line: ef.line,
        })
        .collect()
}

/// Read `path`, apply `payload` and write the document back once.
///
/// Returns the new text with whatever could not be applied. Values that fail their field's
/// validation are still written and reported as warnings. Nothing is written when the payload
/// leaves the text unchanged.
pub async fn post_values<S: DocumentStore, R: FieldRegistry>(
    store: &S,
    registry: &R,
    settings: &Settings,
    path: &str,
    payload: &[FieldPayload],
    position: InsertPosition,
) -> Result<(String, Vec<Diagnostic>), FieldnoteError> {
    let text = match store.read(path).await {
        Ok(text) => text,
        Err(FieldnoteError::NotFound(_)) => String::new(),
        Err(e) => return Err(e),
    };
    let fields = registry.fields_for_path(path);
    let mut diagnostics: Vec<Diagnostic> = payload
        .iter()
        .filter_map(|item| {
            let field = fields.iter().find(|f| f.id == item.id)?;
            if field.validate_value(&item.value) {
                return None;
            }
            tracing::warn!(
                "[post_values] {}: '{}' is not a valid {:?} value for '{}'",
                path,
                item.value,
                field.kind,
                field.name
            );
            Some(Diagnostic::warning(format!(
                "{path}: '{}' is not a valid value for '{}'",
                item.value, field.name
            )))
        })
        .collect();
    let mut note = Note::new(path, &text, fields, settings);
    diagnostics.extend(note.create_or_update_fields(payload, position));
    let rendered = note.render();
    if rendered != text {
        store.write(path, rendered.clone()).await?;
    } else {
        tracing::debug!("[post_values] {} unchanged, skipping write", path);
    }
    Ok((rendered, diagnostics))
}

/// Assign every listed document to the file classes named under the file class header key.
///
/// Returns the number of documents assigned to at least one class.
pub async fn index_file_classes<S: DocumentStore>(
    store: &S,
    registry: &StaticRegistry,
    settings: &Settings,
) -> Result<usize, FieldnoteError> {
    let known = registry.list_classes();
    let mut assigned = 0;
    for path in store.list().await? {
        let Ok(text) = store.read(&path).await else {
            continue;
        };
        let classes = Note::new(&path, &text, Vec::new(), settings).file_classes();
        for class in classes.iter().filter(|c| !known.contains(c)) {
            tracing::warn!("{} declares unknown file class '{}'", path, class);
        }
        if !classes.is_empty() {
            registry.assign(&path, classes);
            assigned += 1;
        }
    }
    tracing::info!("[index_file_classes] {} documents assigned", assigned);
    Ok(assigned)
}

fn json_value(field: Option<&Field>, value: &str, multi_attribute: bool) -> serde_json::Value {
    let kind = field.map(|f| f.kind).unwrap_or_default();
    if kind.is_multi() || multi_attribute {
        return serde_json::Value::Array(
            crate::note::value::split_items(value)
                .into_iter()
                .map(serde_json::Value::String)
                .collect(),
        );
    }
    let parsed = match kind {
        FieldType::Number => value.trim().parse::<f64>().ok().map(serde_json::Value::from),
        FieldType::Boolean => value.trim().to_lowercase().parse::<bool>().ok().map(serde_json::Value::Bool),
        FieldType::Json => serde_json::from_str(value).ok(),
        FieldType::Yaml => serde_yaml::from_str(value).ok(),
        _ => None,
    };
    parsed.unwrap_or_else(|| serde_json::Value::String(value.to_string()))
}

/// The top level fields of a document as seen by lookup expressions of other documents.
pub async fn related_document<S: DocumentStore, R: FieldRegistry>(
    store: &S,
    registry: &R,
    settings: &Settings,
    path: &str,
) -> Result<RelatedDocument, FieldnoteError> {
    let text = store.read(path).await?;
    let note = Note::new(path, &text, registry.fields_for_path(path), settings);
    let mut fields = BTreeMap::new();
    for (line, node) in note.nodes() {
        let top_level = match node.indexed_path.as_deref() {
            Some(indexed_path) => !indexed_path.contains(INDEXED_PATH_SEPARATOR),
            None => node.column == 0,
        };
        if !top_level || fields.contains_key(&node.name) {
            continue;
        }
        let value = node.value(line.region, &settings.fileclass_alias);
        let multi_attribute = node.field.is_none()
            && (crate::field::RESERVED_MULTI_ATTRIBUTES.contains(&node.name.as_str())
                || node.name == settings.fileclass_alias);
        fields.insert(
            node.name.clone(),
            json_value(node.field.as_ref(), &value, multi_attribute),
        );
    }
    Ok(RelatedDocument {
        path: path.to_string(),
        fields,
    })
}
