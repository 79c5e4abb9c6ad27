//! The lookup recomputation pass.
//!
//! One pass walks every lookup instance the [RelatedIndex] knows about, computes the value of
//! the instance from its related documents, compares it with the last value seen for that
//! instance, and batches the changed values per document. All values are computed before the
//! first write is issued, and each touched document is written exactly once.
//!
//! The [LookupIndex] remembers what each instance last computed. Because it is updated whenever
//! an instance is checked (whether or not a write follows), the pass triggered by our own writes
//! finds nothing left to do.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::{
    config::Settings,
    diagnostic::Diagnostic,
    error::FieldnoteError,
    field::{BuiltinSummarizing, Field, LookupOptions, LookupOutput},
    lookup::expr::{compile, format_number, Expr, Scope, Value},
    note::{value::join_items, FieldPayload, InsertPosition, Note},
    paths::DocPath,
    registry::FieldRegistry,
    source::{DocumentStore, RelatedDocument, RelatedIndex},
};

static LOOKUP_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<path>.+)__related__(?P<class>.*)___(?P<id>[^_].*)$").unwrap()
});

/// Placeholder substituted with the summarized field name before a summarizing expression is
/// compiled.
pub const SUMMARIZED_FIELD_PLACEHOLDER: &str = "{{summarizedFieldName}}";

/// The address of one lookup instance: `<path>__related__<fileClass>___<fieldId>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LookupKey {
    pub path: String,
    /// Empty for fields that don't belong to a file class
    pub file_class: String,
    pub field_id: String,
}

impl LookupKey {
    pub fn new(path: &str, file_class: &str, field_id: &str) -> LookupKey {
        LookupKey {
            path: path.to_string(),
            file_class: file_class.to_string(),
            field_id: field_id.to_string(),
        }
    }
}

impl FromStr for LookupKey {
    type Err = FieldnoteError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let caps = LOOKUP_KEY_RE
            .captures(key)
            .ok_or_else(|| FieldnoteError::MalformedIndexedPath(key.to_string()))?;
        Ok(LookupKey {
            path: caps["path"].to_string(),
            file_class: caps["class"].to_string(),
            field_id: caps["id"].to_string(),
        })
    }
}

impl Display for LookupKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}__related__{}___{}",
            self.path, self.file_class, self.field_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupStatus {
    /// The document lags behind the computed value: a write has been issued but has not
    /// completed, or a manual field waits for a forced update
    Changed,
    UpToDate,
}

/// Compare two comma separated values as unordered sets of trimmed items.
///
/// Reordering the items does not count as a change. Empty items are items too, so `a, , b`
/// differs from `a, b`.
pub fn arrays_as_string_are_equal(a: &str, b: &str) -> bool {
    let items = |s: &str| -> BTreeSet<String> { s.split(',').map(|item| item.trim().to_string()).collect() };
    items(a) == items(b)
}

/// Per instance state kept between passes. A full reindex starts over with [LookupIndex::reset].
#[derive(Debug, Default)]
pub struct LookupIndex {
    last_values: BTreeMap<LookupKey, String>,
    last_outputs: BTreeMap<LookupKey, LookupOutput>,
    statuses: BTreeMap<LookupKey, LookupStatus>,
    previous_counts: BTreeMap<LookupKey, usize>,
    expressions: HashMap<String, Result<Expr, FieldnoteError>>,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        tracing::debug!(
            "[LookupIndex] resetting {} cached instances",
            self.last_values.len()
        );
        self.last_values.clear();
        self.last_outputs.clear();
        self.statuses.clear();
        self.previous_counts.clear();
    }

    /// `None` until the instance has been checked once.
    pub fn status(&self, key: &LookupKey) -> Option<LookupStatus> {
        self.statuses.get(key).copied()
    }

    pub fn last_value(&self, key: &LookupKey) -> Option<&str> {
        self.last_values.get(key).map(String::as_str)
    }

    pub fn last_output(&self, key: &LookupKey) -> Option<LookupOutput> {
        self.last_outputs.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Drop everything cached for the instances owned by `path`.
    pub fn forget_document(&mut self, path: &str) {
        self.last_values.retain(|key, _| key.path != path);
        self.last_outputs.retain(|key, _| key.path != path);
        self.statuses.retain(|key, _| key.path != path);
        self.previous_counts.retain(|key, _| key.path != path);
    }

    /// Compiled form of `source`, compiled at most once.
    fn expression(&mut self, source: &str) -> Result<&Expr, FieldnoteError> {
        self.expressions
            .entry(source.to_string())
            .or_insert_with(|| compile(source))
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// What a pass should consider beyond auto updating fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassRequest {
    /// Check every instance, including fields with auto update disabled
    pub force_update_all: bool,
    /// `(document path, field name)` pairs to check regardless of auto update
    pub force_update_one: Vec<(String, String)>,
}

impl PassRequest {
    fn forces(&self, path: &str, field_name: &str) -> bool {
        self.force_update_all
            || self
                .force_update_one
                .iter()
                .any(|(p, name)| p == path && name == field_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Number of lookup instances enumerated by the index
    pub instances: usize,
    /// Payload batched per document
    pub writes: BTreeMap<String, Vec<FieldPayload>>,
    /// Documents actually written
    pub written: Vec<String>,
    /// Names of fields whose custom computation failed, each listed once
    pub rendering_errors: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PassReport {
    pub fn is_idle(&self) -> bool {
        self.written.is_empty()
    }

    pub fn write_count(&self) -> usize {
        self.written.len()
    }
}

fn find_lookup_field<R: FieldRegistry>(registry: &R, key: &LookupKey) -> Option<Field> {
    let by_class = match key.file_class.is_empty() {
        true => Vec::new(),
        false => registry.fields_for_class(&key.file_class),
    };
    by_class
        .into_iter()
        .find(|f| f.id == key.field_id)
        .or_else(|| {
            registry
                .fields_for_path(&key.path)
                .into_iter()
                .find(|f| f.id == key.field_id)
        })
        .filter(|f| f.lookup_options().is_some())
}

fn builtin_summary(
    function: BuiltinSummarizing,
    field_name: &str,
    related: &[RelatedDocument],
) -> String {
    let values: Vec<Value> = related
        .iter()
        .map(|doc| {
            doc.fields
                .get(field_name)
                .map(Value::from_json)
                .unwrap_or(Value::Null)
        })
        .collect();
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_number).collect();
    match function {
        BuiltinSummarizing::CountAll => related.len().to_string(),
        BuiltinSummarizing::Count => values.iter().filter(|v| !v.is_empty()).count().to_string(),
        BuiltinSummarizing::Sum => format_number(numbers.iter().sum()),
        _ if numbers.is_empty() => String::new(),
        BuiltinSummarizing::Average => {
            format_number(numbers.iter().sum::<f64>() / numbers.len() as f64)
        }
        BuiltinSummarizing::Min => format_number(numbers.iter().copied().fold(f64::INFINITY, f64::min)),
        BuiltinSummarizing::Max => {
            format_number(numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        }
    }
}

/// A computed lookup value.
#[derive(Debug, Default, PartialEq)]
struct Computed {
    value: String,
    /// First item of a custom list that failed to render. Failed items render as empty.
    item_failure: Option<FieldnoteError>,
}

impl From<String> for Computed {
    fn from(value: String) -> Self {
        Computed {
            value,
            item_failure: None,
        }
    }
}

/// Compute the value of one lookup instance.
fn compute(
    options: &LookupOptions,
    related: &[RelatedDocument],
    settings: &Settings,
    index: &mut LookupIndex,
) -> Result<Computed, FieldnoteError> {
    let markdown_links = settings.markdown_links;
    let value = match options.output_type {
        LookupOutput::LinksList | LookupOutput::LinksBulletList => join_items(
            related
                .iter()
                .map(|doc| DocPath::from(&doc.path).to_link(markdown_links)),
        ),
        LookupOutput::CustomList | LookupOutput::CustomBulletList => {
            let source = options.custom_list_function.as_deref().unwrap_or("link(page)");
            let expr = index.expression(source)?;
            let mut items = Vec::new();
            let mut item_failure = None;
            for doc in related.iter() {
                let scope = Scope::new()
                    .with("page", doc.page(markdown_links))
                    .with_markdown_links(markdown_links);
                match expr.eval(&scope) {
                    Ok(item) => items.push(item.render()),
                    Err(e) => {
                        tracing::debug!("[compute] {} failed to render: {}", doc.path, e);
                        item_failure.get_or_insert(e);
                    }
                }
            }
            items.retain(|item| !item.is_empty());
            return Ok(Computed {
                value: join_items(items),
                item_failure,
            });
        }
        LookupOutput::CustomSummarizing => {
            let source = options.custom_summarizing_function.as_deref().ok_or_else(|| {
                FieldnoteError::Expression("no summarizing function configured".to_string())
            })?;
            let source = source.replace(
                SUMMARIZED_FIELD_PLACEHOLDER,
                options.summarized_field_name.as_deref().unwrap_or_default(),
            );
            let expr = index.expression(&source)?;
            let pages = Value::List(related.iter().map(|doc| doc.page(markdown_links)).collect());
            let scope = Scope::new()
                .with("pages", pages)
                .with_markdown_links(markdown_links);
            expr.eval(&scope)?.render()
        }
        LookupOutput::BuiltinSummarizing => builtin_summary(
            options
                .builtin_summarizing_function
                .unwrap_or(BuiltinSummarizing::Count),
            options.summarized_field_name.as_deref().unwrap_or_default(),
            related,
        ),
    };
    Ok(value.into())
}

/// One instance whose value is going to be written.
struct PendingWrite {
    key: LookupKey,
    payload: FieldPayload,
}

/// Run one recomputation pass over every lookup instance.
#[tracing::instrument(skip_all)]
pub async fn run_pass<S, I, R>(
    store: &S,
    related_index: &I,
    registry: &R,
    settings: &Settings,
    index: &mut LookupIndex,
    request: &PassRequest,
) -> Result<PassReport, FieldnoteError>
where
    S: DocumentStore,
    I: RelatedIndex,
    R: FieldRegistry,
{
    let instances = related_index.lookup_instances().await?;
    let mut report = PassReport {
        instances: instances.len(),
        ..Default::default()
    };
    let mut texts: BTreeMap<String, Option<String>> = BTreeMap::new();
    let mut pending: BTreeMap<String, Vec<PendingWrite>> = BTreeMap::new();

    for (raw_key, related) in instances.iter() {
        let key = match raw_key.parse::<LookupKey>() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("[run_pass] skipping lookup instance: {}", e);
                report
                    .diagnostics
                    .push(Diagnostic::MalformedIndexedPath(raw_key.clone()));
                continue;
            }
        };

        if !texts.contains_key(&key.path) {
            let text = store.read(&key.path).await.ok();
            texts.insert(key.path.clone(), text);
        }
        let Some(Some(text)) = texts.get(&key.path) else {
            tracing::debug!("[run_pass] {} no longer exists, skipping {}", key.path, key);
            report
                .diagnostics
                .push(Diagnostic::MissingRelatedDocument(key.path.clone()));
            continue;
        };

        let Some(field) = find_lookup_field(registry, &key) else {
            tracing::warn!("[run_pass] no lookup field definition for {}", key);
            report.diagnostics.push(Diagnostic::warning(format!(
                "no lookup field definition for {key}"
            )));
            continue;
        };
        let Some(options) = field.lookup_options() else {
            continue;
        };

        let (new_value, failure) = match compute(options, related, settings, index) {
            Ok(computed) => (computed.value, computed.item_failure),
            Err(e) => (String::new(), Some(e)),
        };
        if let Some(e) = failure {
            tracing::debug!("[run_pass] {} failed to compute: {}", key, e);
            if !report.rendering_errors.contains(&field.name) {
                report.rendering_errors.push(field.name.clone());
                report.diagnostics.push(Diagnostic::computation_error(
                    &key.path,
                    &field.name,
                    e.to_string(),
                ));
            }
        }

        let current_value = match index.last_values.get(&key) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => Note::new(
                &key.path,
                text,
                registry.fields_for_path(&key.path),
                settings,
            )
            .value_for_field_id(&field.id)
            .unwrap_or_default(),
        };
        let value_changed = (current_value.is_empty() && !new_value.is_empty())
            || !arrays_as_string_are_equal(&current_value, &new_value);
        let format_changed = matches!(
            index.last_outputs.get(&key),
            Some(previous) if *previous != options.output_type
        );

        if !(options.auto_update() || request.forces(&key.path, &field.name)) {
            let status = match value_changed || format_changed {
                true => LookupStatus::Changed,
                false => LookupStatus::UpToDate,
            };
            tracing::debug!("[run_pass] {} is not auto updated, status {:?}", key, status);
            index.statuses.insert(key, status);
            continue;
        }

        if value_changed || format_changed {
            tracing::debug!(
                "[run_pass] {} changed: '{}' -> '{}'",
                key,
                current_value,
                new_value
            );
            let payload = FieldPayload {
                previous_items_count: index.previous_counts.get(&key).copied().unwrap_or(0),
                ..FieldPayload::new(&field.id, &new_value)
            };
            index.statuses.insert(key.clone(), LookupStatus::Changed);
            pending
                .entry(key.path.clone())
                .or_default()
                .push(PendingWrite {
                    key: key.clone(),
                    payload,
                });
        } else {
            index.statuses.insert(key.clone(), LookupStatus::UpToDate);
        }
        index.previous_counts.insert(key.clone(), related.len());
        index.last_outputs.insert(key.clone(), options.output_type);
        index.last_values.insert(key, new_value);
    }

    // Every value is known; now write each document once.
    for (path, writes) in pending.into_iter() {
        let Some(Some(text)) = texts.get(&path) else {
            continue;
        };
        let payload: Vec<FieldPayload> = writes.iter().map(|w| w.payload.clone()).collect();
        let mut note = Note::new(&path, text, registry.fields_for_path(&path), settings);
        report
            .diagnostics
            .extend(note.create_or_update_fields(&payload, InsertPosition::Auto));
        let rendered = note.render();
        let modified = rendered != *text;
        let result = match modified {
            true => store.write(&path, rendered).await,
            false => Ok(()),
        };
        match result {
            Ok(()) => {
                for write in writes.iter() {
                    index.statuses.insert(write.key.clone(), LookupStatus::UpToDate);
                }
                if modified {
                    report.written.push(path.clone());
                }
            }
            Err(e) => {
                tracing::warn!("[run_pass] failed to write {}: {}", path, e);
                report
                    .diagnostics
                    .push(Diagnostic::warning(format!("failed to write {path}: {e}")));
                // Forget the values so the next pass compares against the document again
                for write in writes.iter() {
                    index.last_values.remove(&write.key);
                }
            }
        }
        report.writes.insert(path, payload);
    }

    if !report.rendering_errors.is_empty() {
        tracing::warn!(
            "Lookup rendering failed for: {}",
            report.rendering_errors.join(", ")
        );
    }
    tracing::info!(
        "[run_pass] {} instances checked, {} documents written",
        report.instances,
        report.written.len()
    );
    Ok(report)
}
