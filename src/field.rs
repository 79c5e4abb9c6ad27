//! Field definitions: identity, declared type, nesting path and type specific options of one
//! typed document field.
//!
//! The set of declared types is closed ([FieldType]); every piece of type specific behavior in the
//! parser, the renderer and the validator is an exhaustive `match` over it.
use enumset::{enum_set, EnumSet, EnumSetType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Header keys that hold lists even when no field definition claims them.
pub const RESERVED_MULTI_ATTRIBUTES: &[&str] = &["tags", "aliases", "cssclasses"];

/// Namespace used to derive stable field ids for definitions declared without one.
pub const UUID_NAMESPACE_FIELDS: Uuid = Uuid::from_bytes([
    0x1f, 0x9c, 0x47, 0x02, 0x6e, 0x3b, 0x4d, 0x58, 0xa1, 0x7e, 0x0c, 0x92, 0xd4, 0x35, 0x8b, 0x61,
]);

#[derive(Debug, Default, Serialize, Deserialize, PartialOrd, Ord, Hash, EnumSetType)]
#[enumset(serialize_repr = "list")]
pub enum FieldType {
    #[default]
    Input,
    Number,
    Boolean,
    Select,
    Cycle,
    Multi,
    File,
    MultiFile,
    Media,
    MultiMedia,
    Date,
    DateTime,
    Time,
    Lookup,
    Formula,
    Canvas,
    #[serde(rename = "YAML")]
    Yaml,
    #[serde(rename = "JSON")]
    Json,
    Object,
    ObjectList,
}

/// Types whose header rendering is a list.
pub const MULTI_TYPES: EnumSet<FieldType> = enum_set!(
    FieldType::Multi | FieldType::MultiFile | FieldType::MultiMedia | FieldType::Lookup | FieldType::Canvas
);

/// Types whose value is a structured block of text, re-indented under its key.
pub const RAW_OBJECT_TYPES: EnumSet<FieldType> = enum_set!(FieldType::Yaml | FieldType::Json);

/// Types whose children live on lines of their own.
pub const CONTAINER_TYPES: EnumSet<FieldType> = enum_set!(FieldType::Object | FieldType::ObjectList);

impl FieldType {
    pub fn is_multi(self) -> bool {
        MULTI_TYPES.contains(self)
    }

    pub fn is_raw_object(self) -> bool {
        RAW_OBJECT_TYPES.contains(self)
    }

    pub fn is_container(self) -> bool {
        CONTAINER_TYPES.contains(self)
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// How multi valued fields are laid out inside the header block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiDisplay {
    /// `key: [a, b, c]`
    #[default]
    AsArray,
    /// `key:` followed by one indented `- item` per line
    AsList,
}

/// The computation a lookup field performs over its related documents.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupOutput {
    #[default]
    LinksList,
    LinksBulletList,
    CustomList,
    CustomBulletList,
    CustomSummarizing,
    BuiltinSummarizing,
}

impl LookupOutput {
    pub fn is_bullet_list(self) -> bool {
        matches!(
            self,
            LookupOutput::LinksBulletList | LookupOutput::CustomBulletList
        )
    }
}

impl Display for LookupOutput {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Fixed reductions applied to one named field across the related documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinSummarizing {
    /// Related documents whose summarized field is not empty
    Count,
    /// All related documents
    CountAll,
    Sum,
    Average,
    Min,
    Max,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupOptions {
    #[serde(default)]
    pub output_type: LookupOutput,
    /// Absent means the field is kept up to date automatically.
    #[serde(default)]
    pub auto_update: Option<bool>,
    #[serde(default)]
    pub custom_list_function: Option<String>,
    #[serde(default)]
    pub custom_summarizing_function: Option<String>,
    #[serde(default)]
    pub builtin_summarizing_function: Option<BuiltinSummarizing>,
    #[serde(default)]
    pub summarized_field_name: Option<String>,
}

impl LookupOptions {
    pub fn auto_update(&self) -> bool {
        self.auto_update.unwrap_or(true)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    /// Allowed values for Select, Cycle and Multi fields
    pub values: Vec<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub lookup: Option<LookupOptions>,
}

/// One field definition.
///
/// `path` lists the ids of the field's ancestors from the root down to its immediate parent, so
/// its length is the nesting depth of the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Stable identity, surviving renames. Derived from scope and name when not declared.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    #[serde(default)]
    pub path: Vec<String>,
    #[serde(default)]
    pub file_class: Option<String>,
    #[serde(default)]
    pub options: FieldOptions,
    #[serde(default)]
    pub display: Option<MultiDisplay>,
}

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static DATETIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}(:\d{2})?$").unwrap());

/// Derive a short, stable id from the owning scope, ancestry and name of a field.
pub fn derive_field_id(scope: Option<&str>, path: &[String], name: &str) -> String {
    let seed = format!("{}/{}/{}", scope.unwrap_or(""), path.join("/"), name);
    let uuid = Uuid::new_v5(&UUID_NAMESPACE_FIELDS, seed.as_bytes());
    uuid.simple().to_string()[..6].to_string()
}

impl Field {
    pub fn new(name: &str, kind: FieldType) -> Field {
        Field {
            id: derive_field_id(None, &[], name),
            name: name.to_string(),
            kind,
            path: Vec::new(),
            file_class: None,
            options: FieldOptions::default(),
            display: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Field {
        self.id = id.to_string();
        self
    }

    /// Nest this field under `parent`, inheriting the parent's ancestry.
    pub fn child_of(mut self, parent: &Field) -> Field {
        let mut path = parent.path.clone();
        path.push(parent.id.clone());
        self.path = path;
        self
    }

    pub fn with_options(mut self, options: FieldOptions) -> Field {
        self.options = options;
        self
    }

    pub fn with_lookup(mut self, lookup: LookupOptions) -> Field {
        self.options.lookup = Some(lookup);
        self
    }

    pub fn with_display(mut self, display: MultiDisplay) -> Field {
        self.display = Some(display);
        self
    }

    pub fn in_class(mut self, file_class: &str) -> Field {
        self.file_class = Some(file_class.to_string());
        self
    }

    /// Fill in a derived id when the declaration did not carry one.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = derive_field_id(self.file_class.as_deref(), &self.path, &self.name);
        }
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Whether this field is declared directly under `parent` (or at the root for `None`).
    pub fn is_child_of(&self, parent: Option<&Field>) -> bool {
        match parent {
            None => self.path.is_empty(),
            Some(parent) => {
                self.path.len() == parent.path.len() + 1
                    && self.path[..parent.path.len()] == parent.path[..]
                    && self.path.last() == Some(&parent.id)
            }
        }
    }

    /// Resolve the ancestor chain, root first. Ids that don't resolve within `fields` are skipped.
    pub fn ancestors<'a>(&self, fields: &'a [Field]) -> Vec<&'a Field> {
        self.path
            .iter()
            .filter_map(|id| {
                let found = fields.iter().find(|f| &f.id == id);
                if found.is_none() {
                    tracing::warn!(
                        "Field '{}' declares ancestor id '{}' which is not defined in scope",
                        self.name,
                        id
                    );
                }
                found
            })
            .collect()
    }

    pub fn lookup_options(&self) -> Option<&LookupOptions> {
        match self.kind {
            FieldType::Lookup => self.options.lookup.as_ref(),
            _ => None,
        }
    }

    pub fn multi_display(&self, default: MultiDisplay) -> MultiDisplay {
        self.display.unwrap_or(default)
    }

    /// Check a raw value against the declared type and options.
    pub fn validate_value(&self, value: &str) -> bool {
        let value = value.trim();
        match self.kind {
            FieldType::Boolean => value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"),
            FieldType::Number => match value.parse::<f64>() {
                Ok(number) if number.is_finite() => {
                    self.options.min.map(|min| number >= min).unwrap_or(true)
                        && self.options.max.map(|max| number <= max).unwrap_or(true)
                }
                _ => false,
            },
            FieldType::Select | FieldType::Cycle => {
                self.options.values.is_empty() || self.options.values.iter().any(|v| v == value)
            }
            FieldType::Multi => {
                self.options.values.is_empty()
                    || crate::note::value::split_items(value)
                        .iter()
                        .all(|item| self.options.values.iter().any(|v| v == item))
            }
            FieldType::Json => serde_json::from_str::<serde_json::Value>(value).is_ok(),
            FieldType::Yaml => serde_yaml::from_str::<serde_yaml::Value>(value).is_ok(),
            FieldType::Date => DATE_RE.is_match(value),
            FieldType::DateTime => DATETIME_RE.is_match(value),
            FieldType::Time => TIME_RE.is_match(value),
            FieldType::Input
            | FieldType::File
            | FieldType::MultiFile
            | FieldType::Media
            | FieldType::MultiMedia
            | FieldType::Lookup
            | FieldType::Formula
            | FieldType::Canvas
            | FieldType::Object
            | FieldType::ObjectList => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_ids_are_stable_and_scoped() {
        let a = derive_field_id(Some("book"), &[], "status");
        let b = derive_field_id(Some("book"), &[], "status");
        let c = derive_field_id(Some("movie"), &[], "status");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn test_child_of_builds_path() {
        let root = Field::new("root", FieldType::Object).with_id("r");
        let mid = Field::new("mid", FieldType::ObjectList).with_id("m").child_of(&root);
        let leaf = Field::new("leaf", FieldType::Input).with_id("l").child_of(&mid);
        assert_eq!(leaf.path, vec!["r".to_string(), "m".to_string()]);
        assert_eq!(leaf.depth(), 2);
        assert!(leaf.is_child_of(Some(&mid)));
        assert!(!leaf.is_child_of(Some(&root)));
        assert!(root.is_child_of(None));

        let fields = vec![root.clone(), mid.clone(), leaf.clone()];
        let ancestors = leaf.ancestors(&fields);
        assert_eq!(
            ancestors.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            vec!["r", "m"]
        );
    }

    #[test]
    fn test_validate_value_by_type() {
        let boolean = Field::new("done", FieldType::Boolean);
        assert!(boolean.validate_value("true"));
        assert!(boolean.validate_value("FALSE"));
        assert!(!boolean.validate_value("yes"));

        let number = Field::new("n", FieldType::Number).with_options(FieldOptions {
            min: Some(0.0),
            max: Some(10.0),
            ..Default::default()
        });
        assert!(number.validate_value("3.5"));
        assert!(!number.validate_value("11"));
        assert!(!number.validate_value("abc"));

        let select = Field::new("s", FieldType::Select).with_options(FieldOptions {
            values: vec!["todo".to_string(), "done".to_string()],
            ..Default::default()
        });
        assert!(select.validate_value("done"));
        assert!(!select.validate_value("later"));

        let multi = Field::new("m", FieldType::Multi).with_options(FieldOptions {
            values: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        });
        assert!(multi.validate_value("a, b"));
        assert!(!multi.validate_value("a, c"));

        assert!(Field::new("j", FieldType::Json).validate_value(r#"{"a": 1}"#));
        assert!(!Field::new("j", FieldType::Json).validate_value("{a"));
        assert!(Field::new("d", FieldType::Date).validate_value("2024-03-01"));
        assert!(!Field::new("d", FieldType::Date).validate_value("01/03/2024"));
    }

    #[test]
    fn test_field_from_toml() {
        let field: Field = toml::from_str(
            r#"
            id = "lk1"
            name = "children"
            type = "Lookup"
            [options.lookup]
            output_type = "LinksBulletList"
            auto_update = false
            "#,
        )
        .unwrap();
        assert_eq!(field.kind, FieldType::Lookup);
        let lookup = field.lookup_options().unwrap();
        assert_eq!(lookup.output_type, LookupOutput::LinksBulletList);
        assert!(!lookup.auto_update());
        assert!(lookup.output_type.is_bullet_list());
    }
}
