//! Field definition registry.
//!
//! Resolves which field definitions apply to a document: the fields of the file classes it is
//! assigned to (including inherited ones), or the global fields when it has no class.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{config::Settings, error::FieldnoteError, field::Field, paths::is_valid_field_id};

/// A named set of field definitions, optionally extending another class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileClass {
    pub name: String,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl FileClass {
    pub fn new(name: &str, fields: Vec<Field>) -> Self {
        FileClass {
            name: name.to_string(),
            extends: None,
            fields,
        }
    }

    pub fn extending(mut self, parent: &str) -> Self {
        self.extends = Some(parent.to_string());
        self
    }
}

pub trait FieldRegistry: Sync {
    /// Every field definition applying to the document at `path`.
    fn fields_for_path(&self, path: &str) -> Vec<Field>;

    /// The fields of one class, inherited ones included. Unknown classes yield nothing.
    fn fields_for_class(&self, class: &str) -> Vec<Field>;
}

#[derive(Debug, Default)]
struct RegistryState {
    global: Vec<Field>,
    classes: BTreeMap<String, FileClass>,
    assignments: BTreeMap<String, Vec<String>>,
}

/// In-memory registry, cheap to clone and shared between the engine and its host.
#[derive(Debug, Default)]
pub struct StaticRegistry(Arc<RwLock<RegistryState>>);

impl Clone for StaticRegistry {
    fn clone(&self) -> Self {
        StaticRegistry(self.0.clone())
    }
}

/// Fill in derived ids and check them for use inside indexed paths.
fn prepare_fields(fields: &mut [Field], class: Option<&str>) -> Result<(), FieldnoteError> {
    let mut seen = BTreeSet::new();
    for field in fields.iter_mut() {
        if field.file_class.is_none() {
            field.file_class = class.map(|c| c.to_string());
        }
        field.ensure_id();
        if !is_valid_field_id(&field.id) {
            return Err(FieldnoteError::Config(format!(
                "Field '{}' has an id that cannot be used in indexed paths: '{}'",
                field.name, field.id
            )));
        }
        if !seen.insert((field.path.clone(), field.name.clone())) {
            return Err(FieldnoteError::Config(format!(
                "Field '{}' is declared twice at the same level{}",
                field.name,
                class.map(|c| format!(" of class '{c}'")).unwrap_or_default()
            )));
        }
    }
    Ok(())
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FieldnoteError> {
        let registry = StaticRegistry::new();
        registry.set_global_fields(settings.global_fields.clone())?;
        for class in settings.file_classes.iter() {
            registry.register_class(class.clone())?;
        }
        for (path, classes) in settings.assignments.iter() {
            registry.assign(path, classes.clone());
        }
        Ok(registry)
    }

    pub fn set_global_fields(&self, mut fields: Vec<Field>) -> Result<(), FieldnoteError> {
        prepare_fields(&mut fields, None)?;
        self.0.write().global = fields;
        Ok(())
    }

    /// Register a file class. An existing class of the same name is replaced.
    pub fn register_class(&self, mut class: FileClass) -> Result<(), FieldnoteError> {
        prepare_fields(&mut class.fields, Some(&class.name))?;
        let mut writer = self.0.write();
        if writer.classes.contains_key(&class.name) {
            tracing::info!(
                "[StaticRegistry::register_class] Overwriting existing file class: {}",
                class.name
            );
        }
        writer.classes.insert(class.name.clone(), class);
        Ok(())
    }

    /// Assign file classes to a document, replacing any previous assignment. An empty list
    /// removes the assignment.
    pub fn assign(&self, path: &str, classes: Vec<String>) {
        let mut writer = self.0.write();
        if classes.is_empty() {
            writer.assignments.remove(path);
        } else {
            writer.assignments.insert(path.to_string(), classes);
        }
    }

    pub fn classes_for_path(&self, path: &str) -> Vec<String> {
        self.0
            .read()
            .assignments
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_classes(&self) -> Vec<String> {
        self.0.read().classes.keys().cloned().collect()
    }
}

fn class_fields(state: &RegistryState, class: &str) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::new();
    let mut visited = BTreeSet::new();
    let mut current = Some(class.to_string());
    while let Some(name) = current.take() {
        if !visited.insert(name.clone()) {
            tracing::warn!(
                "File class '{}' has a cyclic 'extends' chain through '{}'",
                class,
                name
            );
            break;
        }
        let Some(file_class) = state.classes.get(&name) else {
            if name != class {
                tracing::warn!("File class '{}' extends unknown class '{}'", class, name);
            }
            break;
        };
        for field in file_class.fields.iter() {
            // Closer classes override inherited definitions of the same name
            if !fields
                .iter()
                .any(|f| f.name == field.name && f.path == field.path)
            {
                fields.push(field.clone());
            }
        }
        current = file_class.extends.clone();
    }
    fields
}

impl FieldRegistry for StaticRegistry {
    fn fields_for_path(&self, path: &str) -> Vec<Field> {
        let reader = self.0.read();
        match reader.assignments.get(path) {
            Some(classes) => {
                let mut fields: Vec<Field> = Vec::new();
                for class in classes.iter() {
                    for field in class_fields(&reader, class) {
                        if !fields.iter().any(|f| f.id == field.id) {
                            fields.push(field);
                        }
                    }
                }
                fields
            }
            None => reader.global.clone(),
        }
    }

    fn fields_for_class(&self, class: &str) -> Vec<Field> {
        class_fields(&self.0.read(), class)
    }
}
