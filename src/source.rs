//! Collaborator boundaries: where document text and related-document sets come from.
//!
//! The engine only ever suspends at these traits. [DocumentStore] reads and writes document text,
//! [RelatedIndex] enumerates lookup instances with their related documents. Both come with
//! in-memory implementations; [FsStore] serves a directory of markdown files.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    error::FieldnoteError,
    lookup::expr::Value,
    paths::{os_path_to_string, string_to_os_path, DocPath},
};

pub trait DocumentStore: Sync {
    fn read(&self, path: &str) -> impl Future<Output = Result<String, FieldnoteError>> + Send;

    fn write(&self, path: &str, content: String) -> impl Future<Output = Result<(), FieldnoteError>> + Send;

    fn exists(&self, path: &str) -> impl Future<Output = bool> + Send {
        async move { self.read(path).await.is_ok() }
    }

    /// Every document path in the store.
    fn list(&self) -> impl Future<Output = Result<Vec<String>, FieldnoteError>> + Send {
        tracing::warn!("This DocumentStore impl does not have a list implementation!");
        async { Ok(Vec::new()) }
    }
}

/// One document related to a lookup instance, with the named fields expressions may read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub path: String,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl RelatedDocument {
    pub fn new(path: &str) -> RelatedDocument {
        RelatedDocument {
            path: path.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: serde_json::Value) -> RelatedDocument {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// The `page` object handed to lookup expressions: every field, plus `file` describing the
    /// document itself.
    pub fn page(&self, markdown_links: bool) -> Value {
        let doc_path = DocPath::from(&self.path);
        let mut file = BTreeMap::new();
        file.insert("path".to_string(), Value::Str(self.path.clone()));
        file.insert("name".to_string(), Value::Str(doc_path.filestem().to_string()));
        file.insert("folder".to_string(), Value::Str(doc_path.dir().to_string()));
        file.insert("link".to_string(), Value::Str(doc_path.to_link(markdown_links)));
        let mut page: BTreeMap<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect();
        page.insert("file".to_string(), Value::Object(file));
        Value::Object(page)
    }
}

/// A lookup instance as enumerated by the index: its key and its ordered related documents.
pub type LookupInstance = (String, Vec<RelatedDocument>);

pub trait RelatedIndex: Sync {
    /// Every lookup instance, keyed `<documentPath>__related__<fileClass>___<fieldId>`.
    fn lookup_instances(&self) -> impl Future<Output = Result<Vec<LookupInstance>, FieldnoteError>> + Send;
}

/// Documents held in memory. Every write is recorded so callers can observe pass output.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<String, String>>>,
    writes: Arc<RwLock<Vec<(String, String)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, content: &str) {
        self.docs.write().insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        self.docs.write().remove(path)
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.docs.read().get(path).cloned()
    }

    /// Writes in the order they were issued.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.read().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.read().len()
    }

    pub fn clear_writes(&self) {
        self.writes.write().clear();
    }
}

impl DocumentStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<String, FieldnoteError> {
        self.get(path)
            .ok_or_else(|| FieldnoteError::NotFound(format!("document {path}")))
    }

    async fn write(&self, path: &str, content: String) -> Result<(), FieldnoteError> {
        self.writes.write().push((path.to_string(), content.clone()));
        self.docs.write().insert(path.to_string(), content);
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.docs.read().contains_key(path)
    }

    async fn list(&self) -> Result<Vec<String>, FieldnoteError> {
        Ok(self.docs.read().keys().cloned().collect())
    }
}

/// Markdown documents under a root directory, addressed by `/` separated relative paths.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FsStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        FsStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(string_to_os_path(path))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl DocumentStore for FsStore {
    async fn read(&self, path: &str) -> Result<String, FieldnoteError> {
        Ok(tokio::fs::read_to_string(self.full_path(path)).await?)
    }

    async fn write(&self, path: &str, content: String) -> Result<(), FieldnoteError> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::debug!("[FsStore::write] writing {:?}", full_path);
        Ok(tokio::fs::write(full_path, content).await?)
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.full_path(path))
            .await
            .unwrap_or(false)
    }

    async fn list(&self) -> Result<Vec<String>, FieldnoteError> {
        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry.map_err(|e| FieldnoteError::Io(format!("{e}")))?;
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "md") {
                let relative = entry.path().strip_prefix(&self.root)?;
                paths.push(os_path_to_string(relative));
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Lookup instances held in memory, in key order.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    instances: Arc<RwLock<BTreeMap<String, Vec<RelatedDocument>>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_related(&self, key: &str, related: Vec<RelatedDocument>) {
        self.instances.write().insert(key.to_string(), related);
    }

    pub fn remove(&self, key: &str) -> Option<Vec<RelatedDocument>> {
        self.instances.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl RelatedIndex for MemoryIndex {
    async fn lookup_instances(&self) -> Result<Vec<LookupInstance>, FieldnoteError> {
        Ok(self
            .instances
            .read()
            .iter()
            .map(|(key, related)| (key.clone(), related.clone()))
            .collect())
    }
}
