use crate::{
    error::FieldnoteError,
    field::{Field, MultiDisplay},
    registry::FileClass,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
};

pub const DEFAULT_FILECLASS_ALIAS: &str = "fileClass";
pub const DEFAULT_MAX_PASSES: usize = 5;
pub const CONFIG_FILE_NAME: &str = "fieldnote.toml";

/// Host level settings shared by the parser, the renderer and the lookup engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Header key naming the file classes a document belongs to
    pub fileclass_alias: String,
    /// Default header layout of multi valued fields without their own display option
    pub frontmatter_list_display: MultiDisplay,
    /// Render generated links as `[name](<path>)` instead of `[[path|name]]`
    pub markdown_links: bool,
    /// Upper bound on cascading lookup passes run by one `run_until_idle` call
    pub max_passes: usize,
    /// Fields that apply to documents without a file class
    pub global_fields: Vec<Field>,
    pub file_classes: Vec<FileClass>,
    /// Explicit document path to file class assignments
    pub assignments: BTreeMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            fileclass_alias: DEFAULT_FILECLASS_ALIAS.to_string(),
            frontmatter_list_display: MultiDisplay::default(),
            markdown_links: false,
            max_passes: DEFAULT_MAX_PASSES,
            global_fields: Vec::new(),
            file_classes: Vec::new(),
            assignments: BTreeMap::new(),
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn get_settings(&self) -> Result<Settings, FieldnoteError>;
    fn set_settings(&self, settings: &Settings) -> Result<(), FieldnoteError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        TomlConfigProvider { path }
    }

    /// Provider reading `fieldnote.toml` at the root of a vault.
    pub fn for_vault<P: AsRef<Path>>(root: P) -> Self {
        TomlConfigProvider::new(root.as_ref().join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn get_content(path: &Path) -> Result<Option<String>, FieldnoteError> {
    if !path.exists() {
        tracing::debug!("Config file {:?} not found, using defaults.", path);
        return Ok(None);
    }
    Ok(Some(read_to_string(path)?))
}

impl ConfigProvider for TomlConfigProvider {
    fn get_settings(&self) -> Result<Settings, FieldnoteError> {
        tracing::debug!("Attempting to read settings from: {:?}", &self.path);
        match get_content(&self.path)? {
            Some(content) => toml::from_str::<Settings>(&content).map_err(|e| {
                FieldnoteError::Config(format!("Could not parse {:?}: {e}", self.path))
            }),
            None => Ok(Settings::default()),
        }
    }

    fn set_settings(&self, settings: &Settings) -> Result<(), FieldnoteError> {
        tracing::debug!("Attempting to write settings to: {:?}", &self.path);
        let toml_string = toml::to_string(settings)?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
