use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use thiserror::Error;
use tokio::sync::mpsc::error::SendError as TokioSendError;

use crate::event::LookupEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum FieldnoteError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Expression error: {0}")]
    Expression(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Malformed indexed path: {0}")]
    MalformedIndexedPath(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Unknown field '{0}'")]
    UnknownField(String),
}

impl From<StripPrefixError> for FieldnoteError {
    fn from(src: StripPrefixError) -> FieldnoteError {
        FieldnoteError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for FieldnoteError {
    fn from(src: toml::de::Error) -> FieldnoteError {
        FieldnoteError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for FieldnoteError {
    fn from(src: toml::ser::Error) -> FieldnoteError {
        FieldnoteError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for FieldnoteError {
    fn from(src: JsonError) -> FieldnoteError {
        FieldnoteError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for FieldnoteError {
    fn from(src: YamlError) -> FieldnoteError {
        FieldnoteError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<io::Error> for FieldnoteError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => FieldnoteError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => FieldnoteError::PermissionDenied,
            _ => FieldnoteError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<fmt::Error> for FieldnoteError {
    fn from(x: fmt::Error) -> Self {
        FieldnoteError::Custom(format!("{x}"))
    }
}

impl From<RegexError> for FieldnoteError {
    fn from(x: RegexError) -> Self {
        FieldnoteError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<TokioSendError<LookupEvent>> for FieldnoteError {
    fn from(x: TokioSendError<LookupEvent>) -> Self {
        FieldnoteError::Io(format!(
            "Channel update send Error, could not transmit lookup event {:?}",
            x.0
        ))
    }
}
