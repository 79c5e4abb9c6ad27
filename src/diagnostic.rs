//! Non-fatal findings collected while parsing notes and running lookup passes.
//!
//! None of these abort the operation that produced them. They are returned alongside the result
//! so hosts can surface them, and each one is also logged through `tracing` where it is raised.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A key or marker that no field definition claims. The text is kept verbatim.
    UnresolvedField {
        name: String,
        /// Physical line number where the key starts
        line: usize,
    },

    /// A lookup instance key or indexed path that does not decompose
    MalformedIndexedPath(String),

    /// A lookup computation failed; the field renders as an empty value
    ComputationError {
        path: String,
        field: String,
        message: String,
    },

    /// A lookup instance whose owning document no longer exists
    MissingRelatedDocument(String),

    /// Anything else worth reporting (failed writes, unknown payload ids)
    Warning(String),
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning(message.into())
    }

    pub fn computation_error(path: &str, field: &str, message: impl Into<String>) -> Self {
        Self::ComputationError {
            path: path.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn is_unresolved_field(&self) -> bool {
        matches!(self, Self::UnresolvedField { .. })
    }

    pub fn is_computation_error(&self) -> bool {
        matches!(self, Self::ComputationError { .. })
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedField { name, line } => {
                write!(f, "Unresolved field '{name}' at line {line}")
            }
            Self::MalformedIndexedPath(key) => write!(f, "Malformed indexed path: {key}"),
            Self::ComputationError {
                path,
                field,
                message,
            } => write!(f, "Computation of '{field}' in {path} failed: {message}"),
            Self::MissingRelatedDocument(path) => write!(f, "Missing document: {path}"),
            Self::Warning(msg) => write!(f, "Warning: {msg}"),
        }
    }
}
