use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Notifications that drive the lookup engine.
///
/// The host forwards these whenever documents or the related-document index change. The engine
/// also emits [LookupEvent::DocumentModified] for each document it writes, so recomputation
/// cascades through an explicit queue rather than nested calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupEvent {
    /// A document's text changed (vault relative path)
    DocumentModified(String),
    /// A document was deleted. Cached lookup state keyed on it is dropped.
    DocumentRemoved(String),
    /// The related-document index finished an update
    IndexUpdated,
    /// Recompute every lookup instance, including those with auto update disabled
    ForceUpdateAll,
    /// Recompute one lookup field of one document, even if auto update is disabled
    ForceUpdateOne { path: String, field_name: String },
    /// The index was rebuilt from scratch; all cached lookup state is invalid
    FullReindex,
}

impl LookupEvent {
    /// The document path this event is scoped to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            LookupEvent::DocumentModified(path)
            | LookupEvent::DocumentRemoved(path)
            | LookupEvent::ForceUpdateOne { path, .. } => Some(path),
            LookupEvent::IndexUpdated | LookupEvent::ForceUpdateAll | LookupEvent::FullReindex => {
                None
            }
        }
    }
}

impl Display for LookupEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LookupEvent::DocumentModified(path) => write!(f, "DocumentModified({path})"),
            LookupEvent::DocumentRemoved(path) => write!(f, "DocumentRemoved({path})"),
            LookupEvent::IndexUpdated => write!(f, "IndexUpdated"),
            LookupEvent::ForceUpdateAll => write!(f, "ForceUpdateAll"),
            LookupEvent::ForceUpdateOne { path, field_name } => {
                write!(f, "ForceUpdateOne({path}, {field_name})")
            }
            LookupEvent::FullReindex => write!(f, "FullReindex"),
        }
    }
}
