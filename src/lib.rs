//! # fieldnote-core
//!
//! Typed fields embedded in markdown documents, with derived "lookup" fields kept in sync across a
//! document collection.
//!
//! ## Overview
//!
//! A document carries fields in two places: a header block of `key: value` lines between `---`
//! delimiters, and inline `key:: value` markers anywhere in the body. Fields may nest inside
//! objects and object lists, so one definition can occur several times in one document; each
//! occurrence is addressed by its **indexed path**.
//!
//! fieldnote-core provides:
//!
//! - **A lossless text model** ([`note::Note`]): parsing a document and rendering it again yields
//!   the same bytes. Edits rewrite exactly one field occurrence and leave everything else alone.
//! - **Ancestor aware insertion**: inserting a nested field creates any missing parent lines,
//!   top ancestor first, with the indentation of its region.
//! - **A lookup engine** ([`lookup`]): lookup fields are computed from related documents (link
//!   lists, custom expressions, summaries). A pass writes only real changes and converges: the
//!   pass triggered by its own writes finds nothing left to do.
//!
//! ## Quick Start
//!
//! ### Editing a note
//!
//! ```rust
//! use fieldnote_core::{
//!     config::Settings,
//!     field::{Field, FieldType},
//!     note::{FieldPayload, InsertPosition, Note},
//! };
//!
//! let settings = Settings::default();
//! let fields = vec![
//!     Field::new("meta", FieldType::Object).with_id("mt"),
//!     Field::new("rating", FieldType::Number).with_id("rt").child_of(
//!         &Field::new("meta", FieldType::Object).with_id("mt"),
//!     ),
//! ];
//! let mut note = Note::new("Dune.md", "---\ntitle: Dune\n---\n", fields, &settings);
//! note.create_or_update_fields(&[FieldPayload::new("rt", "5")], InsertPosition::Auto);
//! assert_eq!(note.render(), "---\ntitle: Dune\nmeta:\n  rating: 5\n---\n");
//! ```
//!
//! ### Running lookups
//!
//! ```rust,no_run
//! use fieldnote_core::{
//!     config::Settings, event::LookupEvent, lookup::LookupService, registry::StaticRegistry,
//!     source::{FsStore, MemoryIndex},
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     let registry = StaticRegistry::from_settings(&settings)?;
//!     let mut service =
//!         LookupService::new(FsStore::new("./vault"), MemoryIndex::new(), registry, settings);
//!     service.enqueue(LookupEvent::IndexUpdated)?;
//!     for report in service.run_until_idle().await? {
//!         println!("{} documents written", report.write_count());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Diagnostics
//!
//! Problems scoped to one field or one document never abort an operation. Unknown keys are kept
//! verbatim, malformed lookup keys and missing documents are skipped, and failing expressions
//! render as empty values. Each is reported as a [`diagnostic::Diagnostic`].
//!
//! ## Features
//!
//! - **default**: the library
//! - **bin**: the `fieldnote` command line tool

pub mod commands;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod event;
pub mod field;
pub mod lookup;
pub mod note;
pub mod paths;
pub mod registry;
pub mod source;
#[cfg(test)]
mod tests;

pub use error::*;
