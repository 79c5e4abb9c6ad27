//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::path::PathBuf;
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Settings for a small library vault. Books carry a chapter lookup and a page total, chapters
/// carry a page count.
#[allow(dead_code)]
pub const LIBRARY_CONFIG: &str = r#"
max_passes = 4

[[global_fields]]
id = "st"
name = "status"
type = "Select"
options.values = ["todo", "reading", "done"]

[[file_classes]]
name = "book"

[[file_classes.fields]]
id = "chl"
name = "chapters"
type = "Lookup"
options.lookup.output_type = "LinksList"

[[file_classes.fields]]
id = "tot"
name = "total"
type = "Lookup"
options.lookup.output_type = "BuiltinSummarizing"
options.lookup.builtin_summarizing_function = "Sum"
options.lookup.summarized_field_name = "pages"

[[file_classes]]
name = "chapter"

[[file_classes.fields]]
id = "pgs"
name = "pages"
type = "Number"
"#;

/// Create a vault directory holding `fieldnote.toml` and the given documents.
///
/// Returns the vault root (`<temp_dir>/vault/`).
#[allow(dead_code)]
pub fn create_test_vault(temp_dir: &TempDir, docs: &[(&str, &str)]) -> PathBuf {
    let root = temp_dir.path().join("vault");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("fieldnote.toml"), LIBRARY_CONFIG).unwrap();
    for (path, content) in docs {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
    root
}
