//! Shared test utilities for notes and lookup passes

use crate::{
    config::Settings,
    field::{Field, FieldType, LookupOptions, LookupOutput},
    registry::StaticRegistry,
    source::{MemoryIndex, MemoryStore, RelatedDocument},
};

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A lookup field with id `id` computing `output`.
pub fn lookup_field(name: &str, id: &str, options: LookupOptions) -> Field {
    Field::new(name, FieldType::Lookup)
        .with_id(id)
        .with_lookup(options)
}

pub fn links(output: LookupOutput) -> LookupOptions {
    LookupOptions {
        output_type: output,
        ..Default::default()
    }
}

/// Nested object fields `a > b > c` with ids equal to their names.
pub fn nested_fields() -> Vec<Field> {
    let a = Field::new("a", FieldType::Object).with_id("a");
    let b = Field::new("b", FieldType::Object).with_id("b").child_of(&a);
    let c = Field::new("c", FieldType::Input).with_id("c").child_of(&b);
    vec![a, b, c]
}

/// Fields of a reading list: scalars, a multi, an object and an object list.
pub fn reading_fields() -> Vec<Field> {
    let meta = Field::new("meta", FieldType::Object).with_id("mt");
    let refs = Field::new("refs", FieldType::ObjectList).with_id("rf");
    vec![
        Field::new("status", FieldType::Select).with_id("st"),
        Field::new("rating", FieldType::Number).with_id("rt"),
        Field::new("tags", FieldType::Multi).with_id("tg"),
        Field::new("author", FieldType::Input).with_id("au").child_of(&meta),
        Field::new("title", FieldType::Input).with_id("ti").child_of(&refs),
        Field::new("page", FieldType::Number).with_id("pg").child_of(&refs),
        meta,
        refs,
    ]
}

pub fn related(paths: &[&str]) -> Vec<RelatedDocument> {
    paths.iter().map(|p| RelatedDocument::new(p)).collect()
}

/// Store, index and registry for lookup fields declared globally.
pub fn lookup_fixture(fields: Vec<Field>) -> (MemoryStore, MemoryIndex, StaticRegistry, Settings) {
    init_logging();
    let settings = Settings::default();
    let registry = StaticRegistry::new();
    registry.set_global_fields(fields).unwrap();
    (MemoryStore::new(), MemoryIndex::new(), registry, settings)
}
