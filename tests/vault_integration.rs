//! End to end tests over a vault on disk: settings from `fieldnote.toml`, file class indexing,
//! field updates and lookup passes against [FsStore].

mod common;

use common::{create_test_vault, init_logging};
use fieldnote_core::{
    commands::{execute, related_document, Op, OpResult},
    config::{ConfigProvider, TomlConfigProvider},
    event::LookupEvent,
    lookup::LookupService,
    note::{FieldPayload, Note},
    registry::{FieldRegistry, StaticRegistry},
    source::{DocumentStore, FsStore, MemoryIndex},
};
use tempfile::TempDir;
use test_log::test;

const DUNE: &str = "---\nfileClass: book\nstatus: todo\n---\n# Dune\n\nA desert planet.\n";
const CHAPTER_ONE: &str = "---\nfileClass: chapter\npages: 12\n---\n";
const CHAPTER_TWO: &str = "---\nfileClass: chapter\npages: 8\n---\n";

const CHAPTERS_KEY: &str = "Dune.md__related__book___chl";
const TOTAL_KEY: &str = "Dune.md__related__book___tot";

async fn relate(
    index: &MemoryIndex,
    store: &FsStore,
    registry: &StaticRegistry,
    settings: &fieldnote_core::config::Settings,
    paths: &[&str],
) {
    let mut docs = Vec::new();
    for path in paths {
        docs.push(
            related_document(store, registry, settings, path)
                .await
                .unwrap(),
        );
    }
    index.set_related(CHAPTERS_KEY, docs.clone());
    index.set_related(TOTAL_KEY, docs);
}

fn field_value(text: &str, registry: &StaticRegistry, id: &str) -> Option<String> {
    let settings = fieldnote_core::config::Settings::default();
    Note::new("Dune.md", text, registry.fields_for_path("Dune.md"), &settings).value_for_field_id(id)
}

#[test(tokio::test)]
async fn test_lookup_pass_over_vault_converges() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_vault(
        &temp_dir,
        &[
            ("Dune.md", DUNE),
            ("chapters/one.md", CHAPTER_ONE),
            ("chapters/two.md", CHAPTER_TWO),
        ],
    );
    let settings = TomlConfigProvider::for_vault(&root).get_settings().unwrap();
    assert_eq!(settings.max_passes, 4);
    let registry = StaticRegistry::from_settings(&settings).unwrap();
    let store = FsStore::new(&root);

    let indexed = execute(Op::IndexFileClasses, &store, &registry, &settings)
        .await
        .unwrap();
    assert_eq!(indexed, OpResult::Indexed(3));
    assert_eq!(registry.classes_for_path("chapters/one.md"), vec!["chapter"]);

    let index = MemoryIndex::new();
    relate(
        &index,
        &store,
        &registry,
        &settings,
        &["chapters/one.md", "chapters/two.md"],
    )
    .await;

    let mut service = LookupService::new(store.clone(), index.clone(), registry.clone(), settings.clone());
    service.enqueue(LookupEvent::IndexUpdated).unwrap();
    let reports = service.run_until_idle().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].written, vec!["Dune.md".to_string()]);
    assert!(reports[0].diagnostics.is_empty());
    assert!(reports[1].is_idle());

    let text = store.read("Dune.md").await.unwrap();
    assert!(text.contains("status: todo\n"));
    assert!(text.ends_with("---\n# Dune\n\nA desert planet.\n"));
    assert_eq!(
        field_value(&text, &registry, "chl").unwrap(),
        "[[chapters/one|one]], [[chapters/two|two]]"
    );
    assert_eq!(field_value(&text, &registry, "tot").unwrap(), "20");

    // A chapter goes away: both lookups follow, in one write
    std::fs::remove_file(root.join("chapters/two.md")).unwrap();
    relate(&index, &store, &registry, &settings, &["chapters/one.md"]).await;
    service
        .enqueue(LookupEvent::DocumentRemoved("chapters/two.md".to_string()))
        .unwrap();
    service.enqueue(LookupEvent::IndexUpdated).unwrap();
    let reports = service.run_until_idle().await.unwrap();
    assert_eq!(reports[0].write_count(), 1);
    assert!(reports.last().unwrap().is_idle());

    let text = store.read("Dune.md").await.unwrap();
    assert_eq!(field_value(&text, &registry, "chl").unwrap(), "[[chapters/one|one]]");
    assert_eq!(field_value(&text, &registry, "tot").unwrap(), "12");
}

#[test(tokio::test)]
async fn test_set_and_get_fields_on_disk() {
    init_logging();
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_vault(&temp_dir, &[("Dune.md", DUNE)]);
    let settings = TomlConfigProvider::for_vault(&root).get_settings().unwrap();
    let registry = StaticRegistry::from_settings(&settings).unwrap();
    let store = FsStore::new(&root);

    assert_eq!(store.list().await.unwrap(), vec!["Dune.md".to_string()]);
    let result = execute(
        Op::SetValues(
            "Dune.md".to_string(),
            vec![FieldPayload::new("st", "reading")],
        ),
        &store,
        &registry,
        &settings,
    )
    .await
    .unwrap();
    let OpResult::Written(text, diagnostics) = result else {
        panic!("expected a write result");
    };
    assert!(diagnostics.is_empty());
    assert_eq!(text, DUNE.replacen("status: todo", "status: reading", 1));
    assert_eq!(std::fs::read_to_string(root.join("Dune.md")).unwrap(), text);

    let result = execute(Op::GetFields("Dune.md".to_string()), &store, &registry, &settings)
        .await
        .unwrap();
    let OpResult::Fields(fields, _) = result else {
        panic!("expected fields");
    };
    let status = fields.iter().find(|f| f.id == "st").unwrap();
    assert_eq!(status.value, "reading");
    assert_eq!(status.line, 2);
}

#[test(tokio::test)]
async fn test_set_values_creates_missing_document() {
    let temp_dir = TempDir::new().unwrap();
    let root = create_test_vault(&temp_dir, &[]);
    let settings = TomlConfigProvider::for_vault(&root).get_settings().unwrap();
    let registry = StaticRegistry::from_settings(&settings).unwrap();
    let store = FsStore::new(&root);

    assert!(!store.exists("inbox/New.md").await);
    execute(
        Op::SetValues("inbox/New.md".to_string(), vec![FieldPayload::new("st", "todo")]),
        &store,
        &registry,
        &settings,
    )
    .await
    .unwrap();
    assert!(store.exists("inbox/New.md").await);
    let text = store.read("inbox/New.md").await.unwrap();
    let note = Note::new(
        "inbox/New.md",
        &text,
        registry.fields_for_path("inbox/New.md"),
        &settings,
    );
    assert_eq!(note.value_for_field_id("st").unwrap(), "todo");
    assert_eq!(store.list().await.unwrap(), vec!["inbox/New.md".to_string()]);
}
