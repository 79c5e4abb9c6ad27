//! fieldnote CLI tool
//!
//! Command-line interface for inspecting and updating fields in a directory of markdown
//! documents, and for running lookup passes over it.
//!
//! ## Commands
//!
//! - `fields <root> <doc>`: Print the resolved fields of a document as JSON
//! - `set <root> <doc> <field-id> <value>`: Update or insert one field value
//! - `lookups <root> --related <file>`: Recompute lookup fields until nothing changes
//!
//! Settings are read from `fieldnote.toml` at the root unless `--config` names another file.
//! Documents declaring a file class under the configured alias are assigned to it before any
//! command runs.

use clap::{Parser, Subcommand};
use fieldnote_core::{
    commands::{execute, related_document, Op, OpResult},
    config::{ConfigProvider, Settings, TomlConfigProvider},
    event::LookupEvent,
    lookup::LookupService,
    note::FieldPayload,
    registry::StaticRegistry,
    source::{FsStore, MemoryIndex},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(name = "fieldnote")]
#[command(author, version, about = "Typed fields in markdown documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (default: <root>/fieldnote.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fields of a document as JSON
    Fields {
        /// Root directory of the document collection
        root: PathBuf,

        /// Document path relative to the root
        doc: String,
    },

    /// Update a field, inserting it (and any missing parents) when absent
    Set {
        root: PathBuf,

        doc: String,

        /// Field id, or an indexed path such as `refs[1]____title`
        field: String,

        value: String,

        /// Treat `field` as an indexed path
        #[arg(long)]
        indexed: bool,
    },

    /// Recompute lookup fields until a pass writes nothing
    Lookups {
        root: PathBuf,

        /// JSON file mapping lookup instance keys to related document paths
        #[arg(long)]
        related: PathBuf,

        /// Recompute fields with auto update disabled too
        #[arg(long)]
        force: bool,
    },
}

fn load_settings(root: &Path, config: Option<PathBuf>) -> Result<Settings, Box<dyn std::error::Error>> {
    let provider = match config {
        Some(path) => TomlConfigProvider::new(path),
        None => TomlConfigProvider::for_vault(root),
    };
    Ok(provider.get_settings()?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Fields { root, doc } => {
            let settings = load_settings(&root, cli.config)?;
            let registry = StaticRegistry::from_settings(&settings)?;
            let store = FsStore::new(&root);
            let result = runtime.block_on(async {
                execute(Op::IndexFileClasses, &store, &registry, &settings).await?;
                execute(Op::GetFields(doc), &store, &registry, &settings).await
            })?;
            if let OpResult::Fields(fields, diagnostics) = result {
                println!("{}", serde_json::to_string_pretty(&fields)?);
                for diagnostic in diagnostics {
                    eprintln!("{diagnostic}");
                }
            }
        }

        Commands::Set {
            root,
            doc,
            field,
            value,
            indexed,
        } => {
            let settings = load_settings(&root, cli.config)?;
            let registry = StaticRegistry::from_settings(&settings)?;
            let store = FsStore::new(&root);
            let payload = match indexed {
                true => {
                    let id = fieldnote_core::paths::indexed_path_field_id(&field).to_string();
                    FieldPayload::new(&id, &value).at(&field)
                }
                false => FieldPayload::new(&field, &value),
            };
            let result = runtime.block_on(async {
                execute(Op::IndexFileClasses, &store, &registry, &settings).await?;
                execute(Op::SetValues(doc, vec![payload]), &store, &registry, &settings).await
            })?;
            if let OpResult::Written(_, diagnostics) = result {
                for diagnostic in diagnostics.iter() {
                    eprintln!("{diagnostic}");
                }
                if !diagnostics.is_empty() {
                    std::process::exit(1);
                }
            }
        }

        Commands::Lookups {
            root,
            related,
            force,
        } => {
            let settings = load_settings(&root, cli.config)?;
            let registry = StaticRegistry::from_settings(&settings)?;
            let store = FsStore::new(&root);
            let instances: BTreeMap<String, Vec<String>> =
                serde_json::from_str(&std::fs::read_to_string(&related)?)?;

            let reports = runtime.block_on(async {
                execute(Op::IndexFileClasses, &store, &registry, &settings).await?;
                let index = MemoryIndex::new();
                for (key, paths) in instances.iter() {
                    let mut docs = Vec::new();
                    for path in paths.iter() {
                        match related_document(&store, &registry, &settings, path).await {
                            Ok(doc) => docs.push(doc),
                            Err(e) => tracing::warn!("Skipping related document {}: {}", path, e),
                        }
                    }
                    index.set_related(key, docs);
                }
                let mut service = LookupService::new(store, index, registry, settings);
                service.enqueue(match force {
                    true => LookupEvent::ForceUpdateAll,
                    false => LookupEvent::IndexUpdated,
                })?;
                service.run_until_idle().await
            })?;

            let written: usize = reports.iter().map(|r| r.write_count()).sum();
            println!("{} passes, {} documents written", reports.len(), written);
            for report in reports.iter() {
                for diagnostic in report.diagnostics.iter() {
                    eprintln!("{diagnostic}");
                }
            }
        }
    }

    Ok(())
}
