//! CLI entry point for the note vector store.
//!
//! Maps one command to each engine operation. Logs go to stderr through
//! `tracing`; results go to stdout as text tables or JSON.

use std::fmt;
use std::path::{Path, PathBuf};

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use notevault::chunking::ChunkingOptions;
use notevault::config::{CONFIG_DIR, EngineConfig, Settings};
use notevault::display::{
    THEME, create_batch_table, create_help_text, create_info_table, create_progress_bar,
    create_query_table, with_spinner,
};
use notevault::engine::{BatchReport, DocumentInput, IndexInfo, IndexScope, QueryHit};
use notevault::io::{ExitCode, OutputFormat, OutputManager};
use notevault::workspace::{relative_to_root, scan_workspace, to_document_path};
use notevault::{StoreError, StoreResult, VectorStoreEngine};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic search over a folder of notes
#[derive(Parser)]
#[command(
    name = "notevault",
    version = env!("CARGO_PKG_VERSION"),
    about = "Semantic search over a folder of notes",
    long_about = "Chunk notes, embed the chunks and query them by meaning.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = create_help_text()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Chunking overrides shared by the embedding commands
#[derive(clap::Args, Debug, Clone, Copy)]
struct ChunkArgs {
    /// Characters per chunk (overrides config)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Characters shared by consecutive chunks (overrides config)
    #[arg(long)]
    chunk_overlap: Option<usize>,
}

impl From<ChunkArgs> for ChunkingOptions {
    fn from(args: ChunkArgs) -> Self {
        ChunkingOptions {
            chunk_size: args.chunk_size,
            chunk_overlap: args.chunk_overlap,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Create .notevault/settings.toml in the current directory
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Open or create the store and bind it to the configured model
    Configure,

    /// Embed one note, replacing its previous chunks
    #[command(after_help = "Examples:\n  notevault embed notes/today.md\n  notevault embed ~/inbox/idea.md --name ideas/idea.md")]
    Embed {
        /// Note file to read
        path: PathBuf,

        /// Document name (defaults to the workspace-relative path)
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// Embed every note found under the workspace
    #[command(name = "embed-batch")]
    EmbedBatch {
        /// Directory to scan (defaults to the workspace root)
        #[arg(long)]
        root: Option<PathBuf>,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// Remove a note's chunks and index entries
    Delete {
        /// Document name as shown by `list`
        name: String,
    },

    /// Index missing entries for one note, or rebuild the whole index
    #[command(name = "update-index")]
    UpdateIndex {
        /// Only index this document's chunks
        #[arg(long)]
        document: Option<String>,
    },

    /// Find the chunks nearest to a piece of text
    #[command(after_help = "Examples:\n  notevault query \"watering schedule\"\n  notevault query \"soup recipes\" -k 3 --json | jq '.data[].document_name'")]
    Query {
        /// Text to search for
        text: String,

        /// Number of results (overrides config)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Show index and chunk counts
    Info,

    /// Delete every chunk and index entry
    Reset,

    /// List embedded documents
    List,
}

#[derive(Debug, Serialize)]
struct StoreSummary {
    store_path: String,
    model: String,
    dimension: usize,
    #[serde(flatten)]
    info: IndexInfo,
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            create_info_table(&self.info, &self.model, self.dimension, &self.store_path)
        )
    }
}

#[derive(Debug, Serialize)]
struct Embedded {
    document: String,
    chunks: usize,
}

impl fmt::Display for Embedded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = format!("Embedded {} ({} chunks)", self.document, self.chunks);
        write!(f, "{}", THEME.success_with_icon(&message))
    }
}

#[derive(Debug, Serialize)]
struct Deleted {
    document: String,
    chunks: usize,
}

impl fmt::Display for Deleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = format!("Deleted {} ({} chunks)", self.document, self.chunks);
        write!(f, "{}", THEME.success_with_icon(&message))
    }
}

#[derive(Debug, Serialize)]
struct Indexed {
    scope: String,
    entries: usize,
}

impl fmt::Display for Indexed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = format!("Indexed {} entries ({})", self.entries, self.scope);
        write!(f, "{}", THEME.success_with_icon(&message))
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct Hits(Vec<QueryHit>);

impl fmt::Display for Hits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "{}", THEME.apply(&THEME.dim, "No matching chunks"));
        }
        write!(f, "{}", create_query_table(&self.0))
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct BatchSummary(BatchReport);

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", create_batch_table(&self.0))
    }
}

#[derive(Debug, Serialize)]
struct DocumentEntry {
    name: String,
    chunks: usize,
}

impl fmt::Display for DocumentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}",
            THEME.apply(&THEME.path, &self.name),
            THEME.apply(&THEME.dim, format!("({} chunks)", self.chunks))
        )
    }
}

#[derive(Debug, Serialize)]
struct Message {
    message: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", THEME.success_with_icon(&self.message))
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notevault=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);
    let mut output = OutputManager::new(format);

    let code = match run(&cli, &mut output) {
        Ok(code) => code,
        Err(error) => output.error(&error).unwrap_or(ExitCode::GeneralError),
    };
    std::process::exit(code.into());
}

fn run(cli: &Cli, output: &mut OutputManager) -> StoreResult<ExitCode> {
    // init must work even when the existing settings file is broken
    let settings = match cli.command {
        Commands::Init { .. } => Settings::default(),
        _ => load_settings(cli.config.as_deref())?,
    };
    let json = output.format().is_json();

    match &cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(*force).map_err(|e| StoreError::Config {
                reason: e.to_string(),
            })?;
            respond(
                output,
                Message {
                    message: format!("Created configuration file at {}", path.display()),
                },
            )
        }

        Commands::Configure => {
            let engine = open_engine(&settings, None, json)?;
            summary(output, &engine)
        }

        Commands::Embed {
            path,
            name,
            chunking,
        } => {
            let root = workspace_root(&settings);
            let relative = relative_to_root(&root, path);
            let document_path = if relative.is_absolute() {
                relative.to_string_lossy().into_owned()
            } else {
                to_document_path(&relative)
            };
            let document = DocumentInput {
                name: name.clone().unwrap_or_else(|| document_path.clone()),
                path: document_path,
                content: None,
            };

            let engine = open_engine(&settings, Some(&root), json)?;
            let chunks = with_spinner(&format!("Embedding {}", document.name), !json, || {
                engine.embed_document(&document, (*chunking).into())
            })?;
            respond(
                output,
                Embedded {
                    document: document.name,
                    chunks,
                },
            )
        }

        Commands::EmbedBatch { root, chunking } => {
            let root = root.clone().unwrap_or_else(|| workspace_root(&settings));
            let documents: Vec<DocumentInput> = scan_workspace(
                &root,
                &settings.workspace.extensions,
                &settings.workspace.skip_dirs,
            )?
            .into_iter()
            .map(DocumentInput::from_path)
            .collect();

            if documents.is_empty() {
                output
                    .progress(&format!("No notes found under {}", root.display()))
                    .ok();
            }

            let engine = open_engine(&settings, Some(&root), json)?;
            let report = if json {
                engine.embed_batch(&documents, (*chunking).into())?
            } else {
                let progress = create_progress_bar(documents.len() as u64, "Embedding notes");
                let report =
                    engine.embed_batch_with_progress(&documents, (*chunking).into(), |name| {
                        progress.set_message(name.to_string());
                        progress.inc(1);
                    });
                progress.finish_and_clear();
                report?
            };

            if report.is_clean() {
                respond(output, BatchSummary(report))
            } else {
                let message = format!(
                    "{} documents failed; fix them and run embed-batch again",
                    report.failed.len()
                );
                output
                    .success_with_code(
                        BatchSummary(report),
                        ExitCode::PartialFailure,
                        &styled_warning(&message, json),
                    )
                    .map_err(StoreError::from)
            }
        }

        Commands::Delete { name } => {
            let engine = open_engine(&settings, None, json)?;
            let chunks = engine.delete_document_embedding(name)?;
            if chunks == 0 {
                return output.not_found("Document", name).map_err(StoreError::from);
            }
            respond(
                output,
                Deleted {
                    document: name.clone(),
                    chunks,
                },
            )
        }

        Commands::UpdateIndex { document } => {
            let engine = open_engine(&settings, None, json)?;
            let scope = match document {
                Some(name) => IndexScope::Document(name.clone()),
                None => IndexScope::Full,
            };
            let label = match &scope {
                IndexScope::Document(name) => name.clone(),
                IndexScope::Full => "full rebuild".to_string(),
            };
            let entries = with_spinner("Updating index", !json, || engine.update_index(scope))?;
            respond(
                output,
                Indexed {
                    scope: label,
                    entries,
                },
            )
        }

        Commands::Query { text, k } => {
            let engine = open_engine(&settings, None, json)?;
            let k = k.unwrap_or(settings.query.result_count);
            let hits = with_spinner("Searching", !json, || engine.query(text, k))?;
            respond(output, Hits(hits))
        }

        Commands::Info => {
            let engine = open_engine(&settings, None, json)?;
            summary(output, &engine)
        }

        Commands::Reset => {
            let engine = open_engine(&settings, None, json)?;
            engine.reset()?;
            respond(
                output,
                Message {
                    message: format!("Reset {}", engine.store_path().display()),
                },
            )
        }

        Commands::List => {
            let engine = open_engine(&settings, None, json)?;
            let entries = engine
                .list_document_names()?
                .into_iter()
                .map(|name| {
                    let chunks = engine.document_chunk_count(&name)?;
                    Ok(DocumentEntry { name, chunks })
                })
                .collect::<StoreResult<Vec<_>>>()?;
            output.collection(entries, "documents").map_err(StoreError::from)
        }
    }
}

fn load_settings(config_path: Option<&Path>) -> StoreResult<Settings> {
    let loaded = match config_path {
        Some(path) => Settings::load_from(path),
        None => {
            if Settings::workspace_root().is_none() {
                tracing::warn!(
                    "no {CONFIG_DIR} directory found, using default configuration (run 'notevault init')"
                );
            }
            Settings::load()
        }
    };
    loaded.map_err(|e| StoreError::Config {
        reason: e.to_string(),
    })
}

/// Configured workspace root, or the current directory.
fn workspace_root(settings: &Settings) -> PathBuf {
    settings
        .store
        .workspace_root
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn open_engine(
    settings: &Settings,
    document_root: Option<&Path>,
    json: bool,
) -> StoreResult<VectorStoreEngine> {
    let mut config = EngineConfig::from_settings(settings);
    if let Some(root) = document_root {
        config = config.with_workspace_root(root);
    }

    let provider = with_spinner("Loading embedding model", !json, || {
        settings.embedding.create_generator()
    })?;
    VectorStoreEngine::open(config, provider)
}

fn summary(output: &mut OutputManager, engine: &VectorStoreEngine) -> StoreResult<ExitCode> {
    let info = engine.info()?;
    let summary = StoreSummary {
        store_path: engine.store_path().display().to_string(),
        model: engine.model_id().to_string(),
        dimension: engine.dimension().get(),
        info,
    };

    if info.is_drifted() {
        let message = styled_warning("index drift, run update-index", output.format().is_json());
        output
            .success_with_code(summary, ExitCode::IndexDrift, &message)
            .map_err(StoreError::from)
    } else {
        respond(output, summary)
    }
}

/// JSON messages stay plain.
fn styled_warning(message: &str, json: bool) -> String {
    if json {
        message.to_string()
    } else {
        THEME.warning_with_icon(message)
    }
}

fn respond<T>(output: &mut OutputManager, data: T) -> StoreResult<ExitCode>
where
    T: Serialize + fmt::Display,
{
    output.success(data).map_err(StoreError::from)
}

