//! # RAG Assistant CLI (`rag`)
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database schema |
//! | `rag status` | Show store, providers, and missing API keys |
//! | `rag upload <paths..>` | Upload files (directories are walked recursively) |
//! | `rag documents` | List uploaded documents |
//! | `rag get <id>` | Show a document and its chunks |
//! | `rag delete <id>` | Delete a document and its chunks |
//! | `rag search "<query>"` | Similarity search over chunks |
//! | `rag ask "<question>"` | Answer a question from the documents |
//! | `rag chat` | Interactive chat on stdin |
//! | `rag greet "<text>"` | Landing-page greeting bot |
//! | `rag history` | Persisted chat messages |
//! | `rag serve` | Start the HTTP API |
//!
//! Logs go to stderr; set `RUST_LOG` to change verbosity.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use rag_assistant::{commands, config, server};

const DEFAULT_CONFIG: &str = "./config/rag.toml";

/// RAG Assistant: upload documents, then ask questions about them.
///
/// API keys are read from the environment (`JINA_API_KEY`,
/// `GEMINI_API_KEY`, `OPENAI_API_KEY`, `SUPABASE_URL`,
/// `SUPABASE_ANON_KEY`). Without them the assistant uses deterministic
/// mock embeddings and templated answers.
#[derive(Parser)]
#[command(name = "rag", version, about = "Retrieval-augmented chat over your documents")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// A missing file at the default path means "all defaults".
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite database and schema. Safe to run repeatedly.
    Init,

    /// Show the configured store, providers, document count, and missing keys.
    Status,

    /// Upload files or directories.
    Upload {
        /// Files or directories. Directories only contribute files with an
        /// allowed extension.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// List uploaded documents, newest first.
    Documents,

    /// Show one document with its chunks.
    Get {
        /// Document id.
        id: String,
    },

    /// Delete a document and its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// Find chunks similar to a query.
    Search {
        query: String,

        /// Maximum number of results (default: `[retrieval].limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity, exclusive (default: `[retrieval].threshold`).
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Answer a question from the uploaded documents.
    Ask { question: String },

    /// Interactive chat. Type `/quit` to leave.
    Chat,

    /// Reply with the landing-page greeting.
    Greet { text: String },

    /// Show persisted chat messages (requires `[chat].persist = true`).
    History {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rag_assistant=info,rag=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<config::Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(config::Config::default());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // greeting needs no configuration, so it is loaded per command
    let cfg = || load_config(&cli.config);

    match cli.command {
        Commands::Greet { text } => commands::run_greet(&text)?,
        Commands::Init => commands::run_init(&cfg()?).await?,
        Commands::Status => commands::run_status(&cfg()?).await?,
        Commands::Upload { paths } => commands::run_upload(&cfg()?, &paths).await?,
        Commands::Documents => commands::run_documents(&cfg()?).await?,
        Commands::Get { id } => commands::run_get(&cfg()?, &id).await?,
        Commands::Delete { id } => commands::run_delete(&cfg()?, &id).await?,
        Commands::Search {
            query,
            limit,
            threshold,
        } => commands::run_search(&cfg()?, &query, limit, threshold).await?,
        Commands::Ask { question } => commands::run_ask(&cfg()?, &question).await?,
        Commands::Chat => commands::run_chat(&cfg()?).await?,
        Commands::History { limit } => commands::run_history(&cfg()?, limit).await?,
        Commands::Serve => server::run_server(&cfg()?).await?,
    }

    Ok(())
}
