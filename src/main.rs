//! # Awareness Retrieval CLI (`awr`)
//!
//! Command-line front end for the three-collection vector store.
//!
//! ## Usage
//!
//! ```bash
//! awr --config ./config/awr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `awr init` | Create the database and the three collections |
//! | `awr add <collection>` | Embed and store one document |
//! | `awr ingest <collection\|all>` | Load a knowledge-base directory |
//! | `awr get <collection> <id>` | Print a stored document |
//! | `awr search <collection> "<query>"` | Nearest documents in one collection |
//! | `awr search-all "<query>"` | Nearest documents in every collection |
//! | `awr context "<query>"` | Retrieval context for script generation |
//! | `awr clear <collection>` | Remove every document from a collection |
//! | `awr stats` | Per-collection document counts |
//! | `awr completions <shell>` | Print shell completions |

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use awareness_retrieval::context::{self, SessionContext};
use awareness_retrieval::ingest::{self, AddArgs};
use awareness_retrieval::vector_store::VectorStore;
use awareness_retrieval::{config, embedding, get, logging, search, stats};

/// Awareness Retrieval CLI: store and search security-awareness training
/// material across the `papers`, `templates`, and `threats` collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "awr",
    about = "Awareness Retrieval: multi-collection vector search for security-awareness material",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/awr.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and the three collections.
    ///
    /// Idempotent: running it again leaves existing documents untouched.
    Init,

    /// Embed and store a single document.
    Add {
        /// Target collection: `papers`, `templates`, or `threats`.
        collection: String,

        /// Document text.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// Read the document text from a file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Explicit id. An existing document with this id is replaced.
        #[arg(long)]
        id: Option<String>,

        /// Metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,

        #[arg(long)]
        source: Option<String>,

        /// Value of the `type` metadata field.
        #[arg(long = "type")]
        doc_type: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        category: Option<String>,

        /// Tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Load documents from the knowledge-base directory.
    ///
    /// Target is a collection name or `all`. With `all`, each collection
    /// reads `<knowledge_base.root>/<collection>/`.
    Ingest {
        target: String,

        /// Directory to read instead of `<root>/<collection>`.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Replace each collection's contents with the loaded documents.
        /// Existing records are kept if embedding fails.
        #[arg(long)]
        clear: bool,

        /// Show file and document counts without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a stored document.
    Get { collection: String, id: String },

    /// Search one collection.
    Search {
        collection: String,
        query: String,

        /// Metadata filter: `key=value[,key=value...]`.
        #[arg(long)]
        filter: Option<String>,

        /// Maximum number of results (default from config).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Search all three collections concurrently.
    SearchAll {
        query: String,

        /// Maximum number of results per collection.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Gather retrieval context for a script-generation request.
    Context {
        query: String,

        /// Facility type, e.g. `Krankenhaus`.
        #[arg(long)]
        facility: Option<String>,

        /// Target audience (repeatable).
        #[arg(long = "audience")]
        audiences: Vec<String>,

        /// Focus threat (repeatable).
        #[arg(long = "threat")]
        threats: Vec<String>,

        /// Template id to fetch worked examples for.
        #[arg(long)]
        template: Option<String>,
    },

    /// Remove every document from a collection.
    Clear { collection: String },

    /// Show per-collection document counts.
    Stats,

    /// Print shell completion script to stdout.
    Completions { shell: Shell },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "awr", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_minimal(&cli.config)?;
    logging::init_tracing(&cfg.logging, cli.verbose);

    let provider = embedding::create_provider(&cfg.embedding)?;
    let store = VectorStore::open(&cfg, provider).await?;

    let result = dispatch(cli.command, &cfg, &store, cli.json).await;
    store.close().await;
    result
}

async fn dispatch(
    command: Commands,
    cfg: &config::Config,
    store: &VectorStore,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            println!("Store initialized at {}", cfg.store.path.display());
        }
        Commands::Add {
            collection,
            text,
            file,
            id,
            metadata,
            source,
            doc_type,
            title,
            category,
            tags,
        } => {
            let args = AddArgs {
                text,
                file,
                id,
                metadata,
                source,
                doc_type,
                title,
                category,
                tags,
            };
            ingest::run_add(store, &collection, args).await?;
        }
        Commands::Ingest {
            target,
            path,
            clear,
            dry_run,
        } => {
            ingest::run_ingest(
                &cfg.knowledge_base,
                store,
                &target,
                path.as_deref(),
                clear,
                dry_run,
            )
            .await?;
        }
        Commands::Get { collection, id } => {
            get::run_get(store, &collection, &id, json).await?;
        }
        Commands::Search {
            collection,
            query,
            filter,
            limit,
        } => {
            search::run_search(store, &collection, &query, filter.as_deref(), limit, json).await?;
        }
        Commands::SearchAll { query, limit } => {
            let limit = limit.unwrap_or(cfg.retrieval.limit_per_collection);
            search::run_search_all(store, &query, limit, json).await?;
        }
        Commands::Context {
            query,
            facility,
            audiences,
            threats,
            template,
        } => {
            let session = SessionContext {
                facility_type: facility,
                target_audience: audiences,
                focus_threats: threats,
            };
            context::run_context(
                store,
                cfg.retrieval.clone(),
                &query,
                &session,
                template.as_deref(),
                json,
            )
            .await?;
        }
        Commands::Clear { collection } => {
            let removed = store.clear_collection(&collection).await?;
            println!("Cleared {} documents from {}", removed, collection);
        }
        Commands::Stats => {
            stats::run_stats(cfg, store, json).await?;
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}
