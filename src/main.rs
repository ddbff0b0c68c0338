//! # Dive Log Assistant CLI (`divelog`)
//!
//! ## Usage
//!
//! ```bash
//! divelog --config ./config/divelog.toml [command]
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `divelog` / `divelog chat` | Talk to the assistant |
//! | `divelog init` | Create the SQLite database and run schema migrations |
//! | `divelog populate <file>` | Load dives from a JSON array |
//! | `divelog search "<query>"` | Search the log |
//! | `divelog dives` | List every dive |
//! | `divelog get <id>` | Show one dive in full |
//! | `divelog stats` | Totals and embedding coverage |
//! | `divelog pref get/set/list` | Manage preferences |
//! | `divelog embed pending` | Backfill missing or stale embeddings |
//! | `divelog embed rebuild` | Delete and regenerate all embeddings |
//! | `divelog tools` | Print the tool schemas sent to the model |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use divelog::models::SearchFilters;
use divelog::tools::ToolRegistry;
use divelog::{chat, config, embed_cmd, get, migrate, populate, prefs, search, stats};

/// Dive Log Assistant: ask questions about your scuba dives and log new ones.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/divelog.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "divelog",
    about = "Dive Log Assistant: a conversational assistant for your scuba dive log",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/divelog.toml`. A missing file means built-in
    /// defaults.
    #[arg(long, global = true, default_value = "./config/divelog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the interactive assistant (the default).
    ///
    /// Requires OPENAI_API_KEY.
    Chat,

    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the dive log tables, the full-text
    /// index and its triggers. Running it again is safe.
    Init,

    /// Load dives from a JSON file containing an array of dive objects.
    Populate {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Search the dive log.
    ///
    /// An empty query lists every dive matching the filters.
    Search {
        /// Free-text query.
        query: String,

        /// Country, area, or site (exact, case-insensitive).
        #[arg(long)]
        location: Option<String>,

        /// Dive type; comma-separate several to match any.
        #[arg(long)]
        dive_type: Option<String>,

        /// Only dives with a maximum depth at most this many meters.
        #[arg(long)]
        max_depth: Option<f64>,

        /// Only dives with a maximum depth at least this many meters.
        #[arg(long)]
        min_depth: Option<f64>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// List every dive, most recent first.
    Dives,

    /// Show a single dive by id.
    Get {
        /// Dive id.
        id: String,
    },

    /// Show dive log statistics.
    Stats,

    /// Read or write user preferences.
    Pref {
        #[command(subcommand)]
        action: PrefAction,
    },

    /// Manage embedding vectors for semantic retrieval.
    ///
    /// Requires an embedding provider to be configured.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Print the tool definitions exposed to the language model.
    Tools,
}

#[derive(Subcommand)]
enum PrefAction {
    /// Print a preference value.
    Get { key: String },
    /// Store a preference, replacing any previous value.
    Set { key: String, value: String },
    /// List all preferences.
    List,
}

/// Embedding management subcommands.
#[derive(Subcommand)]
enum EmbedAction {
    /// Embed dives that are missing or have stale embeddings.
    Pending {
        /// Maximum number of dives to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete and regenerate all embeddings.
    ///
    /// Useful when switching embedding models or dimensions.
    Rebuild {
        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("divelog=warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    if let Some(Commands::Tools) = cli.command {
        let defs = ToolRegistry::with_builtins().definitions();
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }

    if let Ok(cwd) = std::env::current_dir() {
        config::load_dotenv(&cwd);
    }
    let cfg = config::load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Populate { file } => {
            populate::run_populate(&cfg, &file).await?;
        }
        Commands::Search {
            query,
            location,
            dive_type,
            max_depth,
            min_depth,
            limit,
        } => {
            let filters = SearchFilters {
                location,
                dive_type,
                max_depth,
                min_depth,
            };
            search::run_search(&cfg, &query, filters, limit).await?;
        }
        Commands::Dives => {
            get::run_list(&cfg).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Pref { action } => match action {
            PrefAction::Get { key } => prefs::run_pref_get(&cfg, &key).await?,
            PrefAction::Set { key, value } => prefs::run_pref_set(&cfg, &key, &value).await?,
            PrefAction::List => prefs::run_pref_list(&cfg).await?,
        },
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => {
                embed_cmd::run_embed_pending(&cfg, limit, batch_size, dry_run).await?;
            }
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(&cfg, batch_size).await?;
            }
        },
        Commands::Tools => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}
