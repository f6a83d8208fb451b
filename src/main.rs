//! # Spillage CLI (`spill`)
//!
//! Search articles, add new ones, and summarize results from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! spill --config ./config/spill.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `spill search "<query>"` | Search and print one page of results |
//! | `spill ingest <url>` | Add an article by URL and follow the job |
//! | `spill ingest-file <path>` | Add a structured JSON document |
//! | `spill summarize <url>...` | Summarize one or more articles |
//! | `spill shell` | Interactive session |
//! | `spill completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Second page of results tagged "Ceramics", newest first
//! spill search "ming vases" --tag Ceramics --sort newest --page 2
//!
//! # Add an article with JSON progress lines on stderr
//! spill ingest https://medium.com/@author/post --progress json
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use spillage_client::models::SortMode;
use spillage_client::progress::ProgressMode;
use spillage_client::session::SessionController;
use spillage_client::{commands, config, shell};

/// Spillage CLI: search, ingest, and summarize articles.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/spill.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "spill",
    about = "Spillage: search, ingest, and summarize articles",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/spill.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/spill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search articles.
    ///
    /// Runs the query against the ranking service, then applies the tag
    /// filter, sort order, and page before printing.
    Search {
        /// The search query string.
        query: String,

        /// Only show results carrying this tag.
        #[arg(long)]
        tag: Option<String>,

        /// Sort order: `relevancy`, `newest`, or `oldest`.
        #[arg(long, default_value = "relevancy")]
        sort: SortMode,

        /// Page to show (1-based, clamped to the last page).
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Print the whole view as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add an article by URL and wait for ingestion to finish.
    Ingest {
        /// Article URL (http or https).
        url: String,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Add a structured JSON document and wait for ingestion to finish.
    ///
    /// The document must contain `title`, `text`, `url`, `authors`,
    /// `timestamp`, and `tags`.
    IngestFile {
        /// Path to the JSON document.
        path: PathBuf,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Summarize one or more article URLs.
    Summarize {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Start an interactive session.
    Shell,

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("spillage_client=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(
            *shell,
            &mut Cli::command(),
            "spill",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            tag,
            sort,
            page,
            json,
        } => {
            commands::run_search(&cfg, &query, tag, sort, page, json).await?;
        }
        Commands::Ingest { url, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_ingest(&cfg, &url, mode.reporter()).await?;
        }
        Commands::IngestFile { path, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_ingest_file(&cfg, &path, mode.reporter()).await?;
        }
        Commands::Summarize { urls } => {
            commands::run_summarize(&cfg, &urls).await?;
        }
        Commands::Shell => {
            let session = SessionController::from_config(&cfg)?;
            shell::run_shell(session).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
