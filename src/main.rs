//! # Knowledge Center CLI (`kc`)
//!
//! ## Usage
//!
//! ```bash
//! kc [--config ./config/kc.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kc serve` | Start the HTTP API server |
//! | `kc documents` | List stored documents, newest first |
//! | `kc ask "<question>"` | Answer a question from the stored documents |
//! | `kc config` | Print the resolved configuration with secrets masked |
//!
//! Settings not in the config file come from the environment (`DB_HOST`,
//! `STORAGE_BUCKET`, `PARSER_URL`, ...).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use knowledge_center::{chat, config, documents, logging, server};

/// Knowledge Center CLI: document ingestion and question answering.
#[derive(Parser)]
#[command(
    name = "kc",
    about = "Knowledge Center: retrieval-augmented question answering over your documents",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Optional; environment variables override anything it sets.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` (or `0.0.0.0:$PORT`).
    Serve,

    /// List stored documents.
    Documents {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Ask a question against the stored documents.
    Ask {
        /// The question.
        question: String,
    },

    /// Print the resolved configuration (secrets masked).
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json)?;

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Documents { json } => {
            documents::run_list_documents(&cfg, json).await?;
        }
        Commands::Ask { question } => {
            chat::run_ask(&cfg, &question).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&cfg.redacted())?);
        }
    }

    Ok(())
}
