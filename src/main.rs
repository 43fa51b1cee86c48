//! # docqa CLI
//!
//! ```bash
//! # Embed every row of the `documents` table into vectorstore/db_faiss
//! DB_NAME=docs DB_USER=app DB_PASSWORD=... DB_HOST=localhost DB_PORT=5432 docqa ingest
//!
//! # Answer questions over HTTP
//! HF_TOKEN=hf_... HUGGINGFACE_REPO_ID=mistralai/Mistral-7B-Instruct-v0.3 docqa serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::{config, ingest, logging, server};

/// docqa — ask questions about the rows of a database table.
#[derive(Parser)]
#[command(name = "docqa", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Optional; environment variables
    /// override its values.
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index from the `documents` table.
    Ingest,

    /// Load the vector index and serve `POST /ask`.
    Serve {
        /// Override `server.bind` (e.g. `0.0.0.0:8000`).
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // A `.env` in the working directory fills in unset variables only.
    dotenvy::dotenv().ok();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Ingest => ingest::run_ingest(&cfg).await?,
        Commands::Serve { bind } => server::run_server(&cfg, bind).await?,
    }

    Ok(())
}
