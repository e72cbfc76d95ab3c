//! Stress Analyzer - Main Entry Point

use std::path::PathBuf;

use anyhow::Result;
use api::{init_logging, run_server, AppConfig};
use clap::{Parser, Subcommand};
use storage::HistoryLog;
use tracing::info;
use user_auth::CredentialStore;

/// Student stress analyzer
#[derive(Parser)]
#[command(name = "stress-analyzer")]
#[command(about = "Classifies wellness questionnaires into stress levels and keeps their history")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./stress-analyzer.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Override the configured bind address
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Create an account
    Register { username: String, password: String },

    /// Grant the admin role to an existing account
    Promote { username: String },

    /// Rewrite the history log into the canonical layout
    MigrateHistory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.log.level = "debug".to_string();
    }
    init_logging(&config.log)?;

    info!("=== Stress Analyzer v{} ===", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            run_server(config).await?;
        }
        Commands::Register { username, password } => {
            std::fs::create_dir_all(&config.data_dir)?;
            let user = CredentialStore::open(config.users_path())?.register(&username, &password)?;
            println!("Registered {} ({})", user.username, user.role.as_str());
        }
        Commands::Promote { username } => {
            let user = CredentialStore::open(config.users_path())?.promote(&username)?;
            println!("{} is now {}", user.username, user.role.as_str());
        }
        Commands::MigrateHistory => {
            let report = HistoryLog::migrate(config.history_path())?;
            println!("Kept {} rows, rejected {}", report.kept, report.rejected);
            if let Some(path) = report.rejected_path {
                println!("Rejected rows written to {}", path.display());
            }
        }
    }

    Ok(())
}
