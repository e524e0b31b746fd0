//! # Steam Harvest CLI (`harvest`)
//!
//! ## Usage
//!
//! ```bash
//! harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest catalog` | Fetch and store the Steam app list |
//! | `harvest fetch <details\|news\|achievements>` | Run the resumable harvest loop over the catalog |
//! | `harvest load` | Normalize stored artifacts into the relational tables |
//! | `harvest status` | Show harvest progress and table row counts |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use steam_harvest::fetch_cmd::{self, Dataset};
use steam_harvest::progress::ProgressMode;
use steam_harvest::{config, load_cmd, logging, migrate, stats};

/// Steam Harvest CLI: resumable Steam harvesting and normalization.
#[derive(Parser)]
#[command(
    name = "harvest",
    about = "Steam Harvest — resumable Steam catalog, store-page, news and achievements harvester",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the normalized tables and the
    /// harvest bookkeeping tables. Safe to run repeatedly.
    Init,

    /// Fetch the app catalog (GetAppList).
    ///
    /// The stored catalog is reused unless `--refresh` is given.
    Catalog {
        #[arg(long)]
        refresh: bool,
    },

    /// Harvest one per-app dataset over the stored catalog.
    ///
    /// Resumes from the last checkpoint. A failure leaves a checkpoint at the
    /// failing id, so rerunning the command retries it.
    Fetch {
        dataset: Dataset,

        /// Drop the checkpoint and any finished artifact, then start over.
        #[arg(long)]
        restart: bool,

        /// Progress output on stderr. Defaults to human when stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Normalize the stored artifacts and load them.
    Load {
        /// Empty the normalized tables first.
        #[arg(long)]
        reset: bool,

        /// Normalize and validate only; write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show dataset progress and table row counts.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Catalog { refresh } => {
            fetch_cmd::run_catalog(&cfg, refresh).await?;
        }
        Commands::Fetch {
            dataset,
            restart,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            fetch_cmd::run_fetch(&cfg, dataset, restart, mode).await?;
        }
        Commands::Load { reset, dry_run } => {
            load_cmd::run_load(&cfg, reset, dry_run).await?;
        }
        Commands::Status => {
            stats::run_status(&cfg).await?;
        }
    }

    Ok(())
}
