//! `harvest catalog` and `harvest fetch` commands.
//!
//! Both persist through the [`SqliteCheckpointStore`]: the catalog is stored
//! as a completed artifact of its own, and the per-id datasets run the
//! [`Harvester`] over the catalog's appids in catalog order.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use steam_harvest_core::models::CatalogEntry;

use crate::checkpoint::SqliteCheckpointStore;
use crate::config::Config;
use crate::db;
use crate::harvest::{HarvestOutcome, HarvestPolicy, Harvester};
use crate::progress::{format_number, ProgressMode};
use crate::steam_api::{self, AchievementsFetcher, NewsFetcher};
use crate::store_page::StorePageFetcher;
use crate::traits::{CheckpointStore, Fetcher};

pub const CATALOG: &str = "catalog";

/// Per-id datasets the harvest loop can fetch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Dataset {
    /// Store-page details per appid.
    Details,
    /// News items per appid.
    News,
    /// Global achievement unlock percentages per appid.
    Achievements,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Details => "details",
            Dataset::News => "news",
            Dataset::Achievements => "achievements",
        }
    }
}

/// Read the stored catalog artifact.
pub async fn load_catalog(store: &dyn CheckpointStore) -> Result<Option<Vec<CatalogEntry>>> {
    let Some(values) = store.load_artifact(CATALOG).await? else {
        return Ok(None);
    };
    let entries = values
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<CatalogEntry>, _>>()
        .context("Stored catalog is malformed")?;
    Ok(Some(entries))
}

pub async fn run_catalog(config: &Config, refresh: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteCheckpointStore::new(pool.clone());

    if !refresh {
        if let Some(entries) = load_catalog(&store).await? {
            println!("catalog (cached)");
            println!("  apps: {}", format_number(entries.len() as u64));
            println!("ok");
            pool.close().await;
            return Ok(());
        }
    }

    let client = steam_api::build_client(&config.source)?;
    let entries = steam_api::fetch_catalog(&client, &config.source.api_base)
        .await
        .context("Failed to fetch app catalog")?;
    let values = entries
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()?;
    store.discard(CATALOG).await?;
    store.complete(CATALOG, &values).await?;

    println!("catalog");
    println!("  apps: {}", format_number(entries.len() as u64));
    println!("ok");

    pool.close().await;
    Ok(())
}

pub async fn run_fetch(
    config: &Config,
    dataset: Dataset,
    restart: bool,
    progress: ProgressMode,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteCheckpointStore::new(pool.clone());

    let Some(catalog) = load_catalog(&store).await? else {
        bail!("No catalog stored yet. Run `harvest catalog` first.");
    };
    let candidates: Vec<i64> = catalog.iter().map(|e| e.appid).collect();

    if restart {
        store.discard(dataset.as_str()).await?;
    }

    let client = steam_api::build_client(&config.source)?;
    let fetcher: Box<dyn Fetcher> = match dataset {
        Dataset::Details => Box::new(StorePageFetcher::new(client, &config.source.store_base)),
        Dataset::News => Box::new(NewsFetcher::new(client, &config.source.api_base)),
        Dataset::Achievements => {
            Box::new(AchievementsFetcher::new(client, &config.source.api_base))
        }
    };

    let harvester = Harvester::new(
        fetcher.as_ref(),
        &store,
        HarvestPolicy::from(&config.harvest),
    )
    .with_progress(progress.reporter());

    let outcome = harvester
        .run(&candidates)
        .await
        .with_context(|| format!("harvest {} failed", dataset.as_str()))?;

    match outcome {
        HarvestOutcome::AlreadyComplete { items } => {
            println!("harvest {} (already complete)", dataset.as_str());
            println!("  items: {}", format_number(items.len() as u64));
            println!("  use --restart to fetch again");
        }
        HarvestOutcome::Completed(report) => {
            println!("harvest {}", dataset.as_str());
            if report.resumed_from > 0 {
                println!(
                    "  resumed from: {}",
                    format_number(report.resumed_from as u64)
                );
            }
            println!("  fetched: {}", format_number(report.fetched));
            println!("  absent: {}", format_number(report.absent));
            println!("  denylisted: {}", format_number(report.denylisted));
            println!("  retries: {}", format_number(report.retries));
            println!("  checkpoints: {}", format_number(report.checkpoints_written));
            println!("  items: {}", format_number(report.total_items as u64));
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}
