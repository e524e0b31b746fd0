//! `harvest load`: normalize the stored artifacts and apply them to the
//! relational tables.

use anyhow::{bail, Context, Result};
use steam_harvest_core::load::{validate, LoadCoordinator, LoadError};
use steam_harvest_core::models::{Dimension, NormalizedGraph};
use steam_harvest_core::normalize::normalize;
use tracing::{info, warn};

use crate::checkpoint::SqliteCheckpointStore;
use crate::config::Config;
use crate::db;
use crate::fetch_cmd::{load_catalog, Dataset};
use crate::migrate;
use crate::progress::format_number;
use crate::sqlite_store::SqliteStore;
use crate::traits::CheckpointStore;

/// Build the normalized graph from whatever artifacts are stored.
///
/// The catalog and details artifacts are required; a missing news artifact
/// loads as no news.
pub async fn normalize_stored(store: &dyn CheckpointStore) -> Result<NormalizedGraph> {
    let Some(catalog) = load_catalog(store).await? else {
        bail!("No catalog stored yet. Run `harvest catalog` first.");
    };
    let Some(details) = store.load_artifact(Dataset::Details.as_str()).await? else {
        bail!("No completed details harvest. Run `harvest fetch details` first.");
    };
    let news = match store.load_artifact(Dataset::News.as_str()).await? {
        Some(news) => news,
        None => {
            warn!("no completed news harvest; loading games only");
            Vec::new()
        }
    };

    let graph = normalize(&catalog, &details, &news);
    info!(
        games = graph.games.len(),
        news = graph.news.len(),
        report = ?graph.report,
        "normalized"
    );
    Ok(graph)
}

pub async fn run_load(config: &Config, reset: bool, dry_run: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let checkpoints = SqliteCheckpointStore::new(pool.clone());
    let graph = normalize_stored(&checkpoints).await?;
    let r = &graph.report;

    if dry_run {
        validate(&graph).context("Normalized graph failed validation")?;
        println!("load (dry-run)");
        print_normalize_summary(&graph);
        println!("ok");
        pool.close().await;
        return Ok(());
    }

    if reset {
        migrate::reset_normalized(&pool).await?;
        info!("normalized tables emptied");
    }

    let store = SqliteStore::new(pool.clone());
    let report = match LoadCoordinator::new(&store).load(&graph).await {
        Ok(report) => report,
        Err(err @ LoadError::SurrogateConflict { .. }) => {
            return Err(anyhow::Error::new(err).context(
                "Load failed: the normalized tables hold a different run. Rerun with `harvest load --reset`",
            ));
        }
        Err(err) => return Err(anyhow::Error::new(err).context("Load failed")),
    };

    println!("load");
    print_normalize_summary(&graph);
    println!("  dimension rows: {}", format_number(report.dimension_rows));
    println!("  game links: {}", format_number(report.game_links));
    println!("  news tags: {}", format_number(report.news_tags));
    println!(
        "  companies flagged: {} developers, {} publishers",
        format_number(report.developers_flagged),
        format_number(report.publishers_flagged)
    );
    if r.games_invalid + r.news_invalid > 0 {
        println!(
            "  invalid records skipped: {}",
            format_number(r.games_invalid + r.news_invalid)
        );
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

fn print_normalize_summary(graph: &NormalizedGraph) {
    let r = &graph.report;
    println!(
        "  games: {} (duplicates: {}, outside identity set: {})",
        format_number(r.games_accepted),
        format_number(r.games_duplicate),
        format_number(r.games_outside_identity_set)
    );
    println!(
        "  news items: {} (duplicates: {}, outside identity set: {})",
        format_number(r.news_accepted),
        format_number(r.news_duplicate),
        format_number(r.news_outside_identity_set)
    );
    for dimension in Dimension::ALL {
        println!(
            "  {}: {}",
            dimension.table(),
            format_number(graph.dimensions.len(dimension) as u64)
        );
    }
}
