//! Harvest and database overview.
//!
//! `harvest status` answers three questions: which datasets are finished,
//! which are mid-run (and where they will resume), and how much has been
//! loaded into the relational tables.

use anyhow::{Context, Result};

use crate::checkpoint::{list_artifacts, list_checkpoints};
use crate::config::Config;
use crate::db;
use crate::migrate::NORMALIZED_TABLES;
use crate::progress::format_number;

pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let artifacts = list_artifacts(&pool)
        .await
        .context("Failed to read harvest state. Has `harvest init` been run?")?;
    let checkpoints = list_checkpoints(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Steam Harvest — Status");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));

    println!();
    println!("  Datasets:");
    println!("  {:<12} {:<12} {:>10}   {}", "DATASET", "STATE", "ITEMS", "UPDATED");
    println!("  {}", "-".repeat(52));
    if artifacts.is_empty() && checkpoints.is_empty() {
        println!("  (nothing harvested yet)");
    }
    for (dataset, count, ts) in &artifacts {
        println!(
            "  {:<12} {:<12} {:>10}   {}",
            dataset,
            "complete",
            format_number(*count as u64),
            format_ts_relative(*ts)
        );
    }
    for (dataset, cursor, ts) in &checkpoints {
        println!(
            "  {:<12} {:<12} {:>10}   {}",
            dataset,
            format!("at {}", format_number(*cursor as u64)),
            "-",
            format_ts_relative(*ts)
        );
    }

    println!();
    println!("  Tables:");
    for table in NORMALIZED_TABLES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await?;
        println!("  {:<28} {:>10}", table, format_number(count as u64));
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }
    match delta {
        0..=59 => "just now".to_string(),
        60..=3599 => plural(delta / 60, "min"),
        3600..=86_399 => plural(delta / 3600, "hour"),
        86_400..=2_591_999 => plural(delta / 86_400, "day"),
        _ => format_ts_iso(ts),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
