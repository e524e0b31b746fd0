use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Normalized tables in creation (parent-first) order.
pub const NORMALIZED_TABLES: [&str; 14] = [
    "games",
    "companies",
    "game_tag_enumerations",
    "feature_enumerations",
    "authors",
    "feedlabels",
    "feednames",
    "newsitem_tag_enumerations",
    "developers",
    "publishers",
    "game_tags",
    "game_features",
    "newsitems",
    "newsitem_tags",
];

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS games (
        appid INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        description_snippet TEXT,
        release_date TEXT,
        coming_soon INTEGER NOT NULL,
        price REAL,
        description TEXT,
        all_positive_review_pct INTEGER,
        total_num_reviews INTEGER,
        recent_positive_review_pct INTEGER,
        recent_num_reviews INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS companies (
        company_id INTEGER PRIMARY KEY,
        company TEXT NOT NULL UNIQUE,
        is_developer INTEGER NOT NULL DEFAULT 0,
        is_publisher INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_tag_enumerations (
        game_tag_enumeration_id INTEGER PRIMARY KEY,
        tag TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feature_enumerations (
        feature_enumeration_id INTEGER PRIMARY KEY,
        feature TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS authors (
        author_id INTEGER PRIMARY KEY,
        author TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feedlabels (
        feedlabel_id INTEGER PRIMARY KEY,
        feedlabel TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feednames (
        feedname_id INTEGER PRIMARY KEY,
        feedname TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS newsitem_tag_enumerations (
        newsitem_tag_enumeration_id INTEGER PRIMARY KEY,
        tag TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS developers (
        developer_id INTEGER PRIMARY KEY AUTOINCREMENT,
        appid INTEGER NOT NULL,
        company_id INTEGER NOT NULL,
        UNIQUE(appid, company_id),
        FOREIGN KEY (appid) REFERENCES games(appid),
        FOREIGN KEY (company_id) REFERENCES companies(company_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS publishers (
        publisher_id INTEGER PRIMARY KEY AUTOINCREMENT,
        appid INTEGER NOT NULL,
        company_id INTEGER NOT NULL,
        UNIQUE(appid, company_id),
        FOREIGN KEY (appid) REFERENCES games(appid),
        FOREIGN KEY (company_id) REFERENCES companies(company_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_tags (
        game_tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
        appid INTEGER NOT NULL,
        game_tag_enumeration_id INTEGER NOT NULL,
        UNIQUE(appid, game_tag_enumeration_id),
        FOREIGN KEY (appid) REFERENCES games(appid),
        FOREIGN KEY (game_tag_enumeration_id)
            REFERENCES game_tag_enumerations(game_tag_enumeration_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS game_features (
        game_feature_id INTEGER PRIMARY KEY AUTOINCREMENT,
        appid INTEGER NOT NULL,
        feature_enumeration_id INTEGER NOT NULL,
        UNIQUE(appid, feature_enumeration_id),
        FOREIGN KEY (appid) REFERENCES games(appid),
        FOREIGN KEY (feature_enumeration_id)
            REFERENCES feature_enumerations(feature_enumeration_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS newsitems (
        gid INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        is_external_url INTEGER NOT NULL,
        author_id INTEGER,
        contents TEXT NOT NULL,
        feedlabel_id INTEGER,
        date TEXT NOT NULL,
        feedname_id INTEGER,
        feed_type INTEGER NOT NULL,
        appid INTEGER NOT NULL,
        FOREIGN KEY (author_id) REFERENCES authors(author_id),
        FOREIGN KEY (feedlabel_id) REFERENCES feedlabels(feedlabel_id),
        FOREIGN KEY (feedname_id) REFERENCES feednames(feedname_id),
        FOREIGN KEY (appid) REFERENCES games(appid)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS newsitem_tags (
        newsitem_tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
        gid INTEGER NOT NULL,
        newsitem_tag_enumeration_id INTEGER NOT NULL,
        UNIQUE(gid, newsitem_tag_enumeration_id),
        FOREIGN KEY (gid) REFERENCES newsitems(gid),
        FOREIGN KEY (newsitem_tag_enumeration_id)
            REFERENCES newsitem_tag_enumerations(newsitem_tag_enumeration_id)
    )
    "#,
    // Harvest bookkeeping. Payloads are one row each, shared by a dataset's
    // open checkpoint and, once complete, its artifact.
    r#"
    CREATE TABLE IF NOT EXISTS harvest_payloads (
        dataset TEXT NOT NULL,
        seq INTEGER NOT NULL,
        payload_json TEXT NOT NULL,
        PRIMARY KEY (dataset, seq)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS harvest_checkpoints (
        dataset TEXT PRIMARY KEY,
        cursor INTEGER NOT NULL,
        item_count INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS harvest_artifacts (
        dataset TEXT PRIMARY KEY,
        item_count INTEGER NOT NULL,
        completed_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_newsitems_appid ON newsitems(appid)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table on an open pool. Safe to repeat.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Empty the normalized tables, children first. Harvest tables are kept.
pub async fn reset_normalized(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for table in NORMALIZED_TABLES.iter().rev() {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}
