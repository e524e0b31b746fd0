//! Harvest artifacts through the SQLite checkpoint store, then normalize and
//! load them into a real database.

use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use steam_harvest::checkpoint::SqliteCheckpointStore;
use steam_harvest::config::Config;
use steam_harvest::fetch_cmd::CATALOG;
use steam_harvest::load_cmd::normalize_stored;
use steam_harvest::migrate::{self, NORMALIZED_TABLES};
use steam_harvest::sqlite_store::SqliteStore;
use steam_harvest::traits::{CheckpointStore, HarvestCheckpoint};
use steam_harvest::{db, migrate::reset_normalized};
use steam_harvest_core::load::{LoadCoordinator, LoadError};

fn test_config(tmp: &TempDir) -> Config {
    let db_path = tmp.path().join("data").join("steam.sqlite");
    toml::from_str(&format!(
        "[db]\npath = \"{}\"\n",
        db_path.display().to_string().replace('\\', "/")
    ))
    .unwrap()
}

fn catalog() -> Vec<Value> {
    vec![
        json!({ "appid": 10, "name": "Ten" }),
        json!({ "appid": 20, "name": "Twenty" }),
        json!({ "appid": 30, "name": "Thirty" }),
    ]
}

fn details() -> Vec<Value> {
    vec![
        json!({
            "appid": 10,
            "developers": ["Acme"],
            "publishers": ["Acme", "Globex"],
            "tags": ["Indie", "Puzzle"],
            "features": ["Single-player"],
            "release_date": "Nov 10, 2004",
            "price": 9.99,
            "all_positive_review_pct": 95,
            "total_num_reviews": 1200
        }),
        json!({
            "appid": 20,
            "developers": ["Initech"],
            "publishers": ["Globex"],
            "tags": ["Puzzle"],
            "release_date": "Coming soon"
        }),
        // Not in the catalog: dropped.
        json!({ "appid": 99, "developers": ["Nobody"] }),
    ]
}

fn news() -> Vec<Value> {
    vec![
        json!([
            {
                "gid": "1001", "appid": 10, "title": "Patch 1.1", "url": "https://example.test/1",
                "is_external_url": false, "author": "dev", "contents": "fixes",
                "feedlabel": "Community Announcements", "feedname": "steam_community_announcements",
                "feed_type": 1, "date": 1_700_000_000, "tags": ["patchnotes"]
            },
            {
                "gid": "1002", "appid": 10, "title": "Sale", "url": "https://example.test/2",
                "is_external_url": true, "contents": "50% off",
                "feedlabel": "PC Gamer", "feedname": "pcgamer",
                "feed_type": 0, "date": 1_700_086_400
            }
        ]),
        json!([]),
    ]
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn all_counts(pool: &SqlitePool) -> Vec<(String, i64)> {
    let mut counts = Vec::new();
    for table in NORMALIZED_TABLES {
        counts.push((table.to_string(), count(pool, table).await));
    }
    counts
}

async fn seeded_pool(tmp: &TempDir) -> SqlitePool {
    let config = test_config(tmp);
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();

    let checkpoints = SqliteCheckpointStore::new(pool.clone());
    checkpoints.complete(CATALOG, &catalog()).await.unwrap();
    checkpoints.complete("details", &details()).await.unwrap();
    checkpoints.complete("news", &news()).await.unwrap();
    pool
}

#[tokio::test]
async fn checkpoint_round_trip() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    let store = SqliteCheckpointStore::new(pool.clone());

    assert!(store.load_checkpoint("details").await.unwrap().is_none());

    let first = json!({ "appid": 10, "price": 1.5, "tags": ["a"] });
    store
        .save_checkpoint("details", 2, std::slice::from_ref(&first))
        .await
        .unwrap();
    assert_eq!(
        store.load_checkpoint("details").await.unwrap(),
        Some(HarvestCheckpoint {
            cursor: 2,
            accumulated: vec![first.clone()],
        })
    );

    let accumulated = vec![first, json!({ "appid": 40 })];
    store.save_checkpoint("details", 4, &accumulated).await.unwrap();
    assert_eq!(
        store.load_checkpoint("details").await.unwrap(),
        Some(HarvestCheckpoint {
            cursor: 4,
            accumulated: accumulated.clone(),
        })
    );

    store.complete("details", &accumulated).await.unwrap();
    assert!(store.load_checkpoint("details").await.unwrap().is_none());
    assert_eq!(store.load_artifact("details").await.unwrap(), Some(accumulated));

    store.discard("details").await.unwrap();
    assert!(store.load_artifact("details").await.unwrap().is_none());
    assert_eq!(count(&pool, "harvest_payloads").await, 0);
}

#[tokio::test]
async fn checkpoints_store_one_row_per_payload() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp);
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();
    let store = SqliteCheckpointStore::new(pool.clone());

    let items: Vec<Value> = (0..5).map(|i| json!({ "appid": i })).collect();
    store.save_checkpoint("news", 2, &items[..2]).await.unwrap();
    store.save_checkpoint("news", 4, &items[..4]).await.unwrap();
    // A failure checkpoint with nothing new appends nothing.
    store.save_checkpoint("news", 4, &items[..4]).await.unwrap();
    assert_eq!(count(&pool, "harvest_payloads").await, 4);

    let first_seqs: Vec<i64> =
        sqlx::query_scalar("SELECT seq FROM harvest_payloads WHERE dataset = 'news' ORDER BY seq")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(first_seqs, vec![0, 1, 2, 3]);

    store.complete("news", &items).await.unwrap();
    assert_eq!(count(&pool, "harvest_payloads").await, 5);
    assert_eq!(store.load_artifact("news").await.unwrap(), Some(items.clone()));

    // Fewer payloads than already stored means the caller lost track.
    store.discard("details").await.unwrap();
    store.save_checkpoint("details", 3, &items[..3]).await.unwrap();
    let err = store
        .save_checkpoint("details", 1, &items[..1])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already stores 3 payloads"));
}

#[tokio::test]
async fn load_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp).await;

    let graph = normalize_stored(&SqliteCheckpointStore::new(pool.clone()))
        .await
        .unwrap();
    assert_eq!(graph.report.games_accepted, 2);
    assert_eq!(graph.report.games_outside_identity_set, 1);
    assert_eq!(graph.report.news_accepted, 2);

    let store = SqliteStore::new(pool.clone());
    LoadCoordinator::new(&store).load(&graph).await.unwrap();
    let first = all_counts(&pool).await;

    LoadCoordinator::new(&store).load(&graph).await.unwrap();
    let second = all_counts(&pool).await;
    assert_eq!(first, second);

    assert_eq!(count(&pool, "games").await, 2);
    assert_eq!(count(&pool, "companies").await, 3);
    assert_eq!(count(&pool, "developers").await, 2);
    assert_eq!(count(&pool, "publishers").await, 3);
    assert_eq!(count(&pool, "game_tags").await, 3);
    assert_eq!(count(&pool, "newsitems").await, 2);
    assert_eq!(count(&pool, "newsitem_tags").await, 1);
    assert_eq!(count(&pool, "authors").await, 1);

    let coming_soon: (i64, Option<String>) =
        sqlx::query_as("SELECT coming_soon, release_date FROM games WHERE appid = 20")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(coming_soon, (1, None));

    let name: String = sqlx::query_scalar("SELECT name FROM games WHERE appid = 10")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(name, "Ten");
}

#[tokio::test]
async fn company_roles_are_flagged() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp).await;
    let graph = normalize_stored(&SqliteCheckpointStore::new(pool.clone()))
        .await
        .unwrap();
    LoadCoordinator::new(&SqliteStore::new(pool.clone()))
        .load(&graph)
        .await
        .unwrap();

    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        "SELECT company, is_developer, is_publisher FROM companies ORDER BY company",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        rows,
        vec![
            ("Acme".to_string(), 1, 1),
            ("Globex".to_string(), 0, 1),
            ("Initech".to_string(), 1, 0),
        ]
    );
}

#[tokio::test]
async fn reset_empties_normalized_tables_only() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp).await;
    let graph = normalize_stored(&SqliteCheckpointStore::new(pool.clone()))
        .await
        .unwrap();
    LoadCoordinator::new(&SqliteStore::new(pool.clone()))
        .load(&graph)
        .await
        .unwrap();

    reset_normalized(&pool).await.unwrap();
    for (table, rows) in all_counts(&pool).await {
        assert_eq!(rows, 0, "{table} not emptied");
    }
    assert_eq!(count(&pool, "harvest_artifacts").await, 3);
}

#[tokio::test]
async fn reload_of_renumbered_run_is_refused() {
    let tmp = TempDir::new().unwrap();
    let pool = seeded_pool(&tmp).await;
    let checkpoints = SqliteCheckpointStore::new(pool.clone());
    let store = SqliteStore::new(pool.clone());

    let graph = normalize_stored(&checkpoints).await.unwrap();
    LoadCoordinator::new(&store).load(&graph).await.unwrap();
    let before = all_counts(&pool).await;

    // A re-harvest where game 20 alone remains, credited to a new studio.
    checkpoints.discard("details").await.unwrap();
    checkpoints
        .complete(
            "details",
            &[json!({ "appid": 20, "developers": ["Foo"], "tags": ["Puzzle"] })],
        )
        .await
        .unwrap();
    let changed = normalize_stored(&checkpoints).await.unwrap();
    let err = LoadCoordinator::new(&store).load(&changed).await.unwrap_err();
    assert!(
        matches!(err, LoadError::SurrogateConflict { table: "companies", surrogate_id: 1, .. }),
        "{err}"
    );

    assert_eq!(all_counts(&pool).await, before);
    let acme: String = sqlx::query_scalar("SELECT company FROM companies WHERE company_id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(acme, "Acme");

    // After a reset the same graph loads cleanly.
    reset_normalized(&pool).await.unwrap();
    LoadCoordinator::new(&store).load(&changed).await.unwrap();
    assert_eq!(count(&pool, "developers").await, 1);
}
