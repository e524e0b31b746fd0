//! Load coordinator: applies a [`NormalizedGraph`] to a [`Store`].
//!
//! Phases, in order:
//!
//! 0. compare the graph's dimension ids with what the store already holds;
//!    a stored id carrying a different key aborts the load before any write;
//! 1. every dimension table, one commit each;
//! 2. per game: validate references, upsert the row (commit), replace its
//!    links (commit);
//! 3. per news item: the same, with the owning game as an extra reference;
//! 4. a single company-role pass over the run's role sets.
//!
//! References are checked against the graph before an identity's first
//! write, so a violation stops the load without leaving a core row that is
//! missing its links. Every write is an upsert or a replace, so rerunning a
//! load that died between the two commits for an identity simply repeats
//! them.
//!
//! Surrogate ids are allocated per normalization run. Loading the same
//! artifacts again reproduces the same ids; loading changed artifacts over
//! an earlier load can move a key to another id, which would silently
//! relabel every stored link. Phase 0 refuses that case with
//! [`LoadError::SurrogateConflict`].

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::models::{
    Dimension, DimensionTables, GameRecord, NewsRecord, NormalizedGraph,
};
use crate::normalize::loaded_appids;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum LoadError {
    /// An associative row or foreign key points at an id the graph never
    /// allocated. This is a normalization bug, not an I/O failure.
    #[error("{entity}: references {table} id {surrogate_id}, which was never allocated")]
    UnresolvedReference {
        entity: String,
        table: &'static str,
        surrogate_id: i64,
    },
    /// The store already holds `surrogate_id` under a different key, so
    /// it was loaded from another normalization run.
    #[error(
        "{table} id {surrogate_id} is stored as {stored:?} but this load assigns it to {incoming:?}"
    )]
    SurrogateConflict {
        table: &'static str,
        surrogate_id: i64,
        stored: String,
        incoming: String,
    },
    #[error("{entity}: store write failed")]
    Store {
        entity: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Row counts written by one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LoadReport {
    pub dimension_rows: u64,
    pub games: u64,
    pub game_links: u64,
    pub news_items: u64,
    pub news_tags: u64,
    pub developers_flagged: u64,
    pub publishers_flagged: u64,
}

pub struct LoadCoordinator<'s, S: Store + ?Sized> {
    store: &'s S,
}

impl<'s, S: Store + ?Sized> LoadCoordinator<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub async fn load(&self, graph: &NormalizedGraph) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();
        let appids = loaded_appids(graph);

        self.check_stored_dimensions(&graph.dimensions).await?;

        for dimension in Dimension::ALL {
            let values = graph.dimensions.values(dimension);
            if values.is_empty() {
                continue;
            }
            self.store
                .upsert_dimension(dimension, values)
                .await
                .map_err(|source| LoadError::Store {
                    entity: format!("dimension {}", dimension.table()),
                    source,
                })?;
            report.dimension_rows += values.len() as u64;
        }
        info!(rows = report.dimension_rows, "dimension tables loaded");

        for record in &graph.games {
            let entity = format!("game {}", record.game.appid);
            check_game(&entity, record, &graph.dimensions)?;
            self.store
                .upsert_game(&record.game)
                .await
                .map_err(|source| store_err(&entity, source))?;
            self.store
                .replace_game_links(record)
                .await
                .map_err(|source| store_err(&entity, source))?;
            report.games += 1;
            report.game_links += (record.developers.len()
                + record.publishers.len()
                + record.tags.len()
                + record.features.len()) as u64;
        }
        info!(
            games = report.games,
            links = report.game_links,
            "games loaded"
        );

        for record in &graph.news {
            let entity = format!("news item {}", record.item.gid);
            check_news(&entity, record, &graph.dimensions, &appids)?;
            self.store
                .upsert_news_item(&record.item)
                .await
                .map_err(|source| store_err(&entity, source))?;
            self.store
                .replace_news_tags(record.item.gid, &record.tags)
                .await
                .map_err(|source| store_err(&entity, source))?;
            report.news_items += 1;
            report.news_tags += record.tags.len() as u64;
        }
        info!(
            items = report.news_items,
            tags = report.news_tags,
            "news items loaded"
        );

        let roles = &graph.roles;
        for &id in roles.developers.iter().chain(&roles.publishers) {
            require(
                "company roles",
                &graph.dimensions,
                Dimension::Company,
                id,
            )?;
        }
        self.store
            .mark_company_roles(roles)
            .await
            .map_err(|source| store_err("company roles", source))?;
        report.developers_flagged = roles.developers.len() as u64;
        report.publishers_flagged = roles.publishers.len() as u64;
        info!(
            developers = report.developers_flagged,
            publishers = report.publishers_flagged,
            "company roles updated"
        );

        Ok(report)
    }

    async fn check_stored_dimensions(&self, tables: &DimensionTables) -> Result<(), LoadError> {
        for dimension in Dimension::ALL {
            let incoming: HashMap<i64, &str> = tables
                .values(dimension)
                .iter()
                .map(|v| (v.id, v.key.as_str()))
                .collect();
            if incoming.is_empty() {
                continue;
            }
            let stored = self
                .store
                .dimension_rows(dimension)
                .await
                .map_err(|source| store_err(&format!("dimension {}", dimension.table()), source))?;
            for row in stored {
                let Some(&key) = incoming.get(&row.id) else {
                    continue;
                };
                if key != row.key {
                    error!(
                        table = dimension.table(),
                        id = row.id,
                        stored = %row.key,
                        incoming = key,
                        "stored surrogate id belongs to another normalization run"
                    );
                    return Err(LoadError::SurrogateConflict {
                        table: dimension.table(),
                        surrogate_id: row.id,
                        stored: row.key,
                        incoming: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Check every reference in the graph without writing anything.
pub fn validate(graph: &NormalizedGraph) -> Result<(), LoadError> {
    let appids = loaded_appids(graph);
    for record in &graph.games {
        check_game(&format!("game {}", record.game.appid), record, &graph.dimensions)?;
    }
    for record in &graph.news {
        check_news(
            &format!("news item {}", record.item.gid),
            record,
            &graph.dimensions,
            &appids,
        )?;
    }
    for &id in graph.roles.developers.iter().chain(&graph.roles.publishers) {
        require("company roles", &graph.dimensions, Dimension::Company, id)?;
    }
    Ok(())
}

fn check_game(entity: &str, record: &GameRecord, tables: &DimensionTables) -> Result<(), LoadError> {
    let refs = record
        .developers
        .iter()
        .chain(&record.publishers)
        .map(|&id| (Dimension::Company, id))
        .chain(record.tags.iter().map(|&id| (Dimension::GameTag, id)))
        .chain(record.features.iter().map(|&id| (Dimension::Feature, id)));
    for (dimension, id) in refs {
        require(entity, tables, dimension, id)?;
    }
    Ok(())
}

fn check_news(
    entity: &str,
    record: &NewsRecord,
    tables: &DimensionTables,
    appids: &BTreeSet<i64>,
) -> Result<(), LoadError> {
    let item = &record.item;
    if !appids.contains(&item.appid) {
        error!(entity, appid = item.appid, "news item references an unloaded game");
        return Err(LoadError::UnresolvedReference {
            entity: entity.to_string(),
            table: "games",
            surrogate_id: item.appid,
        });
    }
    let optional = [
        (Dimension::Author, item.author_id),
        (Dimension::Feedlabel, item.feedlabel_id),
        (Dimension::Feedname, item.feedname_id),
    ];
    for (dimension, id) in optional {
        if let Some(id) = id {
            require(entity, tables, dimension, id)?;
        }
    }
    for &id in &record.tags {
        require(entity, tables, Dimension::NewsitemTag, id)?;
    }
    Ok(())
}

fn require(
    entity: &str,
    tables: &DimensionTables,
    dimension: Dimension,
    id: i64,
) -> Result<(), LoadError> {
    if tables.contains(dimension, id) {
        return Ok(());
    }
    error!(entity, table = dimension.table(), id, "unresolved reference");
    Err(LoadError::UnresolvedReference {
        entity: entity.to_string(),
        table: dimension.table(),
        surrogate_id: id,
    })
}

fn store_err(entity: &str, source: anyhow::Error) -> LoadError {
    debug!(entity, error = %source, "store write failed");
    LoadError::Store {
        entity: entity.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogEntry;
    use crate::normalize::normalize;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    fn sample_graph() -> NormalizedGraph {
        let catalog = vec![
            CatalogEntry {
                appid: 10,
                name: "Counter-Strike".into(),
            },
            CatalogEntry {
                appid: 20,
                name: "Team Fortress Classic".into(),
            },
        ];
        let details = vec![
            json!({
                "appid": 10,
                "developers": ["Valve"],
                "publishers": ["Valve"],
                "tags": ["Action", "FPS", "+"],
                "features": ["Multi-player"],
                "release_date": "Nov 1, 2000",
                "price": 9.99,
            }),
            json!({
                "appid": 20,
                "developers": ["Studio"],
                "publishers": ["Publisher Co"],
                "tags": ["Action"],
                "release_date": "Q2 2025",
            }),
        ];
        let news = vec![json!([
            { "gid": "42", "appid": 10, "title": "Patch", "date": 1_700_000_000,
              "author": "Valve", "feedlabel": "Community Announcements",
              "feedname": "steam_community_announcements", "tags": ["patchnotes"] },
            { "gid": "43", "appid": 20, "title": "News", "date": 1_700_000_100 },
        ])];
        normalize(&catalog, &details, &news)
    }

    #[tokio::test]
    async fn loads_every_table() {
        let store = InMemoryStore::new();
        let graph = sample_graph();
        let report = LoadCoordinator::new(&store).load(&graph).await.unwrap();

        assert_eq!(report.games, 2);
        assert_eq!(report.news_items, 2);
        assert_eq!(report.news_tags, 1);
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.games.len(), 2);
        assert_eq!(snap.game_tags.len(), 3);
        assert_eq!(snap.news[&42].author_id, Some(1));
    }

    #[tokio::test]
    async fn loading_twice_is_idempotent() {
        let store = InMemoryStore::new();
        let graph = sample_graph();
        let coordinator = LoadCoordinator::new(&store);

        coordinator.load(&graph).await.unwrap();
        let first = store.snapshot().unwrap();
        coordinator.load(&graph).await.unwrap();
        assert_eq!(store.snapshot().unwrap(), first);
    }

    #[tokio::test]
    async fn company_role_flags() {
        let store = InMemoryStore::new();
        LoadCoordinator::new(&store)
            .load(&sample_graph())
            .await
            .unwrap();
        let companies = store.snapshot().unwrap().companies();
        let find = |name: &str| companies.iter().find(|c| c.company == name).unwrap();

        let valve = find("Valve");
        assert!(valve.is_developer && valve.is_publisher);
        let publisher = find("Publisher Co");
        assert!(!publisher.is_developer && publisher.is_publisher);
        let studio = find("Studio");
        assert!(studio.is_developer && !studio.is_publisher);
    }

    #[tokio::test]
    async fn unresolved_reference_stops_before_core_row() {
        let store = InMemoryStore::new();
        let mut graph = sample_graph();
        graph.games[1].tags.push(99);

        let err = LoadCoordinator::new(&store).load(&graph).await.unwrap_err();
        match err {
            LoadError::UnresolvedReference {
                entity,
                table,
                surrogate_id,
            } => {
                assert_eq!(entity, "game 20");
                assert_eq!(table, "game_tag_enumerations");
                assert_eq!(surrogate_id, 99);
            }
            other => panic!("unexpected error: {other}"),
        }
        let snap = store.snapshot().unwrap();
        assert!(snap.games.contains_key(&10));
        assert!(!snap.games.contains_key(&20));
    }

    fn graph_with_developers(games: &[(i64, &str)]) -> NormalizedGraph {
        let catalog: Vec<CatalogEntry> = games
            .iter()
            .map(|&(appid, _)| CatalogEntry {
                appid,
                name: format!("app {appid}"),
            })
            .collect();
        let details: Vec<_> = games
            .iter()
            .map(|&(appid, dev)| json!({ "appid": appid, "developers": [dev] }))
            .collect();
        normalize(&catalog, &details, &[])
    }

    #[tokio::test]
    async fn renumbered_graph_is_refused_before_any_write() {
        let store = InMemoryStore::new();
        let coordinator = LoadCoordinator::new(&store);
        coordinator
            .load(&graph_with_developers(&[(10, "Valve"), (20, "Acme")]))
            .await
            .unwrap();
        let before = store.snapshot().unwrap();

        let err = coordinator
            .load(&graph_with_developers(&[(20, "Foo")]))
            .await
            .unwrap_err();
        match err {
            LoadError::SurrogateConflict {
                table,
                surrogate_id,
                stored,
                incoming,
            } => {
                assert_eq!(table, "companies");
                assert_eq!(surrogate_id, 1);
                assert_eq!(stored, "Valve");
                assert_eq!(incoming, "Foo");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn reload_replaces_links_of_changed_game() {
        let store = InMemoryStore::new();
        let coordinator = LoadCoordinator::new(&store);
        coordinator
            .load(&graph_with_developers(&[(10, "Valve"), (20, "Acme")]))
            .await
            .unwrap();

        // Same keys keep the same ids; game 20 now credits Valve.
        coordinator
            .load(&graph_with_developers(&[(10, "Valve"), (20, "Valve")]))
            .await
            .unwrap();
        let snap = store.snapshot().unwrap();
        assert_eq!(
            snap.developers.into_iter().collect::<Vec<_>>(),
            vec![(10, 1), (20, 1)]
        );
        assert_eq!(snap.dimensions[&Dimension::Company][&2], "Acme");
    }

    #[test]
    fn validate_catches_orphan_news_item() {
        let mut graph = sample_graph();
        graph.news[0].item.appid = 30;
        let err = validate(&graph).unwrap_err();
        assert!(err.to_string().starts_with("news item 42"));
        assert!(validate(&sample_graph()).is_ok());
    }
}
