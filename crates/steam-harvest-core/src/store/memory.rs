//! In-memory [`Store`] implementation for tests.
//!
//! All tables live behind one `std::sync::RwLock`. Foreign keys and the
//! dimension natural-key uniqueness are checked the same way SQLite checks
//! them, so a load that succeeds here would succeed against the database.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    Company, CompanyRoles, Dimension, DimensionValue, Game, GameRecord, NewsItem,
};

use super::Store;

/// Point-in-time copy of every table, comparable with `==`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub dimensions: BTreeMap<Dimension, BTreeMap<i64, String>>,
    pub roles: CompanyRoles,
    pub games: BTreeMap<i64, Game>,
    pub developers: BTreeSet<(i64, i64)>,
    pub publishers: BTreeSet<(i64, i64)>,
    pub game_tags: BTreeSet<(i64, i64)>,
    pub game_features: BTreeSet<(i64, i64)>,
    pub news: BTreeMap<i64, NewsItem>,
    pub newsitem_tags: BTreeSet<(i64, i64)>,
}

impl StoreSnapshot {
    /// Company rows with their persisted role flags.
    pub fn companies(&self) -> Vec<Company> {
        self.dimensions
            .get(&Dimension::Company)
            .into_iter()
            .flatten()
            .map(|(&id, name)| Company {
                company_id: id,
                company: name.clone(),
                is_developer: self.roles.developers.contains(&id),
                is_publisher: self.roles.publishers.contains(&id),
            })
            .collect()
    }

    fn has_dimension(&self, dimension: Dimension, id: i64) -> bool {
        self.dimensions
            .get(&dimension)
            .is_some_and(|rows| rows.contains_key(&id))
    }

    fn require(&self, dimension: Dimension, id: i64) -> Result<()> {
        if !self.has_dimension(dimension, id) {
            bail!(
                "FOREIGN KEY constraint failed: {} id {id} does not exist",
                dimension.table()
            );
        }
        Ok(())
    }
}

/// In-memory store for tests.
pub struct InMemoryStore {
    tables: RwLock<StoreSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(StoreSnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreSnapshot>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreSnapshot>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn dimension_rows(&self, dimension: Dimension) -> Result<Vec<DimensionValue>> {
        Ok(self
            .read()?
            .dimensions
            .get(&dimension)
            .into_iter()
            .flatten()
            .map(|(&id, key)| DimensionValue {
                id,
                key: key.clone(),
            })
            .collect())
    }

    async fn upsert_dimension(
        &self,
        dimension: Dimension,
        values: &[DimensionValue],
    ) -> Result<()> {
        let mut tables = self.write()?;
        let mut rows = tables.dimensions.get(&dimension).cloned().unwrap_or_default();
        for value in values {
            if let Some((&other, _)) = rows
                .iter()
                .find(|(id, key)| **id != value.id && **key == value.key)
            {
                bail!(
                    "UNIQUE constraint failed: {} key {:?} already has id {other}",
                    dimension.table(),
                    value.key
                );
            }
            rows.insert(value.id, value.key.clone());
        }
        // Whole batch or nothing, like the transaction it stands in for.
        tables.dimensions.insert(dimension, rows);
        Ok(())
    }

    async fn upsert_game(&self, game: &Game) -> Result<()> {
        self.write()?.games.insert(game.appid, game.clone());
        Ok(())
    }

    async fn replace_game_links(&self, record: &GameRecord) -> Result<()> {
        let mut tables = self.write()?;
        let appid = record.game.appid;
        if !tables.games.contains_key(&appid) {
            bail!("FOREIGN KEY constraint failed: games appid {appid} does not exist");
        }
        for &id in record.developers.iter().chain(&record.publishers) {
            tables.require(Dimension::Company, id)?;
        }
        for &id in &record.tags {
            tables.require(Dimension::GameTag, id)?;
        }
        for &id in &record.features {
            tables.require(Dimension::Feature, id)?;
        }

        tables.developers.retain(|&(a, _)| a != appid);
        tables.publishers.retain(|&(a, _)| a != appid);
        tables.game_tags.retain(|&(a, _)| a != appid);
        tables.game_features.retain(|&(a, _)| a != appid);

        tables
            .developers
            .extend(record.developers.iter().map(|&id| (appid, id)));
        tables
            .publishers
            .extend(record.publishers.iter().map(|&id| (appid, id)));
        tables
            .game_tags
            .extend(record.tags.iter().map(|&id| (appid, id)));
        tables
            .game_features
            .extend(record.features.iter().map(|&id| (appid, id)));
        Ok(())
    }

    async fn upsert_news_item(&self, item: &NewsItem) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.games.contains_key(&item.appid) {
            bail!(
                "FOREIGN KEY constraint failed: games appid {} does not exist",
                item.appid
            );
        }
        let optional = [
            (Dimension::Author, item.author_id),
            (Dimension::Feedlabel, item.feedlabel_id),
            (Dimension::Feedname, item.feedname_id),
        ];
        for (dimension, id) in optional {
            if let Some(id) = id {
                tables.require(dimension, id)?;
            }
        }
        tables.news.insert(item.gid, item.clone());
        Ok(())
    }

    async fn replace_news_tags(&self, gid: i64, tag_ids: &[i64]) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.news.contains_key(&gid) {
            bail!("FOREIGN KEY constraint failed: newsitems gid {gid} does not exist");
        }
        for &id in tag_ids {
            tables.require(Dimension::NewsitemTag, id)?;
        }
        tables.newsitem_tags.retain(|&(g, _)| g != gid);
        tables
            .newsitem_tags
            .extend(tag_ids.iter().map(|&id| (gid, id)));
        Ok(())
    }

    async fn mark_company_roles(&self, roles: &CompanyRoles) -> Result<()> {
        let mut tables = self.write()?;
        for &id in roles.developers.iter().chain(&roles.publishers) {
            tables.require(Dimension::Company, id)?;
        }
        tables.roles.developers.extend(&roles.developers);
        tables.roles.publishers.extend(&roles.publishers);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(id: i64, key: &str) -> DimensionValue {
        DimensionValue {
            id,
            key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn dimension_key_must_be_unique() {
        let store = InMemoryStore::new();
        store
            .upsert_dimension(Dimension::Author, &[value(1, "Gabe")])
            .await
            .unwrap();
        let err = store
            .upsert_dimension(Dimension::Author, &[value(2, "Gabe")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
        assert_eq!(store.snapshot().unwrap().dimensions[&Dimension::Author].len(), 1);
    }

    #[tokio::test]
    async fn news_tags_need_parent_item() {
        let store = InMemoryStore::new();
        store
            .upsert_dimension(Dimension::NewsitemTag, &[value(1, "patchnotes")])
            .await
            .unwrap();
        let err = store.replace_news_tags(99, &[1]).await.unwrap_err();
        assert!(err.to_string().contains("FOREIGN KEY"));
        assert!(store.snapshot().unwrap().newsitem_tags.is_empty());
    }
}
