//! Storage abstraction for the normalized relational model.
//!
//! The [`Store`] trait is the persistence boundary the
//! [`LoadCoordinator`](crate::load::LoadCoordinator) writes through. Every
//! write method is idempotent and is expected to commit on its own, so the
//! coordinator controls transaction boundaries purely by choosing which
//! method to call when.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CompanyRoles, Dimension, DimensionValue, Game, GameRecord, NewsItem};

/// Abstract relational backend.
///
/// | Method | Rows touched |
/// |--------|--------------|
/// | [`dimension_rows`](Store::dimension_rows) | reads one dimension table |
/// | [`upsert_dimension`](Store::upsert_dimension) | one dimension table |
/// | [`upsert_game`](Store::upsert_game) | `games` |
/// | [`replace_game_links`](Store::replace_game_links) | `developers`, `publishers`, `game_tags`, `game_features` |
/// | [`upsert_news_item`](Store::upsert_news_item) | `newsitems` |
/// | [`replace_news_tags`](Store::replace_news_tags) | `newsitem_tags` |
/// | [`mark_company_roles`](Store::mark_company_roles) | `companies` role flags |
#[async_trait]
pub trait Store: Send + Sync {
    /// Every persisted row of one dimension, ordered by surrogate id.
    async fn dimension_rows(&self, dimension: Dimension) -> Result<Vec<DimensionValue>>;

    /// Insert or update every value of one dimension, keyed by surrogate id.
    ///
    /// Company role flags are left untouched on update.
    async fn upsert_dimension(&self, dimension: Dimension, values: &[DimensionValue])
        -> Result<()>;

    /// Insert or update one game row by `appid`.
    async fn upsert_game(&self, game: &Game) -> Result<()>;

    /// Make the game's associative rows exactly the record's lists.
    async fn replace_game_links(&self, record: &GameRecord) -> Result<()>;

    /// Insert or update one news item by `gid`.
    async fn upsert_news_item(&self, item: &NewsItem) -> Result<()>;

    /// Make the item's tag links exactly `tag_ids`.
    async fn replace_news_tags(&self, gid: i64, tag_ids: &[i64]) -> Result<()>;

    /// Set `is_developer` / `is_publisher` for exactly the ids in each set.
    async fn mark_company_roles(&self, roles: &CompanyRoles) -> Result<()>;
}
