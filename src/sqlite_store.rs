//! SQLite implementation of the core [`Store`] trait.
//!
//! Each trait method runs in its own transaction, so the load coordinator's
//! call sequence maps one-to-one onto commits. Core rows use
//! `ON CONFLICT(pk) DO UPDATE`. An entity's associative rows are deleted and
//! reinserted in the same transaction, so a reload drops links the new
//! payload no longer carries.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use steam_harvest_core::models::{
    CompanyRoles, Dimension, DimensionValue, Game, GameRecord, NewsItem,
};
use steam_harvest_core::store::Store;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn replace_links(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    core_column: &str,
    dim_column: &str,
    core_id: i64,
    dim_ids: &[i64],
) -> Result<()> {
    sqlx::query(&format!("DELETE FROM {table} WHERE {core_column} = ?"))
        .bind(core_id)
        .execute(&mut **tx)
        .await?;
    let sql = format!(
        "INSERT INTO {table} ({core_column}, {dim_column}) VALUES (?, ?) \
         ON CONFLICT({core_column}, {dim_column}) DO NOTHING"
    );
    for &dim_id in dim_ids {
        sqlx::query(&sql)
            .bind(core_id)
            .bind(dim_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn dimension_rows(&self, dimension: Dimension) -> Result<Vec<DimensionValue>> {
        let sql = format!(
            "SELECT {id}, {key} FROM {table} ORDER BY {id}",
            table = dimension.table(),
            id = dimension.id_column(),
            key = dimension.key_column(),
        );
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(id, key)| DimensionValue { id, key })
            .collect())
    }

    async fn upsert_dimension(
        &self,
        dimension: Dimension,
        values: &[DimensionValue],
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} ({id}, {key}) VALUES (?, ?) \
             ON CONFLICT({id}) DO UPDATE SET {key} = excluded.{key}",
            table = dimension.table(),
            id = dimension.id_column(),
            key = dimension.key_column(),
        );
        let mut tx = self.pool.begin().await?;
        for value in values {
            sqlx::query(&sql)
                .bind(value.id)
                .bind(&value.key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_game(&self, game: &Game) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO games (appid, name, description_snippet, release_date, coming_soon, price,
                description, all_positive_review_pct, total_num_reviews,
                recent_positive_review_pct, recent_num_reviews)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(appid) DO UPDATE SET
                name = excluded.name,
                description_snippet = excluded.description_snippet,
                release_date = excluded.release_date,
                coming_soon = excluded.coming_soon,
                price = excluded.price,
                description = excluded.description,
                all_positive_review_pct = excluded.all_positive_review_pct,
                total_num_reviews = excluded.total_num_reviews,
                recent_positive_review_pct = excluded.recent_positive_review_pct,
                recent_num_reviews = excluded.recent_num_reviews
            "#,
        )
        .bind(game.appid)
        .bind(&game.name)
        .bind(&game.description_snippet)
        .bind(game.release_date)
        .bind(game.coming_soon)
        .bind(game.price)
        .bind(&game.description)
        .bind(game.all_positive_review_pct)
        .bind(game.total_num_reviews)
        .bind(game.recent_positive_review_pct)
        .bind(game.recent_num_reviews)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_game_links(&self, record: &GameRecord) -> Result<()> {
        let appid = record.game.appid;
        let mut tx = self.pool.begin().await?;
        replace_links(&mut tx, "developers", "appid", "company_id", appid, &record.developers)
            .await?;
        replace_links(&mut tx, "publishers", "appid", "company_id", appid, &record.publishers)
            .await?;
        replace_links(
            &mut tx,
            "game_tags",
            "appid",
            "game_tag_enumeration_id",
            appid,
            &record.tags,
        )
        .await?;
        replace_links(
            &mut tx,
            "game_features",
            "appid",
            "feature_enumeration_id",
            appid,
            &record.features,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_news_item(&self, item: &NewsItem) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO newsitems (gid, title, url, is_external_url, author_id, contents,
                feedlabel_id, date, feedname_id, feed_type, appid)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(gid) DO UPDATE SET
                title = excluded.title,
                url = excluded.url,
                is_external_url = excluded.is_external_url,
                author_id = excluded.author_id,
                contents = excluded.contents,
                feedlabel_id = excluded.feedlabel_id,
                date = excluded.date,
                feedname_id = excluded.feedname_id,
                feed_type = excluded.feed_type,
                appid = excluded.appid
            "#,
        )
        .bind(item.gid)
        .bind(&item.title)
        .bind(&item.url)
        .bind(item.is_external_url)
        .bind(item.author_id)
        .bind(&item.contents)
        .bind(item.feedlabel_id)
        .bind(item.date)
        .bind(item.feedname_id)
        .bind(item.feed_type)
        .bind(item.appid)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_news_tags(&self, gid: i64, tag_ids: &[i64]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        replace_links(
            &mut tx,
            "newsitem_tags",
            "gid",
            "newsitem_tag_enumeration_id",
            gid,
            tag_ids,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_company_roles(&self, roles: &CompanyRoles) -> Result<()> {
        let developers = serde_json::to_string(&roles.developers)?;
        let publishers = serde_json::to_string(&roles.publishers)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE companies SET is_developer = 1 WHERE company_id IN (SELECT value FROM json_each(?))",
        )
        .bind(developers)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE companies SET is_publisher = 1 WHERE company_id IN (SELECT value FROM json_each(?))",
        )
        .bind(publishers)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
