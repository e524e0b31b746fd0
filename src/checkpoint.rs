//! [`CheckpointStore`] backends.
//!
//! [`SqliteCheckpointStore`] keeps every harvested payload as its own row in
//! `harvest_payloads`, numbered by `seq` within the dataset. A checkpoint
//! appends the payloads added since the previous save and moves the cursor in
//! one transaction; completion appends the rest, records the artifact and
//! retires the checkpoint in one transaction. No single value ever holds a
//! whole dataset.
//!
//! [`MemoryCheckpointStore`] keeps the same state in a mutex and records every
//! checkpoint cursor it was asked to save.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::traits::{CheckpointStore, HarvestCheckpoint};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_payloads(&self, dataset: &str) -> Result<Vec<Value>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT seq, payload_json FROM harvest_payloads WHERE dataset = ? ORDER BY seq",
        )
        .bind(dataset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(seq, json)| {
                serde_json::from_str(&json).with_context(|| {
                    format!("Corrupt payload {} of dataset '{}'", seq, dataset)
                })
            })
            .collect()
    }
}

/// Insert the payloads at positions not yet stored. Returns how many were
/// written.
async fn append_payloads(
    tx: &mut Transaction<'_, Sqlite>,
    dataset: &str,
    items: &[Value],
) -> Result<usize> {
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(seq) + 1, 0) FROM harvest_payloads WHERE dataset = ?",
    )
    .bind(dataset)
    .fetch_one(&mut **tx)
    .await?;
    let stored = usize::try_from(next)
        .with_context(|| format!("Negative payload sequence for '{}'", dataset))?;
    if stored > items.len() {
        bail!(
            "Dataset '{}' already stores {} payloads but only {} were accumulated; restart the dataset",
            dataset,
            stored,
            items.len()
        );
    }

    for (seq, item) in items.iter().enumerate().skip(stored) {
        sqlx::query("INSERT INTO harvest_payloads (dataset, seq, payload_json) VALUES (?, ?, ?)")
            .bind(dataset)
            .bind(seq as i64)
            .bind(serde_json::to_string(item)?)
            .execute(&mut **tx)
            .await?;
    }
    Ok(items.len() - stored)
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load_checkpoint(&self, dataset: &str) -> Result<Option<HarvestCheckpoint>> {
        let row = sqlx::query("SELECT cursor FROM harvest_checkpoints WHERE dataset = ?")
            .bind(dataset)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let cursor: i64 = row.get("cursor");
        Ok(Some(HarvestCheckpoint {
            cursor: usize::try_from(cursor)
                .with_context(|| format!("Negative checkpoint cursor for '{}'", dataset))?,
            accumulated: self.load_payloads(dataset).await?,
        }))
    }

    async fn save_checkpoint(
        &self,
        dataset: &str,
        cursor: usize,
        accumulated: &[Value],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        append_payloads(&mut tx, dataset, accumulated).await?;
        sqlx::query(
            r#"
            INSERT INTO harvest_checkpoints (dataset, cursor, item_count, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(dataset) DO UPDATE SET
                cursor = excluded.cursor,
                item_count = excluded.item_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(dataset)
        .bind(cursor as i64)
        .bind(accumulated.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_artifact(&self, dataset: &str) -> Result<Option<Vec<Value>>> {
        let complete: Option<i64> =
            sqlx::query_scalar("SELECT item_count FROM harvest_artifacts WHERE dataset = ?")
                .bind(dataset)
                .fetch_optional(&self.pool)
                .await?;
        if complete.is_none() {
            return Ok(None);
        }
        self.load_payloads(dataset).await.map(Some)
    }

    async fn complete(&self, dataset: &str, items: &[Value]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        append_payloads(&mut tx, dataset, items).await?;

        sqlx::query(
            r#"
            INSERT INTO harvest_artifacts (dataset, item_count, completed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(dataset) DO UPDATE SET
                item_count = excluded.item_count,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(dataset)
        .bind(items.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM harvest_checkpoints WHERE dataset = ?")
            .bind(dataset)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn discard(&self, dataset: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["harvest_checkpoints", "harvest_artifacts", "harvest_payloads"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE dataset = ?"))
                .bind(dataset)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    checkpoints: HashMap<String, HarvestCheckpoint>,
    artifacts: HashMap<String, Vec<Value>>,
    saved_cursors: Vec<usize>,
}

/// Checkpoint store held in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<MemoryState>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cursor passed to `save_checkpoint`, in call order.
    pub fn saved_cursors(&self) -> Result<Vec<usize>> {
        Ok(self.lock()?.saved_cursors.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("checkpoint store lock poisoned"))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load_checkpoint(&self, dataset: &str) -> Result<Option<HarvestCheckpoint>> {
        Ok(self.lock()?.checkpoints.get(dataset).cloned())
    }

    async fn save_checkpoint(
        &self,
        dataset: &str,
        cursor: usize,
        accumulated: &[Value],
    ) -> Result<()> {
        let mut state = self.lock()?;
        state.saved_cursors.push(cursor);
        state.checkpoints.insert(
            dataset.to_string(),
            HarvestCheckpoint {
                cursor,
                accumulated: accumulated.to_vec(),
            },
        );
        Ok(())
    }

    async fn load_artifact(&self, dataset: &str) -> Result<Option<Vec<Value>>> {
        Ok(self.lock()?.artifacts.get(dataset).cloned())
    }

    async fn complete(&self, dataset: &str, items: &[Value]) -> Result<()> {
        let mut state = self.lock()?;
        state.artifacts.insert(dataset.to_string(), items.to_vec());
        state.checkpoints.remove(dataset);
        Ok(())
    }

    async fn discard(&self, dataset: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.checkpoints.remove(dataset);
        state.artifacts.remove(dataset);
        Ok(())
    }
}

/// Dataset, cursor and age of every open checkpoint.
pub async fn list_checkpoints(pool: &SqlitePool) -> Result<Vec<(String, i64, i64)>> {
    let rows = sqlx::query(
        "SELECT dataset, cursor, updated_at FROM harvest_checkpoints ORDER BY dataset",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get("dataset"), r.get("cursor"), r.get("updated_at")))
        .collect())
}

/// Dataset, item count and completion time of every final artifact.
pub async fn list_artifacts(pool: &SqlitePool) -> Result<Vec<(String, i64, i64)>> {
    let rows = sqlx::query(
        "SELECT dataset, item_count, completed_at FROM harvest_artifacts ORDER BY dataset",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get("dataset"), r.get("item_count"), r.get("completed_at")))
        .collect())
}
