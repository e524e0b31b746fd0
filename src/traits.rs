//! Seams of the harvest loop.
//!
//! ```text
//!   candidate ids ──▶ Harvester ──fetch(id)──▶ Fetcher (Steam API, store page, test script)
//!                        │
//!                        └──checkpoint/complete──▶ CheckpointStore (SQLite, memory)
//! ```
//!
//! The [`Harvester`](crate::harvest::Harvester) only ever sees these traits,
//! so the loop is tested against scripted fetchers and an in-memory
//! checkpoint store, and runs in production against HTTP and SQLite.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Result of fetching one id.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A payload to record.
    Found(Value),
    /// The id resolves to nothing worth recording. Not an error.
    Absent,
}

/// Classification of one failed fetch attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying with the same id (timeouts, 429, 5xx, connection resets).
    #[error("transient: {0}")]
    Transient(String),
    /// Retrying will not help.
    #[error("{0}")]
    Fatal(String),
}

/// Produces the raw payload for one id.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Dataset name; also the checkpoint/artifact key.
    fn dataset(&self) -> &str;

    async fn fetch(&self, id: i64) -> Result<FetchOutcome, FetchError>;
}

/// Durable harvest progress: everything before `cursor` has been processed
/// and its payloads are in `accumulated`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestCheckpoint {
    pub cursor: usize,
    pub accumulated: Vec<Value>,
}

/// Where harvest progress and final artifacts live.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_checkpoint(&self, dataset: &str) -> Result<Option<HarvestCheckpoint>>;

    /// Record `cursor` together with every payload accumulated so far.
    ///
    /// `accumulated` only ever grows within a run, so a store may persist
    /// just the payloads added since its last save.
    async fn save_checkpoint(&self, dataset: &str, cursor: usize, accumulated: &[Value])
        -> Result<()>;

    /// The final artifact, if a run over `dataset` has completed.
    async fn load_artifact(&self, dataset: &str) -> Result<Option<Vec<Value>>>;

    /// Persist the final artifact and retire the checkpoint, atomically.
    async fn complete(&self, dataset: &str, items: &[Value]) -> Result<()>;

    /// Forget both checkpoint and artifact for `dataset`.
    async fn discard(&self, dataset: &str) -> Result<()>;
}
