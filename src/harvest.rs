//! Resumable harvest loop.
//!
//! Walks an ordered candidate id list, fetching each id through a
//! [`Fetcher`] and accumulating the payloads. Progress lives in a
//! [`CheckpointStore`]:
//!
//! - every `checkpoint_every` ids the cursor and accumulated payloads are
//!   saved, so a crash loses fewer than `checkpoint_every` ids of work;
//! - on a fatal error (or a transient one that outlives `max_attempts`) the
//!   loop saves a checkpoint at the *failing* id before returning, so the next
//!   run retries that id instead of skipping it;
//! - on completion the payload list becomes the dataset's final artifact and
//!   the checkpoint is retired in the same transaction.
//!
//! Denylisted ids are skipped in place: they keep their position in the
//! candidate list so cursors from different runs stay comparable.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::HarvestConfig;
use crate::progress::{HarvestProgressEvent, HarvestProgressReporter, NoProgress};
use crate::traits::{CheckpointStore, FetchError, FetchOutcome, Fetcher, HarvestCheckpoint};

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("id {id} failed {attempts} times, last error: {last} (checkpoint saved at cursor {cursor})")]
    RetriesExhausted {
        id: i64,
        cursor: usize,
        attempts: u32,
        last: String,
    },
    #[error("id {id} failed: {message} (checkpoint saved at cursor {cursor})")]
    Fatal {
        id: i64,
        cursor: usize,
        message: String,
    },
    #[error("checkpoint store failed")]
    Checkpoint(#[source] anyhow::Error),
}

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub resumed_from: usize,
    pub fetched: u64,
    pub absent: u64,
    pub denylisted: u64,
    pub retries: u64,
    pub checkpoints_written: u64,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HarvestOutcome {
    /// A final artifact already existed; nothing was fetched.
    AlreadyComplete { items: Vec<Value> },
    Completed(HarvestReport),
}

/// Retry, checkpoint and pacing knobs.
#[derive(Debug, Clone)]
pub struct HarvestPolicy {
    pub checkpoint_every: usize,
    pub max_attempts: u32,
    pub request_delay: Duration,
    pub denylist: HashSet<i64>,
}

impl Default for HarvestPolicy {
    fn default() -> Self {
        Self::from(&HarvestConfig::default())
    }
}

impl From<&HarvestConfig> for HarvestPolicy {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            checkpoint_every: config.checkpoint_every.max(1),
            max_attempts: config.max_attempts.max(1),
            request_delay: Duration::from_millis(config.request_delay_ms),
            denylist: config.denylist.iter().copied().collect(),
        }
    }
}

pub struct Harvester<'a> {
    fetcher: &'a dyn Fetcher,
    checkpoints: &'a dyn CheckpointStore,
    policy: HarvestPolicy,
    progress: Box<dyn HarvestProgressReporter>,
}

impl<'a> Harvester<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        checkpoints: &'a dyn CheckpointStore,
        policy: HarvestPolicy,
    ) -> Self {
        Self {
            fetcher,
            checkpoints,
            policy,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn HarvestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, candidates: &[i64]) -> Result<HarvestOutcome, HarvestError> {
        let dataset = self.fetcher.dataset();

        if let Some(items) = self
            .checkpoints
            .load_artifact(dataset)
            .await
            .map_err(HarvestError::Checkpoint)?
        {
            info!(dataset, items = items.len(), "harvest already complete");
            return Ok(HarvestOutcome::AlreadyComplete { items });
        }

        let HarvestCheckpoint {
            cursor: start,
            mut accumulated,
        } = self
            .checkpoints
            .load_checkpoint(dataset)
            .await
            .map_err(HarvestError::Checkpoint)?
            .unwrap_or_default();

        if start > candidates.len() {
            return Err(HarvestError::Checkpoint(anyhow::anyhow!(
                "checkpoint cursor {} is past the end of {} candidates; restart the dataset",
                start,
                candidates.len()
            )));
        }
        if start > 0 {
            info!(
                dataset,
                cursor = start,
                accumulated = accumulated.len(),
                "resuming from checkpoint"
            );
        }

        let total = candidates.len() as u64;
        self.progress.report(HarvestProgressEvent::Started {
            dataset: dataset.to_string(),
            cursor: start as u64,
            total,
        });

        let mut report = HarvestReport {
            resumed_from: start,
            ..HarvestReport::default()
        };
        let mut first_request = true;

        for (cursor, &id) in candidates.iter().enumerate().skip(start) {
            if self.policy.denylist.contains(&id) {
                debug!(dataset, id, "denylisted id skipped");
                report.denylisted += 1;
            } else {
                match self.fetch_with_retry(id, &mut first_request, &mut report).await {
                    Ok(FetchOutcome::Found(payload)) => {
                        accumulated.push(payload);
                        report.fetched += 1;
                    }
                    Ok(FetchOutcome::Absent) => {
                        debug!(dataset, id, "no content for id");
                        report.absent += 1;
                    }
                    Err(failure) => {
                        let err = match failure {
                            FetchError::Transient(last) => HarvestError::RetriesExhausted {
                                id,
                                cursor,
                                attempts: self.policy.max_attempts,
                                last,
                            },
                            FetchError::Fatal(message) => HarvestError::Fatal {
                                id,
                                cursor,
                                message,
                            },
                        };
                        error!(dataset, id, cursor, error = %err, "harvest aborted");
                        self.checkpoint(dataset, cursor, &accumulated).await?;
                        return Err(err);
                    }
                }
            }

            let processed = cursor + 1;
            self.progress.report(HarvestProgressEvent::Advanced {
                dataset: dataset.to_string(),
                n: processed as u64,
                total,
            });
            if processed % self.policy.checkpoint_every == 0 {
                self.checkpoint(dataset, processed, &accumulated).await?;
                report.checkpoints_written += 1;
            }
        }

        report.total_items = accumulated.len();
        self.checkpoints
            .complete(dataset, &accumulated)
            .await
            .map_err(HarvestError::Checkpoint)?;
        info!(
            dataset,
            fetched = report.fetched,
            absent = report.absent,
            denylisted = report.denylisted,
            retries = report.retries,
            items = report.total_items,
            "harvest complete"
        );
        Ok(HarvestOutcome::Completed(report))
    }

    /// Fetch one id, retrying transient failures up to `max_attempts` times.
    /// The error returned is the last attempt's.
    async fn fetch_with_retry(
        &self,
        id: i64,
        first_request: &mut bool,
        report: &mut HarvestReport,
    ) -> Result<FetchOutcome, FetchError> {
        let mut attempt = 1;
        loop {
            if !*first_request && !self.policy.request_delay.is_zero() {
                tokio::time::sleep(self.policy.request_delay).await;
            }
            *first_request = false;

            match self.fetcher.fetch(id).await {
                Err(FetchError::Transient(msg)) if attempt < self.policy.max_attempts => {
                    warn!(
                        dataset = self.fetcher.dataset(),
                        id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %msg,
                        "transient fetch failure, retrying"
                    );
                    report.retries += 1;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn checkpoint(
        &self,
        dataset: &str,
        cursor: usize,
        accumulated: &[Value],
    ) -> Result<(), HarvestError> {
        self.checkpoints
            .save_checkpoint(dataset, cursor, accumulated)
            .await
            .map_err(HarvestError::Checkpoint)?;
        info!(dataset, cursor, items = accumulated.len(), "checkpoint written");
        self.progress.report(HarvestProgressEvent::Checkpointed {
            dataset: dataset.to_string(),
            cursor: cursor as u64,
        });
        Ok(())
    }
}
