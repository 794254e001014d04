use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinError;

use crate::config::ReaperConfig;
use crate::cutoff::CutoffZone;
use crate::store::operations::bookings::{BookingStore, DeleteBatch};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    NothingToDelete,
    Deleted(usize),
}

#[derive(Debug, Error)]
pub enum ReaperError {
    #[error("no start of day for {now} in zone {zone}")]
    Cutoff { now: DateTime<Utc>, zone: CutoffZone },
    #[error("failed to query expired bookings: {0}")]
    Query(#[source] StoreError),
    #[error("failed to commit delete batch after {deleted} deletions: {source}")]
    Commit {
        deleted: usize,
        #[source]
        source: StoreError,
    },
    #[error("reaper task did not complete: {0}")]
    Aborted(#[from] JoinError),
}

/// Scheduled entry point: deletes every booking dated before the start of today.
///
/// The store calls block, so the reap runs on the blocking pool.
pub async fn run<S>(store: Arc<S>, config: ReaperConfig) -> Result<(), ReaperError>
where
    S: BookingStore + ?Sized + 'static,
{
    tracing::debug!("booking_reaper: start");
    tokio::task::spawn_blocking(move || reap_expired(store.as_ref(), Utc::now(), &config))
        .await?
        .map(|_| ())
}

pub fn reap_expired<S>(
    store: &S,
    now: DateTime<Utc>,
    config: &ReaperConfig,
) -> Result<ReapOutcome, ReaperError>
where
    S: BookingStore + ?Sized,
{
    let cutoff = config
        .timezone
        .start_of_day(now)
        .ok_or(ReaperError::Cutoff {
            now,
            zone: config.timezone,
        })?;

    let expired = store
        .query_bookings_before(cutoff)
        .map_err(ReaperError::Query)?;

    if expired.is_empty() {
        tracing::info!(%cutoff, "No old bookings to delete.");
        return Ok(ReapOutcome::NothingToDelete);
    }

    let batch_limit = match config.max_batch_size {
        0 => expired.len(),
        n => n,
    };

    let mut batches = Vec::with_capacity(expired.len().div_ceil(batch_limit));
    let mut batch = DeleteBatch::new();
    for target in expired {
        if batch.len() == batch_limit {
            batches.push(std::mem::take(&mut batch));
        }
        batch.delete(target);
    }
    batches.push(batch);

    let mut deleted = 0usize;
    for batch in batches {
        let size = batch.len();
        let removed = store
            .commit_deletes(batch)
            .map_err(|source| ReaperError::Commit { deleted, source })?;
        tracing::debug!(size, removed, "booking_reaper: batch committed");
        deleted += removed;
    }

    tracing::info!(deleted, %cutoff, "Successfully deleted {deleted} old bookings.");
    Ok(ReapOutcome::Deleted(deleted))
}
