//! Idempotent status record per (song, job kind, run)
//!
//! Writes go through [`retry_on_lock`] so transient sqlite lock contention is
//! absorbed here; every other persistence failure propagates to the caller.

use lyra_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{self, MAX_LOCK_WAIT_MS};
use crate::models::{JobKind, JobStatus, ProcessingJob};
use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct JobLedger {
    pool: SqlitePool,
}

impl JobLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a status transition for (song_id, kind, run_id)
    ///
    /// Safe to call any number of times for the same triple; the row is
    /// created on first use and updated in place afterwards.
    pub async fn record_transition(
        &self,
        song_id: Uuid,
        kind: JobKind,
        run_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<ProcessingJob> {
        let job = retry_on_lock("record job transition", MAX_LOCK_WAIT_MS, || {
            db::jobs::upsert_transition(&self.pool, song_id, kind, run_id, status, error)
        })
        .await?;

        tracing::debug!(
            song_id = %song_id,
            kind = %kind,
            run_id,
            status = %status,
            "Recorded job transition"
        );

        Ok(job)
    }

    /// Ledger history for a song, newest first
    pub async fn jobs_for_song(&self, song_id: Uuid) -> Result<Vec<ProcessingJob>> {
        db::jobs::list_jobs(&self.pool, song_id).await
    }

    /// Most recent run of one kind
    pub async fn latest(&self, song_id: Uuid, kind: JobKind) -> Result<Option<ProcessingJob>> {
        db::jobs::latest_job(&self.pool, song_id, kind).await
    }
}
