//! Processing job ledger persistence
//!
//! **Pattern:** find-or-create is a single `INSERT ... ON CONFLICT DO UPDATE`
//! keyed on the UNIQUE (song_id, kind, run_id) constraint, so two workers
//! racing on the same triple converge on one row.

use chrono::Utc;
use lyra_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_optional_timestamp, parse_timestamp, parse_uuid, timestamp};
use crate::models::{JobKind, JobStatus, ProcessingJob};

const JOB_COLUMNS: &str = "id, song_id, kind, run_id, status, error, started_at, completed_at, \
     created_at, updated_at";

fn job_from_row(row: &SqliteRow) -> Result<ProcessingJob> {
    let id: String = row.get("id");
    let song_id: String = row.get("song_id");
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(ProcessingJob {
        id: parse_uuid("processing_jobs.id", &id)?,
        song_id: parse_uuid("processing_jobs.song_id", &song_id)?,
        kind: kind.parse()?,
        run_id: row.get("run_id"),
        status: status.parse()?,
        error: row.get("error"),
        started_at: parse_optional_timestamp("started_at", row.get("started_at"))?,
        completed_at: parse_optional_timestamp("completed_at", row.get("completed_at"))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

/// Create or update the row for (song_id, kind, run_id)
///
/// - `started_at` is only ever written by the first PROCESSING transition
/// - `completed_at` is written when `status` is terminal
/// - `error` is kept when the new transition carries none
pub async fn upsert_transition(
    pool: &SqlitePool,
    song_id: Uuid,
    kind: JobKind,
    run_id: &str,
    status: JobStatus,
    error: Option<&str>,
) -> Result<ProcessingJob> {
    let now = timestamp(Utc::now());
    let started_at = (status == JobStatus::Processing).then(|| now.clone());
    let completed_at = status.is_terminal().then(|| now.clone());

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO processing_jobs (
            id, song_id, kind, run_id, status, error,
            started_at, completed_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(song_id, kind, run_id) DO UPDATE SET
            status = excluded.status,
            error = COALESCE(excluded.error, processing_jobs.error),
            started_at = COALESCE(processing_jobs.started_at, excluded.started_at),
            completed_at = COALESCE(excluded.completed_at, processing_jobs.completed_at),
            updated_at = excluded.updated_at
        RETURNING {}
        "#,
        JOB_COLUMNS
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(song_id.to_string())
    .bind(kind.as_str())
    .bind(run_id)
    .bind(status.as_str())
    .bind(error)
    .bind(started_at)
    .bind(completed_at)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::database("upsert processing job", e))?;

    job_from_row(&row)
}

/// All job rows for a song, newest first
pub async fn list_jobs(pool: &SqlitePool, song_id: Uuid) -> Result<Vec<ProcessingJob>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM processing_jobs WHERE song_id = ? ORDER BY created_at DESC, rowid DESC",
        JOB_COLUMNS
    ))
    .bind(song_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(|e| Error::database("list processing jobs", e))?;

    rows.iter().map(job_from_row).collect()
}

/// Most recently created row for (song_id, kind)
pub async fn latest_job(
    pool: &SqlitePool,
    song_id: Uuid,
    kind: JobKind,
) -> Result<Option<ProcessingJob>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {} FROM processing_jobs
        WHERE song_id = ? AND kind = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
        JOB_COLUMNS
    ))
    .bind(song_id.to_string())
    .bind(kind.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::database("load latest processing job", e))?;

    row.as_ref().map(job_from_row).transpose()
}

/// Load the row for one exact triple
pub async fn load_job(
    pool: &SqlitePool,
    song_id: Uuid,
    kind: JobKind,
    run_id: &str,
) -> Result<Option<ProcessingJob>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM processing_jobs WHERE song_id = ? AND kind = ? AND run_id = ?",
        JOB_COLUMNS
    ))
    .bind(song_id.to_string())
    .bind(kind.as_str())
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::database("load processing job", e))?;

    row.as_ref().map(job_from_row).transpose()
}
