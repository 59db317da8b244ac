//! Database access for lyra-enrich
//!
//! sqlite through sqlx. UUIDs and timestamps are stored as TEXT, embeddings as
//! JSON arrays. Tables are created idempotently when the pool opens.

pub mod jobs;
pub mod lyrics;
pub mod songs;

use chrono::{DateTime, SecondsFormat, Utc};
use lyra_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Busy timeout applied to every connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Lock-contention budget for ledger writes
pub const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Open (creating if needed) the service database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    tracing::debug!(path = %db_path.display(), "Connecting to database");

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
        .map_err(|e| Error::database("connect", e))?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database (tests and tooling)
///
/// One connection keeps every query on the same in-memory database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| Error::database("connect", e))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| Error::database("connect", e))?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create catalog and ledger tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            audio_url TEXT NOT NULL,
            audio_key TEXT NOT NULL,
            cover_url TEXT,
            cover_key TEXT,
            release_date TEXT,
            is_unreleased INTEGER NOT NULL DEFAULT 0,
            play_count INTEGER NOT NULL DEFAULT 0 CHECK (play_count >= 0),
            uploader_id TEXT NOT NULL,
            title_embedding TEXT,
            title_folded TEXT NOT NULL DEFAULT '',
            artist_folded TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::database("create songs table", e))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_uploader ON songs(uploader_id)")
        .execute(pool)
        .await
        .map_err(|e| Error::database("create songs index", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lyrics (
            id TEXT PRIMARY KEY,
            song_id TEXT NOT NULL UNIQUE REFERENCES songs(id) ON DELETE CASCADE,
            full_text TEXT NOT NULL,
            is_generated INTEGER NOT NULL DEFAULT 0,
            is_verified INTEGER NOT NULL DEFAULT 0,
            embedding TEXT,
            text_folded TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::database("create lyrics table", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lyric_lines (
            lyrics_id TEXT NOT NULL REFERENCES lyrics(id) ON DELETE CASCADE,
            order_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            start_time REAL NOT NULL CHECK (start_time >= 0),
            end_time REAL,
            PRIMARY KEY (lyrics_id, order_index)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::database("create lyric_lines table", e))?;

    // UNIQUE(song_id, kind, run_id) turns concurrent identical transitions
    // into one upserted row
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_jobs (
            id TEXT PRIMARY KEY,
            song_id TEXT NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            run_id TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            started_at TEXT,
            completed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (song_id, kind, run_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::database("create processing_jobs table", e))?;

    tracing::info!("Database tables initialized (songs, lyrics, lyric_lines, processing_jobs)");

    Ok(())
}

/// Lowercased copy of searchable text
///
/// sqlite's `lower()` and `LIKE` only fold ASCII, so the folded columns are
/// written from Rust and matched against a pattern folded the same way.
pub(crate) fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Fixed-width UTC timestamp so TEXT ordering matches time ordering
pub(crate) fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

pub(crate) fn encode_embedding(vector: &[f32]) -> Result<String> {
    Ok(serde_json::to_string(vector)?)
}

pub(crate) fn decode_embedding(value: Option<String>) -> Result<Option<Vec<f32>>> {
    value
        .map(|v| serde_json::from_str::<Vec<f32>>(&v).map_err(Error::from))
        .transpose()
}
