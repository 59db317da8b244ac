//! Song persistence

use chrono::{NaiveDate, Utc};
use lyra_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{
    decode_embedding, encode_embedding, fold_case, parse_timestamp, parse_uuid, timestamp,
};
use crate::models::{NewSong, Song};

const SONG_COLUMNS: &str = "id, title, artist, audio_url, audio_key, cover_url, cover_key, \
     release_date, is_unreleased, play_count, uploader_id, title_embedding, created_at, updated_at";

fn song_from_row(row: &SqliteRow) -> Result<Song> {
    let id: String = row.get("id");
    let release_date: Option<String> = row.get("release_date");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Song {
        id: parse_uuid("songs.id", &id)?,
        title: row.get("title"),
        artist: row.get("artist"),
        audio_url: row.get("audio_url"),
        audio_key: row.get("audio_key"),
        cover_url: row.get("cover_url"),
        cover_key: row.get("cover_key"),
        release_date: release_date
            .map(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to parse release_date: {}", e)))?,
        is_unreleased: row.get::<i64, _>("is_unreleased") != 0,
        play_count: row.get("play_count"),
        uploader_id: row.get("uploader_id"),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        title_embedding: decode_embedding(row.get("title_embedding"))?,
    })
}

/// Insert a new song on an open connection or transaction
pub async fn insert_song(conn: &mut SqliteConnection, new: &NewSong) -> Result<Song> {
    let id = Uuid::new_v4();
    let now = timestamp(Utc::now());

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO songs (
            id, title, artist, audio_url, audio_key, cover_url, cover_key,
            release_date, is_unreleased, play_count, uploader_id, title_folded, artist_folded,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)
        RETURNING {}
        "#,
        SONG_COLUMNS
    ))
    .bind(id.to_string())
    .bind(&new.title)
    .bind(&new.artist)
    .bind(&new.audio_url)
    .bind(&new.audio_key)
    .bind(&new.cover_url)
    .bind(&new.cover_key)
    .bind(new.release_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(new.is_unreleased as i64)
    .bind(&new.uploader_id)
    .bind(fold_case(&new.title))
    .bind(fold_case(&new.artist))
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| Error::database("insert song", e))?;

    song_from_row(&row)
}

/// Load song by id
pub async fn load_song(pool: &SqlitePool, song_id: Uuid) -> Result<Option<Song>> {
    let row = sqlx::query(&format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS))
        .bind(song_id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::database("load song", e))?;

    row.as_ref().map(song_from_row).transpose()
}

/// Load song by id, mapping absence to NotFound
pub async fn require_song(pool: &SqlitePool, song_id: Uuid) -> Result<Song> {
    load_song(pool, song_id)
        .await?
        .ok_or_else(|| Error::not_found("song", song_id))
}

/// Batch-load songs; missing ids are skipped, order is unspecified
pub async fn load_songs(pool: &SqlitePool, song_ids: &[Uuid]) -> Result<Vec<Song>> {
    if song_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM songs WHERE id IN (", SONG_COLUMNS));
    let mut separated = builder.separated(", ");
    for id in song_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    let rows = builder
        .build()
        .fetch_all(pool)
        .await
        .map_err(|e| Error::database("load songs", e))?;

    rows.iter().map(song_from_row).collect()
}

/// Delete a song row; lyrics, lines and jobs cascade. Returns false when absent.
pub async fn delete_song(pool: &SqlitePool, song_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM songs WHERE id = ?")
        .bind(song_id.to_string())
        .execute(pool)
        .await
        .map_err(|e| Error::database("delete song", e))?;

    Ok(result.rows_affected() > 0)
}

/// Atomically increment the play counter, returning the new value
pub async fn increment_play_count(pool: &SqlitePool, song_id: Uuid) -> Result<i64> {
    let count: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE songs
        SET play_count = play_count + 1, updated_at = ?
        WHERE id = ?
        RETURNING play_count
        "#,
    )
    .bind(timestamp(Utc::now()))
    .bind(song_id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::database("increment play count", e))?;

    count.ok_or_else(|| Error::not_found("song", song_id))
}

/// Store the title embedding
pub async fn set_title_embedding(pool: &SqlitePool, song_id: Uuid, vector: &[f32]) -> Result<()> {
    sqlx::query("UPDATE songs SET title_embedding = ?, updated_at = ? WHERE id = ?")
        .bind(encode_embedding(vector)?)
        .bind(timestamp(Utc::now()))
        .bind(song_id.to_string())
        .execute(pool)
        .await
        .map_err(|e| Error::database("store title embedding", e))?;

    Ok(())
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in fold_case(query).chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Case-insensitive substring match over title, artist and lyrics text
///
/// Results keep store order (newest first).
pub async fn search_lexical(pool: &SqlitePool, query: &str, limit: usize) -> Result<Vec<Uuid>> {
    let pattern = like_pattern(query);

    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT s.id
        FROM songs s
        LEFT JOIN lyrics l ON l.song_id = s.id
        WHERE s.title_folded LIKE ? ESCAPE '\'
           OR s.artist_folded LIKE ? ESCAPE '\'
           OR l.text_folded LIKE ? ESCAPE '\'
        ORDER BY s.created_at DESC, s.id
        LIMIT ?
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::database("lexical search", e))?;

    ids.iter().map(|id| parse_uuid("songs.id", id)).collect()
}

/// Songs with a stored title embedding: (id, label, vector)
pub async fn title_embeddings(pool: &SqlitePool) -> Result<Vec<(Uuid, String, Vec<f32>)>> {
    let rows = sqlx::query(
        "SELECT id, title, title_embedding FROM songs WHERE title_embedding IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::database("load title embeddings", e))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        if let Some(vector) = decode_embedding(row.get("title_embedding"))? {
            out.push((parse_uuid("songs.id", &id)?, row.get("title"), vector));
        }
    }
    Ok(out)
}
