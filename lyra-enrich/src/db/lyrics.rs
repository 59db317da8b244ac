//! Lyrics and lyric line persistence
//!
//! Line writes are replace-all: every resync deletes the previous lines of the
//! Lyrics and inserts the new set inside one transaction, numbering them
//! `0..N` in the order given.

use chrono::Utc;
use lyra_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    decode_embedding, encode_embedding, fold_case, parse_timestamp, parse_uuid, timestamp,
};
use crate::models::{LyricLine, Lyrics};

const LYRICS_COLUMNS: &str =
    "id, song_id, full_text, is_generated, is_verified, embedding, created_at, updated_at";

fn lyrics_from_row(row: &SqliteRow) -> Result<Lyrics> {
    let id: String = row.get("id");
    let song_id: String = row.get("song_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Lyrics {
        id: parse_uuid("lyrics.id", &id)?,
        song_id: parse_uuid("lyrics.song_id", &song_id)?,
        full_text: row.get("full_text"),
        is_generated: row.get::<i64, _>("is_generated") != 0,
        is_verified: row.get::<i64, _>("is_verified") != 0,
        lines: Vec::new(),
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        embedding: decode_embedding(row.get("embedding"))?,
    })
}

async fn load_lines(pool: &SqlitePool, lyrics_id: Uuid) -> Result<Vec<LyricLine>> {
    let rows = sqlx::query(
        r#"
        SELECT order_index, text, start_time, end_time
        FROM lyric_lines
        WHERE lyrics_id = ?
        ORDER BY order_index
        "#,
    )
    .bind(lyrics_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(|e| Error::database("load lyric lines", e))?;

    Ok(rows
        .iter()
        .map(|row| LyricLine {
            text: row.get("text"),
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            order_index: row.get("order_index"),
        })
        .collect())
}

/// Load lyrics (with ordered lines) for a song
pub async fn load_lyrics(pool: &SqlitePool, song_id: Uuid) -> Result<Option<Lyrics>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM lyrics WHERE song_id = ?",
        LYRICS_COLUMNS
    ))
    .bind(song_id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::database("load lyrics", e))?;

    match row {
        Some(row) => {
            let mut lyrics = lyrics_from_row(&row)?;
            lyrics.lines = load_lines(pool, lyrics.id).await?;
            Ok(Some(lyrics))
        }
        None => Ok(None),
    }
}

/// Cheap existence check used for idempotent short-circuits
pub async fn lyrics_exist(pool: &SqlitePool, song_id: Uuid) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM lyrics WHERE song_id = ?")
        .bind(song_id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(|e| Error::database("check lyrics", e))?;

    Ok(found.is_some())
}

/// Batch-load lyrics (without lines) keyed by song id
pub async fn load_lyrics_for_songs(
    pool: &SqlitePool,
    song_ids: &[Uuid],
) -> Result<HashMap<Uuid, Lyrics>> {
    if song_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM lyrics WHERE song_id IN (",
        LYRICS_COLUMNS
    ));
    let mut separated = builder.separated(", ");
    for id in song_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    let rows = builder
        .build()
        .fetch_all(pool)
        .await
        .map_err(|e| Error::database("load lyrics batch", e))?;

    rows.iter()
        .map(|row| lyrics_from_row(row).map(|l| (l.song_id, l)))
        .collect()
}

/// Insert user-authored lyrics (no timed lines) on an open transaction
pub async fn insert_manual_lyrics(
    conn: &mut SqliteConnection,
    song_id: Uuid,
    full_text: &str,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = timestamp(Utc::now());

    sqlx::query(
        r#"
        INSERT INTO lyrics (
            id, song_id, full_text, text_folded, is_generated, is_verified, created_at, updated_at
        ) VALUES (?, ?, ?, ?, 0, 0, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(song_id.to_string())
    .bind(full_text)
    .bind(fold_case(full_text))
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::database("insert lyrics", e))?;

    Ok(id)
}

async fn write_lines(
    conn: &mut SqliteConnection,
    lyrics_id: Uuid,
    lines: &[LyricLine],
) -> Result<()> {
    sqlx::query("DELETE FROM lyric_lines WHERE lyrics_id = ?")
        .bind(lyrics_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::database("clear lyric lines", e))?;

    for (index, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO lyric_lines (lyrics_id, order_index, text, start_time, end_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(lyrics_id.to_string())
        .bind(index as i64)
        .bind(&line.text)
        .bind(line.start_time.max(0.0))
        .bind(line.end_time)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::database("insert lyric line", e))?;
    }

    Ok(())
}

/// Create or overwrite a song's lyrics and replace all of its lines
pub async fn replace_lyrics(
    pool: &SqlitePool,
    song_id: Uuid,
    full_text: &str,
    is_generated: bool,
    lines: &[LyricLine],
) -> Result<Lyrics> {
    let now = timestamp(Utc::now());
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::database("begin lyrics transaction", e))?;

    let lyrics_id: String = sqlx::query_scalar(
        r#"
        INSERT INTO lyrics (
            id, song_id, full_text, text_folded, is_generated, is_verified, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, 0, ?, ?)
        ON CONFLICT(song_id) DO UPDATE SET
            full_text = excluded.full_text,
            text_folded = excluded.text_folded,
            is_generated = excluded.is_generated,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(song_id.to_string())
    .bind(full_text)
    .bind(fold_case(full_text))
    .bind(is_generated as i64)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| Error::database("upsert lyrics", e))?;

    let lyrics_id = parse_uuid("lyrics.id", &lyrics_id)?;
    write_lines(&mut tx, lyrics_id, lines).await?;

    tx.commit()
        .await
        .map_err(|e| Error::database("commit lyrics", e))?;

    load_lyrics(pool, song_id)
        .await?
        .ok_or_else(|| Error::not_found("lyrics", song_id))
}

/// Replace only the timed lines of existing lyrics
pub async fn replace_lines(pool: &SqlitePool, lyrics_id: Uuid, lines: &[LyricLine]) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::database("begin lines transaction", e))?;

    write_lines(&mut tx, lyrics_id, lines).await?;

    sqlx::query("UPDATE lyrics SET updated_at = ? WHERE id = ?")
        .bind(timestamp(Utc::now()))
        .bind(lyrics_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::database("touch lyrics", e))?;

    tx.commit()
        .await
        .map_err(|e| Error::database("commit lines", e))
}

/// Store the lyrics embedding
pub async fn set_embedding(pool: &SqlitePool, lyrics_id: Uuid, vector: &[f32]) -> Result<()> {
    sqlx::query("UPDATE lyrics SET embedding = ?, updated_at = ? WHERE id = ?")
        .bind(encode_embedding(vector)?)
        .bind(timestamp(Utc::now()))
        .bind(lyrics_id.to_string())
        .execute(pool)
        .await
        .map_err(|e| Error::database("store lyrics embedding", e))?;

    Ok(())
}

/// Lyrics with a stored embedding: (lyrics id, song id, full text, vector)
pub async fn lyrics_embeddings(pool: &SqlitePool) -> Result<Vec<(Uuid, Uuid, String, Vec<f32>)>> {
    let rows = sqlx::query(
        "SELECT id, song_id, full_text, embedding FROM lyrics WHERE embedding IS NOT NULL",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| Error::database("load lyrics embeddings", e))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let song_id: String = row.get("song_id");
        if let Some(vector) = decode_embedding(row.get("embedding"))? {
            out.push((
                parse_uuid("lyrics.id", &id)?,
                parse_uuid("lyrics.song_id", &song_id)?,
                row.get("full_text"),
                vector,
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::db::songs::tests::seed_song;

    fn line(text: &str, start: f64, order_index: i64) -> LyricLine {
        LyricLine {
            text: text.to_string(),
            start_time: start,
            end_time: Some(start + 1.0),
            order_index,
        }
    }

    #[tokio::test]
    async fn test_replace_lyrics_renumbers_lines_contiguously() {
        let pool = init_memory_pool().await.unwrap();
        let song = seed_song(&pool, "Song", "Artist").await;

        let lines = vec![line("a", 0.0, 7), line("b", 1.0, 3), line("c", 2.0, 42)];
        let lyrics = replace_lyrics(&pool, song.id, "a\nb\nc", true, &lines)
            .await
            .unwrap();

        assert!(lyrics.is_generated);
        let indices: Vec<i64> = lyrics.lines.iter().map(|l| l.order_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let texts: Vec<&str> = lyrics.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_resync_replaces_instead_of_merging() {
        let pool = init_memory_pool().await.unwrap();
        let song = seed_song(&pool, "Song", "Artist").await;

        let first = replace_lyrics(
            &pool,
            song.id,
            "a\nb\nc",
            true,
            &[line("a", 0.0, 0), line("b", 1.0, 1), line("c", 2.0, 2)],
        )
        .await
        .unwrap();

        replace_lines(&pool, first.id, &[line("only", 5.0, 0)])
            .await
            .unwrap();

        let reloaded = load_lyrics(&pool, song.id).await.unwrap().unwrap();
        assert_eq!(reloaded.id, first.id);
        assert_eq!(reloaded.lines.len(), 1);
        assert_eq!(reloaded.lines[0].text, "only");
        assert_eq!(reloaded.lines[0].order_index, 0);
    }

    #[tokio::test]
    async fn test_manual_lyrics_and_existence() {
        let pool = init_memory_pool().await.unwrap();
        let song = seed_song(&pool, "Song", "Artist").await;
        assert!(!lyrics_exist(&pool, song.id).await.unwrap());

        let mut conn = pool.acquire().await.unwrap();
        insert_manual_lyrics(&mut conn, song.id, "hand written")
            .await
            .unwrap();
        drop(conn);

        assert!(lyrics_exist(&pool, song.id).await.unwrap());
        let lyrics = load_lyrics(&pool, song.id).await.unwrap().unwrap();
        assert!(!lyrics.is_generated);
        assert!(lyrics.lines.is_empty());

        let batch = load_lyrics_for_songs(&pool, &[song.id]).await.unwrap();
        assert_eq!(batch[&song.id].full_text, "hand written");
    }

    #[tokio::test]
    async fn test_deleting_song_cascades_to_lyrics() {
        let pool = init_memory_pool().await.unwrap();
        let song = seed_song(&pool, "Song", "Artist").await;
        replace_lyrics(&pool, song.id, "x", true, &[line("x", 0.0, 0)])
            .await
            .unwrap();

        crate::db::songs::delete_song(&pool, song.id).await.unwrap();

        assert!(load_lyrics(&pool, song.id).await.unwrap().is_none());
        let orphan_lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lyric_lines")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphan_lines, 0);
    }

    #[tokio::test]
    async fn test_embedding_is_listed_for_index_rebuild() {
        let pool = init_memory_pool().await.unwrap();
        let song = seed_song(&pool, "Song", "Artist").await;
        let lyrics = replace_lyrics(&pool, song.id, "words", true, &[])
            .await
            .unwrap();

        set_embedding(&pool, lyrics.id, &[1.0, 0.0]).await.unwrap();

        let stored = lyrics_embeddings(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1, song.id);
        assert_eq!(stored[0].3, vec![1.0, 0.0]);
    }
}
