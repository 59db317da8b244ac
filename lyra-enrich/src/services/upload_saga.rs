//! Song upload and deletion across storage and the database
//!
//! Creating a song is a two-step saga:
//! 1. **Grant** - hand out write grants for the audio (and optional cover)
//!    artifacts under the uploader's prefix. Nothing is persisted.
//! 2. **Commit** - persist the song (and manual lyrics) in one transaction.
//!    If anything fails after the artifacts were uploaded, every storage key
//!    of the attempt is deleted on a best-effort basis and the original
//!    error is returned.
//!
//! Deletion checks ownership before any side effect, removes the row (lyrics,
//! lines and jobs cascade), then deletes storage artifacts best-effort.

use chrono::{NaiveDate, Utc};
use lyra_common::config::StorageConfig;
use lyra_common::events::{new_run_id, EnrichmentEvent, EventBus};
use lyra_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db;
use crate::models::{NewSong, Song};
use crate::services::providers::{ObjectStorage, VectorIndex, WriteGrant};
use crate::utils::{run_bounded, FanoutReport};

const UPLOAD_PREFIX: &str = "uploads";
const MAX_FILENAME_CHARS: usize = 100;

/// Client-declared artifact to upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub filename: String,
    pub content_type: String,
}

/// Write grants returned by the grant phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedUpload {
    pub audio: WriteGrant,
    pub cover: Option<WriteGrant>,
}

/// Song fields and uploaded keys submitted to the commit phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub title: String,
    pub artist: String,
    pub audio_key: String,
    #[serde(default)]
    pub cover_key: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_unreleased: bool,
    /// User-authored lyrics; when absent, lyrics generation is requested
    #[serde(default)]
    pub lyrics: Option<String>,
}

/// Saga tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SagaSettings {
    pub grant_ttl: Duration,
    pub compensation_concurrency: usize,
    pub compensation_timeout: Duration,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

impl SagaSettings {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            grant_ttl: Duration::from_secs(config.grant_ttl_secs),
            compensation_concurrency: config.compensation_concurrency.max(1),
            compensation_timeout: Duration::from_millis(config.compensation_timeout_ms),
        }
    }
}

/// Storage keys to delete if the commit does not go through
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Compensation {
    keys: Vec<String>,
}

impl Compensation {
    pub fn push(&mut self, key: impl Into<String>) {
        let key = key.into();
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Delete every key, swallowing (and logging) individual failures
    pub async fn run(
        self,
        storage: &dyn ObjectStorage,
        settings: &SagaSettings,
    ) -> FanoutReport {
        if self.keys.is_empty() {
            return FanoutReport::default();
        }

        let report = run_bounded(
            "compensation",
            self.keys,
            settings.compensation_concurrency,
            settings.compensation_timeout,
            |key| async move {
                storage.delete(&key).await.map_err(|e| {
                    Error::Internal(format!("failed to delete {}: {}", key, e))
                })
            },
        )
        .await;

        tracing::info!(
            deleted = report.succeeded,
            failed = report.failed,
            timed_out = report.timed_out,
            "Compensation finished"
        );
        report
    }
}

/// Upload, delete and play-count operations on songs
pub struct UploadSaga {
    pool: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    vector_index: Arc<dyn VectorIndex>,
    events: EventBus,
    settings: SagaSettings,
}

impl UploadSaga {
    pub fn new(
        pool: SqlitePool,
        storage: Arc<dyn ObjectStorage>,
        vector_index: Arc<dyn VectorIndex>,
        events: EventBus,
        settings: SagaSettings,
    ) -> Self {
        Self {
            pool,
            storage,
            vector_index,
            events,
            settings,
        }
    }

    /// Grant phase: write grants for the audio and optional cover artifacts
    pub async fn prepare_upload(
        &self,
        uploader_id: &str,
        audio: &ArtifactDescriptor,
        cover: Option<&ArtifactDescriptor>,
    ) -> Result<PreparedUpload> {
        validate_uploader(uploader_id)?;
        validate_content_type("audio", &audio.content_type, "audio/")?;
        if let Some(cover) = cover {
            validate_content_type("cover", &cover.content_type, "image/")?;
        }

        let millis = Utc::now().timestamp_millis();
        let audio_key = storage_key(uploader_id, "audio", millis, &nonce(), &audio.filename);
        let audio_grant = self
            .storage
            .presign_write(&audio_key, &audio.content_type, self.settings.grant_ttl)
            .await?;

        let cover_grant = match cover {
            Some(cover) => {
                let cover_key =
                    storage_key(uploader_id, "cover", millis, &nonce(), &cover.filename);
                Some(
                    self.storage
                        .presign_write(&cover_key, &cover.content_type, self.settings.grant_ttl)
                        .await?,
                )
            }
            None => None,
        };

        tracing::info!(
            uploader_id,
            audio_key = %audio_grant.key,
            cover_key = cover_grant.as_ref().map(|g| g.key.as_str()).unwrap_or("-"),
            "Issued upload grants"
        );

        Ok(PreparedUpload {
            audio: audio_grant,
            cover: cover_grant,
        })
    }

    /// Commit phase: persist the song, compensating storage on failure
    pub async fn commit(&self, uploader_id: &str, request: CommitRequest) -> Result<Song> {
        validate_uploader(uploader_id)?;

        // Only keys under the caller's own prefix are ever compensated
        let prefix = user_prefix(uploader_id);
        let mut compensation = Compensation::default();
        for key in std::iter::once(&request.audio_key).chain(request.cover_key.as_ref()) {
            if key.starts_with(&prefix) {
                compensation.push(key.clone());
            }
        }

        match self.try_commit(uploader_id, &prefix, &request).await {
            Ok(song) => {
                let has_manual_lyrics = request
                    .lyrics
                    .as_deref()
                    .is_some_and(|text| !text.trim().is_empty());
                self.publish_follow_ups(&song, has_manual_lyrics);
                Ok(song)
            }
            Err(err) => {
                tracing::warn!(
                    uploader_id,
                    error = %err,
                    keys = compensation.keys().len(),
                    "Song commit failed, compensating uploaded artifacts"
                );
                compensation.run(self.storage.as_ref(), &self.settings).await;
                Err(err)
            }
        }
    }

    async fn try_commit(
        &self,
        uploader_id: &str,
        prefix: &str,
        request: &CommitRequest,
    ) -> Result<Song> {
        let title = request.title.trim();
        let artist = request.artist.trim();
        if title.is_empty() {
            return Err(Error::validation("title", "must not be empty"));
        }
        if artist.is_empty() {
            return Err(Error::validation("artist", "must not be empty"));
        }
        if !request.audio_key.starts_with(prefix) {
            return Err(Error::validation("audio_key", "not under the uploader's prefix"));
        }
        if let Some(cover_key) = &request.cover_key {
            if !cover_key.starts_with(prefix) {
                return Err(Error::validation("cover_key", "not under the uploader's prefix"));
            }
        }

        if !self.storage.exists(&request.audio_key).await? {
            return Err(Error::validation("audio_key", "no uploaded audio at this key"));
        }
        if let Some(cover_key) = &request.cover_key {
            if !self.storage.exists(cover_key).await? {
                return Err(Error::validation("cover_key", "no uploaded cover at this key"));
            }
        }

        let new_song = NewSong {
            title: title.to_string(),
            artist: artist.to_string(),
            audio_url: self.storage.public_url(&request.audio_key),
            audio_key: request.audio_key.clone(),
            cover_url: request.cover_key.as_deref().map(|k| self.storage.public_url(k)),
            cover_key: request.cover_key.clone(),
            release_date: request.release_date,
            is_unreleased: request.is_unreleased,
            uploader_id: uploader_id.to_string(),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database("begin song transaction", e))?;

        let song = db::songs::insert_song(&mut tx, &new_song).await?;
        if let Some(text) = request.lyrics.as_deref().map(str::trim) {
            if !text.is_empty() {
                db::lyrics::insert_manual_lyrics(&mut tx, song.id, text).await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| Error::database("commit song", e))?;

        tracing::info!(song_id = %song.id, uploader_id, title = %song.title, "Song created");
        Ok(song)
    }

    fn publish_follow_ups(&self, song: &Song, has_manual_lyrics: bool) {
        self.events.emit_lossy(EnrichmentEvent::GenerateEmbeddings {
            song_id: song.id,
            run_id: new_run_id(),
        });
        if !has_manual_lyrics {
            self.events.emit_lossy(EnrichmentEvent::GenerateLyrics {
                song_id: song.id,
                run_id: new_run_id(),
            });
        }
    }

    /// Owner-only delete; storage cleanup is best-effort
    pub async fn delete_song(&self, actor_id: &str, song_id: Uuid) -> Result<FanoutReport> {
        let song = db::songs::require_song(&self.pool, song_id).await?;
        if !song.is_owned_by(actor_id) {
            tracing::warn!(song_id = %song_id, actor_id, "Rejected delete by non-owner");
            return Err(Error::Authorization(format!(
                "song {} can only be deleted by its uploader",
                song_id
            )));
        }

        if !db::songs::delete_song(&self.pool, song_id).await? {
            return Err(Error::not_found("song", song_id));
        }

        match self.vector_index.remove_song(song_id).await {
            Ok(removed) => tracing::debug!(song_id = %song_id, removed, "Vector records removed"),
            Err(e) => {
                tracing::warn!(song_id = %song_id, error = %e, "Failed to remove vector records")
            }
        }

        let mut cleanup = Compensation::default();
        cleanup.push(song.audio_key.clone());
        if let Some(cover_key) = &song.cover_key {
            cleanup.push(cover_key.clone());
        }
        let report = cleanup.run(self.storage.as_ref(), &self.settings).await;

        tracing::info!(song_id = %song_id, actor_id, "Song deleted");
        Ok(report)
    }

    /// Increment the play counter, returning the new count
    pub async fn record_play(&self, song_id: Uuid) -> Result<i64> {
        db::songs::increment_play_count(&self.pool, song_id).await
    }
}

fn user_prefix(uploader_id: &str) -> String {
    format!("{}/{}/", UPLOAD_PREFIX, uploader_id)
}

/// `uploads/<uploader>/<unix-millis>-<role>-<nonce>-<sanitized filename>`
pub fn storage_key(
    uploader_id: &str,
    role: &str,
    unix_millis: i64,
    nonce: &str,
    filename: &str,
) -> String {
    format!(
        "{}{}-{}-{}-{}",
        user_prefix(uploader_id),
        unix_millis,
        role,
        nonce,
        sanitize_filename(filename)
    )
}

/// Random key segment; keeps same-millisecond and same-name grants apart
fn nonce() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Reduce a client filename to `[A-Za-z0-9._-]`, without leading dots
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(filename);

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let mapped = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            c
        } else {
            '_'
        };
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }

    let trimmed: String = out
        .trim_start_matches('.')
        .trim_matches('_')
        .chars()
        .take(MAX_FILENAME_CHARS)
        .collect();

    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed
    }
}

fn validate_uploader(uploader_id: &str) -> Result<()> {
    let valid = !uploader_id.is_empty()
        && uploader_id.len() <= 128
        && uploader_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !uploader_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(Error::validation("uploader_id", "invalid identity"))
    }
}

fn validate_content_type(field: &str, content_type: &str, required_prefix: &str) -> Result<()> {
    if content_type.starts_with(required_prefix) && content_type.len() > required_prefix.len() {
        Ok(())
    } else {
        Err(Error::validation(
            field,
            format!("content type must be {}*", required_prefix),
        ))
    }
}
