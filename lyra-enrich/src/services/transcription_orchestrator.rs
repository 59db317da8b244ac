//! Enrichment pipeline orchestrator
//!
//! Drives one enrichment run per (song_id, run_id) through a fixed sequence of
//! phases, recording each transition in the [`JobLedger`].
//!
//! State progression for "generate lyrics":
//! START → CHECK_EXISTING → FETCH_AUDIO → TRANSCRIBE → SYNC_TIMESTAMPS → PERSIST → EMBED → DONE
//!
//! Any failure moves the run to FAILED with the error text before the error is
//! returned. Runs are safe to repeat: existing lyrics short-circuit
//! CHECK_EXISTING, and ledger writes are upserts.

use lyra_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db;
use crate::models::{lines_from_timed, JobKind, JobStatus, LyricLine, Lyrics, Song, TimedText};
use crate::services::job_ledger::JobLedger;
use crate::services::providers::{
    AudioFetcher, Embedder, Transcriber, VectorIndex, VectorKind, VectorMetadata,
};
use crate::services::timestamp_sync::{improve_timestamps, TimestampSynchronizer};
use crate::utils::{cancellable, retry_with_backoff, RetryPolicy};

/// Pipeline phase of an enrichment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelinePhase {
    Start,
    CheckExisting,
    FetchAudio,
    Transcribe,
    SyncTimestamps,
    Persist,
    Embed,
    Done,
    Failed,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Start => "START",
            PipelinePhase::CheckExisting => "CHECK_EXISTING",
            PipelinePhase::FetchAudio => "FETCH_AUDIO",
            PipelinePhase::Transcribe => "TRANSCRIBE",
            PipelinePhase::SyncTimestamps => "SYNC_TIMESTAMPS",
            PipelinePhase::Persist => "PERSIST",
            PipelinePhase::Embed => "EMBED",
            PipelinePhase::Done => "DONE",
            PipelinePhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Result of a "generate lyrics" run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerateOutcome {
    /// Lyrics were already present; nothing was fetched or transcribed
    AlreadyExists,
    Generated {
        lyrics_id: Uuid,
        line_count: usize,
        /// False when the EMBED phase failed (lyrics are still persisted)
        embedded: bool,
    },
}

/// Result of a "sync lyrics" run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub lyrics_id: Uuid,
    pub line_count: usize,
}

/// Result of a "generate embeddings" run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingOutcome {
    pub song_embedded: bool,
    pub lyrics_embedded: bool,
}

/// External collaborators used by the pipeline
#[derive(Clone)]
pub struct PipelineProviders {
    pub fetcher: Arc<dyn AudioFetcher>,
    pub transcriber: Arc<dyn Transcriber>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Arc<dyn VectorIndex>,
}

/// Ledger bookkeeping for one run
struct RunTracker<'a> {
    ledger: &'a JobLedger,
    song_id: Uuid,
    kind: JobKind,
    run_id: &'a str,
}

impl RunTracker<'_> {
    async fn enter(&self, phase: PipelinePhase) -> Result<()> {
        tracing::debug!(
            song_id = %self.song_id,
            run_id = self.run_id,
            kind = %self.kind,
            phase = %phase,
            "Entering phase"
        );
        self.ledger
            .record_transition(self.song_id, self.kind, self.run_id, JobStatus::Processing, None)
            .await?;
        Ok(())
    }

    /// Record the terminal status matching `result`, then hand it back
    async fn finish<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.ledger
                    .record_transition(
                        self.song_id,
                        self.kind,
                        self.run_id,
                        JobStatus::Completed,
                        None,
                    )
                    .await?;
                tracing::info!(
                    song_id = %self.song_id,
                    run_id = self.run_id,
                    kind = %self.kind,
                    phase = %PipelinePhase::Done,
                    "Enrichment run completed"
                );
                Ok(value)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(
                    song_id = %self.song_id,
                    run_id = self.run_id,
                    kind = %self.kind,
                    phase = %PipelinePhase::Failed,
                    error = %message,
                    "Enrichment run failed"
                );
                if let Err(ledger_err) = self
                    .ledger
                    .record_transition(
                        self.song_id,
                        self.kind,
                        self.run_id,
                        JobStatus::Failed,
                        Some(&message),
                    )
                    .await
                {
                    tracing::error!(
                        song_id = %self.song_id,
                        run_id = self.run_id,
                        error = %ledger_err,
                        "Failed to record job failure"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Transcription and embedding pipeline
pub struct TranscriptionOrchestrator {
    pool: SqlitePool,
    ledger: JobLedger,
    providers: PipelineProviders,
    synchronizer: Arc<TimestampSynchronizer>,
    retry_policy: RetryPolicy,
}

impl TranscriptionOrchestrator {
    pub fn new(
        pool: SqlitePool,
        ledger: JobLedger,
        providers: PipelineProviders,
        synchronizer: Arc<TimestampSynchronizer>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            pool,
            ledger,
            providers,
            synchronizer,
            retry_policy,
        }
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    fn tracker<'a>(&'a self, song_id: Uuid, kind: JobKind, run_id: &'a str) -> RunTracker<'a> {
        RunTracker {
            ledger: &self.ledger,
            song_id,
            kind,
            run_id,
        }
    }

    /// Transcribe a song's audio into timed lyrics
    ///
    /// Returns [`GenerateOutcome::AlreadyExists`] without touching any provider
    /// when the song already has lyrics.
    pub async fn generate_lyrics(
        &self,
        song_id: Uuid,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome> {
        let song = db::songs::require_song(&self.pool, song_id).await?;
        let run = self.tracker(song_id, JobKind::GenerateLyrics, run_id);

        tracing::info!(song_id = %song_id, run_id, phase = %PipelinePhase::Start, "Generating lyrics");
        run.enter(PipelinePhase::Start).await?;

        let result = self.generate_lyrics_phases(&run, &song, cancel).await;
        run.finish(result).await
    }

    async fn generate_lyrics_phases(
        &self,
        run: &RunTracker<'_>,
        song: &Song,
        cancel: &CancellationToken,
    ) -> Result<GenerateOutcome> {
        run.enter(PipelinePhase::CheckExisting).await?;
        if db::lyrics::lyrics_exist(&self.pool, song.id).await? {
            tracing::info!(song_id = %song.id, run_id = run.run_id, "Lyrics already exist, skipping");
            return Ok(GenerateOutcome::AlreadyExists);
        }

        run.enter(PipelinePhase::FetchAudio).await?;
        let audio = cancellable(cancel, self.providers.fetcher.fetch(&song.audio_url)).await?;
        tracing::debug!(song_id = %song.id, bytes = audio.len(), "Fetched audio");

        run.enter(PipelinePhase::Transcribe).await?;
        let transcriber = &self.providers.transcriber;
        let transcript = cancellable(
            cancel,
            retry_with_backoff("transcribe", &self.retry_policy, Error::is_transient, || {
                cancellable(cancel, transcriber.transcribe(audio.clone()))
            }),
        )
        .await?;

        let segments: Vec<TimedText> = transcript
            .segments
            .into_iter()
            .filter(|segment| !segment.text.trim().is_empty())
            .collect();
        let full_text = if transcript.text.trim().is_empty() {
            segments
                .iter()
                .map(|s| s.text.trim())
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            transcript.text.trim().to_string()
        };
        if full_text.is_empty() {
            return Err(Error::Provider("transcription returned no text".into()));
        }

        run.enter(PipelinePhase::SyncTimestamps).await?;
        let lines: Vec<LyricLine> = if segments.is_empty() {
            self.synchronizer
                .synchronize(&full_text, transcript.duration_seconds, cancel)
                .await?
        } else {
            lines_from_timed(&segments)
        };

        run.enter(PipelinePhase::Persist).await?;
        let lyrics =
            db::lyrics::replace_lyrics(&self.pool, song.id, &full_text, true, &lines).await?;
        tracing::info!(
            song_id = %song.id,
            lyrics_id = %lyrics.id,
            lines = lyrics.lines.len(),
            language = transcript.language.as_deref().unwrap_or("unknown"),
            "Persisted generated lyrics"
        );

        run.enter(PipelinePhase::Embed).await?;
        let embedded = match self.embed_lyrics(&lyrics, cancel).await {
            Ok(()) => true,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(
                    song_id = %song.id,
                    lyrics_id = %lyrics.id,
                    error = %e,
                    "Lyrics embedding failed, keeping persisted lyrics"
                );
                false
            }
        };

        Ok(GenerateOutcome::Generated {
            lyrics_id: lyrics.id,
            line_count: lyrics.lines.len(),
            embedded,
        })
    }

    /// Re-time existing lyrics, snapping line starts to `beat_times` when given
    pub async fn sync_lyrics(
        &self,
        song_id: Uuid,
        run_id: &str,
        duration_seconds: Option<f64>,
        beat_times: Option<&[f64]>,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        db::songs::require_song(&self.pool, song_id).await?;
        let run = self.tracker(song_id, JobKind::SyncLyrics, run_id);

        tracing::info!(song_id = %song_id, run_id, "Synchronizing lyrics");
        run.enter(PipelinePhase::Start).await?;

        let result = async {
            run.enter(PipelinePhase::CheckExisting).await?;
            let lyrics = db::lyrics::load_lyrics(&self.pool, song_id)
                .await?
                .ok_or_else(|| Error::not_found("lyrics", song_id))?;

            run.enter(PipelinePhase::SyncTimestamps).await?;
            let lines = self
                .synchronizer
                .synchronize(&lyrics.full_text, duration_seconds, cancel)
                .await?;
            let lines = improve_timestamps(lines, beat_times);

            run.enter(PipelinePhase::Persist).await?;
            db::lyrics::replace_lines(&self.pool, lyrics.id, &lines).await?;

            Ok::<_, Error>(SyncOutcome {
                lyrics_id: lyrics.id,
                line_count: lines.len(),
            })
        }
        .await;

        run.finish(result).await
    }

    /// Embed the song title (and lyrics, when present) for vector search
    pub async fn generate_embeddings(
        &self,
        song_id: Uuid,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<EmbeddingOutcome> {
        let song = db::songs::require_song(&self.pool, song_id).await?;
        let run = self.tracker(song_id, JobKind::GenerateEmbeddings, run_id);

        tracing::info!(song_id = %song_id, run_id, "Generating embeddings");
        run.enter(PipelinePhase::Start).await?;

        let result = async {
            run.enter(PipelinePhase::Embed).await?;
            self.embed_song(&song, cancel).await?;

            let lyrics_embedded = match db::lyrics::load_lyrics(&self.pool, song_id).await? {
                Some(lyrics) => {
                    self.embed_lyrics(&lyrics, cancel).await?;
                    true
                }
                None => false,
            };

            Ok::<_, Error>(EmbeddingOutcome {
                song_embedded: true,
                lyrics_embedded,
            })
        }
        .await;

        run.finish(result).await
    }

    async fn embed_text(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let embedder = &self.providers.embedder;
        cancellable(
            cancel,
            retry_with_backoff("embed", &self.retry_policy, Error::is_transient, || {
                cancellable(cancel, embedder.embed(text))
            }),
        )
        .await
    }

    async fn embed_song(&self, song: &Song, cancel: &CancellationToken) -> Result<()> {
        let vector = self.embed_text(&song.embedding_text(), cancel).await?;
        db::songs::set_title_embedding(&self.pool, song.id, &vector).await?;

        let metadata = VectorMetadata {
            kind: VectorKind::Song,
            song_id: song.id,
            label: song.title.clone(),
        };
        let record_id = metadata.record_id(song.id);
        cancellable(
            cancel,
            self.providers
                .vector_index
                .upsert(&record_id, vector, metadata),
        )
        .await?;

        tracing::debug!(song_id = %song.id, record_id = %record_id, "Song embedding stored");
        Ok(())
    }

    async fn embed_lyrics(&self, lyrics: &Lyrics, cancel: &CancellationToken) -> Result<()> {
        let vector = self.embed_text(&lyrics.full_text, cancel).await?;
        db::lyrics::set_embedding(&self.pool, lyrics.id, &vector).await?;

        let metadata = VectorMetadata {
            kind: VectorKind::Lyrics,
            song_id: lyrics.song_id,
            label: lyrics.preview(),
        };
        let record_id = metadata.record_id(lyrics.id);
        cancellable(
            cancel,
            self.providers
                .vector_index
                .upsert(&record_id, vector, metadata),
        )
        .await?;

        tracing::debug!(song_id = %lyrics.song_id, record_id = %record_id, "Lyrics embedding stored");
        Ok(())
    }
}
