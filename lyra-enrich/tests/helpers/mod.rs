//! Test Helper Utilities
//!
//! Shared fixtures for lyra-enrich integration tests: a temporary database,
//! scripted provider fakes and pre-wired services.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use lyra_common::config::TomlConfig;
use lyra_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lyra_enrich::config::ProviderSet;
use lyra_enrich::db;
use lyra_enrich::models::{NewSong, Song};
use lyra_enrich::services::{
    AudioFetcher, Embedder, InMemoryVectorIndex, JobLedger, LocalObjectStorage, ObjectStorage,
    PipelineProviders, TimestampSynchronizer, Transcriber, Transcript, TranscriptionOrchestrator,
    VectorIndex, VectorMatch, VectorMetadata, WriteGrant,
};
use lyra_enrich::utils::RetryPolicy;
use lyra_enrich::{AppState, Collaborators};

/// Create a temporary file-backed database
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let pool = db::init_database_pool(&temp_dir.path().join("lyra-test.db"))
        .await
        .unwrap();
    (temp_dir, pool)
}

pub fn new_song(title: &str, artist: &str, uploader: &str) -> NewSong {
    NewSong {
        title: title.to_string(),
        artist: artist.to_string(),
        audio_url: format!("http://media.test/{}.mp3", title),
        audio_key: format!("uploads/{}/1-{}.mp3", uploader, title),
        cover_url: None,
        cover_key: None,
        release_date: NaiveDate::from_ymd_opt(2020, 1, 1),
        is_unreleased: false,
        uploader_id: uploader.to_string(),
    }
}

/// Insert a song directly; a short pause keeps `created_at` strictly increasing
pub async fn seed_song(pool: &SqlitePool, title: &str, artist: &str, uploader: &str) -> Song {
    tokio::time::sleep(Duration::from_millis(2)).await;
    let mut conn = pool.acquire().await.unwrap();
    db::songs::insert_song(&mut conn, &new_song(title, artist, uploader))
        .await
        .unwrap()
}

/// Millisecond backoff so retry tests stay fast
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        max_attempts,
    }
}

// ---------------------------------------------------------------------------
// Provider fakes
// ---------------------------------------------------------------------------

/// Transcriber answering from a script, then with `fallback` once it runs dry
pub struct ScriptedTranscriber {
    script: Mutex<VecDeque<Result<Transcript>>>,
    fallback: Transcript,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(script: Vec<Result<Transcript>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: plain_transcript("la la la"),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(transcript: Transcript) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: transcript,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Transcriber that never answers (for cancellation tests)
pub struct HangingTranscriber;

#[async_trait]
impl Transcriber for HangingTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<Transcript> {
        std::future::pending::<()>().await;
        Err(Error::Internal("unreachable".into()))
    }
}

pub fn plain_transcript(text: &str) -> Transcript {
    Transcript {
        text: text.to_string(),
        segments: Vec::new(),
        language: Some("en".into()),
        duration_seconds: None,
    }
}

/// Embedder returning one fixed vector per call, or failing every call
pub struct FakeEmbedder {
    vector: Option<Vec<f32>>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn constant(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            vector: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vector
            .clone()
            .ok_or_else(|| Error::Provider("embedding model rejected the input".into()))
    }
}

/// Audio fetcher returning fixed bytes, or a fetch failure
pub struct FakeFetcher {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::AudioFetch(format!("GET {} returned 404", url)));
        }
        Ok(vec![0x49, 0x44, 0x33, 0x04])
    }
}

/// Vector index whose queries always fail
pub struct FailingVectorIndex;

#[async_trait]
impl VectorIndex for FailingVectorIndex {
    async fn upsert(&self, _id: &str, _vector: Vec<f32>, _metadata: VectorMetadata) -> Result<()> {
        Err(Error::TransientProvider("vector index unavailable".into()))
    }

    async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<VectorMatch>> {
        Err(Error::TransientProvider("vector index unavailable".into()))
    }

    async fn remove_song(&self, _song_id: Uuid) -> Result<usize> {
        Err(Error::TransientProvider("vector index unavailable".into()))
    }
}

/// Vector index whose queries outlive any reasonable branch timeout
pub struct SlowVectorIndex;

#[async_trait]
impl VectorIndex for SlowVectorIndex {
    async fn upsert(&self, _id: &str, _vector: Vec<f32>, _metadata: VectorMetadata) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<VectorMatch>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn remove_song(&self, _song_id: Uuid) -> Result<usize> {
        Ok(0)
    }
}

/// Object storage recording every delete attempt
///
/// Keys listed in `failing_deletes` report an error on delete; `exists`
/// answers true only for keys in `present`.
#[derive(Default)]
pub struct RecordingStorage {
    present: Mutex<HashSet<String>>,
    failing_deletes: HashSet<String>,
    deletes: Mutex<Vec<String>>,
}

impl RecordingStorage {
    pub fn with_present(keys: &[&str]) -> Self {
        Self {
            present: Mutex::new(keys.iter().map(|k| k.to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn failing_delete_of(mut self, key: &str) -> Self {
        self.failing_deletes.insert(key.to_string());
        self
    }

    pub fn deletes(&self) -> Vec<String> {
        let mut deletes = self.deletes.lock().unwrap().clone();
        deletes.sort();
        deletes
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn presign_write(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<WriteGrant> {
        Ok(WriteGrant {
            key: key.to_string(),
            upload_url: format!("http://storage.test/upload/{}", key),
            public_url: self.public_url(key),
            content_type: content_type.to_string(),
            expires_at: chrono::Utc::now()
                + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1)),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(key.to_string());
        if self.failing_deletes.contains(key) {
            return Err(Error::Internal(format!("storage refused to delete {}", key)));
        }
        self.present.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.present.lock().unwrap().contains(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://storage.test/files/{}", key)
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn providers(
    transcriber: Arc<dyn Transcriber>,
    embedder: Arc<dyn Embedder>,
    fetcher: Arc<dyn AudioFetcher>,
    vector_index: Arc<dyn VectorIndex>,
) -> PipelineProviders {
    PipelineProviders {
        fetcher,
        transcriber,
        embedder,
        vector_index,
    }
}

pub fn orchestrator(
    pool: &SqlitePool,
    providers: PipelineProviders,
    retry: RetryPolicy,
) -> TranscriptionOrchestrator {
    TranscriptionOrchestrator::new(
        pool.clone(),
        JobLedger::new(pool.clone()),
        providers,
        Arc::new(TimestampSynchronizer::baseline_only()),
        retry,
    )
}

/// Full application state over fakes, with real local storage under the temp dir
pub async fn test_app_state(
    temp_dir: &TempDir,
    pool: SqlitePool,
    transcriber: Arc<dyn Transcriber>,
    embedder: Arc<dyn Embedder>,
) -> AppState {
    let mut toml = TomlConfig::default();
    toml.pipeline.retry_base_ms = 1;
    toml.pipeline.retry_max_delay_ms = 4;

    let collaborators = Collaborators {
        providers: ProviderSet {
            transcriber,
            embedder,
            estimator: None,
        },
        fetcher: Arc::new(FakeFetcher::ok()),
        vector_index: Arc::new(InMemoryVectorIndex::new()),
        storage: Arc::new(LocalObjectStorage::new(
            temp_dir.path().join("media"),
            "http://localhost:5780",
            "test-signing-secret".to_string(),
        )),
    };

    AppState::assemble(pool, &toml, collaborators, CancellationToken::new())
}
