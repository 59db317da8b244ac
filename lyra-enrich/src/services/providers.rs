//! Collaborator interfaces for the enrichment pipeline
//!
//! Every external dependency is injected as `Arc<dyn Trait>`: concrete
//! implementations live next to this module, and tests substitute scripted
//! fakes. Implementations classify their own failures into
//! [`lyra_common::Error`] kinds, in particular `TransientProvider` vs `Provider`.

use async_trait::async_trait;
use lyra_common::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::models::TimedText;

/// Speech-to-text output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Provider segments in provider order (may be empty)
    pub segments: Vec<TimedText>,
    pub language: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// Audio transcription provider
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<Transcript>;
}

/// Optional AI assistant proposing per-line timings
#[async_trait]
pub trait LineTimingEstimator: Send + Sync {
    /// Returns one span per input line, in input order
    async fn estimate(&self, lines: &[String], duration_seconds: f64) -> Result<Vec<TimedText>>;
}

/// Text embedding provider
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// What a vector record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorKind {
    Song,
    Lyrics,
}

impl VectorKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            VectorKind::Song => "song",
            VectorKind::Lyrics => "lyrics",
        }
    }
}

/// Metadata stored with every vector record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub kind: VectorKind,
    pub song_id: Uuid,
    /// Title for song records, lyrics preview for lyrics records
    pub label: String,
}

impl VectorMetadata {
    /// Index key: `song_<id>` or `lyrics_<id>`
    pub fn record_id(&self, id: Uuid) -> String {
        format!("{}_{}", self.kind.prefix(), id)
    }
}

/// One similarity hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Similarity index over embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: VectorMetadata) -> Result<()>;

    /// Best matches first
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>>;

    /// Drop every record belonging to a song; returns how many were removed
    async fn remove_song(&self, song_id: Uuid) -> Result<usize>;
}

/// Time-limited permission to write one storage key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteGrant {
    pub key: String,
    /// URL the client uploads to
    pub upload_url: String,
    /// URL the artifact will be readable at after upload
    pub public_url: String,
    pub content_type: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Object store holding audio and cover artifacts
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn presign_write(&self, key: &str, content_type: &str, ttl: Duration)
        -> Result<WriteGrant>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Public read URL of `key`
    fn public_url(&self, key: &str) -> String;
}

/// Downloads audio for transcription
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Non-2xx responses and network failures are `Error::AudioFetch`
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
