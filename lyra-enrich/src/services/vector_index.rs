//! In-process vector index (cosine similarity)
//!
//! Embeddings are persisted on the song and lyrics rows; the index itself is
//! memory-only and rebuilt from those columns at start-up.

use async_trait::async_trait;
use lyra_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db;
use crate::services::providers::{VectorIndex, VectorKind, VectorMatch, VectorMetadata};

struct Entry {
    vector: Vec<f32>,
    norm: f32,
    metadata: VectorMetadata,
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<HashMap<String, Entry>>,
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from embeddings stored in the database
    pub async fn load_from_db(pool: &SqlitePool) -> Result<Self> {
        let index = Self::new();

        for (song_id, title, vector) in db::songs::title_embeddings(pool).await? {
            let metadata = VectorMetadata {
                kind: VectorKind::Song,
                song_id,
                label: title,
            };
            let id = metadata.record_id(song_id);
            index.upsert(&id, vector, metadata).await?;
        }

        for (lyrics_id, song_id, full_text, vector) in db::lyrics::lyrics_embeddings(pool).await? {
            let label: String = full_text
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .chars()
                .take(80)
                .collect();
            let metadata = VectorMetadata {
                kind: VectorKind::Lyrics,
                song_id,
                label,
            };
            let id = metadata.record_id(lyrics_id);
            index.upsert(&id, vector, metadata).await?;
        }

        tracing::info!(records = index.len().await, "Vector index rebuilt from database");
        Ok(index)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: VectorMetadata) -> Result<()> {
        let norm = norm(&vector);
        if vector.is_empty() || !norm.is_finite() {
            return Err(Error::validation("vector", "must be a non-empty finite vector"));
        }

        self.entries.write().await.insert(
            id.to_string(),
            Entry {
                vector,
                norm,
                metadata,
            },
        );
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorMatch>> {
        let query_norm = norm(vector);
        if top_k == 0 || query_norm == 0.0 || !query_norm.is_finite() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .filter(|(_, entry)| entry.vector.len() == vector.len() && entry.norm > 0.0)
            .map(|(id, entry)| {
                let dot: f32 = entry.vector.iter().zip(vector).map(|(a, b)| a * b).sum();
                VectorMatch {
                    id: id.clone(),
                    score: dot / (entry.norm * query_norm),
                    metadata: entry.metadata.clone(),
                }
            })
            .collect();

        // id as tiebreak keeps results deterministic across HashMap orderings
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn remove_song(&self, song_id: Uuid) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.metadata.song_id != song_id);
        Ok(before - entries.len())
    }
}
