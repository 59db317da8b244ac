//! Hybrid lexical + semantic song search
//!
//! Both branches run concurrently, each under its own timeout. A branch that
//! fails or times out contributes nothing; search only fails on bad input or
//! when the final batch load from the store fails.
//!
//! Scoring: songs found by the vector branch keep their best vector score
//! (a song can match as both `song_<id>` and `lyrics_<id>`); lexical-only
//! hits get a fixed score. Ranking is a stable sort by score, so equal scores
//! keep lexical store order followed by vector rank order.

use lyra_common::config::SearchConfig;
use lyra_common::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::db;
use crate::models::Song;
use crate::services::providers::{Embedder, VectorIndex};

/// Which branch surfaced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Lexical,
    Vector,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSong {
    #[serde(flatten)]
    pub song: Song,
    pub score: f32,
    pub matched_by: MatchSource,
    pub has_lyrics: bool,
    pub lyrics_preview: Option<String>,
}

/// Ranker tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub branch_timeout: Duration,
    pub vector_top_k: usize,
    pub lexical_score: f32,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

impl SearchSettings {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            branch_timeout: Duration::from_millis(config.branch_timeout_ms),
            vector_top_k: config.vector_top_k,
            lexical_score: config.lexical_score,
            default_limit: config.default_limit,
            max_limit: config.max_limit.max(1),
        }
    }

    /// Requested limit clamped to `1..=max_limit`
    pub fn effective_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

pub struct HybridSearchRanker {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    settings: SearchSettings,
}

impl HybridSearchRanker {
    pub fn new(
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        vector_index: Arc<dyn VectorIndex>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            pool,
            embedder,
            vector_index,
            settings,
        }
    }

    async fn lexical_branch(&self, query: &str) -> Result<Vec<Uuid>> {
        db::songs::search_lexical(&self.pool, query, self.settings.max_limit).await
    }

    /// Best score per song id, in vector rank order
    async fn vector_branch(&self, query: &str) -> Result<Vec<(Uuid, f32)>> {
        let vector = self.embedder.embed(query).await?;
        let matches = self
            .vector_index
            .query(&vector, self.settings.vector_top_k)
            .await?;

        let mut best: Vec<(Uuid, f32)> = Vec::with_capacity(matches.len());
        for m in matches {
            match best.iter_mut().find(|(id, _)| *id == m.metadata.song_id) {
                Some((_, score)) => *score = score.max(m.score),
                None => best.push((m.metadata.song_id, m.score)),
            }
        }
        Ok(best)
    }

    async fn with_timeout<T: Default>(
        &self,
        branch: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> T {
        match tokio::time::timeout(self.settings.branch_timeout, fut).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(branch, error = %e, "Search branch failed, continuing without it");
                T::default()
            }
            Err(_) => {
                tracing::warn!(
                    branch,
                    timeout_ms = self.settings.branch_timeout.as_millis() as u64,
                    "Search branch timed out, continuing without it"
                );
                T::default()
            }
        }
    }

    /// Search the catalog; `limit` defaults to 10 and is clamped to `1..=50`
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<RankedSong>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::validation("query", "must not be empty"));
        }
        let limit = self.settings.effective_limit(limit);

        let (lexical_ids, vector_hits) = tokio::join!(
            self.with_timeout("lexical", self.lexical_branch(query)),
            self.with_timeout("vector", self.vector_branch(query)),
        );

        let vector_scores: HashMap<Uuid, f32> = vector_hits.iter().copied().collect();

        // Union in first-seen order: lexical store order, then vector rank
        let mut candidates: Vec<(Uuid, f32, MatchSource)> = Vec::new();
        for id in &lexical_ids {
            if candidates.iter().any(|(seen, _, _)| seen == id) {
                continue;
            }
            match vector_scores.get(id) {
                Some(score) => candidates.push((*id, *score, MatchSource::Both)),
                None => candidates.push((*id, self.settings.lexical_score, MatchSource::Lexical)),
            }
        }
        for (id, score) in &vector_hits {
            if !candidates.iter().any(|(seen, _, _)| seen == id) {
                candidates.push((*id, *score, MatchSource::Vector));
            }
        }

        let ids: Vec<Uuid> = candidates.iter().map(|(id, _, _)| *id).collect();
        let songs: HashMap<Uuid, Song> = db::songs::load_songs(&self.pool, &ids)
            .await?
            .into_iter()
            .map(|song| (song.id, song))
            .collect();
        let lyrics = db::lyrics::load_lyrics_for_songs(&self.pool, &ids).await?;

        let mut ranked: Vec<RankedSong> = candidates
            .into_iter()
            .filter_map(|(id, score, matched_by)| {
                // Index entries can outlive deleted songs
                let song = songs.get(&id)?.clone();
                let preview = lyrics.get(&id).map(|l| l.preview());
                Some(RankedSong {
                    song,
                    score,
                    matched_by,
                    has_lyrics: preview.is_some(),
                    lyrics_preview: preview,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(limit);

        tracing::debug!(
            query,
            lexical = lexical_ids.len(),
            vector = vector_hits.len(),
            returned = ranked.len(),
            "Hybrid search complete"
        );

        Ok(ranked)
    }
}
