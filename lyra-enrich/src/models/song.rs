//! Song catalog records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry for an uploaded track
///
/// Only the uploader may delete or destructively mutate a song.
/// `play_count` only ever increases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    /// Public read URL of the audio artifact
    pub audio_url: String,
    /// Storage key of the audio artifact
    pub audio_key: String,
    pub cover_url: Option<String>,
    pub cover_key: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub is_unreleased: bool,
    pub play_count: i64,
    /// Identity of the uploading user (ownership)
    pub uploader_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Embedding of "title - artist", when computed
    #[serde(skip)]
    pub title_embedding: Option<Vec<f32>>,
}

impl Song {
    /// Text embedded for the `song_<id>` vector record
    pub fn embedding_text(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }

    pub fn is_owned_by(&self, actor_id: &str) -> bool {
        self.uploader_id == actor_id
    }
}

/// Fields persisted by the upload saga commit
#[derive(Debug, Clone, PartialEq)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub audio_url: String,
    pub audio_key: String,
    pub cover_url: Option<String>,
    pub cover_key: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub is_unreleased: bool,
    pub uploader_id: String,
}

impl NewSong {
    /// Storage keys referenced by this song, audio first
    pub fn storage_keys(&self) -> Vec<String> {
        let mut keys = vec![self.audio_key.clone()];
        if let Some(cover) = &self.cover_key {
            keys.push(cover.clone());
        }
        keys
    }
}
