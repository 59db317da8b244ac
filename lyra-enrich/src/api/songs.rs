//! Song catalog endpoints
//!
//! - `POST /songs/uploads` - grant phase of the upload saga
//! - `POST /songs` - commit phase (201 with the created song)
//! - `GET /songs/:song_id` - song with its lyrics
//! - `DELETE /songs/:song_id` - owner-only delete (204)
//! - `POST /songs/:song_id/play` - increment the play counter

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Actor;
use crate::db;
use crate::models::{Lyrics, Song};
use crate::services::{ArtifactDescriptor, CommitRequest, PreparedUpload};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct PrepareUploadRequest {
    pub audio: ArtifactDescriptor,
    #[serde(default)]
    pub cover: Option<ArtifactDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct SongDetail {
    #[serde(flatten)]
    pub song: Song,
    pub lyrics: Option<Lyrics>,
}

#[derive(Debug, Serialize)]
pub struct PlayCountResponse {
    pub song_id: Uuid,
    pub play_count: i64,
}

pub(crate) fn parse_song_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid song id '{}'", raw)))
}

/// POST /songs/uploads
pub async fn prepare_upload(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(request): Json<PrepareUploadRequest>,
) -> ApiResult<Json<PreparedUpload>> {
    let prepared = state
        .saga
        .prepare_upload(&actor, &request.audio, request.cover.as_ref())
        .await?;
    Ok(Json(prepared))
}

/// POST /songs
pub async fn create_song(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(request): Json<CommitRequest>,
) -> ApiResult<(StatusCode, Json<Song>)> {
    let song = state.saga.commit(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(song)))
}

/// GET /songs/:song_id
pub async fn get_song(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> ApiResult<Json<SongDetail>> {
    let song_id = parse_song_id(&song_id)?;
    let song = db::songs::require_song(&state.db, song_id).await?;
    let lyrics = db::lyrics::load_lyrics(&state.db, song_id).await?;
    Ok(Json(SongDetail { song, lyrics }))
}

/// DELETE /songs/:song_id
pub async fn delete_song(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(song_id): Path<String>,
) -> ApiResult<StatusCode> {
    let song_id = parse_song_id(&song_id)?;
    state.saga.delete_song(&actor, song_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /songs/:song_id/play
pub async fn record_play(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> ApiResult<Json<PlayCountResponse>> {
    let song_id = parse_song_id(&song_id)?;
    let play_count = state.saga.record_play(song_id).await?;
    Ok(Json(PlayCountResponse {
        song_id,
        play_count,
    }))
}

/// Build song catalog routes
pub fn song_routes() -> Router<AppState> {
    Router::new()
        .route("/songs", post(create_song))
        .route("/songs/uploads", post(prepare_upload))
        .route("/songs/:song_id", get(get_song).delete(delete_song))
        .route("/songs/:song_id/play", post(record_play))
}
