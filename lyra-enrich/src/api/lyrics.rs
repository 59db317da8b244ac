//! Lyrics, enrichment triggers and job status
//!
//! Trigger endpoints validate, publish an enrichment event and answer 202 with
//! the run id; progress is polled through `GET /songs/:song_id/jobs`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lyra_common::events::{new_run_id, EnrichmentEvent};
use lyra_common::Error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::songs::parse_song_id;
use super::Actor;
use crate::db;
use crate::models::{Lyrics, ProcessingJob};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct SyncLyricsRequest {
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub beat_times: Option<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct AcceptedRun {
    pub song_id: Uuid,
    pub run_id: String,
    pub event: &'static str,
}

fn publish(state: &AppState, event: EnrichmentEvent) -> ApiResult<(StatusCode, Json<AcceptedRun>)> {
    let accepted = AcceptedRun {
        song_id: event.song_id(),
        run_id: event.run_id().to_string(),
        event: event.name(),
    };

    state
        .event_bus
        .emit(event)
        .map_err(|_| Error::Internal("enrichment worker is not running".into()))?;

    tracing::info!(
        event = accepted.event,
        song_id = %accepted.song_id,
        run_id = %accepted.run_id,
        "Enrichment run requested"
    );
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /songs/:song_id/lyrics
pub async fn get_lyrics(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> ApiResult<Json<Lyrics>> {
    let song_id = parse_song_id(&song_id)?;
    let lyrics = db::lyrics::load_lyrics(&state.db, song_id)
        .await?
        .ok_or_else(|| Error::not_found("lyrics", song_id))?;
    Ok(Json(lyrics))
}

/// POST /songs/:song_id/lyrics/generate
pub async fn generate_lyrics(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> ApiResult<(StatusCode, Json<AcceptedRun>)> {
    let song_id = parse_song_id(&song_id)?;
    db::songs::require_song(&state.db, song_id).await?;

    publish(
        &state,
        EnrichmentEvent::GenerateLyrics {
            song_id,
            run_id: new_run_id(),
        },
    )
}

/// POST /songs/:song_id/lyrics/sync (uploader only; replaces all lines)
pub async fn sync_lyrics(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(song_id): Path<String>,
    Json(request): Json<SyncLyricsRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedRun>)> {
    let song_id = parse_song_id(&song_id)?;

    if let Some(duration) = request.duration_seconds {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(ApiError::BadRequest(
                "duration_seconds must be a positive number".into(),
            ));
        }
    }
    if let Some(beats) = &request.beat_times {
        if beats.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(ApiError::BadRequest(
                "beat_times must be non-negative numbers".into(),
            ));
        }
    }

    let song = db::songs::require_song(&state.db, song_id).await?;
    if !song.is_owned_by(&actor) {
        return Err(Error::Authorization(format!(
            "lyrics of song {} can only be re-synced by its uploader",
            song_id
        ))
        .into());
    }
    if !db::lyrics::lyrics_exist(&state.db, song_id).await? {
        return Err(Error::not_found("lyrics", song_id).into());
    }

    publish(
        &state,
        EnrichmentEvent::SyncLyrics {
            song_id,
            run_id: new_run_id(),
            duration_seconds: request.duration_seconds,
            beat_times: request.beat_times,
        },
    )
}

/// POST /songs/:song_id/embeddings
pub async fn generate_embeddings(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> ApiResult<(StatusCode, Json<AcceptedRun>)> {
    let song_id = parse_song_id(&song_id)?;
    db::songs::require_song(&state.db, song_id).await?;

    publish(
        &state,
        EnrichmentEvent::GenerateEmbeddings {
            song_id,
            run_id: new_run_id(),
        },
    )
}

/// GET /songs/:song_id/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(song_id): Path<String>,
) -> ApiResult<Json<Vec<ProcessingJob>>> {
    let song_id = parse_song_id(&song_id)?;
    db::songs::require_song(&state.db, song_id).await?;
    let jobs = state.orchestrator.ledger().jobs_for_song(song_id).await?;
    Ok(Json(jobs))
}

/// Build lyrics and enrichment routes
pub fn lyrics_routes() -> Router<AppState> {
    Router::new()
        .route("/songs/:song_id/lyrics", get(get_lyrics))
        .route("/songs/:song_id/lyrics/generate", post(generate_lyrics))
        .route("/songs/:song_id/lyrics/sync", post(sync_lyrics))
        .route("/songs/:song_id/embeddings", post(generate_embeddings))
        .route("/songs/:song_id/jobs", get(list_jobs))
}
