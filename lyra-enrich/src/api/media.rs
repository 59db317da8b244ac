//! Local object storage endpoints
//!
//! - `PUT /media/upload/*key?expires=..&signature=..` - upload through a write grant
//! - `GET /media/files/*key` - public reads (static files)

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::put,
    Router,
};
use serde::Deserialize;
use tower_http::services::ServeDir;

use crate::{ApiError, ApiResult, AppState};

/// Largest accepted artifact
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct GrantParams {
    pub expires: i64,
    pub signature: String,
}

/// PUT /media/upload/*key
pub async fn upload_artifact(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(grant): Query<GrantParams>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let key = key.trim_start_matches('/');
    state
        .storage
        .verify_grant(key, grant.expires, &grant.signature)?;

    if body.is_empty() {
        return Err(ApiError::BadRequest("upload body is empty".into()));
    }

    state.storage.write(key, &body).await?;
    tracing::info!(key, bytes = body.len(), "Artifact uploaded");
    Ok(StatusCode::CREATED)
}

/// Build media routes serving files from `media_root`
pub fn media_routes(media_root: &std::path::Path) -> Router<AppState> {
    Router::new()
        .route(
            "/media/upload/*key",
            put(upload_artifact).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .nest_service("/media/files", ServeDir::new(media_root))
}
