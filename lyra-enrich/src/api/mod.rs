//! HTTP API handlers for lyra-enrich
//!
//! Thin routing glue: handlers check request shape, resolve the caller from
//! the trusted [`USER_HEADER`] set by the upstream gateway, and forward to
//! the core components.

pub mod health;
pub mod lyrics;
pub mod media;
pub mod search;
pub mod songs;

pub use health::health_routes;
pub use lyrics::lyrics_routes;
pub use media::media_routes;
pub use search::search_routes;
pub use songs::song_routes;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::ApiError;

/// Header carrying the authenticated user id
pub const USER_HEADER: &str = "x-lyra-user";

/// Authenticated caller identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", USER_HEADER)))?;

        Ok(Actor(value.to_string()))
    }
}
