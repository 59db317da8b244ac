//! HTTP Server & Routing Integration Tests
//!
//! Drives the full router with `tower::ServiceExt::oneshot`; providers are
//! fakes, storage is the real local backend under a temp dir.

mod helpers;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use helpers::*;
use http_body_util::BodyExt;
use lyra_enrich::api::USER_HEADER;
use lyra_enrich::{build_router, db, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

async fn test_app() -> (TempDir, AppState, Router) {
    let (temp_dir, pool) = create_test_db().await;
    let state = test_app_state(
        &temp_dir,
        pool,
        Arc::new(ScriptedTranscriber::new(Vec::new())),
        Arc::new(FakeEmbedder::constant(vec![1.0, 0.0])),
    )
    .await;
    let app = build_router(state.clone());
    (temp_dir, state, app)
}

fn request(method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

/// Grant, upload and commit a song through the HTTP surface
async fn upload_song(app: &Router, user: &str, title: &str, lyrics: Option<&str>) -> Value {
    let (status, prepared) = send(
        app,
        request(
            Method::POST,
            "/songs/uploads",
            Some(user),
            Some(json!({ "audio": { "filename": "track.mp3", "content_type": "audio/mpeg" } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "prepare failed: {}", prepared);

    let upload_url = prepared["audio"]["upload_url"].as_str().unwrap();
    let path = upload_url.trim_start_matches("http://localhost:5780");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(path)
                .body(Body::from(vec![1u8, 2, 3, 4]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let (status, song) = send(
        app,
        request(
            Method::POST,
            "/songs",
            Some(user),
            Some(json!({
                "title": title,
                "artist": "Test Artist",
                "audio_key": prepared["audio"]["key"],
                "lyrics": lyrics,
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "commit failed: {}", song);
    song
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (_dir, _state, app) = test_app().await;

    let (status, body) = send(&app, request(Method::GET, "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "lyra-enrich");
}

#[tokio::test]
async fn test_missing_identity_is_unauthenticated() {
    let (_dir, _state, app) = test_app().await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/songs/uploads",
            None,
            Some(json!({ "audio": { "filename": "a.mp3", "content_type": "audio/mpeg" } })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_upload_commit_and_read_back() {
    let (_dir, state, app) = test_app().await;
    let mut rx = state.event_bus.subscribe();

    let song = upload_song(&app, "user-1", "Unravel", None).await;
    let song_id = song["id"].as_str().unwrap().to_string();
    assert_eq!(song["uploader_id"], "user-1");

    // Commit requests embeddings and lyrics generation
    let mut names = vec![rx.try_recv().unwrap().name(), rx.try_recv().unwrap().name()];
    names.sort();
    assert_eq!(names, vec!["song/generate-embeddings", "song/generate-lyrics"]);

    let (status, detail) = send(
        &app,
        request(Method::GET, &format!("/songs/{}", song_id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], "Unravel");
    assert!(detail["lyrics"].is_null());

    // The stored artifact is served back under its public URL
    let audio_path = detail["audio_url"]
        .as_str()
        .unwrap()
        .trim_start_matches("http://localhost:5780")
        .to_string();
    let response = app
        .clone()
        .oneshot(Request::builder().uri(audio_path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), &[1u8, 2, 3, 4]);
}

#[tokio::test]
async fn test_upload_with_bad_signature_is_forbidden() {
    let (_dir, _state, app) = test_app().await;

    let expires = chrono::Utc::now().timestamp() + 600;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri(format!(
                    "/media/upload/uploads/user-1/1-x.mp3?expires={}&signature=deadbeef",
                    expires
                ))
                .body(Body::from(vec![0u8; 8]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_commit_without_uploaded_audio_is_rejected() {
    let (_dir, _state, app) = test_app().await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            "/songs",
            Some("user-1"),
            Some(json!({
                "title": "Ghost",
                "artist": "Nobody",
                "audio_key": "uploads/user-1/1-ghost.mp3",
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_invalid_song_id_is_bad_request() {
    let (_dir, _state, app) = test_app().await;

    let (status, body) = send(&app, request(Method::GET, "/songs/not-a-uuid", None, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_delete_is_owner_only() {
    let (_dir, state, app) = test_app().await;
    let song = seed_song(&state.db, "Mine", "Owner", "user-1").await;
    let uri = format!("/songs/{}", song.id);

    let (status, body) = send(&app, request(Method::DELETE, &uri, Some("user-2"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = send(&app, request(Method::DELETE, &uri, Some("user-1"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request(Method::GET, &uri, None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_play_counter_increments() {
    let (_dir, state, app) = test_app().await;
    let song = seed_song(&state.db, "Replay", "Someone", "user-1").await;
    let uri = format!("/songs/{}/play", song.id);

    send(&app, request(Method::POST, &uri, None, None)).await;
    let (status, body) = send(&app, request(Method::POST, &uri, None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["play_count"], 2);
}

#[tokio::test]
async fn test_generate_trigger_is_accepted_and_published() {
    let (_dir, state, app) = test_app().await;
    let song = seed_song(&state.db, "Trigger", "Someone", "user-1").await;
    let mut rx = state.event_bus.subscribe();

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/songs/{}/lyrics/generate", song.id),
            None,
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["event"], "song/generate-lyrics");
    let event = rx.try_recv().unwrap();
    assert_eq!(event.song_id(), song.id);
    assert_eq!(event.run_id(), body["run_id"].as_str().unwrap());
}

#[tokio::test]
async fn test_trigger_without_worker_is_server_error() {
    let (_dir, state, app) = test_app().await;
    let song = seed_song(&state.db, "Lonely", "Someone", "user-1").await;

    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &format!("/songs/{}/embeddings", song.id),
            None,
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn test_sync_trigger_validates_input_and_ownership() {
    let (_dir, state, app) = test_app().await;
    let song = seed_song(&state.db, "Timing", "Someone", "user-1").await;
    let uri = format!("/songs/{}/lyrics/sync", song.id);
    let _rx = state.event_bus.subscribe();

    let (status, _) = send(
        &app,
        request(
            Method::POST,
            &uri,
            Some("user-1"),
            Some(json!({ "duration_seconds": -3.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, request(Method::POST, &uri, Some("user-2"), Some(json!({})))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Owner, but nothing to sync yet
    let (status, _) = send(&app, request(Method::POST, &uri, Some("user-1"), Some(json!({})))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    {
        let mut conn = state.db.acquire().await.unwrap();
        db::lyrics::insert_manual_lyrics(&mut conn, song.id, "tick\ntock")
            .await
            .unwrap();
    }
    let (status, body) = send(
        &app,
        request(
            Method::POST,
            &uri,
            Some("user-1"),
            Some(json!({ "duration_seconds": 60.0, "beat_times": [0.0, 30.5] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["event"], "song/sync-lyrics");
}

#[tokio::test]
async fn test_lyrics_and_jobs_endpoints() {
    let (_dir, state, app) = test_app().await;
    let song = seed_song(&state.db, "Words", "Someone", "user-1").await;

    let (status, _) = send(
        &app,
        request(Method::GET, &format!("/songs/{}/lyrics", song.id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state
        .orchestrator
        .ledger()
        .record_transition(
            song.id,
            lyra_enrich::models::JobKind::GenerateLyrics,
            "run-1",
            lyra_enrich::models::JobStatus::Processing,
            None,
        )
        .await
        .unwrap();

    let (status, jobs) = send(
        &app,
        request(Method::GET, &format!("/songs/{}/jobs", song.id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 1);
    assert_eq!(jobs[0]["status"], "PROCESSING");
    assert_eq!(jobs[0]["kind"], "GENERATE_LYRICS");
}

#[tokio::test]
async fn test_search_endpoint() {
    let (_dir, state, app) = test_app().await;
    seed_song(&state.db, "Searchable Tune", "Someone", "user-1").await;

    let (status, body) = send(&app, request(Method::GET, "/search?q=", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        request(Method::GET, "/search?q=searchable&limit=5", None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "searchable");
    assert_eq!(body["results"][0]["title"], "Searchable Tune");
    assert_eq!(body["results"][0]["matched_by"], "lexical");
}
