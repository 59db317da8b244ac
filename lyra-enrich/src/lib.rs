//! lyra-enrich library interface
//!
//! Media-enrichment service: AI lyrics, timed captions, embeddings and hybrid
//! search over an uploaded song catalog. The binary in `main.rs` only parses
//! arguments, initializes logging and serves [`build_router`].

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod event_worker;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use lyra_common::config::TomlConfig;
use lyra_common::events::EventBus;
use lyra_common::Result;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ProviderSet;
use crate::services::{
    AudioFetcher, HttpAudioFetcher, HybridSearchRanker, InMemoryVectorIndex, JobLedger,
    LocalObjectStorage, PipelineProviders, SagaSettings, SearchSettings, TimestampSynchronizer,
    TranscriptionOrchestrator, UploadSaga, VectorIndex,
};
use crate::utils::RetryPolicy;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub orchestrator: Arc<TranscriptionOrchestrator>,
    pub search: Arc<HybridSearchRanker>,
    pub saga: Arc<UploadSaga>,
    pub storage: Arc<LocalObjectStorage>,
    /// Root token; cancelled on shutdown
    pub shutdown: CancellationToken,
    pub startup_time: DateTime<Utc>,
}

/// Externally supplied collaborators (real clients in `main`, fakes in tests)
#[derive(Clone)]
pub struct Collaborators {
    pub providers: ProviderSet,
    pub fetcher: Arc<dyn AudioFetcher>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub storage: Arc<LocalObjectStorage>,
}

impl Collaborators {
    /// Production collaborators for `root_folder`
    pub async fn from_config(
        db: &SqlitePool,
        toml: &TomlConfig,
        root_folder: &Path,
    ) -> Result<Self> {
        let providers = config::build_providers(toml)?;
        let fetcher = Arc::new(HttpAudioFetcher::new(std::time::Duration::from_secs(
            toml.providers.request_timeout_secs,
        ))?);
        let vector_index = Arc::new(InMemoryVectorIndex::load_from_db(db).await?);
        let storage = Arc::new(LocalObjectStorage::new(
            config::media_root(root_folder),
            &toml.storage.public_base_url,
            config::resolve_signing_secret(toml),
        ));

        Ok(Self {
            providers,
            fetcher,
            vector_index,
            storage,
        })
    }
}

impl AppState {
    /// Assemble the core components around a database pool
    pub fn assemble(
        db: SqlitePool,
        toml: &TomlConfig,
        collaborators: Collaborators,
        shutdown: CancellationToken,
    ) -> Self {
        let event_bus = EventBus::new(toml.worker.event_capacity.max(1));

        let synchronizer = Arc::new(TimestampSynchronizer::new(
            collaborators.providers.estimator.clone(),
            toml.pipeline.default_duration_seconds,
        ));

        let orchestrator = Arc::new(TranscriptionOrchestrator::new(
            db.clone(),
            JobLedger::new(db.clone()),
            PipelineProviders {
                fetcher: collaborators.fetcher.clone(),
                transcriber: collaborators.providers.transcriber.clone(),
                embedder: collaborators.providers.embedder.clone(),
                vector_index: collaborators.vector_index.clone(),
            },
            synchronizer,
            RetryPolicy::from_config(&toml.pipeline),
        ));

        let search = Arc::new(HybridSearchRanker::new(
            db.clone(),
            collaborators.providers.embedder.clone(),
            collaborators.vector_index.clone(),
            SearchSettings::from_config(&toml.search),
        ));

        let saga = Arc::new(UploadSaga::new(
            db.clone(),
            collaborators.storage.clone(),
            collaborators.vector_index.clone(),
            event_bus.clone(),
            SagaSettings::from_config(&toml.storage),
        ));

        Self {
            db,
            event_bus,
            orchestrator,
            search,
            saga,
            storage: collaborators.storage,
            shutdown,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::song_routes())
        .merge(api::lyrics_routes())
        .merge(api::search_routes())
        .merge(api::media_routes(state.storage.root()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
