//! Enrichment components and their external collaborators
//!
//! Core components:
//! - [`JobLedger`] - idempotent status record per (song, kind, run)
//! - [`TimestampSynchronizer`] - lyric text + duration (+ beats) → timed lines
//! - [`TranscriptionOrchestrator`] - fetch → transcribe → persist → embed
//! - [`HybridSearchRanker`] - merges lexical and vector search results
//! - [`UploadSaga`] - write grants, commit with compensation, owner-only delete
//!
//! Collaborators implement the traits in [`providers`].

pub mod audio_fetcher;
pub mod hybrid_search;
pub mod job_ledger;
pub mod local_storage;
pub mod openai_client;
pub mod providers;
pub mod timestamp_sync;
pub mod transcription_orchestrator;
pub mod upload_saga;
pub mod vector_index;

pub use audio_fetcher::HttpAudioFetcher;
pub use hybrid_search::{HybridSearchRanker, MatchSource, RankedSong, SearchSettings};
pub use job_ledger::JobLedger;
pub use local_storage::LocalObjectStorage;
pub use openai_client::OpenAiClient;
pub use providers::{
    AudioFetcher, Embedder, LineTimingEstimator, ObjectStorage, Transcriber, Transcript,
    VectorIndex, VectorKind, VectorMatch, VectorMetadata, WriteGrant,
};
pub use timestamp_sync::{improve_timestamps, TimestampSynchronizer, DEFAULT_DURATION_SECONDS};
pub use transcription_orchestrator::{
    EmbeddingOutcome, GenerateOutcome, PipelinePhase, PipelineProviders, SyncOutcome,
    TranscriptionOrchestrator,
};
pub use upload_saga::{
    ArtifactDescriptor, CommitRequest, Compensation, PreparedUpload, SagaSettings, UploadSaga,
};
pub use vector_index::InMemoryVectorIndex;
