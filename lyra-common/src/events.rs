//! Enrichment events and the in-process EventBus
//!
//! Delivery is treated as at-least-once: every subscriber must tolerate seeing
//! the same `run_id` more than once.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events that trigger background enrichment runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EnrichmentEvent {
    /// Transcribe the song audio into lyrics (skipped when lyrics already exist)
    GenerateLyrics { song_id: Uuid, run_id: String },

    /// Re-time the existing lyrics, optionally snapping to beat times
    SyncLyrics {
        song_id: Uuid,
        run_id: String,
        #[serde(default)]
        duration_seconds: Option<f64>,
        #[serde(default)]
        beat_times: Option<Vec<f64>>,
    },

    /// Compute title (and lyrics) embeddings for search
    GenerateEmbeddings { song_id: Uuid, run_id: String },
}

impl EnrichmentEvent {
    /// Stable event name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            EnrichmentEvent::GenerateLyrics { .. } => "song/generate-lyrics",
            EnrichmentEvent::SyncLyrics { .. } => "song/sync-lyrics",
            EnrichmentEvent::GenerateEmbeddings { .. } => "song/generate-embeddings",
        }
    }

    pub fn song_id(&self) -> Uuid {
        match self {
            EnrichmentEvent::GenerateLyrics { song_id, .. }
            | EnrichmentEvent::SyncLyrics { song_id, .. }
            | EnrichmentEvent::GenerateEmbeddings { song_id, .. } => *song_id,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            EnrichmentEvent::GenerateLyrics { run_id, .. }
            | EnrichmentEvent::SyncLyrics { run_id, .. }
            | EnrichmentEvent::GenerateEmbeddings { run_id, .. } => run_id,
        }
    }
}

/// Generate a fresh run identifier
pub fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Broadcast bus carrying [`EnrichmentEvent`]s to the event worker
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EnrichmentEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Lagging receivers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EnrichmentEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EnrichmentEvent,
    ) -> Result<usize, broadcast::error::SendError<EnrichmentEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, logging instead of failing when nobody listens
    pub fn emit_lossy(&self, event: EnrichmentEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            tracing::warn!(event = name, "No subscribers for enrichment event");
        }
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
