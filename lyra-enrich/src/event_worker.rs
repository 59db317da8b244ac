//! Background consumer of enrichment events
//!
//! Subscribes to the [`EventBus`] and dispatches each event to the
//! [`TranscriptionOrchestrator`] on its own task.
//!
//! **Behavior:**
//! - At most `max_concurrent_runs` runs are in flight (semaphore permits);
//!   the receiver keeps draining while runs wait for a permit
//! - Every run gets a child of the shutdown token, so shutdown cancels
//!   in-flight provider calls
//! - Failures are already recorded in the job ledger; here they are only logged
//! - Lagged receivers log the number of dropped events and keep going
//! - Stops when the bus closes or the shutdown token fires, then waits for
//!   in-flight runs to wind down

use lyra_common::events::EnrichmentEvent;
use lyra_common::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::TranscriptionOrchestrator;

pub struct EventWorker {
    orchestrator: Arc<TranscriptionOrchestrator>,
    permits: Arc<Semaphore>,
}

impl EventWorker {
    pub fn new(orchestrator: Arc<TranscriptionOrchestrator>, max_concurrent_runs: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
        }
    }

    /// Run the worker on a background task
    pub fn spawn(
        self,
        rx: broadcast::Receiver<EnrichmentEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(rx, shutdown))
    }

    pub async fn run(
        self,
        mut rx: broadcast::Receiver<EnrichmentEvent>,
        shutdown: CancellationToken,
    ) {
        info!(
            max_concurrent_runs = self.permits.available_permits(),
            "Event worker started"
        );
        let mut runs = JoinSet::new();

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Event worker: shutdown requested");
                    break;
                }
                received = rx.recv() => received,
            };

            match received {
                Ok(event) => {
                    // The receive loop never waits on a permit; a saturated
                    // worker queues runs here instead of lagging the bus
                    let permits = self.permits.clone();
                    let orchestrator = self.orchestrator.clone();
                    let cancel = shutdown.child_token();
                    runs.spawn(async move {
                        // Queued runs still dispatch once cancelled, so the
                        // ledger records them as failed
                        let _permit = tokio::select! {
                            _ = cancel.cancelled() => None,
                            permit = permits.acquire_owned() => permit.ok(),
                        };
                        let name = event.name();
                        let song_id = event.song_id();
                        if let Err(e) = dispatch(&orchestrator, event, &cancel).await {
                            warn!(event = name, song_id = %song_id, error = %e, "Enrichment event failed");
                        }
                    });

                    // Reap finished runs so the set doesn't grow unbounded
                    while runs.try_join_next().is_some() {}
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped,
                        "Event worker lagged, enrichment events dropped (increase worker.event_capacity)"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event worker: event bus closed");
                    break;
                }
            }
        }

        let in_flight = runs.len();
        if in_flight > 0 {
            info!(in_flight, "Event worker waiting for in-flight runs");
        }
        while runs.join_next().await.is_some() {}

        info!("Event worker stopped");
    }
}

/// Route one event to the matching orchestrator operation
pub async fn dispatch(
    orchestrator: &TranscriptionOrchestrator,
    event: EnrichmentEvent,
    cancel: &CancellationToken,
) -> Result<()> {
    debug!(event = event.name(), song_id = %event.song_id(), run_id = event.run_id(), "Dispatching event");

    match event {
        EnrichmentEvent::GenerateLyrics { song_id, run_id } => {
            orchestrator.generate_lyrics(song_id, &run_id, cancel).await?;
        }
        EnrichmentEvent::SyncLyrics {
            song_id,
            run_id,
            duration_seconds,
            beat_times,
        } => {
            orchestrator
                .sync_lyrics(song_id, &run_id, duration_seconds, beat_times.as_deref(), cancel)
                .await?;
        }
        EnrichmentEvent::GenerateEmbeddings { song_id, run_id } => {
            orchestrator
                .generate_embeddings(song_id, &run_id, cancel)
                .await?;
        }
    }
    Ok(())
}
