//! Background processing job records
//!
//! One row per (song_id, kind, run_id). Different run ids for the same song and
//! kind are independent history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Enrichment stage tracked by a job row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    GenerateLyrics,
    SyncLyrics,
    GenerateEmbeddings,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::GenerateLyrics => "GENERATE_LYRICS",
            JobKind::SyncLyrics => "SYNC_LYRICS",
            JobKind::GenerateEmbeddings => "GENERATE_EMBEDDINGS",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = lyra_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GENERATE_LYRICS" => Ok(JobKind::GenerateLyrics),
            "SYNC_LYRICS" => Ok(JobKind::SyncLyrics),
            "GENERATE_EMBEDDINGS" => Ok(JobKind::GenerateEmbeddings),
            other => Err(lyra_common::Error::validation(
                "kind",
                format!("unknown job kind '{}'", other),
            )),
        }
    }
}

/// Job status; COMPLETED and FAILED are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = lyra_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(lyra_common::Error::validation(
                "status",
                format!("unknown job status '{}'", other),
            )),
        }
    }
}

/// Ledger row for one enrichment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub song_id: Uuid,
    pub kind: JobKind,
    /// Idempotency key of the triggering event
    pub run_id: String,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Set on the first PROCESSING transition, never overwritten
    pub started_at: Option<DateTime<Utc>>,
    /// Set when entering a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
