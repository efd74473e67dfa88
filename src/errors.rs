//! Typed error hierarchy for the repoinsight pipeline.
//!
//! Three top-level enums cover the three subsystems:
//! - `OrchestratorError` — job creation and pipeline sequencing failures
//! - `WorkerError` — phase worker harness failures
//! - `TrackerError` — client-side polling and persistence failures

use thiserror::Error;

use crate::phase::PhaseId;

/// Errors from the job orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid repository key '{key}': expected owner/repo")]
    InvalidRepositoryKey { key: String },

    #[error("No job found for repository {key}")]
    JobNotFound { key: String },

    #[error("Failed to list files for {key}: {source}")]
    ListingFailed {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Repository {key} has no files to analyze")]
    NoFilesFound { key: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single phase worker run.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Every eligible item in the phase failed. Treated as a fatal phase
    /// error: something systemic (credentials, downstream outage) is wrong.
    #[error("Phase {phase} failed for all {failed} items")]
    AllItemsFailed { phase: PhaseId, failed: u32 },

    #[error("Phase {phase} store access failed: {source}")]
    Store {
        phase: PhaseId,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors from the status tracker (poller manager, client, storage).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The server has no data for this repository yet. Transient by
    /// definition: polling continues unchanged.
    #[error("Repository not ingested yet")]
    NotReadyYet,

    #[error("Status endpoint returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected status payload shape")]
    UnexpectedPayload,

    #[error("Snapshot storage error: {0}")]
    Storage(#[source] std::io::Error),

    #[error("A start request is already in flight")]
    SubmitInFlight,

    #[error("Invalid analysis config: {0}")]
    InvalidConfig(String),
}

impl TrackerError {
    /// Whether polling should continue without touching local state.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, TrackerError::NotReadyYet)
    }
}
