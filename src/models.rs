//! Domain and wire types for jobs, phases, and status snapshots.
//!
//! Wire structs serialize with camelCase field names — the shapes the
//! dashboard consumes (`jobId`, `currentPhase`, `overallProgress`, ...).
//! The two status payload shapes are a tagged enum with an explicit
//! `version` marker; the legacy flat shape is always derived from the
//! canonical per-phase one, never stored.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::PhaseId;

// ── Status enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Terminal jobs are immutable: no write may touch them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Resolved items never transition again.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid file status: {}", s)),
        }
    }
}

// ── Analysis config ───────────────────────────────────────────────────

/// Per-job analysis configuration supplied by the setup flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Primary language/framework of the repository.
    pub language: String,
    /// Git ref to analyze. Defaults to the repository's default branch.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

impl AnalysisConfig {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            git_ref: None,
        }
    }
}

// ── Phase and file state ──────────────────────────────────────────────

/// Aggregate state of one phase of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    pub status: JobStatus,
    pub total_items: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub pending_count: u32,
    /// Percentage of items resolved (completed or failed). Failed items
    /// count as resolved so partial failure cannot wedge a phase below
    /// 100%. A phase with no eligible items reads 100 once it completes.
    pub progress: u8,
}

impl PhaseState {
    pub fn from_counts(
        status: JobStatus,
        total_items: u32,
        completed_count: u32,
        failed_count: u32,
        pending_count: u32,
    ) -> Self {
        let progress = if total_items == 0 {
            if status == JobStatus::Completed { 100 } else { 0 }
        } else {
            let resolved = completed_count + failed_count;
            ((resolved as f64 / total_items as f64) * 100.0).round() as u8
        };
        Self {
            status,
            total_items,
            completed_count,
            failed_count,
            pending_count,
            progress,
        }
    }

    pub fn empty(status: JobStatus) -> Self {
        Self::from_counts(status, 0, 0, 0, 0)
    }
}

/// Per-file status within one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItemStatus {
    pub file_path: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

// ── Job snapshot (canonical status shape) ─────────────────────────────

/// Point-in-time aggregate of a job: the canonical status shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    pub repository_key: String,
    pub status: JobStatus,
    /// `None` once the pipeline has run to completion.
    pub current_phase: Option<PhaseId>,
    pub overall_progress: u8,
    pub phases: BTreeMap<PhaseId, PhaseState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flat counters summed across every phase of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub total_files: u32,
    pub completed: u32,
    pub failed: u32,
    pub pending: u32,
}

impl JobSnapshot {
    /// The well-defined "not started" snapshot: querying status before any
    /// job exists is not an error.
    pub fn not_started(repository_key: &str) -> Self {
        let phases = PhaseId::ORDER
            .iter()
            .map(|p| (*p, PhaseState::empty(JobStatus::Pending)))
            .collect();
        Self {
            job_id: None,
            repository_key: repository_key.to_string(),
            status: JobStatus::Pending,
            current_phase: Some(PhaseId::Documentation),
            overall_progress: 0,
            phases,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Unweighted mean of the five phases' progress, rounded.
    pub fn compute_overall_progress(phases: &BTreeMap<PhaseId, PhaseState>) -> u8 {
        let sum: u32 = PhaseId::ORDER
            .iter()
            .map(|p| phases.get(p).map(|s| s.progress as u32).unwrap_or(0))
            .sum();
        (sum as f64 / PhaseId::ORDER.len() as f64).round() as u8
    }

    /// Flat counters for the legacy shape and for completion detection.
    /// `total_files` is the repository's file count (the documentation
    /// phase processes every file); the rest sum across all phases.
    pub fn totals(&self) -> Totals {
        let total_files = self
            .phases
            .get(&PhaseId::Documentation)
            .map(|s| s.total_items)
            .unwrap_or(0);
        let (mut completed, mut failed, mut pending) = (0u32, 0u32, 0u32);
        for state in self.phases.values() {
            completed += state.completed_count;
            failed += state.failed_count;
            pending += state.pending_count;
        }
        Totals {
            total_files,
            completed,
            failed,
            pending,
        }
    }
}

// ── Status payloads ───────────────────────────────────────────────────

/// The legacy flat aggregate, derived from the canonical snapshot on
/// every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStatus {
    pub progress: u8,
    pub total_files: u32,
    pub completed: u32,
    pub failed: u32,
    pub pending: u32,
    #[serde(default)]
    pub detailed_status: Vec<FileItemStatus>,
}

impl LegacyStatus {
    pub fn from_snapshot(snapshot: &JobSnapshot, detailed_status: Vec<FileItemStatus>) -> Self {
        let totals = snapshot.totals();
        Self {
            progress: snapshot.overall_progress,
            total_files: totals.total_files,
            completed: totals.completed,
            failed: totals.failed,
            pending: totals.pending,
            detailed_status,
        }
    }
}

/// Discriminated status payload. The `version` tag replaces the old
/// practice of sniffing which fields happen to be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "version")]
pub enum StatusPayload {
    #[serde(rename = "v2")]
    Canonical(JobSnapshot),
    #[serde(rename = "v1")]
    Legacy(LegacyStatus),
}

// ── Start response ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseBrief {
    pub id: PhaseId,
    pub name: String,
    pub status: JobStatus,
}

/// Response to a start request. Idempotent: starting an already-running
/// repository returns the existing job's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub job_id: i64,
    pub current_phase: PhaseId,
    pub phases: Vec<PhaseBrief>,
}

impl StartResponse {
    pub fn new(job_id: i64, current_phase: PhaseId) -> Self {
        let phases = PhaseId::ORDER
            .iter()
            .map(|p| PhaseBrief {
                id: *p,
                name: p.display_name().to_string(),
                status: match p.cmp(&current_phase) {
                    std::cmp::Ordering::Less => JobStatus::Completed,
                    std::cmp::Ordering::Equal => JobStatus::Processing,
                    std::cmp::Ordering::Greater => JobStatus::Pending,
                },
            })
            .collect();
        Self {
            job_id,
            current_phase,
            phases,
        }
    }
}

// ── Client snapshot (tracker-side, persisted) ─────────────────────────

/// One observed repository's tracked state, persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    // Legacy flat fields kept for backward-compatible consumers.
    pub progress: u8,
    pub total_files: u32,
    pub completed: u32,
    pub failed: u32,
    pub pending: u32,
    // Canonical fields, present once a comprehensive status was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phases: Option<BTreeMap<PhaseId, PhaseState>>,
    pub is_polling: bool,
    pub last_updated: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ClientSnapshot {
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            progress: 0,
            total_files: 0,
            completed: 0,
            failed: 0,
            pending: 0,
            overall_progress: None,
            phases: None,
            is_polling: true,
            last_updated: now,
            started_at: now,
            completed_at: None,
        }
    }

    /// Merge a freshly fetched server snapshot into the tracked state.
    pub fn merge(&mut self, snapshot: &JobSnapshot, now: DateTime<Utc>) {
        let totals = snapshot.totals();
        self.progress = snapshot.overall_progress;
        self.total_files = totals.total_files;
        self.completed = totals.completed;
        self.failed = totals.failed;
        self.pending = totals.pending;
        self.overall_progress = Some(snapshot.overall_progress);
        self.phases = Some(snapshot.phases.clone());
        self.last_updated = now;
    }

    /// Completion check. Both conditions are needed: rounding can hold the
    /// mean below 100 while every item is already resolved, and vice versa.
    pub fn is_complete(&self) -> bool {
        self.progress >= 100 || (self.total_files > 0 && self.pending == 0)
    }

    /// Freeze the snapshot at completion. Called exactly once per job.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.progress = 100;
        self.pending = 0;
        self.is_polling = false;
        self.completed_at = Some(now);
        self.last_updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases_with(doc: PhaseState, rest: PhaseState) -> BTreeMap<PhaseId, PhaseState> {
        let mut map = BTreeMap::new();
        map.insert(PhaseId::Documentation, doc);
        for p in &PhaseId::ORDER[1..] {
            map.insert(*p, rest.clone());
        }
        map
    }

    #[test]
    fn test_job_status_roundtrip() {
        for s in &["pending", "processing", "completed", "error"] {
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!("invalid".parse::<JobStatus>().is_err());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_file_status_roundtrip() {
        for s in &["pending", "processing", "completed", "failed"] {
            let parsed: FileStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), *s);
        }
        assert!(FileStatus::Failed.is_resolved());
        assert!(!FileStatus::Processing.is_resolved());
    }

    #[test]
    fn test_phase_progress_counts_failed_as_resolved() {
        let state = PhaseState::from_counts(JobStatus::Completed, 10, 9, 1, 0);
        assert_eq!(state.progress, 100);
    }

    #[test]
    fn test_phase_progress_empty_set() {
        // An unstarted empty phase reads 0; a completed empty phase 100.
        assert_eq!(PhaseState::empty(JobStatus::Pending).progress, 0);
        assert_eq!(
            PhaseState::from_counts(JobStatus::Completed, 0, 0, 0, 0).progress,
            100
        );
    }

    #[test]
    fn test_overall_progress_is_unweighted_mean() {
        let phases = phases_with(
            PhaseState::from_counts(JobStatus::Completed, 10, 10, 0, 0),
            PhaseState::from_counts(JobStatus::Pending, 10, 0, 0, 10),
        );
        assert_eq!(JobSnapshot::compute_overall_progress(&phases), 20);
    }

    #[test]
    fn test_not_started_snapshot_is_well_defined() {
        let snap = JobSnapshot::not_started("acme/widgets");
        assert_eq!(snap.job_id, None);
        assert_eq!(snap.status, JobStatus::Pending);
        assert_eq!(snap.overall_progress, 0);
        assert_eq!(snap.phases.len(), 5);
        let totals = snap.totals();
        assert_eq!(totals.total_files, 0);
        assert_eq!(totals.pending, 0);
    }

    #[test]
    fn test_totals_sum_across_phases() {
        let mut snap = JobSnapshot::not_started("acme/widgets");
        snap.phases = phases_with(
            PhaseState::from_counts(JobStatus::Processing, 10, 4, 1, 5),
            PhaseState::from_counts(JobStatus::Pending, 10, 0, 0, 10),
        );
        let totals = snap.totals();
        assert_eq!(totals.total_files, 10);
        assert_eq!(totals.completed, 4);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.pending, 45);
    }

    #[test]
    fn test_status_payload_version_tag() {
        let canonical = StatusPayload::Canonical(JobSnapshot::not_started("a/b"));
        let json = serde_json::to_value(&canonical).unwrap();
        assert_eq!(json["version"], "v2");
        assert_eq!(json["repositoryKey"], "a/b");

        let legacy = StatusPayload::Legacy(LegacyStatus {
            progress: 40,
            total_files: 10,
            completed: 4,
            failed: 0,
            pending: 6,
            detailed_status: vec![],
        });
        let json = serde_json::to_value(&legacy).unwrap();
        assert_eq!(json["version"], "v1");
        assert_eq!(json["totalFiles"], 10);

        // Roundtrip through the tag, no sniffing.
        let parsed: StatusPayload = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed, StatusPayload::Legacy(l) if l.progress == 40));
    }

    #[test]
    fn test_legacy_is_derived_from_canonical() {
        let mut snap = JobSnapshot::not_started("a/b");
        snap.phases = phases_with(
            PhaseState::from_counts(JobStatus::Completed, 10, 10, 0, 0),
            PhaseState::from_counts(JobStatus::Pending, 10, 0, 0, 10),
        );
        snap.overall_progress = JobSnapshot::compute_overall_progress(&snap.phases);
        let legacy = LegacyStatus::from_snapshot(&snap, vec![]);
        assert_eq!(legacy.progress, 20);
        assert_eq!(legacy.total_files, 10);
        assert_eq!(legacy.completed, 10);
        assert_eq!(legacy.pending, 40);
    }

    #[test]
    fn test_start_response_marks_current_phase_processing() {
        let resp = StartResponse::new(7, PhaseId::Documentation);
        assert_eq!(resp.job_id, 7);
        assert_eq!(resp.phases.len(), 5);
        assert_eq!(resp.phases[0].status, JobStatus::Processing);
        assert_eq!(resp.phases[1].status, JobStatus::Pending);
        assert_eq!(resp.phases[0].name, "Documentation Analysis");
    }

    #[test]
    fn test_client_snapshot_completion_conditions() {
        let now = Utc::now();
        let mut snap = ClientSnapshot::started(now);
        assert!(!snap.is_complete());

        // Rounding may hold progress at 99 while nothing is pending.
        snap.progress = 99;
        snap.total_files = 10;
        snap.pending = 0;
        assert!(snap.is_complete());

        let mut snap = ClientSnapshot::started(now);
        snap.progress = 100;
        assert!(snap.is_complete());
    }

    #[test]
    fn test_client_snapshot_mark_completed_freezes() {
        let now = Utc::now();
        let mut snap = ClientSnapshot::started(now);
        snap.pending = 3;
        snap.mark_completed(now);
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.pending, 0);
        assert!(!snap.is_polling);
        assert!(snap.completed_at.is_some());
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let snap = JobSnapshot::not_started("a/b");
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("repositoryKey").is_some());
        assert!(json.get("overallProgress").is_some());
        assert!(json.get("currentPhase").is_some());

        let item = FileItemStatus {
            file_path: "src/a.py".into(),
            status: FileStatus::Completed,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: Some(120),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("filePath").is_some());
        assert!(json.get("durationMs").is_some());
    }

    #[test]
    fn test_analysis_config_ref_field_name() {
        let cfg: AnalysisConfig =
            serde_json::from_str(r#"{"language":"python","ref":"main"}"#).unwrap();
        assert_eq!(cfg.language, "python");
        assert_eq!(cfg.git_ref.as_deref(), Some("main"));
    }
}
