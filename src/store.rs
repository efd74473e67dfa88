//! SQLite-backed job store.
//!
//! The at-most-one-active-job invariant lives here as a partial unique
//! index on `jobs(repository_key)` over non-terminal rows, so it holds
//! across processes — an in-memory guard alone would stop working the
//! moment a second orchestrator instance appears. Forward-only file
//! transitions and terminal-job immutability are enforced in the WHERE
//! clause of every mutating statement.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{FileItemStatus, FileStatus, JobSnapshot, JobStatus, PhaseState};
use crate::phase::PhaseId;

/// Async-safe handle to the job store.
///
/// Wraps `JobStore` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, keeping synchronous SQLite
/// I/O off the async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<JobStore>>,
}

impl DbHandle {
    pub fn new(store: JobStore) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(store)),
        }
    }

    /// Run a closure with access to the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&JobStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|e| anyhow!("Store lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("Store task panicked")?
    }

}

/// One row of the `jobs` table.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub repository_key: String,
    pub status: JobStatus,
    /// `None` once the pipeline has run to completion.
    pub current_phase: Option<PhaseId>,
    pub language: String,
    pub git_ref: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Raw per-phase counters straight from the `file_items` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseCounts {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    /// Items still pending or in flight.
    pub unresolved: u32,
}

pub struct JobStore {
    conn: Connection,
}

impl JobStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    repository_key TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    current_phase TEXT DEFAULT 'documentation',
                    language TEXT NOT NULL DEFAULT '',
                    git_ref TEXT,
                    error TEXT,
                    started_at TEXT NOT NULL,
                    completed_at TEXT
                );

                -- Cross-process at-most-one-active-job guard.
                CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_key
                    ON jobs(repository_key)
                    WHERE status IN ('pending', 'processing');

                CREATE TABLE IF NOT EXISTS file_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                    phase TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    error TEXT,
                    started_at TEXT,
                    completed_at TEXT,
                    duration_ms INTEGER,
                    UNIQUE(job_id, phase, file_path)
                );

                CREATE INDEX IF NOT EXISTS idx_file_items_job_phase
                    ON file_items(job_id, phase);
                CREATE INDEX IF NOT EXISTS idx_jobs_key ON jobs(repository_key);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Job lifecycle ─────────────────────────────────────────────────

    /// Create a job for the key, or return the existing non-terminal one.
    /// Returns `(row, created)`. A unique-index violation means another
    /// writer won the race; the winner's row is returned.
    pub fn create_job(
        &self,
        repository_key: &str,
        language: &str,
        git_ref: Option<&str>,
    ) -> Result<(JobRow, bool)> {
        if let Some(row) = self.active_job(repository_key)? {
            return Ok((row, false));
        }

        let now = now_rfc3339();
        let insert = self.conn.execute(
            "INSERT INTO jobs (repository_key, status, current_phase, language, git_ref, started_at)
             VALUES (?1, 'pending', 'documentation', ?2, ?3, ?4)",
            params![repository_key, language, git_ref, now],
        );

        match insert {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                let row = self
                    .job_by_id(id)?
                    .ok_or_else(|| anyhow!("Job {} vanished after insert", id))?;
                Ok((row, true))
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let row = self
                    .active_job(repository_key)?
                    .ok_or_else(|| anyhow!("Lost create race but no active job exists"))?;
                Ok((row, false))
            }
            Err(e) => Err(e).context("Failed to insert job"),
        }
    }

    pub fn active_job(&self, repository_key: &str) -> Result<Option<JobRow>> {
        self.query_job(
            "SELECT id, repository_key, status, current_phase, language, git_ref, error,
                    started_at, completed_at
             FROM jobs
             WHERE repository_key = ?1 AND status IN ('pending', 'processing')",
            params![repository_key],
        )
    }

    /// Most recent job for the key, terminal or not.
    pub fn latest_job(&self, repository_key: &str) -> Result<Option<JobRow>> {
        self.query_job(
            "SELECT id, repository_key, status, current_phase, language, git_ref, error,
                    started_at, completed_at
             FROM jobs
             WHERE repository_key = ?1
             ORDER BY id DESC LIMIT 1",
            params![repository_key],
        )
    }

    pub fn job_by_id(&self, id: i64) -> Result<Option<JobRow>> {
        self.query_job(
            "SELECT id, repository_key, status, current_phase, language, git_ref, error,
                    started_at, completed_at
             FROM jobs WHERE id = ?1",
            params![id],
        )
    }

    /// Mark the job processing with the given current phase.
    /// No-op if the job is already terminal.
    pub fn begin_phase(&self, job_id: i64, phase: PhaseId) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = 'processing', current_phase = ?2
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![job_id, phase.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn complete_job(&self, job_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = 'completed', current_phase = NULL, completed_at = ?2
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![job_id, now_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn fail_job(&self, job_id: i64, error: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE jobs SET status = 'error', error = ?2, completed_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'processing')",
            params![job_id, error, now_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// Remove every job (and cascaded file rows) for the key.
    /// Callers must cancel any running pipeline first.
    pub fn clear_jobs(&self, repository_key: &str) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM jobs WHERE repository_key = ?1",
            params![repository_key],
        )?;
        Ok(deleted)
    }

    // ── File items ────────────────────────────────────────────────────

    /// Seed the eligible file set for one phase. Idempotent per
    /// `(job, phase, path)`; silently skipped for terminal jobs.
    pub fn seed_files(&self, job_id: i64, phase: PhaseId, paths: &[String]) -> Result<usize> {
        let mut inserted = 0;
        for path in paths {
            inserted += self.conn.execute(
                "INSERT OR IGNORE INTO file_items (job_id, phase, file_path, status)
                 SELECT ?1, ?2, ?3, 'pending'
                 WHERE EXISTS (
                     SELECT 1 FROM jobs WHERE id = ?1 AND status IN ('pending', 'processing')
                 )",
                params![job_id, phase.as_str(), path],
            )?;
        }
        Ok(inserted)
    }

    pub fn pending_files(&self, job_id: i64, phase: PhaseId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_path FROM file_items
             WHERE job_id = ?1 AND phase = ?2 AND status = 'pending'
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![job_id, phase.as_str()], |row| row.get(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    /// `pending → processing`. Returns false if the item already moved on
    /// or the job is terminal — transitions never go backward.
    pub fn mark_file_processing(&self, job_id: i64, phase: PhaseId, path: &str) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE file_items SET status = 'processing', started_at = ?4
             WHERE job_id = ?1 AND phase = ?2 AND file_path = ?3 AND status = 'pending'
               AND EXISTS (
                   SELECT 1 FROM jobs WHERE id = ?1 AND status IN ('pending', 'processing')
               )",
            params![job_id, phase.as_str(), path, now_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// `processing → completed | failed`. Duration is derived from the
    /// recorded start timestamp.
    pub fn mark_file_resolved(
        &self,
        job_id: i64,
        phase: PhaseId,
        path: &str,
        outcome: FileStatus,
        error: Option<&str>,
    ) -> Result<bool> {
        debug_assert!(outcome.is_resolved());
        let now = now_rfc3339();
        let changed = self.conn.execute(
            "UPDATE file_items
             SET status = ?4,
                 error = ?5,
                 completed_at = ?6,
                 duration_ms = CAST((julianday(?6) - julianday(started_at)) * 86400000 AS INTEGER)
             WHERE job_id = ?1 AND phase = ?2 AND file_path = ?3 AND status = 'processing'
               AND EXISTS (
                   SELECT 1 FROM jobs WHERE id = ?1 AND status IN ('pending', 'processing')
               )",
            params![job_id, phase.as_str(), path, outcome.as_str(), error, now],
        )?;
        Ok(changed > 0)
    }

    pub fn phase_counts(&self, job_id: i64, phase: PhaseId) -> Result<PhaseCounts> {
        self.conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'completed'), 0),
                        COALESCE(SUM(status = 'failed'), 0),
                        COALESCE(SUM(status IN ('pending', 'processing')), 0)
                 FROM file_items WHERE job_id = ?1 AND phase = ?2",
                params![job_id, phase.as_str()],
                |row| {
                    Ok(PhaseCounts {
                        total: row.get(0)?,
                        completed: row.get(1)?,
                        failed: row.get(2)?,
                        unresolved: row.get(3)?,
                    })
                },
            )
            .context("Failed to count phase items")
    }

    pub fn file_items(&self, job_id: i64, phase: PhaseId) -> Result<Vec<FileItemStatus>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_path, status, error, started_at, completed_at, duration_ms
             FROM file_items
             WHERE job_id = ?1 AND phase = ?2
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![job_id, phase.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<i64>>(5)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (file_path, status, error, started_at, completed_at, duration_ms) = row?;
            items.push(FileItemStatus {
                file_path,
                status: FileStatus::from_str(&status).map_err(|e| anyhow!(e))?,
                error,
                started_at: parse_ts_opt(started_at.as_deref())?,
                completed_at: parse_ts_opt(completed_at.as_deref())?,
                duration_ms,
            });
        }
        Ok(items)
    }

    // ── Snapshot assembly ─────────────────────────────────────────────

    /// Build the canonical snapshot for the latest job of a key.
    /// `None` when no job has ever existed for the key.
    pub fn snapshot(&self, repository_key: &str) -> Result<Option<JobSnapshot>> {
        let Some(job) = self.latest_job(repository_key)? else {
            return Ok(None);
        };
        Ok(Some(self.snapshot_for(&job)?))
    }

    pub fn snapshot_for(&self, job: &JobRow) -> Result<JobSnapshot> {
        let mut phases = BTreeMap::new();
        for phase in PhaseId::ORDER {
            let counts = self.phase_counts(job.id, phase)?;
            let status = phase_status(job, phase);
            phases.insert(
                phase,
                PhaseState::from_counts(
                    status,
                    counts.total,
                    counts.completed,
                    counts.failed,
                    counts.unresolved,
                ),
            );
        }
        let overall_progress = JobSnapshot::compute_overall_progress(&phases);
        Ok(JobSnapshot {
            job_id: Some(job.id),
            repository_key: job.repository_key.clone(),
            status: job.status,
            current_phase: job.current_phase,
            overall_progress,
            phases,
            started_at: Some(job.started_at),
            completed_at: job.completed_at,
            error: job.error.clone(),
        })
    }

    // ── Row plumbing ──────────────────────────────────────────────────

    fn query_job(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<JobRow>> {
        let raw = self
            .conn
            .query_row(sql, params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })
            .optional()?;

        let Some((id, key, status, phase, language, git_ref, error, started, completed)) = raw
        else {
            return Ok(None);
        };

        Ok(Some(JobRow {
            id,
            repository_key: key,
            status: JobStatus::from_str(&status).map_err(|e| anyhow!(e))?,
            current_phase: phase
                .as_deref()
                .map(PhaseId::from_str)
                .transpose()
                .map_err(|e| anyhow!(e))?,
            language,
            git_ref,
            error,
            started_at: parse_ts(&started)?,
            completed_at: parse_ts_opt(completed.as_deref())?,
        }))
    }
}

/// Millisecond-precision timestamps: SQLite's date functions only
/// understand up to three fractional-second digits.
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Derive a phase's display status from the job row.
fn phase_status(job: &JobRow, phase: PhaseId) -> JobStatus {
    match job.status {
        JobStatus::Completed => JobStatus::Completed,
        JobStatus::Pending => JobStatus::Pending,
        JobStatus::Processing | JobStatus::Error => {
            let current = job.current_phase.unwrap_or(PhaseId::Analysis);
            match phase.cmp(&current) {
                std::cmp::Ordering::Less => JobStatus::Completed,
                std::cmp::Ordering::Equal => {
                    if job.status == JobStatus::Error {
                        JobStatus::Error
                    } else {
                        JobStatus::Processing
                    }
                }
                std::cmp::Ordering::Greater => JobStatus::Pending,
            }
        }
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in store: {}", s))
}

fn parse_ts_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        JobStore::new_in_memory().unwrap()
    }

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_job_is_idempotent_while_active() {
        let db = store();
        let (first, created) = db.create_job("acme/widgets", "python", None).unwrap();
        assert!(created);
        assert_eq!(first.status, JobStatus::Pending);
        assert_eq!(first.current_phase, Some(PhaseId::Documentation));

        let (second, created) = db.create_job("acme/widgets", "python", None).unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn test_new_job_allowed_after_terminal() {
        let db = store();
        let (first, _) = db.create_job("acme/widgets", "python", None).unwrap();
        db.complete_job(first.id).unwrap();

        let (second, created) = db.create_job("acme/widgets", "python", None).unwrap();
        assert!(created);
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn test_different_keys_are_independent() {
        let db = store();
        let (a, _) = db.create_job("acme/widgets", "python", None).unwrap();
        let (b, _) = db.create_job("acme/gadgets", "sql", None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_file_transitions_only_move_forward() {
        let db = store();
        let (job, _) = db.create_job("acme/widgets", "python", None).unwrap();
        db.seed_files(job.id, PhaseId::Documentation, &paths(&["a.py"]))
            .unwrap();

        // Cannot resolve an item that was never claimed.
        assert!(
            !db.mark_file_resolved(
                job.id,
                PhaseId::Documentation,
                "a.py",
                FileStatus::Completed,
                None
            )
            .unwrap()
        );

        assert!(
            db.mark_file_processing(job.id, PhaseId::Documentation, "a.py")
                .unwrap()
        );
        // Claiming twice fails: pending → processing already happened.
        assert!(
            !db.mark_file_processing(job.id, PhaseId::Documentation, "a.py")
                .unwrap()
        );

        assert!(
            db.mark_file_resolved(
                job.id,
                PhaseId::Documentation,
                "a.py",
                FileStatus::Completed,
                None
            )
            .unwrap()
        );
        // Resolved items never transition again.
        assert!(
            !db.mark_file_resolved(
                job.id,
                PhaseId::Documentation,
                "a.py",
                FileStatus::Failed,
                Some("late failure")
            )
            .unwrap()
        );

        let items = db.file_items(job.id, PhaseId::Documentation).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, FileStatus::Completed);
        assert!(items[0].duration_ms.is_some());
    }

    #[test]
    fn test_completed_job_is_immutable() {
        let db = store();
        let (job, _) = db.create_job("acme/widgets", "python", None).unwrap();
        db.seed_files(job.id, PhaseId::Documentation, &paths(&["a.py"]))
            .unwrap();
        db.complete_job(job.id).unwrap();

        assert!(
            !db.mark_file_processing(job.id, PhaseId::Documentation, "a.py")
                .unwrap()
        );
        assert!(!db.begin_phase(job.id, PhaseId::Vectors).unwrap());
        assert!(!db.fail_job(job.id, "too late").unwrap());
        assert_eq!(
            db.seed_files(job.id, PhaseId::Vectors, &paths(&["a.py"]))
                .unwrap(),
            0
        );

        let row = db.job_by_id(job.id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Completed);
        assert!(row.completed_at.is_some());
        assert_eq!(row.current_phase, None);
    }

    #[test]
    fn test_phase_counts_and_pending_files() {
        let db = store();
        let (job, _) = db.create_job("acme/widgets", "python", None).unwrap();
        db.seed_files(
            job.id,
            PhaseId::Documentation,
            &paths(&["a.py", "b.py", "c.py"]),
        )
        .unwrap();

        db.mark_file_processing(job.id, PhaseId::Documentation, "a.py")
            .unwrap();
        db.mark_file_resolved(
            job.id,
            PhaseId::Documentation,
            "a.py",
            FileStatus::Completed,
            None,
        )
        .unwrap();
        db.mark_file_processing(job.id, PhaseId::Documentation, "b.py")
            .unwrap();
        db.mark_file_resolved(
            job.id,
            PhaseId::Documentation,
            "b.py",
            FileStatus::Failed,
            Some("parse error"),
        )
        .unwrap();

        let counts = db.phase_counts(job.id, PhaseId::Documentation).unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.unresolved, 1);

        assert_eq!(
            db.pending_files(job.id, PhaseId::Documentation).unwrap(),
            vec!["c.py".to_string()]
        );
    }

    #[test]
    fn test_snapshot_derives_phase_statuses() {
        let db = store();
        let (job, _) = db.create_job("acme/widgets", "python", None).unwrap();
        for phase in PhaseId::ORDER {
            db.seed_files(job.id, phase, &paths(&["a.sql", "b.sql"]))
                .unwrap();
        }
        db.begin_phase(job.id, PhaseId::Lineage).unwrap();

        let snap = db.snapshot("acme/widgets").unwrap().unwrap();
        assert_eq!(snap.status, JobStatus::Processing);
        assert_eq!(snap.current_phase, Some(PhaseId::Lineage));
        assert_eq!(
            snap.phases[&PhaseId::Documentation].status,
            JobStatus::Completed
        );
        assert_eq!(snap.phases[&PhaseId::Lineage].status, JobStatus::Processing);
        assert_eq!(
            snap.phases[&PhaseId::Dependencies].status,
            JobStatus::Pending
        );
    }

    #[test]
    fn test_snapshot_after_error_marks_current_phase() {
        let db = store();
        let (job, _) = db.create_job("acme/widgets", "python", None).unwrap();
        db.begin_phase(job.id, PhaseId::Vectors).unwrap();
        db.fail_job(job.id, "downstream outage").unwrap();

        let snap = db.snapshot("acme/widgets").unwrap().unwrap();
        assert_eq!(snap.status, JobStatus::Error);
        assert_eq!(snap.error.as_deref(), Some("downstream outage"));
        assert_eq!(
            snap.phases[&PhaseId::Documentation].status,
            JobStatus::Completed
        );
        assert_eq!(snap.phases[&PhaseId::Vectors].status, JobStatus::Error);
        assert_eq!(snap.phases[&PhaseId::Lineage].status, JobStatus::Pending);
    }

    #[test]
    fn test_snapshot_none_for_unknown_key() {
        let db = store();
        assert!(db.snapshot("nobody/nothing").unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_jobs_and_files() {
        let db = store();
        let (job, _) = db.create_job("acme/widgets", "python", None).unwrap();
        db.seed_files(job.id, PhaseId::Documentation, &paths(&["a.py"]))
            .unwrap();
        db.complete_job(job.id).unwrap();

        assert_eq!(db.clear_jobs("acme/widgets").unwrap(), 1);
        assert!(db.snapshot("acme/widgets").unwrap().is_none());
        assert!(db.file_items(job.id, PhaseId::Documentation).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_db_handle_call() {
        let handle = DbHandle::new(JobStore::new_in_memory().unwrap());
        let (row, created) = handle
            .call(|db| db.create_job("acme/widgets", "python", None))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(row.repository_key, "acme/widgets");
    }
}
