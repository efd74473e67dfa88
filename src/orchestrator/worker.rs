//! Phase worker harness.
//!
//! Runs every pending item of one phase with bounded parallelism and
//! per-item retry. The worker never aborts a phase mid-flight because of
//! individual failures; it records each outcome and reports the final
//! tally. The only phase-fatal condition is all items failing, which
//! points at something systemic rather than bad files.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::WorkerError;
use crate::models::FileStatus;
use crate::phase::PhaseId;
use crate::providers::SharedProcessor;
use crate::store::{DbHandle, PhaseCounts};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum in-flight items per phase.
    pub concurrency: usize,
    /// Retries after the first attempt, transient failures only.
    pub retries: u32,
    /// Initial backoff; doubles per retry.
    pub backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

pub struct PhaseWorker {
    store: DbHandle,
    processor: SharedProcessor,
    config: WorkerConfig,
}

impl PhaseWorker {
    pub fn new(store: DbHandle, processor: SharedProcessor, config: WorkerConfig) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    /// Drain one phase's pending items to resolution. Returns the final
    /// counts; errs only when the store fails or every item failed.
    pub async fn run(
        &self,
        job_id: i64,
        repository_key: &str,
        phase: PhaseId,
    ) -> Result<PhaseCounts, WorkerError> {
        let pending = self
            .store
            .call(move |db| db.pending_files(job_id, phase))
            .await
            .map_err(|e| WorkerError::Store { phase, source: e })?;

        debug!(
            repository_key,
            phase = %phase,
            pending = pending.len(),
            "Phase worker starting"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for path in pending {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| WorkerError::Store {
                    phase,
                    source: anyhow::anyhow!("Semaphore closed: {}", e),
                })?;
            let store = self.store.clone();
            let processor = self.processor.clone();
            let config = self.config.clone();
            let key = repository_key.to_string();

            tasks.spawn(async move {
                let _permit = permit;
                process_one(&store, &processor, &config, job_id, &key, phase, &path).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(phase = %phase, "Phase worker task panicked: {}", e);
            }
        }

        let counts = self
            .store
            .call(move |db| db.phase_counts(job_id, phase))
            .await
            .map_err(|e| WorkerError::Store { phase, source: e })?;

        if counts.total > 0 && counts.completed == 0 && counts.failed == counts.total {
            return Err(WorkerError::AllItemsFailed {
                phase,
                failed: counts.failed,
            });
        }

        debug!(
            repository_key,
            phase = %phase,
            completed = counts.completed,
            failed = counts.failed,
            "Phase worker finished"
        );
        Ok(counts)
    }
}

/// Claim, attempt (with retry), and resolve a single item. Claim failure
/// means another worker or a terminal job got there first; skip quietly.
async fn process_one(
    store: &DbHandle,
    processor: &SharedProcessor,
    config: &WorkerConfig,
    job_id: i64,
    repository_key: &str,
    phase: PhaseId,
    path: &str,
) {
    let claim_path = path.to_string();
    let claimed = store
        .call(move |db| db.mark_file_processing(job_id, phase, &claim_path))
        .await;
    match claimed {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            warn!(phase = %phase, path, "Failed to claim item: {}", e);
            return;
        }
    }

    let mut backoff = config.backoff;
    let mut last_error = String::new();
    let mut succeeded = false;

    for attempt in 0..=config.retries {
        match processor.process(repository_key, phase, path).await {
            Ok(()) => {
                succeeded = true;
                break;
            }
            Err(e) => {
                last_error = e.to_string();
                if !e.is_transient() || attempt == config.retries {
                    break;
                }
                debug!(
                    phase = %phase,
                    path,
                    attempt,
                    "Transient failure, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }

    let outcome = if succeeded {
        FileStatus::Completed
    } else {
        FileStatus::Failed
    };
    let error = (!succeeded).then(|| last_error.clone());
    let resolve_path = path.to_string();
    let resolved = store
        .call(move |db| {
            db.mark_file_resolved(job_id, phase, &resolve_path, outcome, error.as_deref())
        })
        .await;

    match resolved {
        Ok(true) => {}
        Ok(false) => debug!(phase = %phase, path, "Item already resolved, outcome dropped"),
        Err(e) => warn!(phase = %phase, path, "Failed to record outcome: {}", e),
    }
    if !succeeded {
        warn!(phase = %phase, path, "Item failed: {}", last_error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{FileProcessor, ProcessError};
    use crate::store::JobStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted processor: per-path outcome plus an attempt counter.
    struct FakeProcessor {
        outcomes: Mutex<HashMap<String, Vec<Result<(), ProcessError>>>>,
        attempts: AtomicU32,
    }

    impl FakeProcessor {
        fn new() -> Self {
            Self {
                outcomes: Mutex::new(HashMap::new()),
                attempts: AtomicU32::new(0),
            }
        }

        /// Queue outcomes for a path, consumed in order; once the script
        /// is exhausted further attempts succeed.
        fn script(self, path: &str, outcomes: Vec<Result<(), ProcessError>>) -> Self {
            self.outcomes
                .lock()
                .unwrap()
                .insert(path.to_string(), outcomes);
            self
        }
    }

    #[async_trait]
    impl FileProcessor for FakeProcessor {
        async fn process(
            &self,
            _repository_key: &str,
            _phase: PhaseId,
            file_path: &str,
        ) -> Result<(), ProcessError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            match outcomes.get_mut(file_path) {
                Some(script) if !script.is_empty() => script.remove(0),
                _ => Ok(()),
            }
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            concurrency: 2,
            retries: 2,
            backoff: Duration::from_millis(1),
        }
    }

    async fn seeded_store(paths: &[&str], phase: PhaseId) -> (DbHandle, i64) {
        let store = DbHandle::new(JobStore::new_in_memory().unwrap());
        let owned: Vec<String> = paths.iter().map(|s| s.to_string()).collect();
        let (row, _) = store
            .call(move |db| {
                let (row, created) = db.create_job("acme/widgets", "python", None)?;
                db.seed_files(row.id, phase, &owned)?;
                Ok((row, created))
            })
            .await
            .unwrap();
        (store, row.id)
    }

    #[tokio::test]
    async fn test_all_items_succeed() {
        let (store, job_id) = seeded_store(&["a.py", "b.py", "c.py"], PhaseId::Vectors).await;
        let worker = PhaseWorker::new(
            store,
            Arc::new(FakeProcessor::new()),
            fast_config(),
        );

        let counts = worker.run(job_id, "acme/widgets", PhaseId::Vectors).await.unwrap();
        assert_eq!(counts.completed, 3);
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.unresolved, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_recorded_not_retried() {
        let (store, job_id) = seeded_store(&["a.py", "b.py"], PhaseId::Vectors).await;
        let processor = Arc::new(FakeProcessor::new().script(
            "a.py",
            vec![Err(ProcessError::Permanent("422 rejected".into()))],
        ));
        let worker = PhaseWorker::new(store.clone(), processor.clone(), fast_config());

        let counts = worker.run(job_id, "acme/widgets", PhaseId::Vectors).await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        // One attempt for the permanent failure, one for the success.
        assert_eq!(processor.attempts.load(Ordering::SeqCst), 2);

        let items = store
            .call(move |db| db.file_items(job_id, PhaseId::Vectors))
            .await
            .unwrap();
        let failed = items.iter().find(|i| i.file_path == "a.py").unwrap();
        assert_eq!(failed.status, FileStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("422"));
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let (store, job_id) = seeded_store(&["a.py"], PhaseId::Documentation).await;
        let processor = Arc::new(FakeProcessor::new().script(
            "a.py",
            vec![
                Err(ProcessError::Transient("503".into())),
                Err(ProcessError::Transient("503".into())),
            ],
        ));
        let worker = PhaseWorker::new(store, processor.clone(), fast_config());

        let counts = worker
            .run(job_id, "acme/widgets", PhaseId::Documentation)
            .await
            .unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(processor.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_marks_failed() {
        let (store, job_id) = seeded_store(&["a.py", "b.py"], PhaseId::Documentation).await;
        let processor = Arc::new(FakeProcessor::new().script(
            "a.py",
            vec![
                Err(ProcessError::Transient("timeout".into())),
                Err(ProcessError::Transient("timeout".into())),
                Err(ProcessError::Transient("timeout".into())),
            ],
        ));
        let worker = PhaseWorker::new(store, processor.clone(), fast_config());

        let counts = worker
            .run(job_id, "acme/widgets", PhaseId::Documentation)
            .await
            .unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.completed, 1);
        // 3 attempts for a.py + 1 for b.py.
        assert_eq!(processor.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_all_items_failing_is_phase_fatal() {
        let (store, job_id) = seeded_store(&["a.py", "b.py"], PhaseId::Analysis).await;
        let processor = Arc::new(
            FakeProcessor::new()
                .script("a.py", vec![Err(ProcessError::Permanent("401".into()))])
                .script("b.py", vec![Err(ProcessError::Permanent("401".into()))]),
        );
        let worker = PhaseWorker::new(store, processor, fast_config());

        let err = worker
            .run(job_id, "acme/widgets", PhaseId::Analysis)
            .await
            .unwrap_err();
        match err {
            WorkerError::AllItemsFailed { phase, failed } => {
                assert_eq!(phase, PhaseId::Analysis);
                assert_eq!(failed, 2);
            }
            other => panic!("Expected AllItemsFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_phase_is_a_noop() {
        let (store, job_id) = seeded_store(&[], PhaseId::Lineage).await;
        let worker = PhaseWorker::new(store, Arc::new(FakeProcessor::new()), fast_config());

        let counts = worker.run(job_id, "acme/widgets", PhaseId::Lineage).await.unwrap();
        assert_eq!(counts.total, 0);
    }
}
