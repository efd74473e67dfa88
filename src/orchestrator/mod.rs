//! Job orchestrator: owns job creation and drives the five phases in
//! sequence on a background task.
//!
//! Start is idempotent per repository key. The store's partial unique
//! index is the authoritative guard; the in-process map of running
//! pipelines exists only so cancel and shutdown can reach the tasks.

pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::errors::{OrchestratorError, WorkerError};
use crate::models::{AnalysisConfig, JobSnapshot};
use crate::phase::PhaseId;
use crate::providers::{SharedLister, SharedProcessor};
use crate::store::{DbHandle, JobRow};
use worker::{PhaseWorker, WorkerConfig};

/// Outcome of a start request.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub job: JobRow,
    /// False when an active job already existed and was returned instead.
    pub created: bool,
}

pub struct Orchestrator {
    store: DbHandle,
    lister: SharedLister,
    processor: SharedProcessor,
    worker_config: WorkerConfig,
    running: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: DbHandle,
        lister: SharedLister,
        processor: SharedProcessor,
        worker_config: WorkerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            lister,
            processor,
            worker_config,
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Start analysis for a repository, or join the already-active job.
    pub async fn start(
        self: &Arc<Self>,
        repository_key: &str,
        config: &AnalysisConfig,
    ) -> Result<StartOutcome, OrchestratorError> {
        validate_repository_key(repository_key)?;

        let key = repository_key.to_string();
        let language = config.language.clone();
        let git_ref = config.git_ref.clone();
        let (job, created) = self
            .store
            .call(move |db| db.create_job(&key, &language, git_ref.as_deref()))
            .await?;

        if created {
            info!(
                repository_key,
                job_id = job.id,
                "Starting analysis pipeline"
            );
            self.spawn_pipeline(&job).await;
        } else {
            info!(
                repository_key,
                job_id = job.id,
                "Joining already-active job"
            );
        }

        Ok(StartOutcome { job, created })
    }

    /// Re-run a failed job. Only the latest job counts, and only when it
    /// ended in error; a fresh job row is created with the same config.
    pub async fn retry(
        self: &Arc<Self>,
        repository_key: &str,
    ) -> Result<StartOutcome, OrchestratorError> {
        validate_repository_key(repository_key)?;

        let key = repository_key.to_string();
        let latest = self
            .store
            .call(move |db| db.latest_job(&key))
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound {
                key: repository_key.to_string(),
            })?;

        if !latest.status.is_terminal() {
            // An active job is already making progress; just join it.
            return Ok(StartOutcome {
                job: latest,
                created: false,
            });
        }

        let config = AnalysisConfig {
            language: latest.language.clone(),
            git_ref: latest.git_ref.clone(),
        };
        self.start(repository_key, &config).await
    }

    /// Remove all history for a repository. Aborts the running pipeline
    /// first so no task writes into rows that are about to disappear.
    pub async fn clear(&self, repository_key: &str) -> Result<usize, OrchestratorError> {
        validate_repository_key(repository_key)?;
        self.cancel(repository_key).await;

        let key = repository_key.to_string();
        let deleted = self.store.call(move |db| db.clear_jobs(&key)).await?;
        if deleted == 0 {
            return Err(OrchestratorError::JobNotFound {
                key: repository_key.to_string(),
            });
        }
        info!(repository_key, deleted, "Cleared repository jobs");
        Ok(deleted)
    }

    /// Canonical snapshot of the latest job for a key.
    pub async fn snapshot(
        &self,
        repository_key: &str,
    ) -> Result<Option<JobSnapshot>, OrchestratorError> {
        validate_repository_key(repository_key)?;
        let key = repository_key.to_string();
        Ok(self.store.call(move |db| db.snapshot(&key)).await?)
    }

    /// Abort the running pipeline task for a key, if any. The job row is
    /// left as-is; a cleared or restarted job decides what happens next.
    pub async fn cancel(&self, repository_key: &str) {
        if let Some(handle) = self.running.lock().await.remove(repository_key) {
            handle.abort();
            warn!(repository_key, "Aborted running pipeline");
        }
    }

    /// Abort every running pipeline. Used on server shutdown; interrupted
    /// jobs stay in their last persisted state.
    pub async fn shutdown(&self) {
        let mut running = self.running.lock().await;
        for (key, handle) in running.drain() {
            handle.abort();
            warn!(repository_key = %key, "Aborted pipeline on shutdown");
        }
    }

    async fn spawn_pipeline(self: &Arc<Self>, job: &JobRow) {
        let this = self.clone();
        let job_id = job.id;
        let key = job.repository_key.clone();
        let git_ref = job.git_ref.clone();

        let task_key = key.clone();
        let running = self.running.clone();
        let handle = tokio::spawn(async move {
            this.run_pipeline(job_id, &key, git_ref.as_deref()).await;
            running.lock().await.remove(&key);
        });
        self.running.lock().await.insert(task_key, handle);
    }

    /// The sequential pipeline: list, seed every phase upfront, then run
    /// the phases in order. Seeding everything at creation time keeps the
    /// job-wide pending count meaningful from the first status poll on.
    async fn run_pipeline(&self, job_id: i64, repository_key: &str, git_ref: Option<&str>) {
        let files = match self.lister.list_files(repository_key, git_ref).await {
            Ok(files) => files,
            Err(e) => {
                let err = OrchestratorError::ListingFailed {
                    key: repository_key.to_string(),
                    source: e,
                };
                self.record_failure(job_id, repository_key, &err.to_string())
                    .await;
                return;
            }
        };

        if files.is_empty() {
            let err = OrchestratorError::NoFilesFound {
                key: repository_key.to_string(),
            };
            self.record_failure(job_id, repository_key, &err.to_string())
                .await;
            return;
        }

        info!(
            repository_key,
            job_id,
            files = files.len(),
            "Listed repository files"
        );

        let seed_files = files.clone();
        let seeded = self
            .store
            .call(move |db| {
                for phase in PhaseId::ORDER {
                    let eligible: Vec<String> = seed_files
                        .iter()
                        .filter(|p| phase.is_eligible(p.as_str()))
                        .cloned()
                        .collect();
                    db.seed_files(job_id, phase, &eligible)?;
                }
                Ok(())
            })
            .await;
        if let Err(e) = seeded {
            self.record_failure(job_id, repository_key, &format!("Failed to seed files: {}", e))
                .await;
            return;
        }

        let worker = PhaseWorker::new(
            self.store.clone(),
            self.processor.clone(),
            self.worker_config.clone(),
        );

        for phase in PhaseId::ORDER {
            let begun = self
                .store
                .call(move |db| db.begin_phase(job_id, phase))
                .await;
            match begun {
                Ok(true) => {}
                // Job turned terminal under us (cleared or failed elsewhere).
                Ok(false) => {
                    warn!(repository_key, job_id, phase = %phase, "Job no longer active, stopping");
                    return;
                }
                Err(e) => {
                    self.record_failure(job_id, repository_key, &e.to_string())
                        .await;
                    return;
                }
            }

            match worker.run(job_id, repository_key, phase).await {
                Ok(counts) => {
                    info!(
                        repository_key,
                        phase = %phase,
                        completed = counts.completed,
                        failed = counts.failed,
                        "Phase finished"
                    );
                }
                Err(e @ WorkerError::AllItemsFailed { .. }) => {
                    self.record_failure(job_id, repository_key, &e.to_string())
                        .await;
                    return;
                }
                Err(WorkerError::Store { phase, source }) => {
                    self.record_failure(
                        job_id,
                        repository_key,
                        &format!("Store failure in {}: {}", phase, source),
                    )
                    .await;
                    return;
                }
            }
        }

        let completed = self.store.call(move |db| db.complete_job(job_id)).await;
        match completed {
            Ok(true) => info!(repository_key, job_id, "Analysis pipeline completed"),
            Ok(false) => warn!(repository_key, job_id, "Job already terminal at completion"),
            Err(e) => error!(repository_key, job_id, "Failed to complete job: {}", e),
        }
    }

    async fn record_failure(&self, job_id: i64, repository_key: &str, message: &str) {
        error!(repository_key, job_id, "Pipeline failed: {}", message);
        let message = message.to_string();
        if let Err(e) = self
            .store
            .call(move |db| db.fail_job(job_id, &message))
            .await
        {
            error!(repository_key, job_id, "Failed to record job failure: {}", e);
        }
    }
}

/// Repository keys are `owner/repo`: exactly one slash, both sides
/// non-empty, no whitespace.
pub fn validate_repository_key(key: &str) -> Result<(), OrchestratorError> {
    let invalid = || OrchestratorError::InvalidRepositoryKey {
        key: key.to_string(),
    };
    let mut parts = key.split('/');
    let (Some(owner), Some(repo), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    if owner.is_empty() || repo.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}
