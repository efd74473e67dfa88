//! Client-side status tracker.
//!
//! The poller manager owns at most one poll loop per repository key.
//! Each loop fetches status immediately, then on a fixed interval, and
//! stops itself only on completion or an explicit stop. Errors other
//! than completion never kill a loop: a flaky server or a repository
//! that is not ingested yet just means "ask again next tick".
//!
//! Every observed snapshot is merged into an in-memory map and persisted
//! to disk, so a restarted tracker resumes in-flight polls.

pub mod client;
pub mod storage;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::models::ClientSnapshot;
use client::StatusApi;
use storage::SnapshotStore;

struct PollHandle {
    generation: u64,
    token: CancellationToken,
}

pub struct PollerManager {
    api: Arc<dyn StatusApi>,
    storage: Arc<SnapshotStore>,
    config: TrackerConfig,
    snapshots: Arc<RwLock<HashMap<String, ClientSnapshot>>>,
    timers: Mutex<HashMap<String, PollHandle>>,
    // Distinguishes a loop's own handle from a replacement registered
    // after it was cancelled.
    generation: AtomicU64,
}

impl PollerManager {
    pub fn new(api: Arc<dyn StatusApi>, storage: SnapshotStore, config: TrackerConfig) -> Arc<Self> {
        Arc::new(Self {
            api,
            storage: Arc::new(storage),
            config,
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            timers: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Begin polling a repository. Any existing loop for the key is
    /// cancelled first, so there is never more than one.
    pub async fn start_polling(self: &Arc<Self>, repository_key: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();

        {
            let mut timers = self.timers.lock().await;
            if let Some(previous) = timers.insert(
                repository_key.to_string(),
                PollHandle {
                    generation,
                    token: token.clone(),
                },
            ) {
                previous.token.cancel();
                debug!(repository_key, "Replaced existing poll loop");
            }
        }

        {
            let mut snapshots = self.snapshots.write().await;
            let entry = snapshots
                .entry(repository_key.to_string())
                .or_insert_with(|| ClientSnapshot::started(Utc::now()));
            entry.is_polling = true;
        }
        self.persist().await;

        info!(repository_key, "Started polling");
        let this = self.clone();
        let key = repository_key.to_string();
        tokio::spawn(async move {
            this.poll_loop(&key, generation, token).await;
        });
    }

    async fn poll_loop(self: &Arc<Self>, repository_key: &str, generation: u64, token: CancellationToken) {
        loop {
            match self.api.fetch_status(repository_key).await {
                Ok(server_snapshot) => {
                    let completed = {
                        let mut snapshots = self.snapshots.write().await;
                        let Some(entry) = snapshots.get_mut(repository_key) else {
                            // Cleared while we were fetching.
                            break;
                        };
                        entry.merge(&server_snapshot, Utc::now());
                        if entry.is_complete() {
                            entry.mark_completed(Utc::now());
                            true
                        } else {
                            false
                        }
                    };
                    self.persist().await;
                    if completed {
                        info!(repository_key, "Analysis complete, polling stopped");
                        break;
                    }
                }
                Err(e) if e.is_not_ready() => {
                    debug!(repository_key, "Not ingested yet, will retry");
                }
                Err(e) => {
                    warn!(repository_key, "Status fetch failed: {}", e);
                    // The tracker is still alive even when the server is
                    // unreachable; only the freshness stamp moves.
                    if let Some(entry) =
                        self.snapshots.write().await.get_mut(repository_key)
                    {
                        entry.last_updated = Utc::now();
                    }
                    self.persist().await;
                }
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        // Deregister only our own handle; a newer loop may have replaced it.
        let mut timers = self.timers.lock().await;
        if timers
            .get(repository_key)
            .is_some_and(|h| h.generation == generation)
        {
            timers.remove(repository_key);
        }
    }

    /// Stop polling a repository without touching its snapshot data.
    pub async fn stop_polling(&self, repository_key: &str) {
        if let Some(handle) = self.timers.lock().await.remove(repository_key) {
            handle.token.cancel();
        }
        if let Some(entry) = self.snapshots.write().await.get_mut(repository_key) {
            entry.is_polling = false;
        }
        self.persist().await;
        info!(repository_key, "Stopped polling");
    }

    /// Forget a repository entirely: stop its loop and drop its snapshot.
    pub async fn clear(&self, repository_key: &str) {
        if let Some(handle) = self.timers.lock().await.remove(repository_key) {
            handle.token.cancel();
        }
        self.snapshots.write().await.remove(repository_key);
        self.persist().await;
        info!(repository_key, "Cleared tracked state");
    }

    pub async fn clear_all(&self) {
        for (_, handle) in self.timers.lock().await.drain() {
            handle.token.cancel();
        }
        self.snapshots.write().await.clear();
        self.persist().await;
    }

    pub async fn status(&self, repository_key: &str) -> Option<ClientSnapshot> {
        self.snapshots.read().await.get(repository_key).cloned()
    }

    pub async fn all(&self) -> HashMap<String, ClientSnapshot> {
        self.snapshots.read().await.clone()
    }

    pub async fn is_polling(&self, repository_key: &str) -> bool {
        self.timers.lock().await.contains_key(repository_key)
    }

    /// Load persisted snapshots into memory without resuming any polls.
    pub async fn load_persisted(&self) {
        match self.storage.load() {
            Ok(map) => self.snapshots.write().await.extend(map),
            Err(e) => warn!("Failed to load persisted snapshots: {}", e),
        }
    }

    /// Load persisted snapshots and, after a short settling delay, resume
    /// polling every repository that was mid-flight when the last run
    /// ended. Already-complete entries just get their flag corrected.
    pub async fn resume_persisted(self: &Arc<Self>) {
        let loaded = match self.storage.load() {
            Ok(map) => map,
            Err(e) => {
                warn!("Failed to load persisted snapshots: {}", e);
                return;
            }
        };
        if loaded.is_empty() {
            return;
        }
        self.snapshots.write().await.extend(loaded);

        tokio::time::sleep(self.config.resume_delay).await;

        let to_resume: Vec<(String, bool)> = self
            .snapshots
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.is_polling)
            .map(|(k, s)| (k.clone(), s.is_complete()))
            .collect();

        for (key, already_complete) in to_resume {
            if already_complete {
                if let Some(entry) = self.snapshots.write().await.get_mut(&key) {
                    entry.mark_completed(Utc::now());
                }
                self.persist().await;
            } else {
                info!(repository_key = %key, "Resuming interrupted poll");
                self.start_polling(&key).await;
            }
        }
    }

    async fn persist(&self) {
        let snapshots = self.snapshots.read().await;
        if let Err(e) = self.storage.save(&snapshots) {
            warn!("Failed to persist snapshots: {}", e);
        }
    }
}
