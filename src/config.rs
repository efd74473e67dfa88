//! Runtime configuration for the server and the tracker.

use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::worker::WorkerConfig;

pub const DEFAULT_PORT: u16 = 4820;

/// Configuration for the analysis server.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// GitHub token for listing private repositories.
    pub github_token: Option<String>,
    /// Base URL of the downstream analysis service.
    pub processor_url: String,
    pub processor_timeout: Duration,
    pub worker: WorkerConfig,
    /// Permissive CORS and 0.0.0.0 binding for local dashboard work.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(".repoinsight/jobs.db"),
            github_token: None,
            processor_url: "http://127.0.0.1:4821".to_string(),
            processor_timeout: Duration::from_secs(60),
            worker: WorkerConfig::default(),
            dev_mode: false,
        }
    }
}

/// Configuration for the client-side status tracker.
#[derive(Clone)]
pub struct TrackerConfig {
    /// Base URL of the analysis server.
    pub server_url: String,
    /// Where tracked snapshots are persisted between runs.
    pub snapshot_path: PathBuf,
    pub poll_interval: Duration,
    /// Delay before resuming persisted in-flight polls on startup.
    pub resume_delay: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://127.0.0.1:{}", DEFAULT_PORT),
            snapshot_path: PathBuf::from(".repoinsight/tracker.json"),
            poll_interval: Duration::from_millis(2000),
            resume_delay: Duration::from_millis(1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.db_path, PathBuf::from(".repoinsight/jobs.db"));
        assert!(!config.dev_mode);
        assert_eq!(config.worker.retries, 2);
    }

    #[test]
    fn test_tracker_config_default() {
        let config = TrackerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.resume_delay, Duration::from_millis(1000));
        assert!(config.server_url.contains("4820"));
    }
}
