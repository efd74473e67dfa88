//! Setup flow: validate an analysis request, submit it, start tracking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::errors::TrackerError;
use crate::models::{AnalysisConfig, StartResponse};
use crate::orchestrator::validate_repository_key;
use crate::tracker::PollerManager;
use crate::tracker::client::StatusApi;

/// Languages the analysis pipeline understands.
pub const SUPPORTED_LANGUAGES: &[&str] = &["python", "sql", "java", "scala", "mixed"];

pub struct SetupController {
    api: Arc<dyn StatusApi>,
    poller: Arc<PollerManager>,
    submitting: AtomicBool,
}

impl SetupController {
    pub fn new(api: Arc<dyn StatusApi>, poller: Arc<PollerManager>) -> Self {
        Self {
            api,
            poller,
            submitting: AtomicBool::new(false),
        }
    }

    /// Validate, start the analysis on the server, and begin polling.
    /// A second submit while one is in flight is rejected, not queued;
    /// the idempotent server start makes retrying afterwards safe.
    pub async fn submit(
        &self,
        repository_key: &str,
        config: &AnalysisConfig,
    ) -> Result<StartResponse, TrackerError> {
        validate(repository_key, config)?;

        if self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TrackerError::SubmitInFlight);
        }

        let result = self.api.start_analysis(repository_key, config).await;
        self.submitting.store(false, Ordering::SeqCst);

        let response = result?;
        info!(
            repository_key,
            job_id = response.job_id,
            "Analysis submitted"
        );
        self.poller.start_polling(repository_key).await;
        Ok(response)
    }
}

fn validate(repository_key: &str, config: &AnalysisConfig) -> Result<(), TrackerError> {
    validate_repository_key(repository_key)
        .map_err(|e| TrackerError::InvalidConfig(e.to_string()))?;

    let language = config.language.trim().to_ascii_lowercase();
    if language.is_empty() {
        return Err(TrackerError::InvalidConfig("Language is required".into()));
    }
    if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
        return Err(TrackerError::InvalidConfig(format!(
            "Unsupported language '{}'; expected one of {}",
            config.language,
            SUPPORTED_LANGUAGES.join(", ")
        )));
    }
    Ok(())
}
