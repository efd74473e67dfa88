//! HTTP client for the analysis server's status API.

use async_trait::async_trait;

use crate::errors::TrackerError;
use crate::models::{AnalysisConfig, JobSnapshot, StartResponse, StatusPayload};

/// The server operations the poller needs. A trait seam so tests can
/// drive the poller with scripted responses and a paused clock.
#[async_trait]
pub trait StatusApi: Send + Sync {
    async fn fetch_status(&self, repository_key: &str) -> Result<JobSnapshot, TrackerError>;

    async fn start_analysis(
        &self,
        repository_key: &str,
        config: &AnalysisConfig,
    ) -> Result<StartResponse, TrackerError>;
}

pub struct HttpStatusClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Delete all jobs for a repository on the server.
    pub async fn clear(&self, repository_key: &str) -> Result<(), TrackerError> {
        let url = format!("{}/sequential/jobs/{}", self.base_url, repository_key);
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        check_status(&resp)?;
        Ok(())
    }
}

fn check_status(resp: &reqwest::Response) -> Result<(), TrackerError> {
    let status = resp.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(TrackerError::NotReadyYet);
    }
    if !status.is_success() {
        return Err(TrackerError::Api {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown").to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl StatusApi for HttpStatusClient {
    async fn fetch_status(&self, repository_key: &str) -> Result<JobSnapshot, TrackerError> {
        let url = format!("{}/sequential/status/{}", self.base_url, repository_key);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        check_status(&resp)?;

        let payload: StatusPayload = resp
            .json()
            .await
            .map_err(|_| TrackerError::UnexpectedPayload)?;
        match payload {
            StatusPayload::Canonical(snapshot) => Ok(snapshot),
            // The canonical endpoint never serves v1; receiving one means
            // we are pointed at the wrong endpoint or server generation.
            StatusPayload::Legacy(_) => Err(TrackerError::UnexpectedPayload),
        }
    }

    async fn start_analysis(
        &self,
        repository_key: &str,
        config: &AnalysisConfig,
    ) -> Result<StartResponse, TrackerError> {
        let url = format!("{}/sequential/start", self.base_url);
        let body = serde_json::json!({
            "repositoryKey": repository_key,
            "language": config.language,
            "ref": config.git_ref,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["error"].as_str().map(str::to_string))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(TrackerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        resp.json().await.map_err(|_| TrackerError::UnexpectedPayload)
    }
}
