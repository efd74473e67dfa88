//! Pluggable file listing and per-file processing.
//!
//! The orchestrator and phase workers only see these traits; production
//! wiring uses the GitHub trees API for listing and an HTTP POST per file
//! for processing. Tests substitute in-memory implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::phase::PhaseId;

/// Outcome classification for a single file-processing attempt.
/// Transient failures are retried with backoff; permanent ones are not.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl ProcessError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessError::Transient(_))
    }
}

/// Enumerates the analyzable files of a repository.
#[async_trait]
pub trait FileLister: Send + Sync {
    async fn list_files(&self, repository_key: &str, git_ref: Option<&str>)
    -> anyhow::Result<Vec<String>>;
}

/// Runs one phase's analysis step against one file.
#[async_trait]
pub trait FileProcessor: Send + Sync {
    async fn process(
        &self,
        repository_key: &str,
        phase: PhaseId,
        file_path: &str,
    ) -> Result<(), ProcessError>;
}

pub type SharedLister = Arc<dyn FileLister>;
pub type SharedProcessor = Arc<dyn FileProcessor>;

// ── GitHub file lister ────────────────────────────────────────────────

/// Lists repository files via the GitHub git trees API (one recursive
/// call per repository, no pagination needed below the 100k-entry cap).
pub struct GitHubFileLister {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl GitHubFileLister {
    pub fn new(token: Option<String>) -> Self {
        Self::with_base("https://api.github.com", token)
    }

    pub fn with_base(api_base: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl FileLister for GitHubFileLister {
    async fn list_files(
        &self,
        repository_key: &str,
        git_ref: Option<&str>,
    ) -> anyhow::Result<Vec<String>> {
        let git_ref = git_ref.unwrap_or("HEAD");
        let url = format!(
            "{}/repos/{}/git/trees/{}",
            self.api_base, repository_key, git_ref
        );

        let mut req = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "repoinsight")
            .query(&[("recursive", "1")]);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let resp: TreeResponse = req
            .send()
            .await
            .context("Failed to send tree request to GitHub")?
            .error_for_status()
            .context("GitHub tree API returned error status")?
            .json()
            .await
            .context("Failed to parse tree response from GitHub")?;

        if resp.truncated {
            tracing::warn!(repository_key, "GitHub tree listing was truncated");
        }

        Ok(resp
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }
}

// ── HTTP file processor ───────────────────────────────────────────────

/// Dispatches each file to a downstream analysis service, one POST to
/// `{base}/{phase}/process` per file. 4xx responses are permanent
/// failures; 5xx and transport errors are transient.
pub struct HttpFileProcessor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFileProcessor {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build processor HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FileProcessor for HttpFileProcessor {
    async fn process(
        &self,
        repository_key: &str,
        phase: PhaseId,
        file_path: &str,
    ) -> Result<(), ProcessError> {
        let url = format!("{}/{}/process", self.base_url, phase);
        let body = json!({
            "repositoryKey": repository_key,
            "filePath": file_path,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProcessError::Transient(format!("Request failed: {}", e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let message = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if status.is_client_error() {
            Err(ProcessError::Permanent(format!(
                "{} rejected ({}): {}",
                phase, status, message
            )))
        } else {
            Err(ProcessError::Transient(format!(
                "{} unavailable ({}): {}",
                phase, status, message
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProcessError::Transient("503".into()).is_transient());
        assert!(!ProcessError::Permanent("422".into()).is_transient());
    }

    #[test]
    fn test_lister_base_url_normalized() {
        let lister = GitHubFileLister::with_base("https://example.test/", None);
        assert_eq!(lister.api_base, "https://example.test");
    }
}
