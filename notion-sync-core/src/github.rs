//! Destination Writer: idempotent create-or-update of Markdown files through the GitHub contents API.
//!
//! # Upsert protocol
//!
//! For every [`Document`]:
//! 1. `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`; a `sha` in a 2xx
//!    response is the current digest. A 404, a transport error, or a 2xx without
//!    `sha` all mean "absent".
//! 2. `PUT /repos/{owner}/{repo}/contents/{path}` with the base64 content, the
//!    branch and, only when a digest was found, `sha`.
//!
//! A failed PUT becomes [`SyncError::WriteFailed`] in the [`WriteReport`]; the
//! remaining documents are still attempted.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use reqwest::header::{HeaderName, ACCEPT};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::GitHubConfig;
use crate::contract::{
    ApiError, ContentsApi, Document, DocumentSink, PutContents, RemoteFile, SyncError,
    WriteReport,
};
use crate::http::{bearer_client, read_json};

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

/// [`ContentsApi`] for one repository over HTTP.
pub struct GitHubHttpClient {
    client: Client,
    contents_url: String,
}

impl GitHubHttpClient {
    pub fn new(config: &GitHubConfig, timeout: Duration) -> Result<Self, ApiError> {
        let accept: HeaderName = ACCEPT;
        let client = bearer_client(&config.token, &[(accept, GITHUB_MEDIA_TYPE)], timeout)?;
        let contents_url = format!(
            "{}/repos/{}/{}/contents",
            config.base_url.trim_end_matches('/'),
            config.owner,
            config.repo
        );
        info!(owner = %config.owner, repo = %config.repo, "Initialized GitHub client");
        Ok(Self {
            client,
            contents_url,
        })
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.contents_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ContentsApi for GitHubHttpClient {
    async fn get_file(&self, path: &str, branch: &str) -> Result<RemoteFile, ApiError> {
        let url = self.file_url(path);
        debug!(url = %url, branch, "GET contents");
        let response = self
            .client
            .get(&url)
            .query(&[("ref", branch)])
            .send()
            .await?;
        let body = match read_json(response).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => return Ok(RemoteFile::absent(path)),
            Err(e) => return Err(e),
        };
        let sha = body.get("sha").and_then(Value::as_str).map(str::to_owned);
        Ok(RemoteFile::present(path, sha))
    }

    async fn put_file(&self, path: &str, body: PutContents) -> Result<(), ApiError> {
        let url = self.file_url(path);
        debug!(url = %url, update = body.sha.is_some(), "PUT contents");
        let response = self.client.put(&url).json(&body).send().await?;
        read_json(response).await.map(|_| ())
    }
}

/// Destination Writer: upserts documents onto one branch.
pub struct GitHubWriter<C> {
    api: C,
    branch: String,
}

impl<C: ContentsApi> GitHubWriter<C> {
    pub fn new(api: C, branch: impl Into<String>) -> Self {
        Self {
            api,
            branch: branch.into(),
        }
    }

    /// Fetches the current digest and writes the document, creating or updating it.
    pub async fn upsert_one(&self, document: &Document) -> Result<(), SyncError> {
        let remote = match self.api.get_file(&document.path, &self.branch).await {
            Ok(remote) => remote,
            Err(e) => {
                debug!(path = %document.path, error = %e, "Treating unreadable file as absent");
                RemoteFile::absent(&document.path)
            }
        };
        let sha = remote.update_digest().map(str::to_owned);

        let body = PutContents {
            message: commit_message(&document.path),
            content: BASE64.encode(document.markdown.as_bytes()),
            branch: self.branch.clone(),
            sha,
        };
        let update = body.sha.is_some();

        self.api
            .put_file(&document.path, body)
            .await
            .map_err(|e| SyncError::WriteFailed {
                path: document.path.clone(),
                status: e.status(),
                detail: e.to_string(),
            })?;
        info!(path = %document.path, update, "[GITHUB] Upserted file");
        Ok(())
    }

    /// Upserts every document in order; failures are collected, not propagated.
    pub async fn upsert_all(&self, documents: &[Document]) -> WriteReport {
        let mut report = WriteReport::default();
        for document in documents {
            match self.upsert_one(document).await {
                Ok(()) => report.written.push(document.path.clone()),
                Err(e) => {
                    error!(path = %document.path, error = %e, "[GITHUB][ERROR] Write failed, continuing");
                    report.failed.push(e);
                }
            }
        }
        if !report.failed.is_empty() {
            warn!(
                written = report.written.len(),
                failed = report.failed.len(),
                "[GITHUB] Some files were not written"
            );
        }
        report
    }
}

#[async_trait]
impl<C: ContentsApi> DocumentSink for GitHubWriter<C> {
    async fn upsert_all(&self, documents: Vec<Document>) -> WriteReport {
        GitHubWriter::upsert_all(self, &documents).await
    }
}

fn commit_message(path: &str) -> String {
    format!(
        "Sync Notion page at {} -> {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        path
    )
}
