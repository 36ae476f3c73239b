//! # contract: data model and capability traits for the export pipeline
//!
//! This module holds the plain data passed between the pipeline stages and the
//! async traits that sit at every seam:
//!
//! - [`NotionApi`]: raw reads against the Notion REST API.
//! - [`ContentsApi`]: file reads and writes against the GitHub contents API.
//! - [`DocumentSource`]: produces the full list of [`Document`]s for one sync.
//! - [`DocumentSink`]: writes a list of [`Document`]s and reports per-file outcomes.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so tests (and downstream crates with the
//!   `test-export-mocks` feature) get `MockNotionApi`, `MockContentsApi`, etc.
//!
//! ## Errors
//! - The HTTP seams return [`ApiError`]; the pipeline surfaces [`SyncError`].

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use serde_json::Value;

/// One Markdown file ready to be written to the destination repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Relative POSIX path ending in `.md`.
    pub path: String,
    pub markdown: String,
}

impl Document {
    pub fn new(path: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            markdown: markdown.into(),
        }
    }
}

/// One page of results from a paginated Notion list endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub results: Vec<Value>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl ListPage {
    /// Builds a final (non-continued) page from a list of results.
    pub fn last(results: Vec<Value>) -> Self {
        Self {
            results,
            has_more: false,
            next_cursor: None,
        }
    }

    /// Extracts `results`, `has_more` and `next_cursor` from a list response.
    /// A missing or non-array `results` field yields an empty page.
    pub fn from_json(value: &Value) -> Self {
        let results = value
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let has_more = value
            .get("has_more")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let next_cursor = value
            .get("next_cursor")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Self {
            results,
            has_more,
            next_cursor,
        }
    }
}

/// State of a file in the destination repository, as seen just before a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    /// Server-assigned version token (the blob `sha`).
    pub digest: Option<String>,
    pub exists: bool,
}

impl RemoteFile {
    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digest: None,
            exists: false,
        }
    }

    pub fn present(path: impl Into<String>, digest: Option<String>) -> Self {
        Self {
            path: path.into(),
            digest,
            exists: true,
        }
    }

    /// The digest to send on a conditional update, if there is one.
    pub fn update_digest(&self) -> Option<&str> {
        if self.exists {
            self.digest.as_deref()
        } else {
            None
        }
    }
}

/// JSON body of `PUT /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutContents {
    pub message: String,
    /// Base64 of the UTF-8 file content.
    pub content: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Outcome of writing a batch of documents.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Paths written successfully, in write order.
    pub written: Vec<String>,
    pub failed: Vec<SyncError>,
}

/// Errors at the HTTP seams.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Pipeline error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("missing required configuration value `{0}`")]
    ConfigMissing(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("partial source read for {id}: {reason}")]
    PartialSourceRead { id: String, reason: String },
    #[error("write failed for {path}: {detail}")]
    WriteFailed {
        path: String,
        status: Option<u16>,
        detail: String,
    },
    #[error("malformed block {id}: {reason}")]
    MalformedBlock { id: String, reason: String },
}

/// Raw read access to the Notion REST API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait NotionApi: Send + Sync {
    /// `GET /databases/{id}`
    async fn get_database(&self, id: &str) -> Result<Value, ApiError>;

    /// `POST /databases/{id}/query`, one page of member pages.
    async fn query_database(
        &self,
        id: &str,
        start_cursor: Option<String>,
    ) -> Result<ListPage, ApiError>;

    /// `GET /pages/{id}`
    async fn get_page(&self, id: &str) -> Result<Value, ApiError>;

    /// `GET /blocks/{id}/children?page_size=100`, one page of child blocks.
    async fn list_block_children(
        &self,
        id: &str,
        start_cursor: Option<String>,
    ) -> Result<ListPage, ApiError>;
}

/// File access against the GitHub contents API of one repository.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentsApi: Send + Sync {
    /// `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`.
    /// A 404 is reported as an absent file, not as an error.
    async fn get_file(&self, path: &str, branch: &str) -> Result<RemoteFile, ApiError>;

    /// `PUT /repos/{owner}/{repo}/contents/{path}`
    async fn put_file(&self, path: &str, body: PutContents) -> Result<(), ApiError>;
}

/// Produces every document for one sync cycle.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_documents(&self) -> Result<Vec<Document>, SyncError>;
}

/// Writes documents to the destination. Never aborts the batch on a single failure.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentSink: Send + Sync {
    async fn upsert_all(&self, documents: Vec<Document>) -> WriteReport;
}
