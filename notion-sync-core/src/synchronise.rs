//! High-level pipeline: Notion page tree → Markdown documents → GitHub files.
//!
//! The [`Synchroniser`] owns one [`DocumentSource`] and one [`DocumentSink`] and runs
//! a sync cycle as:
//!   - fetch every document from the source (fatal only on root failure)
//!   - upsert them in order into the sink (per-file failures are collected)
//!   - report the written paths and a `"Synced N file(s)"` summary
//!
//! Cycles are serialized: a second trigger waits for the running one to finish, so
//! two syncs never race on the digest of the same file.
//!
//! # Navigation
//! - Main entrypoint: [`Synchroniser::sync`]
//! - Wiring for the real HTTP clients: [`Synchroniser::from_config`]

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::contract::{ApiError, Document, DocumentSink, DocumentSource, SyncError};
use crate::github::{GitHubHttpClient, GitHubWriter};
use crate::notion::{NotionHttpClient, NotionReader};

/// Outcome of one sync cycle.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Number of documents produced by the source.
    pub documents: usize,
    /// Paths written successfully, in write order.
    pub written: Vec<String>,
    pub failed: Vec<SyncError>,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        format!("Synced {} file(s)", self.written.len())
    }
}

pub struct Synchroniser {
    source: Box<dyn DocumentSource>,
    sink: Box<dyn DocumentSink>,
    running: Mutex<()>,
}

impl Synchroniser {
    pub fn new(source: Box<dyn DocumentSource>, sink: Box<dyn DocumentSink>) -> Self {
        Self {
            source,
            sink,
            running: Mutex::new(()),
        }
    }

    /// Builds the two HTTP clients (credentials as default headers) and wires them
    /// into a reader and a writer.
    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        let notion = NotionHttpClient::new(&config.notion, config.timeout)?;
        let github = GitHubHttpClient::new(&config.github, config.timeout)?;
        Ok(Self::new(
            Box::new(NotionReader::new(notion, config.notion.root_id.clone())),
            Box::new(GitHubWriter::new(github, config.github.branch.clone())),
        ))
    }

    /// Reads the documents without writing anything.
    pub async fn preview(&self) -> Result<Vec<Document>, SyncError> {
        let _guard = self.running.lock().await;
        self.source.fetch_documents().await
    }

    /// Runs one full export cycle.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let _guard = self.running.lock().await;
        info!("[SYNC] Starting Notion to GitHub synchronisation");

        let documents = match self.source.fetch_documents().await {
            Ok(documents) => documents,
            Err(e) => {
                error!(error = %e, "[SYNC][ERROR] Reading the source failed");
                return Err(e);
            }
        };
        let produced = documents.len();
        info!(documents = produced, "[SYNC] Source read complete, writing files");

        let write = self.sink.upsert_all(documents).await;
        for failure in &write.failed {
            warn!(error = %failure, "[SYNC] File not written");
        }

        let report = SyncReport {
            documents: produced,
            written: write.written,
            failed: write.failed,
        };
        info!(
            written = report.written.len(),
            failed = report.failed.len(),
            "[SYNC] {}",
            report.summary()
        );
        Ok(report)
    }
}
