use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::contract::SyncError;

pub const DEFAULT_GITHUB_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the Notion API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotionConfig {
    pub base_url: String,
    pub api_key: String,
    /// Value of the `Notion-Version` header.
    pub version: String,
    /// Page or database id the export starts from.
    pub root_id: String,
}

/// Target repository and credentials for the GitHub contents API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub base_url: String,
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

/// Fully validated configuration for one exporter process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub notion: NotionConfig,
    pub github: GitHubConfig,
    pub timeout: Duration,
}

impl SyncConfig {
    pub fn trace_loaded(&self) {
        info!(
            notion_base_url = %self.notion.base_url,
            root_id = %self.notion.root_id,
            owner = %self.github.owner,
            repo = %self.github.repo,
            branch = %self.github.branch,
            timeout_secs = self.timeout.as_secs(),
            "Loaded SyncConfig"
        );
        debug!(notion_version = %self.notion.version, github_base_url = %self.github.base_url, "SyncConfig details");
    }
}

/// `source:` section as written in the config file. Every field may be absent
/// so that secrets can be supplied from the environment instead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawSourceSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub version: Option<String>,
    pub root_id: Option<String>,
}

/// `destination:` section as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawDestinationSection {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
}

/// Unvalidated configuration, as deserialized from YAML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawSyncConfig {
    #[serde(default)]
    pub source: RawSourceSection,
    #[serde(default)]
    pub destination: RawDestinationSection,
    pub timeout_secs: Option<u64>,
}

fn required(value: Option<String>, key: &str) -> Result<String, SyncError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(SyncError::ConfigMissing(key.to_string())),
    }
}

impl RawSyncConfig {
    /// Checks that every required value is present and non-blank.
    pub fn validate(self) -> Result<SyncConfig, SyncError> {
        let source = self.source;
        let destination = self.destination;

        let notion = NotionConfig {
            base_url: required(source.base_url, "source.base-url")?
                .trim_end_matches('/')
                .to_string(),
            api_key: required(source.api_key, "source.api-key")?,
            version: required(source.version, "source.version")?,
            root_id: required(source.root_id, "source.root-id")?,
        };

        let github = GitHubConfig {
            base_url: destination
                .base_url
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GITHUB_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: required(destination.token, "destination.token")?,
            owner: required(destination.owner, "destination.owner")?,
            repo: required(destination.repo, "destination.repo")?,
            branch: required(destination.branch, "destination.branch")?,
        };

        Ok(SyncConfig {
            notion,
            github,
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}
