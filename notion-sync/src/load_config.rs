/// `load_config` module: Loads a static YAML config, injects secrets from the environment and
/// validates the result into the core [`SyncConfig`].
///
/// This module is the only place where untrusted YAML is parsed.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into the raw core config
/// - Overlay secrets from the environment (`NOTION_API_KEY`, `GITHUB_TOKEN`)
/// - Fail with a clear message naming the missing key when validation fails
///
/// # Errors
/// All errors use `anyhow::Error` for context-rich diagnostics and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use notion_sync_core::config::{RawSyncConfig, SyncConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const NOTION_API_KEY_ENV: &str = "NOTION_API_KEY";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSection {
    pub port: Option<u16>,
}

/// Everything the CLI needs: the validated sync config plus server settings.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub sync: SyncConfig,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct RawConfigFile {
    #[serde(flatten)]
    sync: RawSyncConfig,
    #[serde(default)]
    server: ServerSection,
}

fn env_secret(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parses YAML text, applies the environment overlay and validates.
pub fn parse_config(yaml: &str) -> Result<CliConfig> {
    let mut raw: RawConfigFile = match serde_yaml::from_str(yaml) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Some(key) = env_secret(NOTION_API_KEY_ENV) {
        info!(env = NOTION_API_KEY_ENV, "Using Notion API key from environment");
        raw.sync.source.api_key = Some(key);
    }
    if let Some(token) = env_secret(GITHUB_TOKEN_ENV) {
        info!(env = GITHUB_TOKEN_ENV, "Using GitHub token from environment");
        raw.sync.destination.token = Some(token);
    }

    let sync = raw.sync.validate().map_err(|e| {
        error!(error = %e, "Configuration is incomplete");
        anyhow::Error::new(e)
    })?;
    sync.trace_loaded();

    Ok(CliConfig {
        sync,
        port: raw.server.port.unwrap_or(DEFAULT_PORT),
    })
}

/// Loads a YAML config file (secrets may be left out and supplied via env vars).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;
    parse_config(&content)
}
