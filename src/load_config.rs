//! `load_config` module: loads a static YAML config and injects credentials from
//! the environment, producing the runtime [`ExportConfig`].
//!
//! The YAML file never holds secrets. Credentials come from
//! `CONFLUENCE_USER`/`CONFLUENCE_PASSWORD`, falling back to `OP_USER`/`OP_PASS`.
//!
//! ```yaml
//! base_url: "http://confluence.internal:8090"
//! base_dir: /srv/archive
//! sites: [DOCS, OPS]
//! page_size: 100            # optional
//! max_pages: 20             # optional
//! request_timeout_secs: 120 # optional
//! concurrency: 1            # optional
//! max_depth: 256            # optional
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::config::{Credentials, ExportConfig};

pub const USER_ENV: &str = "CONFLUENCE_USER";
pub const PASSWORD_ENV: &str = "CONFLUENCE_PASSWORD";
pub const LEGACY_USER_ENV: &str = "OP_USER";
pub const LEGACY_PASSWORD_ENV: &str = "OP_PASS";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: String,
    base_dir: PathBuf,
    sites: Vec<String>,
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default)]
    max_pages: Option<usize>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    max_depth: Option<usize>,
}

/// Loads a static YAML config file and merges in environment credentials.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ExportConfig> {
    let credentials = credentials_from_env()?;
    load_config_with_credentials(path, credentials)
}

/// Loads a static YAML config file using the given credentials.
pub fn load_config_with_credentials<P: AsRef<Path>>(
    path: P,
    credentials: Credentials,
) -> Result<ExportConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let raw: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;

    let config = build_config(raw, credentials)?;
    config.trace_loaded();
    Ok(config)
}

/// Reads the Content Source credentials from the environment.
pub fn credentials_from_env() -> Result<Credentials> {
    let username = env_with_fallback(USER_ENV, LEGACY_USER_ENV)
        .with_context(|| format!("{USER_ENV} (or {LEGACY_USER_ENV}) environment variable not set"))?;
    let password = env_with_fallback(PASSWORD_ENV, LEGACY_PASSWORD_ENV).with_context(|| {
        format!("{PASSWORD_ENV} (or {LEGACY_PASSWORD_ENV}) environment variable not set")
    })?;
    info!(username = %username, "Credentials found in env");
    Ok(Credentials { username, password })
}

/// Site keys double as directory names and ledger records.
pub fn validate_site_key(site: &str) -> Result<()> {
    if site.contains(['/', '\\', ',']) || site.starts_with('.') {
        bail!("site key {site:?} cannot be used as a directory name");
    }
    Ok(())
}

fn env_with_fallback(primary: &str, legacy: &str) -> Option<String> {
    [primary, legacy]
        .into_iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

fn build_config(raw: FileConfig, credentials: Credentials) -> Result<ExportConfig> {
    if raw.base_url.trim().is_empty() {
        bail!("base_url must not be empty");
    }
    let mut config = ExportConfig::new(
        raw.base_url.trim_end_matches('/'),
        raw.base_dir,
        raw.sites,
        credentials,
    );
    if config.sites.is_empty() {
        bail!("at least one site key must be configured");
    }
    for site in &config.sites {
        validate_site_key(site)?;
    }
    if let Some(page_size) = raw.page_size {
        config.page_size = page_size;
    }
    if let Some(max_pages) = raw.max_pages {
        config.max_pages = max_pages;
    }
    if let Some(secs) = raw.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(concurrency) = raw.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(max_depth) = raw.max_depth {
        config.max_depth = max_depth;
    }
    for (name, value) in [
        ("page_size", config.page_size),
        ("max_pages", config.max_pages),
        ("concurrency", config.concurrency),
        ("max_depth", config.max_depth),
    ] {
        if value == 0 {
            error!(field = name, "Config value must be greater than zero");
            bail!("{name} must be greater than zero");
        }
    }
    if config.request_timeout.is_zero() {
        bail!("request_timeout_secs must be greater than zero");
    }
    Ok(config)
}
