use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_PAGES: usize = 20;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CONCURRENCY: usize = 1;
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Username/secret pair for the Content Source. `Debug` never prints the secret.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration injected into every component of an export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub base_url: String,
    pub base_dir: PathBuf,
    /// Site keys in the order they are processed.
    pub sites: Vec<String>,
    pub page_size: usize,
    pub max_pages: usize,
    pub request_timeout: Duration,
    /// Cap on in-flight Content Source calls; 1 keeps the run sequential.
    pub concurrency: usize,
    pub max_depth: usize,
    pub credentials: Credentials,
}

impl ExportConfig {
    pub fn new(
        base_url: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        sites: Vec<String>,
        credentials: Credentials,
    ) -> Self {
        let mut config = Self {
            base_url: base_url.into(),
            base_dir: base_dir.into(),
            sites: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
            credentials,
        };
        config.set_sites(sites);
        config
    }

    /// Replace the site list, keeping first occurrences in declared order.
    pub fn set_sites(&mut self, sites: Vec<String>) {
        let mut unique: Vec<String> = Vec::with_capacity(sites.len());
        for site in sites {
            let site = site.trim().to_string();
            if !site.is_empty() && !unique.contains(&site) {
                unique.push(site);
            }
        }
        self.sites = unique;
    }

    /// Upper bound on documents root discovery will list per site.
    pub fn listing_bound(&self) -> usize {
        self.page_size.saturating_mul(self.max_pages)
    }

    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.base_url,
            base_dir = %self.base_dir.display(),
            sites_count = self.sites.len(),
            page_size = self.page_size,
            max_pages = self.max_pages,
            timeout_secs = self.request_timeout.as_secs(),
            concurrency = self.concurrency,
            username = %self.credentials.username,
            password_set = !self.credentials.password.is_empty(),
            "Loaded ExportConfig"
        );
        debug!(?self, "ExportConfig loaded (full debug)");
    }
}
