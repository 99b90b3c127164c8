//! Root discovery: page through a site's listing and keep the top-level documents.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ExportConfig, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT};
use crate::contract::{ContentSource, DiscoveryError, SourceError};
use crate::progress::ProgressLog;

/// Pagination settings for one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub page_size: usize,
    /// Hard bound on listing calls; `page_size * max_pages` must cover the largest site.
    pub max_pages: usize,
    pub request_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl From<&ExportConfig> for DiscoveryOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
            request_timeout: config.request_timeout,
        }
    }
}

/// Outcome of discovery for one site.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Root document ids, deduplicated, in first-seen order.
    pub roots: Vec<String>,
    /// Number of listing entries seen, duplicates included.
    pub listed: usize,
    pub failed_pages: Vec<DiscoveryError>,
}

impl Discovery {
    /// False when at least one listing page could not be read, in which case
    /// `roots` may be missing documents.
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }
}

/// Collects the ids of every document in `site` that has no ancestors.
///
/// Pages are requested at offsets `0, page_size, 2 * page_size, ...` for at
/// most `max_pages` calls. Listing stops early on the first page shorter than
/// `page_size`. A failed page is logged, recorded and skipped.
pub async fn discover_roots<S>(
    source: &S,
    site: &str,
    options: &DiscoveryOptions,
    log: &ProgressLog,
) -> Discovery
where
    S: ContentSource + ?Sized,
{
    let mut discovery = Discovery::default();
    let mut seen: HashSet<String> = HashSet::new();

    for page in 0..options.max_pages {
        let start = page * options.page_size;
        let listed = tokio::time::timeout(
            options.request_timeout,
            source.list_documents(site, start, options.page_size),
        )
        .await
        .unwrap_or_else(|_| Err(DiscoveryError::new(site, start, SourceError::Timeout)));

        let documents = match listed {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, site, start, "Listing page failed");
                log.log(&format!(
                    "- ERROR listing pages of ({site}) from offset {start} failed: {e}"
                ));
                discovery.failed_pages.push(e);
                continue;
            }
        };

        let returned = documents.len();
        debug!(site, start, returned, "Listed documents");
        discovery.listed += returned;
        for document in documents {
            if document.is_root() && seen.insert(document.id.clone()) {
                discovery.roots.push(document.id);
            }
        }

        if returned < options.page_size {
            break;
        }
    }

    info!(
        site,
        roots = discovery.roots.len(),
        listed = discovery.listed,
        failed_pages = discovery.failed_pages.len(),
        "Root discovery finished"
    );
    discovery
}
