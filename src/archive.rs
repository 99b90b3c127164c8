//! Site driver: orchestrates ledger check → root discovery → tree export → mark done, per site.
//!
//! Sites are processed one after another in configured order. Each site is a
//! failure boundary: whatever goes wrong inside one site is logged, recorded in
//! the [`RunReport`] and the driver moves on to the next site. A site is only
//! written to the completion ledger when every root was exported without a
//! structural error and the listing was read completely.
//!
//! # Navigation
//! - Main entrypoint: [`SiteDriver::run`]
//! - Supporting types: [`RunReport`], [`SiteReport`], [`SiteOutcome`], [`SiteError`]

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ExportConfig;
use crate::contract::ContentSource;
use crate::discovery::{discover_roots, DiscoveryOptions};
use crate::exporter::{ExportError, ExportOptions, ExportReport, TreeExporter};
use crate::ledger::{CompletionLedger, LedgerError};
use crate::progress::ProgressLog;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("site {site} is locked by another run ({path})")]
    Locked { site: String, path: PathBuf },
    #[error("could not prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("listing for site {site} is incomplete: {failed_pages} page(s) failed")]
    IncompleteDiscovery { site: String, failed_pages: usize },
    #[error("root page {root_id} of site {site} aborted: {source}")]
    Export {
        site: String,
        root_id: String,
        #[source]
        source: ExportError,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteOutcome {
    /// The ledger already listed the site; nothing was done.
    AlreadyDone,
    /// All roots exported and the site was marked done.
    Completed,
    /// The site did not reach the ledger; it will be re-run next time.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site: String,
    pub outcome: SiteOutcome,
    pub roots: usize,
    pub export: ExportReport,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub sites: Vec<SiteReport>,
}

impl RunReport {
    /// True when every site is either completed now or was already done.
    pub fn all_done(&self) -> bool {
        self.sites
            .iter()
            .all(|s| !matches!(s.outcome, SiteOutcome::Failed(_)))
    }

    pub fn failed_sites(&self) -> Vec<&str> {
        self.sites
            .iter()
            .filter(|s| matches!(s.outcome, SiteOutcome::Failed(_)))
            .map(|s| s.site.as_str())
            .collect()
    }
}

pub struct SiteDriver<'a, S: ?Sized> {
    source: &'a S,
    config: &'a ExportConfig,
    ledger: CompletionLedger,
    log: ProgressLog,
}

impl<'a, S> SiteDriver<'a, S>
where
    S: ContentSource + ?Sized,
{
    /// Driver with the ledger and progress log placed in `config.base_dir`.
    pub fn new(source: &'a S, config: &'a ExportConfig) -> Self {
        Self {
            source,
            config,
            ledger: CompletionLedger::in_dir(&config.base_dir),
            log: ProgressLog::in_dir(&config.base_dir),
        }
    }

    pub fn ledger(&self) -> &CompletionLedger {
        &self.ledger
    }

    pub fn progress_log(&self) -> &ProgressLog {
        &self.log
    }

    /// Process every configured site in order.
    pub async fn run(&self) -> RunReport {
        self.run_sites(&self.config.sites).await
    }

    /// Process the given sites in order.
    pub async fn run_sites(&self, sites: &[String]) -> RunReport {
        info!(sites = sites.len(), base_dir = %self.config.base_dir.display(), "[ARCHIVE] Starting export run");
        let mut report = RunReport::default();

        if let Err(e) = std::fs::create_dir_all(&self.config.base_dir) {
            error!(error = ?e, base_dir = %self.config.base_dir.display(), "[ARCHIVE][ERROR] Cannot create base directory");
            for site in sites {
                report.sites.push(SiteReport {
                    site: site.clone(),
                    outcome: SiteOutcome::Failed(format!(
                        "could not create base directory {}: {e}",
                        self.config.base_dir.display()
                    )),
                    roots: 0,
                    export: ExportReport::default(),
                });
            }
            return report;
        }

        self.log.log("Tool Started");
        for site in sites {
            report.sites.push(self.run_site(site).await);
        }
        info!(
            completed = report.sites.iter().filter(|s| s.outcome == SiteOutcome::Completed).count(),
            failed = report.failed_sites().len(),
            "[ARCHIVE] Export run finished"
        );
        report
    }

    /// Process one site, turning any site-level error into a `Failed` outcome.
    pub async fn run_site(&self, site: &str) -> SiteReport {
        self.log.log(&format!("- ({site}) selected"));
        let mut report = SiteReport {
            site: site.to_string(),
            outcome: SiteOutcome::Failed(String::new()),
            roots: 0,
            export: ExportReport::default(),
        };
        let outcome = match self.export_site(site, &mut report).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(site, error = %e, "[ARCHIVE][ERROR] Site failed");
                self.log.log(&format!("- ERROR site ({site}) failed: {e}"));
                SiteOutcome::Failed(e.to_string())
            }
        };
        report.outcome = outcome;
        report
    }

    async fn export_site(&self, site: &str, report: &mut SiteReport) -> Result<SiteOutcome, SiteError> {
        self.log.log(&format!(
            "- Checking to see if ({site}) has been completed."
        ));
        if self.ledger.is_done(site) {
            self.log.log(&format!("- ({site}) has been completed."));
            return Ok(SiteOutcome::AlreadyDone);
        }
        self.log.log(&format!("- ({site}) has not been completed."));

        let _lock = SiteLock::acquire(&self.config.base_dir, site)?;
        self.export_locked(site, report).await
    }

    /// The rest of a site's export, run while its lock is held. Another run
    /// may have finished the site before the lock was taken, so the ledger is
    /// consulted again first.
    async fn export_locked(&self, site: &str, report: &mut SiteReport) -> Result<SiteOutcome, SiteError> {
        if self.ledger.is_done(site) {
            info!(site, "[ARCHIVE] Site completed by another run while waiting for its lock");
            self.log.log(&format!("- ({site}) has been completed."));
            return Ok(SiteOutcome::AlreadyDone);
        }

        let discovery = discover_roots(
            self.source,
            site,
            &DiscoveryOptions::from(self.config),
            &self.log,
        )
        .await;
        report.roots = discovery.roots.len();

        let site_dir = self.config.base_dir.join(site);
        let exporter = TreeExporter::new(self.source, &self.log, ExportOptions::from(self.config));
        let mut first_abort: Option<SiteError> = None;
        for (root_id, result) in exporter
            .export_roots(site, &discovery.roots, &site_dir)
            .await
        {
            match result {
                Ok(tree) => report.export += &tree,
                Err(source) => {
                    warn!(site, root_id = %root_id, error = %source, "[ARCHIVE] Root export aborted");
                    if first_abort.is_none() {
                        first_abort = Some(SiteError::Export {
                            site: site.to_string(),
                            root_id,
                            source,
                        });
                    }
                }
            }
        }
        info!(site, report = ?report.export, "[ARCHIVE] Site export pass finished");

        if let Some(abort) = first_abort {
            return Err(abort);
        }
        if !discovery.is_complete() {
            return Err(SiteError::IncompleteDiscovery {
                site: site.to_string(),
                failed_pages: discovery.failed_pages.len(),
            });
        }

        self.ledger.mark_done(site)?;
        self.log.log(&format!("- Site ({site}) complete"));
        Ok(SiteOutcome::Completed)
    }
}

/// Advisory lock on `<base>/.<site>.lock`, held while a site is exported so
/// two overlapping runs never work on the same site.
struct SiteLock {
    file: File,
}

impl SiteLock {
    fn acquire(base_dir: &Path, site: &str) -> Result<Self, SiteError> {
        let path = base_dir.join(format!(".{site}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| SiteError::Io {
                path: path.clone(),
                source,
            })?;
        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(SiteError::Locked {
                site: site.to_string(),
                path,
            });
        }
        Ok(Self { file })
    }
}

impl Drop for SiteLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = ?e, "Failed to release site lock");
        }
    }
}
