//! Completion ledger: the append-only list of sites whose export finished.
//!
//! The file holds site keys each followed by a comma (`"Alpha,Beta,"`).
//! Presence of a key means "do not reprocess"; there is no record of partial
//! progress inside a site.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

pub const LEDGER_FILE: &str = "sites_done.csv";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read completion ledger {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append to completion ledger {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("site key {0:?} cannot be stored in the ledger")]
    InvalidKey(String),
}

#[derive(Debug)]
pub struct CompletionLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CompletionLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_dir(base_dir: &Path) -> Self {
        Self::new(base_dir.join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recorded site key, in file order. A missing ledger is empty.
    pub fn done_sites(&self) -> Result<Vec<String>, LedgerError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LedgerError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(content
            .split([',', '\n', '\r'])
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Whether `site` was recorded as done. Scans every record.
    ///
    /// Fails open: an unreadable ledger is logged and treated as "not done",
    /// so the site is exported (again) rather than silently skipped.
    pub fn is_done(&self, site: &str) -> bool {
        match self.done_sites() {
            Ok(sites) => sites.iter().any(|s| s == site),
            Err(e) => {
                tracing::warn!(error = %e, site, "Completion ledger unreadable, treating site as not done");
                false
            }
        }
    }

    /// Append `site` to the ledger.
    pub fn mark_done(&self, site: &str) -> Result<(), LedgerError> {
        if site.trim().is_empty() || site.contains([',', '\n', '\r']) {
            return Err(LedgerError::InvalidKey(site.to_string()));
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let write_err = |source| LedgerError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(format!("{site},").as_bytes())
            .map_err(write_err)?;
        file.sync_data().map_err(write_err)?;
        tracing::info!(site, ledger = %self.path.display(), "Marked site as done");
        Ok(())
    }
}
