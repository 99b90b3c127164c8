//! Append-only, timestamped progress log.
//!
//! Lines look like `"10/19/2026, 14:03:11 | - File created (/archive/DOCS/Home/Home.pdf)\r\n"`.
//! The program never reads this file back; it exists for after-the-fact
//! diagnosis. Every line is mirrored as a `tracing` event.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

pub const PROGRESS_LOG_FILE: &str = "pdf-export-log.log";
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// Shared progress log. Appends are serialised, so one instance can be used
/// by concurrent export workers.
#[derive(Debug)]
pub struct ProgressLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProgressLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The log file inside an export base directory.
    pub fn in_dir(base_dir: &Path) -> Self {
        Self::new(base_dir.join(PROGRESS_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. A failed write is reported through `tracing` and
    /// otherwise ignored; it never interrupts the export.
    pub fn log(&self, message: &str) {
        tracing::info!(target: "progress", "{message}");
        if let Err(e) = self.append(message) {
            tracing::warn!(
                error = ?e,
                path = %self.path.display(),
                "Failed to append to progress log"
            );
        }
    }

    fn append(&self, message: &str) -> std::io::Result<()> {
        let line = format!("{} | {}\r\n", Local::now().format(TIMESTAMP_FORMAT), message);
        // A poisoned lock only means another writer panicked mid-append.
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
