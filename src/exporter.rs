//! Tree exporter: walks a document and all of its descendants, writing one PDF
//! per document plus its attachments into a folder hierarchy that mirrors the
//! document tree.
//!
//! # Layout
//! Every document gets its own folder named after its sanitized title. The
//! PDF sits inside that folder, and child folders sit next to it:
//!
//! ```text
//! <site_dir>/Root/Root.pdf
//! <site_dir>/Root/ChildA/ChildA.pdf
//! <site_dir>/Root/ChildB/ChildB.pdf
//! ```
//!
//! # Failure isolation
//! Metadata fetch, conversion and attachment download are isolated per
//! document: a failure is logged, counted in the [`ExportReport`] and the walk
//! moves on. Only structural problems ([`ExportError`]) abort a tree.
//!
//! # Resumability
//! A PDF that already exists is never requested again. New PDFs are written to
//! a temporary file in the destination folder and renamed into place once
//! complete, so an interrupted run never leaves a truncated `.pdf` behind.

use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::{ExportConfig, DEFAULT_CONCURRENCY, DEFAULT_MAX_DEPTH, DEFAULT_REQUEST_TIMEOUT};
use crate::contract::{ContentSource, ConversionError, FetchError, SourceError};
use crate::progress::ProgressLog;
use crate::sanitize::sanitize;

/// Structural failures that abort the export of one tree.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cycle detected: document {document_id} appears in its own ancestor chain {chain:?}")]
    CycleDetected {
        document_id: String,
        chain: Vec<String>,
    },
    #[error("document {document_id} is nested deeper than {max_depth} levels")]
    DepthExceeded {
        document_id: String,
        max_depth: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub request_timeout: Duration,
    /// Cap on in-flight Content Source calls, and on root trees exported at once.
    pub concurrency: usize,
    pub max_depth: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl From<&ExportConfig> for ExportOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            concurrency: config.concurrency,
            max_depth: config.max_depth,
        }
    }
}

/// Counters describing what one export did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub documents: usize,
    pub converted: usize,
    pub skipped: usize,
    pub conversion_failures: usize,
    pub write_failures: usize,
    pub attachments: usize,
    pub attachment_failures: usize,
    pub fetch_failures: usize,
    pub collisions: usize,
}

impl ExportReport {
    /// Number of per-document problems that were logged and skipped.
    pub fn failures(&self) -> usize {
        self.conversion_failures
            + self.write_failures
            + self.attachment_failures
            + self.fetch_failures
            + self.collisions
    }
}

impl AddAssign<&ExportReport> for ExportReport {
    fn add_assign(&mut self, other: &ExportReport) {
        self.documents += other.documents;
        self.converted += other.converted;
        self.skipped += other.skipped;
        self.conversion_failures += other.conversion_failures;
        self.write_failures += other.write_failures;
        self.attachments += other.attachments;
        self.attachment_failures += other.attachment_failures;
        self.fetch_failures += other.fetch_failures;
        self.collisions += other.collisions;
    }
}

/// Where a document's folder lives.
enum Placement {
    /// The folder is already known (computed by the parent from the child's title).
    Folder(PathBuf),
    /// The folder is `<parent>/<sanitized fetched title>`; used for roots.
    NamedIn(PathBuf),
}

struct Frame {
    id: String,
    placement: Placement,
    /// Ids from the tree's root down to this document's parent.
    chain: Vec<String>,
}

pub struct TreeExporter<'a, S: ?Sized> {
    source: &'a S,
    log: &'a ProgressLog,
    options: ExportOptions,
    permits: Semaphore,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl<'a, S> TreeExporter<'a, S>
where
    S: ContentSource + ?Sized,
{
    pub fn new(source: &'a S, log: &'a ProgressLog, options: ExportOptions) -> Self {
        let permits = Semaphore::new(options.concurrency.max(1));
        Self {
            source,
            log,
            options,
            permits,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Export `document_id` and its descendants with `destination` as the
    /// document's own folder: the PDF lands at
    /// `destination/<sanitized title>.pdf` and each child at
    /// `destination/<sanitized child title>/`.
    pub async fn export_tree(
        &self,
        document_id: &str,
        destination: &Path,
    ) -> Result<ExportReport, ExportError> {
        self.walk(document_id, Placement::Folder(destination.to_path_buf()))
            .await
    }

    /// Export a root document into a folder named after it inside `site_dir`.
    pub async fn export_root(
        &self,
        document_id: &str,
        site_dir: &Path,
    ) -> Result<ExportReport, ExportError> {
        self.walk(document_id, Placement::NamedIn(site_dir.to_path_buf()))
            .await
    }

    /// Export several roots, at most `concurrency` trees at a time. Results
    /// come back in the order of `roots`.
    pub async fn export_roots(
        &self,
        site: &str,
        roots: &[String],
        site_dir: &Path,
    ) -> Vec<(String, Result<ExportReport, ExportError>)> {
        stream::iter(roots)
            .map(|root| async move {
                self.log.log(&format!(
                    "- Beginning work on ({site}) with root page ({root})"
                ));
                (root.clone(), self.export_root(root, site_dir).await)
            })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    async fn walk(&self, root_id: &str, placement: Placement) -> Result<ExportReport, ExportError> {
        let mut report = ExportReport::default();
        let mut stack = vec![Frame {
            id: root_id.to_string(),
            placement,
            chain: Vec::new(),
        }];

        while let Some(frame) = stack.pop() {
            if frame.chain.iter().any(|ancestor| ancestor == &frame.id) {
                error!(document_id = %frame.id, chain = ?frame.chain, "Cycle detected in document tree");
                self.log.log(&format!(
                    "- ERROR cycle detected at page ({}), aborting this tree",
                    frame.id
                ));
                return Err(ExportError::CycleDetected {
                    document_id: frame.id,
                    chain: frame.chain,
                });
            }
            if frame.chain.len() >= self.options.max_depth {
                error!(document_id = %frame.id, max_depth = self.options.max_depth, "Document tree too deep");
                self.log.log(&format!(
                    "- ERROR page ({}) is nested too deep, aborting this tree",
                    frame.id
                ));
                return Err(ExportError::DepthExceeded {
                    document_id: frame.id,
                    max_depth: self.options.max_depth,
                });
            }

            report.documents += 1;
            let document = match self
                .guarded(self.source.get_document(&frame.id), || {
                    FetchError::new(frame.id.as_str(), SourceError::Timeout)
                })
                .await
            {
                Ok(document) => document,
                Err(e) => {
                    warn!(error = %e, document_id = %frame.id, "Skipping subtree, metadata unavailable");
                    self.log.log(&format!(
                        "- ERROR could not fetch page ({}), skipping it and its children",
                        frame.id
                    ));
                    report.fetch_failures += 1;
                    continue;
                }
            };

            let segment = path_segment(&document.title, &document.id);
            let folder = match frame.placement {
                Placement::Folder(folder) => folder,
                Placement::NamedIn(parent) => parent.join(&segment),
            };
            debug!(document_id = %document.id, folder = %folder.display(), "Exporting document");

            let pdf_name = format!("{segment}.pdf");
            self.convert(&document.id, &pdf_name, &folder, &mut report)
                .await;

            let child_segments: Vec<String> = document
                .children
                .iter()
                .map(|child| path_segment(&child.title, &child.id))
                .collect();
            let mut reserved = child_segments.clone();
            reserved.push(pdf_name);
            self.attachments(&document.id, &folder, &reserved, &mut report)
                .await;

            let mut chain = frame.chain;
            chain.push(document.id);
            // Reversed so the first child is popped first.
            for (child, segment) in document.children.into_iter().zip(child_segments).rev() {
                let child_folder = folder.join(segment);
                stack.push(Frame {
                    id: child.id,
                    placement: Placement::Folder(child_folder),
                    chain: chain.clone(),
                });
            }
        }

        Ok(report)
    }

    async fn convert(&self, id: &str, pdf_name: &str, folder: &Path, report: &mut ExportReport) {
        let full_path = folder.join(pdf_name);
        if full_path.is_file() {
            self.log
                .log(&format!("- File found, skipping ({})", full_path.display()));
            report.skipped += 1;
            return;
        }

        let Some(_claim) = PathClaim::acquire(&self.in_flight, &full_path) else {
            warn!(path = %full_path.display(), document_id = id, "Another document is writing the same path");
            self.log.log(&format!(
                "- ERROR name collision, another page is already writing ({})",
                full_path.display()
            ));
            report.collisions += 1;
            return;
        };

        self.log
            .log(&format!("Working on File ({})", full_path.display()));
        let pdf = self
            .guarded(self.source.export_pdf(id), || {
                ConversionError::new(id, SourceError::Timeout)
            })
            .await;
        let bytes = match pdf {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, path = %full_path.display(), "PDF conversion failed");
                self.log.log(&format!(
                    "- ERROR PDF not created for file ({})",
                    full_path.display()
                ));
                report.conversion_failures += 1;
                return;
            }
        };

        match write_atomically(folder, &full_path, &bytes) {
            Ok(()) => {
                info!(path = %full_path.display(), bytes = bytes.len(), "PDF written");
                self.log
                    .log(&format!("- File created ({})", full_path.display()));
                report.converted += 1;
            }
            Err(e) => {
                error!(error = ?e, path = %full_path.display(), "Failed to write PDF");
                self.log.log(&format!(
                    "- ERROR PDF not written for file ({}): {e}",
                    full_path.display()
                ));
                report.write_failures += 1;
            }
        }
    }

    /// Attachments are one listing plus one request per file, so the batch
    /// only takes a permit; each request is bounded by the source itself.
    async fn attachments(
        &self,
        id: &str,
        folder: &Path,
        reserved: &[String],
        report: &mut ExportReport,
    ) {
        let downloaded = {
            let _permit = self.permits.acquire().await.ok();
            self.source.download_attachments(id, folder, reserved).await
        };
        match downloaded {
            Ok(paths) => {
                debug!(document_id = id, count = paths.len(), "Attachments downloaded");
                report.attachments += paths.len();
                self.log.log("-- Downloaded attachments for this page");
            }
            Err(e) => {
                warn!(error = %e, document_id = id, "Attachment download failed");
                self.log
                    .log("-- Downloading attachments for this page failed.");
                report.attachment_failures += 1;
            }
        }
    }

    /// Run one Content Source call under the concurrency cap and the per-call timeout.
    async fn guarded<T, E, F>(&self, call: F, on_timeout: impl FnOnce() -> E) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        // The semaphore is never closed, so a permit is always eventually granted.
        let _permit = self.permits.acquire().await.ok();
        match tokio::time::timeout(self.options.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout()),
        }
    }
}

/// Path segment for a document: its sanitized title, or its id when the
/// title has no alphanumeric characters at all.
fn path_segment(title: &str, id: &str) -> String {
    let segment = sanitize(title);
    if !segment.is_empty() {
        return segment;
    }
    let fallback = sanitize(id);
    if fallback.is_empty() {
        "untitled".to_string()
    } else {
        fallback
    }
}

/// Write `bytes` to a temporary file in `folder`, then rename it onto `target`.
pub(crate) fn write_atomically(folder: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(folder)?;
    let mut tmp = NamedTempFile::new_in(folder)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Exclusive claim on a target path for the lifetime of the guard.
struct PathClaim<'m> {
    set: &'m Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl<'m> PathClaim<'m> {
    fn acquire(set: &'m Mutex<HashSet<PathBuf>>, path: &Path) -> Option<Self> {
        let mut claimed = set.lock().unwrap_or_else(|p| p.into_inner());
        if !claimed.insert(path.to_path_buf()) {
            return None;
        }
        Some(Self {
            set,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PathClaim<'_> {
    fn drop(&mut self) {
        let mut claimed = self.set.lock().unwrap_or_else(|p| p.into_inner());
        claimed.remove(&self.path);
    }
}
