//! # contract: the Content Source seam
//!
//! This module defines the single trait (`ContentSource`) through which the
//! exporter talks to the remote document store, the plain data types that flow
//! across it, and the typed failures each call can produce.
//!
//! ## Interface & Extensibility
//! - [`crate::confluence::ConfluenceClient`] is the production implementation.
//! - Tests use the generated [`MockContentSource`] (via `mockall`) or any
//!   in-memory type implementing the trait.
//! - Every method is async and returns a typed error, so callers decide
//!   whether to count, retry or escalate a failure instead of swallowing it.
//!
//! ## Error taxonomy
//! - [`SourceError`] describes *how* a call failed (timeout, HTTP status, ...).
//! - [`ConversionError`], [`DownloadError`], [`FetchError`] and
//!   [`DiscoveryError`] describe *which* call failed and for what.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

/// One entry of a paginated space listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedDocument {
    pub id: String,
    /// Ids of the document's ancestors, outermost first.
    pub ancestors: Vec<String>,
}

impl ListedDocument {
    /// A document with no ancestors is the entry point of an export subtree.
    pub fn is_root(&self) -> bool {
        self.ancestors.is_empty()
    }
}

/// A direct child reference as returned with its parent's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub id: String,
    pub title: String,
}

/// Document metadata plus its ordered direct children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub children: Vec<ChildRef>,
}

/// How a single Content Source call failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("response body is not a PDF document")]
    NotPdf,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SourceError::Timeout)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// PDF rendering failed for one document.
#[derive(Debug, Error)]
#[error("PDF conversion failed for document {document_id}: {source}")]
pub struct ConversionError {
    pub document_id: String,
    #[source]
    pub source: SourceError,
}

impl ConversionError {
    pub fn new(document_id: impl Into<String>, source: SourceError) -> Self {
        Self {
            document_id: document_id.into(),
            source,
        }
    }
}

/// Attachment listing or download failed for one document.
#[derive(Debug, Error)]
#[error("attachment download failed for document {document_id}: {source}")]
pub struct DownloadError {
    pub document_id: String,
    #[source]
    pub source: SourceError,
}

impl DownloadError {
    pub fn new(document_id: impl Into<String>, source: SourceError) -> Self {
        Self {
            document_id: document_id.into(),
            source,
        }
    }
}

/// Metadata (title and children) could not be fetched for one document.
#[derive(Debug, Error)]
#[error("metadata fetch failed for document {document_id}: {source}")]
pub struct FetchError {
    pub document_id: String,
    #[source]
    pub source: SourceError,
}

impl FetchError {
    pub fn new(document_id: impl Into<String>, source: SourceError) -> Self {
        Self {
            document_id: document_id.into(),
            source,
        }
    }
}

/// One listing page could not be retrieved.
#[derive(Debug, Error)]
#[error("listing page at offset {start} failed for site {site}: {source}")]
pub struct DiscoveryError {
    pub site: String,
    pub start: usize,
    #[source]
    pub source: SourceError,
}

impl DiscoveryError {
    pub fn new(site: impl Into<String>, start: usize, source: SourceError) -> Self {
        Self {
            site: site.into(),
            start,
            source,
        }
    }
}

/// Trait for the remote document store the archive is exported from.
///
/// Implementations must be `Send + Sync`: the exporter may drive several calls
/// concurrently when configured to.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List one page of documents in `site`, with their ancestors expanded.
    async fn list_documents(
        &self,
        site: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ListedDocument>, DiscoveryError>;

    /// Fetch a document's title and its ordered direct children.
    async fn get_document(&self, id: &str) -> Result<Document, FetchError>;

    /// Render a document as PDF bytes.
    async fn export_pdf(&self, id: &str) -> Result<Vec<u8>, ConversionError>;

    /// Download every attachment of a document into `destination`,
    /// returning the paths written.
    ///
    /// `reserved` names entries of `destination` that belong to the export
    /// itself (the document's PDF, its children's folders). An attachment
    /// must never be written under one of them.
    async fn download_attachments(
        &self,
        id: &str,
        destination: &Path,
        reserved: &[String],
    ) -> Result<Vec<PathBuf>, DownloadError>;
}
