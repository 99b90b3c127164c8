//! Confluence Server / Data Center implementation of [`ContentSource`].
//!
//! All calls use HTTP basic auth and the client-wide request timeout.
//! Endpoints used:
//! - `GET /rest/api/content?spaceKey=..&type=page&expand=ancestors` (listing)
//! - `GET /rest/api/content/{id}` and `GET /rest/api/content/{id}/child/page` (metadata)
//! - `GET /spaces/flyingpdf/pdfpageexport.action?pageId={id}` (PDF export)
//! - `GET /rest/api/content/{id}/child/attachment` plus each `_links.download` (attachments)

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{Credentials, ExportConfig};
use crate::contract::{
    ChildRef, ContentSource, ConversionError, DiscoveryError, Document, DownloadError,
    FetchError, ListedDocument, SourceError,
};
use crate::exporter::write_atomically;
use crate::sanitize::attachment_file_name;

const CHILD_PAGE_SIZE: usize = 100;
const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, Deserialize)]
struct ResultPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ContentSummary {
    id: String,
    #[serde(default)]
    ancestors: Vec<ContentId>,
}

#[derive(Debug, Deserialize)]
struct ContentId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContentTitle {
    id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    title: String,
    #[serde(rename = "_links")]
    links: AttachmentLinks,
}

#[derive(Debug, Deserialize)]
struct AttachmentLinks {
    download: String,
}

pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl ConfluenceClient {
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("confluence-archive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        info!(
            base_url,
            timeout_secs = timeout.as_secs(),
            "Initialized ConfluenceClient"
        );
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self, SourceError> {
        Self::new(
            &config.base_url,
            config.credentials.clone(),
            config.request_timeout,
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).basic_auth(
            &self.credentials.username,
            Some(&self.credentials.password),
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response, SourceError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, url, "Confluence returned an error status");
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.send(self.get(&url).query(query), &url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }

    /// Pages through a `results` endpoint until a short page comes back.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, SourceError> {
        let mut all = Vec::new();
        let mut start = 0;
        loop {
            let page: ResultPage<T> = self
                .get_json(
                    path,
                    &[
                        ("start", start.to_string()),
                        ("limit", CHILD_PAGE_SIZE.to_string()),
                    ],
                )
                .await?;
            let returned = page.results.len();
            all.extend(page.results);
            if returned < CHILD_PAGE_SIZE {
                return Ok(all);
            }
            start += returned;
        }
    }

    async fn fetch_document(&self, id: &str) -> Result<Document, SourceError> {
        let content: ContentTitle = self
            .get_json(&format!("/rest/api/content/{id}"), &[])
            .await?;
        let children: Vec<ContentTitle> = self
            .get_all(&format!("/rest/api/content/{id}/child/page"))
            .await?;
        Ok(Document {
            id: content.id,
            title: content.title,
            children: children
                .into_iter()
                .map(|c| ChildRef {
                    id: c.id,
                    title: c.title,
                })
                .collect(),
        })
    }

    async fn fetch_pdf(&self, id: &str) -> Result<Vec<u8>, SourceError> {
        let url = format!("{}/spaces/flyingpdf/pdfpageexport.action", self.base_url);
        let request = self
            .get(&url)
            .query(&[("pageId", id)])
            .header("X-Atlassian-Token", "no-check");
        let bytes = self.send(request, &url).await?.bytes().await?;
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(SourceError::NotPdf);
        }
        Ok(bytes.to_vec())
    }

    async fn fetch_attachments(
        &self,
        id: &str,
        destination: &Path,
        reserved: &[String],
    ) -> Result<Vec<PathBuf>, SourceError> {
        let attachments: Vec<Attachment> = self
            .get_all(&format!("/rest/api/content/{id}/child/attachment"))
            .await?;
        let mut written = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let Some(target) = attachment_target(destination, &attachment.title, reserved) else {
                warn!(
                    document_id = id,
                    title = %attachment.title,
                    "Attachment name collides with exported content, skipping"
                );
                continue;
            };
            let url = format!("{}{}", self.base_url, attachment.links.download);
            let bytes = self.send(self.get(&url), &url).await?.bytes().await?;
            write_atomically(destination, &target, &bytes)?;
            debug!(path = %target.display(), bytes = bytes.len(), "Attachment written");
            written.push(target);
        }
        Ok(written)
    }
}

/// Where an attachment titled `title` is written inside `destination`.
///
/// A name that is reserved or already a directory gets an `attachment-`
/// prefix; `None` when that name is taken as well.
fn attachment_target(destination: &Path, title: &str, reserved: &[String]) -> Option<PathBuf> {
    let taken = |name: &str| reserved.iter().any(|r| r == name) || destination.join(name).is_dir();
    let name = attachment_file_name(title);
    if !taken(&name) {
        return Some(destination.join(name));
    }
    let renamed = format!("attachment-{name}");
    if taken(&renamed) {
        return None;
    }
    warn!(title, renamed = %renamed, "Attachment name collides with exported content, renaming");
    Some(destination.join(renamed))
}

#[async_trait]
impl ContentSource for ConfluenceClient {
    async fn list_documents(
        &self,
        site: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ListedDocument>, DiscoveryError> {
        let page: ResultPage<ContentSummary> = self
            .get_json(
                "/rest/api/content",
                &[
                    ("spaceKey", site.to_string()),
                    ("type", "page".to_string()),
                    ("start", start.to_string()),
                    ("limit", limit.to_string()),
                    ("expand", "ancestors".to_string()),
                ],
            )
            .await
            .map_err(|e| DiscoveryError::new(site, start, e))?;
        Ok(page
            .results
            .into_iter()
            .map(|c| ListedDocument {
                id: c.id,
                ancestors: c.ancestors.into_iter().map(|a| a.id).collect(),
            })
            .collect())
    }

    async fn get_document(&self, id: &str) -> Result<Document, FetchError> {
        self.fetch_document(id)
            .await
            .map_err(|e| FetchError::new(id, e))
    }

    async fn export_pdf(&self, id: &str) -> Result<Vec<u8>, ConversionError> {
        self.fetch_pdf(id)
            .await
            .map_err(|e| ConversionError::new(id, e))
    }

    async fn download_attachments(
        &self,
        id: &str,
        destination: &Path,
        reserved: &[String],
    ) -> Result<Vec<PathBuf>, DownloadError> {
        self.fetch_attachments(id, destination, reserved)
            .await
            .map_err(|e| DownloadError::new(id, e))
    }
}
