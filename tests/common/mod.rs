//! In-memory Content Source used by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use confluence_archive::contract::{
    ChildRef, ContentSource, ConversionError, DiscoveryError, Document, DownloadError,
    FetchError, ListedDocument, SourceError,
};

#[derive(Clone)]
struct Node {
    title: String,
    children: Vec<String>,
    ancestors: Vec<String>,
    site: String,
}

/// A document tree held in memory, with switches for injecting failures and
/// counters for every call made.
#[derive(Default)]
pub struct FakeSource {
    nodes: HashMap<String, Node>,
    order: Vec<String>,
    pub fail_conversion: HashSet<String>,
    pub fail_fetch: HashSet<String>,
    pub fail_attachments: HashSet<String>,
    pub fail_listing_sites: HashSet<String>,
    pub attachments: HashMap<String, Vec<(String, Vec<u8>)>>,
    pub conversion_delay: Option<Duration>,
    calls: Mutex<Calls>,
}

#[derive(Default, Debug, Clone)]
pub struct Calls {
    pub listings: Vec<(String, usize)>,
    pub fetches: Vec<String>,
    pub conversions: Vec<String>,
    pub attachment_downloads: Vec<String>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root document to `site`.
    pub fn root(&mut self, site: &str, id: &str, title: &str) -> &mut Self {
        self.insert(site, id, title, Vec::new());
        self
    }

    /// Adds a child under `parent`, appended after its existing children.
    pub fn child(&mut self, parent: &str, id: &str, title: &str) -> &mut Self {
        let parent_node = self.nodes.get_mut(parent).expect("parent must exist");
        parent_node.children.push(id.to_string());
        let mut ancestors = parent_node.ancestors.clone();
        ancestors.push(parent.to_string());
        let site = parent_node.site.clone();
        self.insert(&site, id, title, ancestors);
        self
    }

    /// Adds `parent -> child` edge between two existing nodes (for cycles).
    pub fn link(&mut self, parent: &str, child: &str) -> &mut Self {
        self.nodes
            .get_mut(parent)
            .expect("parent must exist")
            .children
            .push(child.to_string());
        self
    }

    fn insert(&mut self, site: &str, id: &str, title: &str, ancestors: Vec<String>) {
        self.nodes.insert(
            id.to_string(),
            Node {
                title: title.to_string(),
                children: Vec::new(),
                ancestors,
                site: site.to_string(),
            },
        );
        self.order.push(id.to_string());
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn pdf_bytes(id: &str) -> Vec<u8> {
        format!("%PDF-1.4 document {id}").into_bytes()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn list_documents(
        &self,
        site: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<ListedDocument>, DiscoveryError> {
        self.calls
            .lock()
            .unwrap()
            .listings
            .push((site.to_string(), start));
        if self.fail_listing_sites.contains(site) {
            return Err(DiscoveryError::new(
                site,
                start,
                SourceError::Http {
                    status: 503,
                    url: "fake://listing".into(),
                },
            ));
        }
        Ok(self
            .order
            .iter()
            .filter(|id| self.nodes[*id].site == site)
            .skip(start)
            .take(limit)
            .map(|id| ListedDocument {
                id: id.clone(),
                ancestors: self.nodes[id].ancestors.clone(),
            })
            .collect())
    }

    async fn get_document(&self, id: &str) -> Result<Document, FetchError> {
        self.calls.lock().unwrap().fetches.push(id.to_string());
        if self.fail_fetch.contains(id) {
            return Err(FetchError::new(id, SourceError::Transport("boom".into())));
        }
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| FetchError::new(id, SourceError::Http { status: 404, url: id.into() }))?;
        Ok(Document {
            id: id.to_string(),
            title: node.title.clone(),
            children: node
                .children
                .iter()
                .map(|child| ChildRef {
                    id: child.clone(),
                    title: self.nodes[child].title.clone(),
                })
                .collect(),
        })
    }

    async fn export_pdf(&self, id: &str) -> Result<Vec<u8>, ConversionError> {
        self.calls.lock().unwrap().conversions.push(id.to_string());
        if let Some(delay) = self.conversion_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_conversion.contains(id) {
            return Err(ConversionError::new(
                id,
                SourceError::Http {
                    status: 500,
                    url: "fake://pdf".into(),
                },
            ));
        }
        Ok(Self::pdf_bytes(id))
    }

    async fn download_attachments(
        &self,
        id: &str,
        destination: &Path,
        reserved: &[String],
    ) -> Result<Vec<PathBuf>, DownloadError> {
        self.calls
            .lock()
            .unwrap()
            .attachment_downloads
            .push(id.to_string());
        if self.fail_attachments.contains(id) {
            return Err(DownloadError::new(id, SourceError::Timeout));
        }
        let mut written = Vec::new();
        for (name, bytes) in self.attachments.get(id).cloned().unwrap_or_default() {
            if reserved.contains(&name) {
                continue;
            }
            std::fs::create_dir_all(destination).map_err(|e| DownloadError::new(id, e.into()))?;
            let path = destination.join(name);
            std::fs::write(&path, bytes).map_err(|e| DownloadError::new(id, e.into()))?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Every regular file under `root`, as sorted paths relative to `root`.
pub fn files_under(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let rel = path.strip_prefix(root).unwrap();
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
