#![doc = "confluence-archive: resumable export of Confluence spaces into a mirrored PDF archive."]

//! The crate walks every configured site (Confluence space), discovers its
//! top-level pages, and exports each page tree as a folder hierarchy of PDFs
//! with the pages' attachments beside them.
//!
//! # Pipeline
//! [`archive::SiteDriver`] → [`ledger::CompletionLedger`] (skip done sites) →
//! [`discovery::discover_roots`] → [`exporter::TreeExporter`] → ledger update,
//! with [`progress::ProgressLog`] recording every step.
//!
//! The remote store is reached only through [`contract::ContentSource`];
//! [`confluence::ConfluenceClient`] is the HTTP implementation.

pub mod archive;
pub mod cli;
pub mod config;
pub mod confluence;
pub mod contract;
pub mod discovery;
pub mod exporter;
pub mod ledger;
pub mod load_config;
pub mod progress;
pub mod sanitize;

pub use cli::{run, Cli, Commands};
