//! Command line surface for confluence-archive.
//!
//! - `export --config <file> [--site KEY]...` runs the site driver.
//! - `status --config <file>` prints which configured sites the completion
//!   ledger marks as done.
//!
//! [`run`] returns an error when any processed site failed to reach the
//! ledger, so the binary exits non-zero in that case.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::archive::{SiteDriver, SiteOutcome};
use crate::config::Credentials;
use crate::confluence::ConfluenceClient;
use crate::ledger::CompletionLedger;
use crate::load_config::{load_config, load_config_with_credentials, validate_site_key};

/// CLI for confluence-archive: mirror Confluence spaces as PDF folder trees.
#[derive(Parser)]
#[clap(
    name = "confluence-archive",
    version,
    about = "Export Confluence spaces into a resumable on-disk PDF archive"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export every configured site that is not yet marked done
    Export {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Only export these site keys (repeatable); overrides the configured list
        #[clap(long = "site")]
        sites: Vec<String>,
    },
    /// Show the completion state of every configured site
    Status {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Export { config, sites } => {
            let mut config = load_config(config)?;
            if !sites.is_empty() {
                for site in &sites {
                    validate_site_key(site)?;
                }
                config.set_sites(sites);
            }
            tracing::info!(command = "export", sites = ?config.sites, "Starting export");
            let client = ConfluenceClient::from_config(&config)
                .context("Failed to construct Confluence client")?;
            let driver = SiteDriver::new(&client, &config);
            let report = driver.run().await;

            for site in &report.sites {
                let state = match &site.outcome {
                    SiteOutcome::AlreadyDone => "already done".to_string(),
                    SiteOutcome::Completed => "completed".to_string(),
                    SiteOutcome::Failed(reason) => format!("FAILED: {reason}"),
                };
                println!(
                    "{}\t{}\troots={} converted={} skipped={} failures={}",
                    site.site,
                    state,
                    site.roots,
                    site.export.converted,
                    site.export.skipped,
                    site.export.failures()
                );
            }

            if report.all_done() {
                tracing::info!(command = "export", "Export complete");
                Ok(())
            } else {
                let failed = report.failed_sites().join(", ");
                tracing::error!(command = "export", failed = %failed, "Export incomplete");
                Err(anyhow::anyhow!("export did not complete for: {failed}"))
            }
        }
        Commands::Status { config } => {
            let config = load_config_with_credentials(config, Credentials::default())?;
            let ledger = CompletionLedger::in_dir(&config.base_dir);
            let done = ledger.done_sites()?;
            for site in &config.sites {
                let state = if done.contains(site) { "done" } else { "pending" };
                println!("{site}\t{state}");
            }
            Ok(())
        }
    }
}
