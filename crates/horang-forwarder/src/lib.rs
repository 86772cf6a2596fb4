//! Horang Forwarder Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! A polling log-forwarding agent. Each cycle walks a directory tree, reads
//! whatever each file gained since the previous cycle, enriches records that
//! carry an `ip` field with geographic and network metadata, and ships one
//! batch per file to a search backend.
//!
//! # Components
//!
//! - **Offset Store** ([`offsets`]): per-file resume positions and the skip sentinel
//! - **Format Detection** ([`detect`]): skip-list rules and ordered format classification
//! - **Incremental Readers** ([`readers`]): JSON, CSV, plaintext and gzip
//! - **Enricher** ([`enrich`], [`geoip`]): IP lookups through a [`enrich::GeoLookup`]
//! - **Forwarder** ([`forwarder`], [`sink`]): bounded, retried delivery to a [`sink::Sink`]
//! - **Poll Loop** ([`poller`]): the orchestrating state machine
//!
//! # Example
//!
//! ```no_run
//! use horang_forwarder::{config::ForwarderConfig, geoip::GeoIpResolver};
//! use horang_forwarder::{forwarder::Forwarder, poller::Poller, sink::StdoutSink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ForwarderConfig::from_env()?.validated()?;
//!     let resolver = GeoIpResolver::open(&config.geoip)?;
//!     let forwarder = Forwarder::new(Box::new(StdoutSink::stdout()), config.delivery.policy());
//!
//!     let mut poller = Poller::new(config, &resolver, forwarder);
//!     poller.run(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//!
//!     drop(poller);
//!     resolver.close();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod detect;
pub mod enrich;
pub mod forwarder;
pub mod geoip;
pub mod offsets;
pub mod poller;
pub mod readers;
pub mod sink;

use clap::Parser;
use std::path::PathBuf;

use config::{CommitPolicy, Destination, ForwarderConfig};

/// Horang - directory-watching log forwarder
#[derive(Parser, Debug)]
#[command(name = "horang-forwarder")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory tree to watch (overrides HORANG_ROOT)
    pub root: Option<PathBuf>,

    /// Seconds to sleep between poll cycles
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Where batches are delivered: elasticsearch (or 1), stdout
    #[arg(short, long)]
    pub destination: Option<Destination>,

    /// When a file's offset advances: on-success, always
    #[arg(long)]
    pub commit_policy: Option<CommitPolicy>,

    /// Elasticsearch base URL
    #[arg(long)]
    pub es_url: Option<String>,

    /// Elasticsearch index receiving the records
    #[arg(long)]
    pub es_index: Option<String>,

    /// Comma-separated file-name suffixes that are never read
    #[arg(long, value_delimiter = ',')]
    pub skip_extensions: Option<Vec<String>>,

    /// Comma-separated file-name prefixes that are never read
    #[arg(long, value_delimiter = ',')]
    pub skip_prefixes: Option<Vec<String>>,

    /// Directory holding GeoLite2-Country.mmdb, GeoLite2-City.mmdb and GeoLite2-ASN.mmdb
    #[arg(long)]
    pub geoip_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply the flags that were given on top of an environment-loaded configuration
    pub fn apply_to(&self, config: &mut ForwarderConfig) {
        if let Some(ref root) = self.root {
            config.root = root.clone();
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(destination) = self.destination {
            config.destination = destination;
        }
        if let Some(policy) = self.commit_policy {
            config.commit_policy = policy;
        }
        if let Some(ref url) = self.es_url {
            config.elasticsearch.url = url.clone();
        }
        if let Some(ref index) = self.es_index {
            config.elasticsearch.index = index.clone();
        }
        if let Some(ref extensions) = self.skip_extensions {
            config.skip_extensions = extensions.clone();
        }
        if let Some(ref prefixes) = self.skip_prefixes {
            config.skip_prefixes = prefixes.clone();
        }
        if let Some(ref dir) = self.geoip_dir {
            config.geoip = config::GeoIpConfig::from_dir(dir);
        }
    }
}
