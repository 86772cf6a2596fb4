//! Configuration management
//!
//! The forwarder's settings are fixed for the process lifetime. They are
//! loaded from defaults, then a `.env` file and `HORANG_*` environment
//! variables, then command-line flags (see [`crate::Cli::apply_to`]).

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::SkipRules;
use crate::forwarder::DeliveryPolicy;

// ============================================================================
// Forwarder Configuration Constants
// ============================================================================

/// Default seconds between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// File-name suffixes that are never read.
pub const DEFAULT_SKIP_EXTENSIONS: &[&str] = &["exe", "bin", "__", "py", "pyc"];

/// File-name prefixes that are never read.
pub const DEFAULT_SKIP_PREFIXES: &[&str] = &["__"];

/// Default Elasticsearch base URL.
pub const DEFAULT_ES_URL: &str = "http://localhost:9200";

/// Default Elasticsearch index.
pub const DEFAULT_ES_INDEX: &str = "horang-logs";

/// Default upper bound for a single delivery attempt in seconds.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 30;

/// Default number of delivery attempts per batch.
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 3;

/// Default back-off before the first delivery retry in milliseconds.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Default directory holding the GeoLite2 databases.
pub const DEFAULT_GEOIP_DIR: &str = "./geoip";

/// Destination receiving forwarded batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Elasticsearch bulk API
    #[default]
    Elasticsearch,
    /// JSON lines on standard output
    Stdout,
}

impl FromStr for Destination {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "elasticsearch" | "elk" | "es" => Ok(Destination::Elasticsearch),
            "stdout" | "console" => Ok(Destination::Stdout),
            other => Err(anyhow::anyhow!(
                "Unsupported destination '{}'. Use 'elasticsearch' (or 1) or 'stdout'",
                other
            )),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Elasticsearch => write!(f, "elasticsearch"),
            Destination::Stdout => write!(f, "stdout"),
        }
    }
}

/// When a file's offset is committed after its batch was handed to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CommitPolicy {
    /// Only after the sink confirmed delivery (at-least-once)
    #[default]
    OnSuccess,
    /// After every delivery attempt, successful or not (at-most-once)
    Always,
}

impl CommitPolicy {
    pub fn should_commit(self, delivered: bool) -> bool {
        match self {
            CommitPolicy::OnSuccess => delivered,
            CommitPolicy::Always => true,
        }
    }
}

impl FromStr for CommitPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on-success" | "on_success" | "success" => Ok(CommitPolicy::OnSuccess),
            "always" => Ok(CommitPolicy::Always),
            other => Err(anyhow::anyhow!(
                "Invalid commit policy '{}'. Use 'on-success' or 'always'",
                other
            )),
        }
    }
}

impl std::fmt::Display for CommitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitPolicy::OnSuccess => write!(f, "on-success"),
            CommitPolicy::Always => write!(f, "always"),
        }
    }
}

/// Forwarder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Directory tree to watch
    pub root: PathBuf,
    pub poll_interval_secs: u64,
    pub skip_extensions: Vec<String>,
    pub skip_prefixes: Vec<String>,
    pub destination: Destination,
    pub commit_policy: CommitPolicy,
    pub delivery: DeliveryConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub geoip: GeoIpConfig,
}

/// Timeout and retry bounds for sink delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

/// Elasticsearch connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
}

/// Locations of the three MaxMind databases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    pub country_db: PathBuf,
    pub city_db: PathBuf,
    pub asn_db: PathBuf,
}

impl GeoIpConfig {
    /// Standard GeoLite2 file names inside `dir`
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            country_db: dir.join("GeoLite2-Country.mmdb"),
            city_db: dir.join("GeoLite2-City.mmdb"),
            asn_db: dir.join("GeoLite2-ASN.mmdb"),
        }
    }
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self::from_dir(DEFAULT_GEOIP_DIR)
    }
}

impl DeliveryConfig {
    pub fn policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            timeout: Duration::from_secs(self.timeout_secs),
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ES_URL.to_string(),
            index: DEFAULT_ES_INDEX.to_string(),
            username: None,
            password: None,
            api_key: None,
        }
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            skip_extensions: DEFAULT_SKIP_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            skip_prefixes: DEFAULT_SKIP_PREFIXES.iter().map(|s| s.to_string()).collect(),
            destination: Destination::default(),
            commit_policy: CommitPolicy::default(),
            delivery: DeliveryConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            geoip: GeoIpConfig::default(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|s| {
        s.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

impl ForwarderConfig {
    /// Load configuration from a `.env` file, environment and defaults
    ///
    /// Environment variables:
    /// - `HORANG_ROOT`: directory tree to watch
    /// - `HORANG_POLL_INTERVAL_SECS`: seconds between cycles
    /// - `HORANG_SKIP_EXTENSIONS` / `HORANG_SKIP_PREFIXES`: comma-separated skip-lists
    /// - `HORANG_DESTINATION`: `elasticsearch` (or `1`), `stdout`
    /// - `HORANG_COMMIT_POLICY`: `on-success`, `always`
    /// - `HORANG_DELIVERY_TIMEOUT_SECS`, `HORANG_MAX_DELIVERY_ATTEMPTS`, `HORANG_RETRY_BACKOFF_MS`
    /// - `HORANG_ES_URL`, `HORANG_ES_INDEX`, `HORANG_ES_USERNAME`, `HORANG_ES_PASSWORD`, `HORANG_ES_API_KEY`
    /// - `HORANG_GEOIP_DIR`: directory with the GeoLite2 databases
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let destination = match std::env::var("HORANG_DESTINATION") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.destination,
        };

        let commit_policy = match std::env::var("HORANG_COMMIT_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.commit_policy,
        };

        let config = Self {
            root: std::env::var("HORANG_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            poll_interval_secs: env_parse("HORANG_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            skip_extensions: env_list("HORANG_SKIP_EXTENSIONS").unwrap_or(defaults.skip_extensions),
            skip_prefixes: env_list("HORANG_SKIP_PREFIXES").unwrap_or(defaults.skip_prefixes),
            destination,
            commit_policy,
            delivery: DeliveryConfig {
                timeout_secs: env_parse(
                    "HORANG_DELIVERY_TIMEOUT_SECS",
                    DEFAULT_DELIVERY_TIMEOUT_SECS,
                ),
                max_attempts: env_parse(
                    "HORANG_MAX_DELIVERY_ATTEMPTS",
                    DEFAULT_MAX_DELIVERY_ATTEMPTS,
                ),
                retry_backoff_ms: env_parse("HORANG_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS),
            },
            elasticsearch: ElasticsearchConfig {
                url: std::env::var("HORANG_ES_URL").unwrap_or(defaults.elasticsearch.url),
                index: std::env::var("HORANG_ES_INDEX").unwrap_or(defaults.elasticsearch.index),
                username: std::env::var("HORANG_ES_USERNAME").ok(),
                password: std::env::var("HORANG_ES_PASSWORD").ok(),
                api_key: std::env::var("HORANG_ES_API_KEY").ok(),
            },
            geoip: std::env::var("HORANG_GEOIP_DIR")
                .map(GeoIpConfig::from_dir)
                .unwrap_or(defaults.geoip),
        };

        Ok(config)
    }

    /// Resolve the root to an absolute path and validate every setting
    pub fn validated(mut self) -> anyhow::Result<Self> {
        self.root = std::fs::canonicalize(&self.root)
            .with_context(|| format!("Cannot resolve watch directory {}", self.root.display()))?;
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.root.is_dir() {
            anyhow::bail!("Watch root {} is not a directory", self.root.display());
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be greater than 0 seconds");
        }

        if self.delivery.max_attempts == 0 {
            anyhow::bail!("HORANG_MAX_DELIVERY_ATTEMPTS must be greater than 0");
        }

        if self.delivery.timeout_secs == 0 {
            anyhow::bail!("HORANG_DELIVERY_TIMEOUT_SECS must be greater than 0");
        }

        if self.destination == Destination::Elasticsearch {
            if self.elasticsearch.index.trim().is_empty() {
                anyhow::bail!("Elasticsearch index name cannot be empty");
            }
            if self.elasticsearch.username.is_some() != self.elasticsearch.password.is_some() {
                anyhow::bail!(
                    "HORANG_ES_USERNAME and HORANG_ES_PASSWORD must be set together"
                );
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn skip_rules(&self) -> SkipRules {
        SkipRules::new(&self.skip_extensions, &self.skip_prefixes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config_for(root: &Path) -> ForwarderConfig {
        ForwarderConfig {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = ForwarderConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.skip_extensions, vec!["exe", "bin", "__", "py", "pyc"]);
        assert_eq!(config.skip_prefixes, vec!["__"]);
        assert_eq!(config.commit_policy, CommitPolicy::OnSuccess);
        assert_eq!(
            config.geoip.asn_db,
            PathBuf::from("./geoip").join("GeoLite2-ASN.mmdb")
        );
    }

    #[test]
    fn test_destination_from_str() {
        assert_eq!("1".parse::<Destination>().unwrap(), Destination::Elasticsearch);
        assert_eq!("ELK".parse::<Destination>().unwrap(), Destination::Elasticsearch);
        assert_eq!("stdout".parse::<Destination>().unwrap(), Destination::Stdout);
        assert!("2".parse::<Destination>().is_err());
    }

    #[test]
    fn test_commit_policy() {
        assert_eq!("always".parse::<CommitPolicy>().unwrap(), CommitPolicy::Always);
        assert_eq!("on-success".parse::<CommitPolicy>().unwrap(), CommitPolicy::OnSuccess);
        assert!(CommitPolicy::Always.should_commit(false));
        assert!(!CommitPolicy::OnSuccess.should_commit(false));
        assert!(CommitPolicy::OnSuccess.should_commit(true));
    }

    #[test]
    fn test_validated_canonicalizes_root() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        std::fs::create_dir(&nested).unwrap();

        let config = config_for(&nested.join("..").join("logs")).validated().unwrap();
        assert!(config.root.is_absolute());
        assert_eq!(config.root, std::fs::canonicalize(&nested).unwrap());
    }

    #[test]
    fn test_validation_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_for(&dir.path().join("absent")).validated().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_half_basic_auth() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.elasticsearch.username = Some("elastic".to_string());
        assert!(config.validate().is_err());

        config.destination = Destination::Stdout;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_delivery_policy_conversion() {
        let delivery = DeliveryConfig {
            timeout_secs: 5,
            max_attempts: 4,
            retry_backoff_ms: 250,
        };
        let policy = delivery.policy();
        assert_eq!(policy.timeout, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
    }
}
