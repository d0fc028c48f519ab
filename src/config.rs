//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::frontier::EmissionOrder;
use crate::listing::ListingDialect;
use crate::pipeline::{RecordMapping, RetryPolicy};
use crate::series::Network;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Sample and progress store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: String,

    /// Samples per upsert batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Attempts per batch before the file fails
    #[serde(default = "default_store_attempts")]
    pub store_attempts: u32,

    #[serde(default = "default_store_backoff")]
    pub store_backoff_ms: u64,
}

fn default_database() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("gridfeed").join("gridfeed.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./gridfeed_data/gridfeed.db".to_string())
}

fn default_batch_size() -> usize {
    1000
}

fn default_store_attempts() -> u32 {
    5
}

fn default_store_backoff() -> u64 {
    200
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            batch_size: default_batch_size(),
            store_attempts: default_store_attempts(),
            store_backoff_ms: default_store_backoff(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_attempts,
            Duration::from_millis(self.store_backoff_ms),
            Duration::from_secs(30),
        )
    }
}

/// Fetching and worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Concurrent file fetches per crawl run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_retry_backoff")]
    pub max_retry_backoff_ms: u64,

    /// Largest downloaded or decompressed file held in memory
    #[serde(default = "default_memory_guard")]
    pub memory_guard_bytes: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub throttle: ThrottleConfig,
}

fn default_concurrency() -> usize {
    8
}

fn default_request_timeout() -> u64 {
    30
}

fn default_fetch_retries() -> u32 {
    9
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_max_retry_backoff() -> u64 {
    60_000
}

fn default_memory_guard() -> u64 {
    512 * 1024 * 1024 // 512 MB
}

fn default_user_agent() -> String {
    format!("gridfeed/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
            fetch_retries: default_fetch_retries(),
            retry_backoff_ms: default_retry_backoff(),
            max_retry_backoff_ms: default_max_retry_backoff(),
            memory_guard_bytes: default_memory_guard(),
            user_agent: default_user_agent(),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_retries.saturating_add(1),
            Duration::from_millis(self.retry_backoff_ms),
            Duration::from_millis(self.max_retry_backoff_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Adaptive request delay
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_throttle_enabled")]
    pub enabled: bool,

    #[serde(default = "default_start_delay")]
    pub start_delay_ms: u64,

    #[serde(default)]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Average parallel requests to aim for against one server
    #[serde(default = "default_target_concurrency")]
    pub target_concurrency: f64,
}

fn default_throttle_enabled() -> bool {
    true
}

fn default_start_delay() -> u64 {
    2000
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_target_concurrency() -> f64 {
    2.0
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: default_throttle_enabled(),
            start_delay_ms: default_start_delay(),
            min_delay_ms: 0,
            max_delay_ms: default_max_delay(),
            target_concurrency: default_target_concurrency(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// One crawl source: a set of listing pages and how to select from them
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Unique id; also the progress cursor key
    pub name: String,

    pub start_urls: Vec<String>,

    #[serde(default)]
    pub dialect: ListingDialect,

    #[serde(default)]
    pub filename_exact_filter: Option<String>,

    #[serde(default)]
    pub filename_regex_filter: Option<String>,

    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Maximum entries per run, 0 for no limit
    #[serde(default)]
    pub limit: usize,

    /// Entries to pass over before emitting
    #[serde(default)]
    pub skip: usize,

    #[serde(default = "default_process_latest")]
    pub process_latest: bool,

    #[serde(default)]
    pub order: EmissionOrder,

    #[serde(default)]
    pub network: Network,

    /// Overrides `crawler.concurrency`
    #[serde(default)]
    pub concurrency: Option<usize>,

    #[serde(default = "default_mappings")]
    pub mappings: Vec<RecordMapping>,
}

fn default_extensions() -> Vec<String> {
    vec![".csv".to_string(), ".zip".to_string()]
}

fn default_process_latest() -> bool {
    true
}

fn default_mappings() -> Vec<RecordMapping> {
    vec![RecordMapping::default()]
}

impl SourceConfig {
    /// A source with one listing URL and default settings
    pub fn new(name: impl Into<String>, start_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start_urls: vec![start_url.into()],
            dialect: ListingDialect::default(),
            filename_exact_filter: None,
            filename_regex_filter: None,
            allowed_extensions: default_extensions(),
            limit: 0,
            skip: 0,
            process_latest: default_process_latest(),
            order: EmissionOrder::default(),
            network: Network::default(),
            concurrency: None,
            mappings: default_mappings(),
        }
    }

    /// Worker count for this source
    pub fn effective_concurrency(&self, crawler: &CrawlerConfig) -> usize {
        self.concurrency.unwrap_or(crawler.concurrency).max(1)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("gridfeed").join("config.toml")),
            Some(PathBuf::from("/etc/gridfeed/config.toml")),
            Some(PathBuf::from("./gridfeed.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Look up a source by name
    pub fn source(&self, name: &str) -> Result<&SourceConfig, ConfigError> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))
    }

    /// Reject settings that would make every run fail
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = std::collections::HashSet::new();

        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source name {:?}",
                    source.name
                )));
            }
            if source.start_urls.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "source {:?} has no start_urls",
                    source.name
                )));
            }
        }

        if self.storage.batch_size == 0 {
            return Err(ConfigError::Invalid("storage.batch_size must be positive".into()));
        }

        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(database) = std::env::var("GRIDFEED_DATABASE") {
            self.storage.database = database;
        }

        if let Ok(concurrency) = std::env::var("GRIDFEED_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.crawler.concurrency = c;
            }
        }

        if let Ok(level) = std::env::var("GRIDFEED_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("GRIDFEED_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            crawler: CrawlerConfig::default(),
            logging: LoggingConfig::default(),
            sources: Vec::new(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No source named {0:?}")]
    UnknownSource(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# gridfeed configuration
#
# Environment variables override these settings:
# - GRIDFEED_DATABASE
# - GRIDFEED_CONCURRENCY
# - GRIDFEED_LOG_LEVEL
# - GRIDFEED_LOG_FORMAT

[storage]
# SQLite database holding samples and crawl progress
database = "./gridfeed_data/gridfeed.db"

# Samples per upsert batch
batch_size = 1000

# Attempts per batch, with exponential backoff from store_backoff_ms
store_attempts = 5
store_backoff_ms = 200

[crawler]
# Concurrent file fetches per source
concurrency = 8

# Per-request timeout (seconds); a timeout counts as one retry
request_timeout_secs = 30

# Retries after the first attempt for 400, 403, 408, 429, 5xx, 522, 524
fetch_retries = 9
retry_backoff_ms = 500
max_retry_backoff_ms = 60000

# Files larger than this (downloaded or decompressed) are abandoned
memory_guard_bytes = 536870912

[crawler.throttle]
enabled = true
start_delay_ms = 2000
min_delay_ms = 0
max_delay_ms = 60000
target_concurrency = 2.0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

[[sources]]
name = "au.nem.current.dispatch_scada"
start_urls = ["http://nemweb.com.au/Reports/Current/Dispatch_SCADA/"]
dialect = "server_listing"
network = "NEM"
process_latest = true
order = "listing"
limit = 0
skip = 0

[[sources.mappings]]
table = "DISPATCH_UNIT_SCADA"
timestamp_field = "SETTLEMENTDATE"
entity_field = "DUID"
value_field = "SCADAVALUE"
timestamp_format = "%Y/%m/%d %H:%M:%S"

[[sources]]
name = "au.nem.archive.dispatch_scada"
start_urls = ["http://nemweb.com.au/Reports/Archive/Dispatch_SCADA/"]
network = "NEM"
skip = 1
concurrency = 4
"#
    .to_string()
}
