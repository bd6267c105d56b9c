//! Configuration for the indexer service.
//!
//! Everything is read from the environment, after loading a `.env` file
//! when one is present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::IndexerError;

/// Default HTTP port.
const DEFAULT_PORT: u16 = 4700;

/// Default structured storage URL.
const DEFAULT_DB_URL: &str = "memory://";

/// Default text engine URL.
const DEFAULT_FULLTEXT_URL: &str = "http://localhost:9200";

/// Default prefix of per-tenant index names.
const DEFAULT_INDEX_PREFIX: &str = "fulltext";

/// Default idle window before a tenant indexer is evicted.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default number of concurrent broadcast pushes.
const DEFAULT_BROADCAST_CONCURRENCY: usize = 8;

/// Lifecycle settings of the indexer pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// An indexer idle for longer than this is evicted.
    pub idle_timeout: Duration,
    /// How often the eviction sweep runs.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub port: u16,
    /// Secret tokens are signed and checked with.
    pub server_secret: String,
    /// Structured storage of every tenant.
    pub db_url: String,
    /// Text engine; `memory://` keeps the index in process.
    pub fulltext_url: String,
    pub index_prefix: String,
    /// Transactor to notify of indexing progress. Broadcast is off when unset.
    pub transactor_url: Option<String>,
    /// JSON array of model transactions replayed into every tenant.
    pub model_path: Option<String>,
    pub pool: PoolConfig,
    pub broadcast_concurrency: usize,
}

impl IndexerConfig {
    /// Load the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PORT`: HTTP port (default: 4700)
    /// - `SERVER_SECRET`: token secret (required)
    /// - `DB_URL`: storage URL (default: memory://)
    /// - `FULLTEXT_URL`: text engine URL (default: http://localhost:9200)
    /// - `FULLTEXT_INDEX_PREFIX`: index name prefix (default: fulltext)
    /// - `TRANSACTOR_URL`: transactor to notify (optional)
    /// - `MODEL_PATH`: model transactions file (optional)
    /// - `INDEXER_IDLE_TIMEOUT_SECS`: idle window (default: 300)
    /// - `INDEXER_SWEEP_INTERVAL_SECS`: sweep period (default: the idle window)
    /// - `BROADCAST_CONCURRENCY`: concurrent broadcast pushes (default: 8)
    ///
    /// # Returns
    ///
    /// * `Ok(IndexerConfig)` - The loaded configuration
    /// * `Err(IndexerError)` - If a variable is missing or malformed
    pub fn from_env() -> Result<Self, IndexerError> {
        dotenv::dotenv().ok();

        let server_secret = env::var("SERVER_SECRET")
            .map_err(|_| IndexerError::config("SERVER_SECRET is required"))?;
        if server_secret.is_empty() {
            return Err(IndexerError::config("SERVER_SECRET must not be empty"));
        }

        let idle_timeout_secs = parse_var("INDEXER_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS)?;
        let sweep_interval_secs = parse_var("INDEXER_SWEEP_INTERVAL_SECS", idle_timeout_secs)?;

        Ok(Self {
            port: parse_var("PORT", DEFAULT_PORT)?,
            server_secret,
            db_url: env::var("DB_URL").unwrap_or_else(|_| DEFAULT_DB_URL.to_string()),
            fulltext_url: env::var("FULLTEXT_URL")
                .unwrap_or_else(|_| DEFAULT_FULLTEXT_URL.to_string()),
            index_prefix: env::var("FULLTEXT_INDEX_PREFIX")
                .unwrap_or_else(|_| DEFAULT_INDEX_PREFIX.to_string()),
            transactor_url: non_empty_var("TRANSACTOR_URL"),
            model_path: non_empty_var("MODEL_PATH"),
            pool: PoolConfig {
                idle_timeout: Duration::from_secs(idle_timeout_secs),
                sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            },
            broadcast_concurrency: parse_var("BROADCAST_CONCURRENCY", DEFAULT_BROADCAST_CONCURRENCY)?,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, IndexerError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| IndexerError::config(format!("{} is not valid: {}", name, value))),
        Err(_) => Ok(default),
    }
}
