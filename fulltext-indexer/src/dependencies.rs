//! Dependency initialization and wiring for the indexer service.

use std::fs;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::IndexerConfig;
use crate::errors::IndexerError;
use crate::indexer::{BroadcastConfig, IndexerServices, TenantIndexerFactory};
use crate::pool::IndexerPool;
use crate::server::AppState;
use fulltext_indexer_pipeline::IndexingConfig;
use fulltext_indexer_repository::{
    FullTextAdapterConfig, FullTextAdapterFactory, MemoryFullTextFactory, MemoryStorageFactory,
    OpenSearchFactory, PlainTextContentFactory,
};
use fulltext_indexer_shared::Tx;

/// Text engine URL that keeps every index in process.
const MEMORY_FULLTEXT_URL: &str = "memory://";

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub pool: Arc<IndexerPool>,
    pub state: AppState,
}

impl Dependencies {
    /// Build the adapters, the indexer pool and the HTTP state.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexerError)` - If the model cannot be read
    pub fn new(config: &IndexerConfig) -> Result<Self, IndexerError> {
        info!(
            db_url = %config.db_url,
            fulltext_url = %config.fulltext_url,
            index_prefix = %config.index_prefix,
            broadcast = config.transactor_url.is_some(),
            "Initializing dependencies"
        );

        let model = match &config.model_path {
            Some(path) => load_model(path)?,
            None => Vec::new(),
        };
        info!(transactions = model.len(), "Model loaded");

        let full_text: Arc<dyn FullTextAdapterFactory> =
            if config.fulltext_url == MEMORY_FULLTEXT_URL {
                Arc::new(MemoryFullTextFactory::new())
            } else {
                Arc::new(OpenSearchFactory::new(FullTextAdapterConfig::new(
                    config.fulltext_url.clone(),
                    config.index_prefix.clone(),
                )))
            };

        let services = IndexerServices {
            model: Arc::new(model),
            db_url: config.db_url.clone(),
            storage: Arc::new(MemoryStorageFactory::new()),
            full_text,
            content: Arc::new(PlainTextContentFactory),
            broadcast: config.transactor_url.as_ref().map(|url| BroadcastConfig {
                transactor_url: url.clone(),
                secret: config.server_secret.clone(),
                concurrency: config.broadcast_concurrency,
            }),
            indexing: IndexingConfig::default(),
        };

        let pool = Arc::new(IndexerPool::start(
            Arc::new(TenantIndexerFactory::new(services)),
            config.pool.clone(),
        ));
        let state = AppState::new(pool.clone(), config.server_secret.as_str());

        Ok(Self { pool, state })
    }
}

/// Read model transactions from a JSON array, skipping entries that are
/// not transactions.
pub fn load_model(path: &str) -> Result<Vec<Tx>, IndexerError> {
    let raw = fs::read_to_string(path)?;
    let entries: Vec<Value> = serde_json::from_str(&raw)
        .map_err(|e| IndexerError::config(format!("Invalid model file {}: {}", path, e)))?;

    let total = entries.len();
    let txes: Vec<Tx> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match serde_json::from_value(entry) {
            Ok(tx) => Some(tx),
            Err(e) => {
                warn!(position = position, error = %e, "Skipping malformed model entry");
                None
            }
        })
        .collect();

    if txes.len() < total {
        warn!(skipped = total - txes.len(), "Model file contained malformed entries");
    }
    Ok(txes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::tests::{model, ISSUE};
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}.json", name, std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_model_skips_malformed_entries() {
        let mut entries: Vec<Value> = model()
            .iter()
            .map(|tx| serde_json::to_value(tx).unwrap())
            .collect();
        entries.push(serde_json::json!({ "_class": "core:class:Unknown" }));
        let path = temp_file("model-skip", &Value::Array(entries).to_string());

        let txes = load_model(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(txes.len(), model().len());
        assert!(txes.iter().any(|tx| tx.as_cud().map(|cud| cud.object_id().as_str()) == Some(ISSUE)));
    }

    #[test]
    fn test_load_model_rejects_non_array() {
        let path = temp_file("model-bad", "{\"not\": \"an array\"}");
        let result = load_model(path.to_str().unwrap());
        fs::remove_file(&path).ok();

        assert!(matches!(result, Err(IndexerError::ConfigError(_))));
    }

    #[test]
    fn test_missing_model_file_is_io_error() {
        let result = load_model("/nonexistent/fulltext-model.json");
        assert!(matches!(result, Err(IndexerError::IoError(_))));
    }
}
