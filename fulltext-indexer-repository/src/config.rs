//! Configuration types for the text-engine adapters.

/// Configuration shared by the text-engine adapters of every tenant.
#[derive(Debug, Clone)]
pub struct FullTextAdapterConfig {
    /// Text engine URL (e.g., "http://localhost:9200").
    pub url: String,
    /// Prefix of the per-tenant index names.
    pub index_prefix: String,
    /// Maximum number of documents sent in a single bulk request.
    /// Set to None to disable the limit (not recommended for production).
    pub max_batch_size: Option<usize>,
}

impl Default for FullTextAdapterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index_prefix: "fulltext".to_string(),
            max_batch_size: Some(1000),
        }
    }
}

impl FullTextAdapterConfig {
    /// Create a config for the given engine URL and index prefix.
    pub fn new(url: impl Into<String>, index_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index_prefix: index_prefix.into(),
            ..Self::default()
        }
    }

    /// Create a config with a custom batch size limit.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }
}
