//! Configuration of the search middleware.

/// Configuration for [`crate::FullTextMiddleware`].
#[derive(Debug, Clone)]
pub struct FullTextMiddlewareConfig {
    /// Indexer endpoints separated by `;`.
    pub indexer_url: String,
    /// Service token sent with every indexer request.
    pub token: String,
    /// Number of forwarded write batches that may wait for delivery.
    pub forward_queue_capacity: usize,
}

impl Default for FullTextMiddlewareConfig {
    fn default() -> Self {
        Self {
            indexer_url: "http://localhost:4700".to_string(),
            token: String::new(),
            forward_queue_capacity: 1000,
        }
    }
}

impl FullTextMiddlewareConfig {
    pub fn new(indexer_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            indexer_url: indexer_url.into(),
            token: token.into(),
            ..Default::default()
        }
    }
}
