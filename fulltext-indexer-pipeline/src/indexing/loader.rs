//! Loader module for the staged indexing pipeline.
//!
//! Writes processed documents into the tenant's text engine.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use super::processor::ProcessedEvent;
use crate::errors::PipelineError;
use fulltext_indexer_repository::{FullTextAdapter, SearchError};
use fulltext_indexer_shared::{DocRef, IndexedDoc};

/// Configuration for the index loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of documents sent in one `update_many` call.
    pub batch_size: usize,
    /// Maximum number of retry attempts for failed indexing operations.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 5000,
        }
    }
}

/// Loader that writes documents into the text engine.
///
/// The loader is responsible for:
/// - Collapsing several events on one document into the last one
/// - Bulk indexing with exponential backoff on transient failures
/// - Falling back to per-document indexing when a bulk request fails
pub struct IndexLoader {
    adapter: Arc<dyn FullTextAdapter>,
    config: LoaderConfig,
}

impl IndexLoader {
    /// Create a new loader with the default configuration.
    pub fn new(adapter: Arc<dyn FullTextAdapter>) -> Self {
        Self::with_config(adapter, LoaderConfig::default())
    }

    /// Create a new loader with custom configuration.
    pub fn with_config(adapter: Arc<dyn FullTextAdapter>, config: LoaderConfig) -> Self {
        Self { adapter, config }
    }

    /// Load a batch of processed events.
    #[instrument(skip(self, events), fields(event_count = events.len()))]
    pub async fn load(&self, events: Vec<ProcessedEvent>) -> Result<(), PipelineError> {
        let (docs, removed) = Self::collapse(events);

        let mut failed = 0;
        for chunk in docs.chunks(self.config.batch_size.max(1)) {
            failed += self.index_chunk(chunk).await;
        }

        if !removed.is_empty() {
            if let Err(e) = self
                .with_retry("remove", || self.adapter.remove(&removed))
                .await
            {
                error!(error = %e, count = removed.len(), "Failed to remove documents");
                failed += removed.len();
            }
        }

        if failed > 0 {
            return Err(PipelineError::loader(format!(
                "Failed to load {} documents",
                failed
            )));
        }
        Ok(())
    }

    /// Keep only the last event of each document, in first-seen order.
    fn collapse(events: Vec<ProcessedEvent>) -> (Vec<IndexedDoc>, Vec<DocRef>) {
        let mut order: Vec<DocRef> = Vec::new();
        let mut last: HashMap<DocRef, ProcessedEvent> = HashMap::new();
        for event in events {
            let id = match &event {
                ProcessedEvent::Index(doc) => doc.id.clone(),
                ProcessedEvent::Remove(id) => id.clone(),
            };
            if last.insert(id.clone(), event).is_none() {
                order.push(id);
            }
        }

        let mut docs = Vec::new();
        let mut removed = Vec::new();
        for id in order {
            match last.remove(&id) {
                Some(ProcessedEvent::Index(doc)) => docs.push(doc),
                Some(ProcessedEvent::Remove(id)) => removed.push(id),
                None => {}
            }
        }
        (docs, removed)
    }

    /// Index one chunk, returning the number of documents that failed.
    async fn index_chunk(&self, docs: &[IndexedDoc]) -> usize {
        let count = docs.len();
        match self
            .with_retry("bulk index", || self.adapter.update_many(docs))
            .await
        {
            Ok(()) => {
                debug!(count = count, "Successfully indexed documents");
                0
            }
            Err(e) => {
                error!(error = %e, count = count, "Failed to bulk index documents after retries");

                // On bulk failure, try indexing individually with retries
                warn!("Attempting individual document indexing with retries");
                let mut success_count = 0;
                let mut error_count = 0;

                for doc in docs {
                    let single = std::slice::from_ref(doc);
                    match self
                        .with_retry("index", || self.adapter.update_many(single))
                        .await
                    {
                        Ok(()) => success_count += 1,
                        Err(e) => {
                            error!(
                                doc_id = %doc.id,
                                error = %e,
                                "Failed to index individual document after retries"
                            );
                            error_count += 1;
                        }
                    }
                }

                info!(
                    success = success_count,
                    errors = error_count,
                    "Individual indexing completed"
                );
                error_count
            }
        }
    }

    /// Run `op` with exponential backoff while it fails with a retryable error.
    async fn with_retry<F, Fut>(&self, what: &str, mut op: F) -> Result<(), SearchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), SearchError>>,
    {
        let mut delay_ms = self.config.initial_retry_delay_ms;
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(attempt = attempt, operation = what, "Succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => {
                    debug!(error = %e, operation = what, "Non-retryable error encountered");
                    return Err(e);
                }
                Err(e) if attempt >= self.config.max_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    warn!(
                        attempt = attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay_ms,
                        operation = what,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = std::cmp::min(delay_ms * 2, self.config.max_retry_delay_ms);
                }
            }
        }
    }
}
