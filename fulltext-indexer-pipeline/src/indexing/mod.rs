//! Staged indexing pipeline.
//!
//! Transaction batches are queued to a single worker that runs them through
//! the [`DocumentProcessor`] and the [`IndexLoader`], then reports the classes
//! it touched to an [`IndexingNotifier`].

mod loader;
mod processor;

pub use loader::{IndexLoader, LoaderConfig};
pub use processor::{DocumentProcessor, ProcessedBatch, ProcessedEvent};

#[cfg(test)]
pub(crate) use loader::tests::MockFullTextAdapter;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::PipelineError;
use fulltext_indexer_shared::{ClassRef, TenantKey, Tx};

/// Receives the classes whose documents finished indexing.
#[async_trait]
pub trait IndexingNotifier: Send + Sync {
    /// Called once per batch that changed the index.
    ///
    /// # Arguments
    ///
    /// * `classes` - Base classes of the documents written by the batch
    async fn indexing_updated(&self, classes: Vec<ClassRef>);
}

/// Notifier that discards updates.
pub struct NoopNotifier;

#[async_trait]
impl IndexingNotifier for NoopNotifier {
    async fn indexing_updated(&self, _classes: Vec<ClassRef>) {}
}

/// Configuration for the indexing pipeline.
#[derive(Debug, Clone)]
pub struct IndexingConfig {
    /// Size of the batch channel buffer.
    pub channel_buffer_size: usize,
    pub loader: LoaderConfig,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            loader: LoaderConfig::default(),
        }
    }
}

/// Handle to a running indexing worker.
pub struct IndexingPipeline {
    tenant: TenantKey,
    sender: Mutex<Option<mpsc::Sender<Vec<Tx>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IndexingPipeline {
    /// Spawn the worker for `tenant`.
    pub fn start(
        tenant: TenantKey,
        processor: DocumentProcessor,
        loader: IndexLoader,
        notifier: Arc<dyn IndexingNotifier>,
        config: &IndexingConfig,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Vec<Tx>>(config.channel_buffer_size.max(1));

        let worker_tenant = tenant.clone();
        let worker = tokio::spawn(async move {
            while let Some(txes) = receiver.recv().await {
                let batch = processor.process_batch(txes).await;
                if batch.events.is_empty() {
                    continue;
                }

                let classes: Vec<ClassRef> = batch.classes.into_iter().collect();
                let count = batch.events.len();
                match loader.load(batch.events).await {
                    Ok(()) => {
                        debug!(tenant = %worker_tenant, count = count, "Indexed batch");
                        notifier.indexing_updated(classes).await;
                    }
                    Err(e) => {
                        error!(tenant = %worker_tenant, error = %e, "Failed to load batch");
                    }
                }
            }
            info!(tenant = %worker_tenant, "Indexing worker stopped");
        });

        Self {
            tenant,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a batch of transactions. Returns once the batch is enqueued.
    pub async fn submit(&self, txes: Vec<Tx>) -> Result<(), PipelineError> {
        if txes.is_empty() {
            return Ok(());
        }
        let sender = self
            .sender
            .lock()
            .map_err(|_| PipelineError::channel("indexing sender lock poisoned"))?
            .clone()
            .ok_or(PipelineError::Closed)?;

        sender
            .send(txes)
            .await
            .map_err(|_| PipelineError::channel("indexing worker is gone"))
    }

    /// Stop accepting batches, drain the queue and wait for the worker.
    pub async fn close(&self) -> Result<(), PipelineError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| PipelineError::channel("indexing sender lock poisoned"))?
            .take();
        drop(sender);

        let worker = self
            .worker
            .lock()
            .map_err(|_| PipelineError::channel("indexing worker lock poisoned"))?
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(tenant = %self.tenant, error = %e, "Indexing worker panicked");
                return Err(PipelineError::channel(e.to_string()));
            }
        }
        Ok(())
    }
}
