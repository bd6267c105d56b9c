//! Background delivery of write batches to the indexer.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::IndexerClient;
use fulltext_indexer_pipeline::PipelineError;
use fulltext_indexer_shared::{TenantKey, Tx};

/// Forwards transaction batches to the indexer from a single worker, so a
/// tenant's batches arrive in the order they were written.
///
/// Delivery is best-effort: a batch that cannot be queued or delivered is
/// logged and dropped.
pub struct TxForwarder {
    tenant: TenantKey,
    sender: Mutex<Option<mpsc::Sender<Vec<Tx>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TxForwarder {
    pub fn start(tenant: TenantKey, client: Arc<dyn IndexerClient>, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Vec<Tx>>(capacity.max(1));

        let worker_tenant = tenant.clone();
        let worker = tokio::spawn(async move {
            while let Some(txes) = receiver.recv().await {
                let count = txes.len();
                match client.index_documents(&worker_tenant, txes).await {
                    Ok(()) => debug!(tenant = %worker_tenant, count = count, "Forwarded transactions"),
                    Err(e) => warn!(
                        tenant = %worker_tenant,
                        count = count,
                        error = %e,
                        "Failed to forward transactions to indexer"
                    ),
                }
            }
            info!(tenant = %worker_tenant, "Transaction forwarder stopped");
        });

        Self {
            tenant,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue `txes` for delivery without waiting.
    pub fn forward(&self, txes: Vec<Tx>) {
        let sender = match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            warn!(tenant = %self.tenant, "Forwarder closed, dropping transactions");
            return;
        };
        if let Err(e) = sender.try_send(txes) {
            warn!(tenant = %self.tenant, error = %e, "Forward queue unavailable, dropping transactions");
        }
    }

    /// Deliver what is queued, then stop the worker.
    pub async fn close(&self) -> Result<(), PipelineError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| PipelineError::channel("forwarder sender lock poisoned"))?
            .take();
        drop(sender);

        let worker = self
            .worker
            .lock()
            .map_err(|_| PipelineError::channel("forwarder worker lock poisoned"))?
            .take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| PipelineError::channel(e.to_string()))?;
        }
        Ok(())
    }
}
