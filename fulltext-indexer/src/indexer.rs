//! Tenant indexer.
//!
//! A tenant indexer bundles everything one tenant needs to answer search
//! requests and ingest writes: the tenant's model, a minimal read pipeline
//! over its storage, one text-engine adapter, one content adapter and the
//! staged indexing pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::errors::IndexerError;
use crate::notifier::BroadcastNotifier;
use fulltext_indexer_pipeline::{
    create_pipeline, ContextNameMiddleware, DbAdapterInitMiddleware, DbAdapterMiddleware,
    DomainFindMiddleware, FullTextIndex, IndexingConfig, IndexingNotifier, LowLevelMiddleware,
    Middleware, NoopNotifier, Pipeline, PipelineContext,
};
use fulltext_indexer_repository::{
    ContentAdapterFactory, FullTextAdapter, FullTextAdapterFactory, StorageAdapterFactory,
};
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, Hierarchy, IndexedDoc, ModelDb, SearchOptions, SearchQuery,
    SearchResult, TenantKey, Tx,
};

/// Where indexing progress is reported.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub transactor_url: String,
    pub secret: String,
    pub concurrency: usize,
}

/// Shared collaborators every tenant indexer is built from.
#[derive(Clone)]
pub struct IndexerServices {
    /// Model transactions replayed into each tenant's hierarchy.
    pub model: Arc<Vec<Tx>>,
    pub db_url: String,
    pub storage: Arc<dyn StorageAdapterFactory>,
    pub full_text: Arc<dyn FullTextAdapterFactory>,
    pub content: Arc<dyn ContentAdapterFactory>,
    pub broadcast: Option<BroadcastConfig>,
    pub indexing: IndexingConfig,
}

/// One tenant's search and indexing state.
pub struct TenantIndexer {
    tenant: TenantKey,
    pipeline: Arc<Pipeline>,
    index: FullTextIndex,
}

impl TenantIndexer {
    /// Build the indexer of `tenant`.
    #[instrument(skip(tenant, services), fields(tenant = %tenant))]
    pub async fn open(tenant: TenantKey, services: &IndexerServices) -> Result<Self, IndexerError> {
        let (hierarchy, model) = replay_model(&tenant, &services.model);
        let hierarchy = Arc::new(hierarchy);
        let contexts = model.search_contexts();

        let context = Arc::new(
            PipelineContext::new(tenant.clone(), hierarchy.clone(), Arc::new(model))
                .with_storage(services.db_url.clone(), services.storage.clone()),
        );
        let pipeline = Arc::new(
            create_pipeline(
                context,
                &[
                    LowLevelMiddleware::creator(),
                    ContextNameMiddleware::creator(),
                    DomainFindMiddleware::creator(),
                    DbAdapterInitMiddleware::creator(),
                    DbAdapterMiddleware::creator(),
                ],
            )
            .await?,
        );

        let adapters = async {
            let adapter = services.full_text.create(&tenant).await?;
            adapter.init().await?;
            let content = services.content.create(&tenant).await?;
            let notifier: Arc<dyn IndexingNotifier> = match &services.broadcast {
                Some(broadcast) => Arc::new(BroadcastNotifier::new(
                    &broadcast.transactor_url,
                    tenant.clone(),
                    &broadcast.secret,
                    broadcast.concurrency,
                )?),
                None => Arc::new(NoopNotifier),
            };
            Ok::<_, IndexerError>((adapter, content, notifier))
        }
        .await;

        let (adapter, content, notifier) = match adapters {
            Ok(adapters) => adapters,
            Err(e) => {
                if let Err(close_err) = pipeline.close().await {
                    warn!(error = %close_err, "Failed to close read pipeline after setup error");
                }
                return Err(e);
            }
        };

        let reader: Arc<dyn Middleware> = pipeline.clone();
        let index = FullTextIndex::new(
            tenant.clone(),
            hierarchy,
            contexts,
            adapter,
            content,
            reader,
            notifier,
            &services.indexing,
        );

        info!("Tenant indexer ready");
        Ok(Self {
            tenant,
            pipeline,
            index,
        })
    }

    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// The tenant's text-engine adapter.
    pub fn full_text(&self) -> &Arc<dyn FullTextAdapter> {
        self.index.adapter()
    }

    pub async fn search(
        &self,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, IndexerError> {
        Ok(self.index.search(classes, query, limit).await?)
    }

    pub async fn full_text_search(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, IndexerError> {
        Ok(self.index.search_fulltext(query, options).await?)
    }

    /// Queue transactions for indexing. Returns before they are indexed.
    pub async fn index(&self, txes: Vec<Tx>) -> Result<(), IndexerError> {
        Ok(self.index.submit(txes).await?)
    }

    /// Flush pending indexing work and release every adapter.
    pub async fn close(&self) -> Result<(), IndexerError> {
        let index = self.index.close().await;
        let pipeline = self.pipeline.close().await;
        info!(tenant = %self.tenant, "Tenant indexer closed");
        index?;
        pipeline?;
        Ok(())
    }
}

/// Apply the model transactions, skipping any that do not apply. Only the
/// applied ones reach the model store.
fn replay_model(tenant: &TenantKey, txes: &[Tx]) -> (Hierarchy, ModelDb) {
    let mut hierarchy = Hierarchy::new();
    let mut applied = Vec::with_capacity(txes.len());
    for tx in txes {
        match hierarchy.tx(tx) {
            Ok(()) => applied.push(tx.clone()),
            Err(e) => warn!(tenant = %tenant, error = %e, "Skipping model transaction"),
        }
    }
    let skipped = txes.len() - applied.len();
    if skipped > 0 {
        warn!(tenant = %tenant, skipped = skipped, "Model loaded with skipped transactions");
    }

    let mut model = ModelDb::new();
    model.add_txes(&applied);
    (hierarchy, model)
}

/// Builds tenant indexers for the pool.
#[async_trait]
pub trait IndexerFactory: Send + Sync {
    async fn create(&self, tenant: &TenantKey) -> Result<Arc<TenantIndexer>, IndexerError>;
}

/// Builds [`TenantIndexer`]s from shared [`IndexerServices`].
pub struct TenantIndexerFactory {
    services: IndexerServices,
}

impl TenantIndexerFactory {
    pub fn new(services: IndexerServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl IndexerFactory for TenantIndexerFactory {
    async fn create(&self, tenant: &TenantKey) -> Result<Arc<TenantIndexer>, IndexerError> {
        Ok(Arc::new(TenantIndexer::open(tenant.clone(), &self.services).await?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fulltext_indexer_repository::{
        MemoryFullTextFactory, MemoryStorageFactory, PlainTextContentFactory,
    };
    use fulltext_indexer_shared::classes;
    use fulltext_indexer_shared::hierarchy::builders::{attribute, class, search_context};
    use serde_json::{Map, Value};

    pub const ISSUE: &str = "tracker:class:Issue";

    pub fn model() -> Vec<Tx> {
        vec![
            class(classes::DOC, None, None),
            class(ISSUE, Some(classes::DOC), Some("tracker")),
            attribute(ISSUE, "title", "core:class:TypeString", Some("FullText")),
        ]
    }

    pub fn services(model: Vec<Tx>) -> IndexerServices {
        IndexerServices {
            model: Arc::new(model),
            db_url: "memory://".to_string(),
            storage: Arc::new(MemoryStorageFactory::new()),
            full_text: Arc::new(MemoryFullTextFactory::new()),
            content: Arc::new(PlainTextContentFactory),
            broadcast: None,
            indexing: IndexingConfig::default(),
        }
    }

    pub fn issue(id: &str, title: &str) -> Tx {
        let mut attrs = Map::new();
        attrs.insert("title".to_string(), Value::String(title.to_string()));
        Tx::create(ISSUE, id, "space1", attrs)
    }

    #[tokio::test]
    async fn test_indexed_writes_are_searchable_after_close() {
        let services = services(model());
        let indexer = TenantIndexer::open(TenantKey::new("w1"), &services).await.unwrap();

        indexer.index(vec![issue("i1", "printer on fire")]).await.unwrap();
        indexer.close().await.unwrap();

        // The text engine keeps the tenant's documents; a reopened indexer sees them.
        let reopened = TenantIndexer::open(TenantKey::new("w1"), &services).await.unwrap();
        let hits = reopened
            .search(
                &[ClassRef::new(ISSUE)],
                &DocumentQuery::new().with("$search", "printer"),
                10,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "i1");
    }

    #[tokio::test]
    async fn test_bad_model_transaction_is_skipped() {
        let mut txes = model();
        // Duplicate class and an attribute of an unknown class.
        txes.push(class(ISSUE, Some(classes::DOC), Some("tracker")));
        txes.push(attribute("missing:class:Thing", "name", "core:class:TypeString", None));

        let indexer = TenantIndexer::open(TenantKey::new("w1"), &services(txes)).await;
        assert!(indexer.is_ok());
    }

    #[test]
    fn test_rejected_model_transactions_stay_out_of_the_model() {
        let mut txes = model();
        let duplicate = {
            let mut attrs = Map::new();
            attrs.insert("extends".to_string(), Value::String(classes::DOC.to_string()));
            attrs.insert("label".to_string(), Value::String("shadow".to_string()));
            Tx::create(classes::CLASS, ISSUE, classes::MODEL_SPACE, attrs)
        };
        txes.push(duplicate);
        txes.push(search_context("missing:class:Thing", true));
        txes.push(search_context(ISSUE, true));

        let (hierarchy, model) = replay_model(&TenantKey::new("w1"), &txes);

        let contexts = model.search_contexts();
        assert_eq!(contexts.len(), 1);
        assert!(contexts.contains_key(&ClassRef::new(ISSUE)));
        assert!(!hierarchy.has_class(&ClassRef::new("missing:class:Thing")));

        let issues = model.find_all_sync(classes::CLASS);
        let issue = issues.iter().find(|d| d.id.as_str() == ISSUE).unwrap();
        assert_eq!(issue.attributes.get("label"), None);
    }

    #[tokio::test]
    async fn test_bad_storage_url_fails_construction() {
        let mut services = services(model());
        services.db_url = "postgres://localhost/db".to_string();

        let result = TenantIndexer::open(TenantKey::new("w1"), &services).await;
        assert!(matches!(result, Err(IndexerError::PipelineError(_))));
    }
}
