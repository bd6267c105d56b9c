//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `FullTextAdapter`
//! using the OpenSearch Rust client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts},
    BulkParts, OpenSearch, SearchParts,
};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::FullTextAdapterConfig;
use crate::errors::SearchError;
use crate::interfaces::{FullTextAdapter, FullTextAdapterFactory};
use crate::opensearch::index_config::{get_index_settings, index_name};
use crate::opensearch::queries::{build_search_query, build_search_string_query};
use fulltext_indexer_shared::classes;
use fulltext_indexer_shared::{
    ClassRef, DocRef, DocumentQuery, IndexedDoc, SearchOptions, SearchQuery, SearchResult,
    SearchResultDoc, TenantKey, TITLE_FIELD,
};

const DEFAULT_SEARCH_LIMIT: usize = 50;

/// OpenSearch text engine for one tenant.
///
/// # Example
///
/// ```ignore
/// use fulltext_indexer_repository::{FullTextAdapterConfig, OpenSearchAdapter};
/// let config = FullTextAdapterConfig::new("http://localhost:9200", "fulltext");
/// let adapter = OpenSearchAdapter::new(&config, &TenantKey::new("acme"))?;
/// adapter.init().await?;
/// ```
pub struct OpenSearchAdapter {
    client: OpenSearch,
    index: String,
    max_batch_size: Option<usize>,
    closed: AtomicBool,
}

impl OpenSearchAdapter {
    /// Create an adapter for `tenant`'s index.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine URL, index prefix and batch size
    /// * `tenant` - Tenant whose index the adapter addresses
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchAdapter)` - A new adapter instance
    /// * `Err(SearchError)` - If connection setup fails
    pub fn new(config: &FullTextAdapterConfig, tenant: &TenantKey) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(&config.url).map_err(|e| SearchError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let index = index_name(&config.index_prefix, tenant);
        info!(url = %config.url, index = %index, "Created OpenSearch client");

        Ok(Self {
            client: OpenSearch::new(transport),
            index,
            max_batch_size: config.max_batch_size,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), SearchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SearchError::Closed);
        }
        Ok(())
    }

    fn batch_size(&self, len: usize) -> usize {
        self.max_batch_size.unwrap_or(len).max(1)
    }

    /// Parse an OpenSearch hit into an indexed document carrying its score.
    fn parse_hit(hit: &Value) -> Option<IndexedDoc> {
        let mut source: Map<String, Value> = hit.get("_source")?.as_object()?.clone();
        if !source.contains_key("id") {
            source.insert("id".to_string(), hit.get("_id")?.clone());
        }
        let doc: IndexedDoc = serde_json::from_value(Value::Object(source)).ok()?;
        let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
        Some(doc.with_score(score))
    }

    async fn run_search(&self, body: Value) -> Result<Value, SearchError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::query(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Search request failed");
            return Err(SearchError::query(format!(
                "Search failed with status {}: {}",
                status, error_body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))
    }

    fn hits(response: &Value) -> Vec<IndexedDoc> {
        response
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(Self::parse_hit).collect())
            .unwrap_or_default()
    }

    async fn send_bulk(
        &self,
        body: Vec<JsonBody<Value>>,
        action: &str,
    ) -> Result<(), SearchError> {
        let response = self
            .client
            .bulk(BulkParts::Index(&self.index))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::bulk_index(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;
        if response_body.get("errors").and_then(Value::as_bool) == Some(true) {
            let failed: Vec<&Value> = response_body
                .get("items")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.get(action))
                        .filter(|item| {
                            // Deleting a missing document is not a failure.
                            item.get("error").is_some()
                                && item.get("status").and_then(Value::as_u64) != Some(404)
                        })
                        .collect()
                })
                .unwrap_or_default();
            if !failed.is_empty() {
                warn!(failed = failed.len(), first = %failed[0], "Bulk items failed");
                return Err(SearchError::bulk_index(format!(
                    "{} {} operations failed",
                    failed.len(),
                    action
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FullTextAdapter for OpenSearchAdapter {
    #[instrument(skip(self, query), fields(index = %self.index))]
    async fn search(
        &self,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, SearchError> {
        self.ensure_open()?;
        let response = self.run_search(build_search_query(classes, query, limit)).await?;
        let hits = Self::hits(&response);
        debug!(hits = hits.len(), "Search completed");
        Ok(hits)
    }

    async fn search_string(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, SearchError> {
        self.ensure_open()?;
        let limit = options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let response = self.run_search(build_search_string_query(query, limit)).await?;

        let total = response
            .get("hits")
            .and_then(|h| h.get("total"))
            .and_then(|t| t.get("value"))
            .and_then(Value::as_u64)
            .map(|t| t as usize);
        let docs = Self::hits(&response)
            .into_iter()
            .map(|hit| SearchResultDoc {
                class: hit
                    .class
                    .as_ref()
                    .and_then(|set| set.iter().next().cloned())
                    .unwrap_or_else(|| ClassRef::new(classes::DOC)),
                score: hit.score.unwrap_or_default(),
                title: hit
                    .fields
                    .get(TITLE_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string),
                id: hit.id,
            })
            .collect();
        Ok(SearchResult { docs, total })
    }

    #[instrument(skip(self, docs), fields(index = %self.index, count = docs.len()))]
    async fn update_many(&self, docs: &[IndexedDoc]) -> Result<(), SearchError> {
        self.ensure_open()?;
        for chunk in docs.chunks(self.batch_size(docs.len())) {
            let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(chunk.len() * 2);
            for doc in chunk {
                let source = serde_json::to_value(doc)
                    .map_err(|e| SearchError::SerializationError(e.to_string()))?;
                body.push(json!({ "index": { "_index": self.index, "_id": doc.id } }).into());
                body.push(source.into());
            }
            self.send_bulk(body, "index").await?;
        }
        debug!("Documents indexed");
        Ok(())
    }

    async fn remove(&self, ids: &[DocRef]) -> Result<(), SearchError> {
        self.ensure_open()?;
        for chunk in ids.chunks(self.batch_size(ids.len())) {
            let body: Vec<JsonBody<Value>> = chunk
                .iter()
                .map(|id| json!({ "delete": { "_index": self.index, "_id": id } }).into())
                .collect();
            self.send_bulk(body, "delete")
                .await
                .map_err(|e| SearchError::delete(e.to_string()))?;
        }
        Ok(())
    }

    async fn init(&self) -> Result<(), SearchError> {
        self.ensure_open()?;
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index]))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;
        if exists.status_code().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SearchError::IndexCreationError(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            // Another process may have created the index in the meantime.
            if error_body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            error!(status = %status, body = %error_body, "Index creation failed");
            return Err(SearchError::IndexCreationError(format!(
                "Index creation failed with status {}: {}",
                status, error_body
            )));
        }
        info!(index = %self.index, "Created index");
        Ok(())
    }

    async fn close(&self) -> Result<(), SearchError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens an [`OpenSearchAdapter`] per tenant against a shared cluster.
pub struct OpenSearchFactory {
    config: FullTextAdapterConfig,
}

impl OpenSearchFactory {
    pub fn new(config: FullTextAdapterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl FullTextAdapterFactory for OpenSearchFactory {
    async fn create(&self, tenant: &TenantKey) -> Result<Arc<dyn FullTextAdapter>, SearchError> {
        Ok(Arc::new(OpenSearchAdapter::new(&self.config, tenant)?))
    }
}
