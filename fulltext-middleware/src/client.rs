//! Client for the indexer pool's HTTP endpoints.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use fulltext_indexer_pipeline::PipelineError;
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FullTextSearchRequest, IndexDocumentsRequest, IndexedDoc,
    SearchOptions, SearchQuery, SearchRequest, SearchResult, TenantKey, Tx,
};

/// Calls into one indexer endpoint on behalf of a tenant.
#[async_trait]
pub trait IndexerClient: Send + Sync {
    /// Raw text hits for a flattened query.
    ///
    /// # Arguments
    ///
    /// * `classes` - Candidate classes the hits may belong to
    /// * `query` - `$search` plus the indexed constraints, under flattened keys
    /// * `limit` - Maximum number of hits
    async fn search(
        &self,
        tenant: &TenantKey,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, PipelineError>;

    /// Keyword search returning ranked titles.
    async fn full_text_search(
        &self,
        tenant: &TenantKey,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError>;

    /// Hand transactions to the tenant's indexing pipeline.
    async fn index_documents(&self, tenant: &TenantKey, txes: Vec<Tx>) -> Result<(), PipelineError>;
}

/// [`IndexerClient`] speaking JSON over HTTP.
pub struct HttpIndexerClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpIndexerClient {
    pub fn new(endpoint: &str, token: impl Into<String>) -> Self {
        Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn put<B, R>(&self, path: &str, body: &B) -> Result<R, PipelineError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/api/v1/{}", self.base_url, path);
        let response = self.client.put(&url).json(body).send().await.map_err(|e| {
            error!(url = %url, error = %e, "Indexer request failed");
            PipelineError::search(format!("Request error: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::search(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| PipelineError::search(format!("Parse error: {}", e)))
    }
}

#[async_trait]
impl IndexerClient for HttpIndexerClient {
    async fn search(
        &self,
        tenant: &TenantKey,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, PipelineError> {
        let request = SearchRequest {
            token: self.token.clone(),
            tenant: tenant.clone(),
            classes: classes.to_vec(),
            query: query.clone(),
            full_text_limit: limit,
        };
        let hits: Vec<IndexedDoc> = self.put("search", &request).await?;
        debug!(tenant = %tenant, hits = hits.len(), "Indexer search completed");
        Ok(hits)
    }

    async fn full_text_search(
        &self,
        tenant: &TenantKey,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        let request = FullTextSearchRequest {
            token: self.token.clone(),
            tenant: tenant.clone(),
            query: query.clone(),
            options: options.clone(),
        };
        self.put("full-text-search", &request).await
    }

    async fn index_documents(&self, tenant: &TenantKey, txes: Vec<Tx>) -> Result<(), PipelineError> {
        let request = IndexDocumentsRequest {
            token: self.token.clone(),
            tenant: tenant.clone(),
            requests: txes,
        };
        let _: serde_json::Value = self.put("index-documents", &request).await?;
        Ok(())
    }
}
