//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::IndexerClient;
use fulltext_indexer_pipeline::{
    creator, Middleware, MiddlewareCreator, Next, PipelineContext, PipelineError,
};
use fulltext_indexer_shared::{
    ClassRef, DocumentQuery, FindOptions, FindResult, IndexedDoc, SearchOptions, SearchQuery,
    SearchResult, TenantKey, Tx,
};

/// Returns canned hits and records what it was asked.
#[derive(Default)]
pub struct MockIndexerClient {
    pub hits: Vec<IndexedDoc>,
    pub fail: bool,
    pub search_calls: AtomicUsize,
    pub index_calls: AtomicUsize,
    pub last_classes: Mutex<Vec<ClassRef>>,
    pub last_query: Mutex<Option<DocumentQuery>>,
    pub last_limit: Mutex<Option<usize>>,
    pub forwarded: Mutex<Vec<Vec<Tx>>>,
}

impl MockIndexerClient {
    pub fn with_hits(hits: Vec<IndexedDoc>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl IndexerClient for MockIndexerClient {
    async fn search(
        &self,
        _tenant: &TenantKey,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, PipelineError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_classes.lock().unwrap() = classes.to_vec();
        *self.last_query.lock().unwrap() = Some(query.clone());
        *self.last_limit.lock().unwrap() = Some(limit);
        if self.fail {
            return Err(PipelineError::search("HTTP 404: Not Found"));
        }
        Ok(self.hits.clone())
    }

    async fn full_text_search(
        &self,
        _tenant: &TenantKey,
        _query: &SearchQuery,
        _options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        if self.fail {
            return Err(PipelineError::search("HTTP 404: Not Found"));
        }
        Ok(SearchResult::empty())
    }

    async fn index_documents(&self, _tenant: &TenantKey, txes: Vec<Tx>) -> Result<(), PipelineError> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::search("Request error: connection refused"));
        }
        self.forwarded.lock().unwrap().push(txes);
        Ok(())
    }
}

/// Records every batch it receives, then hands it to its successor.
pub struct RecordingMiddleware {
    received: Arc<Mutex<Vec<Vec<Tx>>>>,
    next: Next,
}

impl RecordingMiddleware {
    pub fn creator(received: Arc<Mutex<Vec<Vec<Tx>>>>) -> Arc<dyn MiddlewareCreator> {
        creator(move |_context: Arc<PipelineContext>, next: Next| {
            let received = received.clone();
            async move { Ok(Arc::new(Self { received, next }) as Arc<dyn Middleware>) }
        })
    }
}

#[async_trait]
impl Middleware for RecordingMiddleware {
    async fn find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError> {
        self.next.provide_find_all(class, query, options).await
    }

    async fn tx(&self, txes: &[Tx]) -> Result<(), PipelineError> {
        self.received.lock().unwrap().push(txes.to_vec());
        self.next.provide_tx(txes).await
    }

    async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        self.next.provide_search_fulltext(query, options).await
    }
}
