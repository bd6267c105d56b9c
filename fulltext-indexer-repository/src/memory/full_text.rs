//! In-memory text engine.
//!
//! Scores a document by the number of occurrences of the query terms in its
//! summary and title. Every term must occur for the document to match.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::matcher::matches;
use crate::errors::SearchError;
use crate::interfaces::{FullTextAdapter, FullTextAdapterFactory};
use fulltext_indexer_shared::classes;
use fulltext_indexer_shared::{
    ClassRef, DocRef, DocumentQuery, IndexedDoc, SearchOptions, SearchQuery, SearchResult,
    SearchResultDoc, TenantKey, SUMMARY_FIELD, TITLE_FIELD,
};

type IndexStore = Arc<RwLock<BTreeMap<DocRef, IndexedDoc>>>;

const DEFAULT_SEARCH_LIMIT: usize = 50;

pub struct MemoryFullTextAdapter {
    docs: IndexStore,
    closed: AtomicBool,
}

impl Default for MemoryFullTextAdapter {
    fn default() -> Self {
        Self::with_store(IndexStore::default())
    }
}

impl MemoryFullTextAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_store(docs: IndexStore) -> Self {
        Self {
            docs,
            closed: AtomicBool::new(false),
        }
    }

    /// Number of indexed documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    fn ensure_open(&self) -> Result<(), SearchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SearchError::Closed);
        }
        Ok(())
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn text_of(doc: &IndexedDoc) -> String {
    [SUMMARY_FIELD, TITLE_FIELD]
        .iter()
        .filter_map(|field| doc.fields.get(*field).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Occurrences of all `terms` in `doc`, or `None` when one is missing.
fn score(doc: &IndexedDoc, terms: &[String]) -> Option<f64> {
    if terms.is_empty() {
        return None;
    }
    let text = text_of(doc);
    let mut total = 0usize;
    for term in terms {
        let count = text.matches(term.as_str()).count();
        if count == 0 {
            return None;
        }
        total += count;
    }
    Some(total as f64)
}

fn in_classes(doc: &IndexedDoc, classes: &[ClassRef]) -> bool {
    classes.is_empty()
        || doc
            .class
            .as_ref()
            .is_some_and(|set| classes.iter().any(|c| set.contains(c)))
}

fn ranked(mut hits: Vec<IndexedDoc>, limit: usize) -> Vec<IndexedDoc> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}

#[async_trait]
impl FullTextAdapter for MemoryFullTextAdapter {
    async fn search(
        &self,
        classes: &[ClassRef],
        query: &DocumentQuery,
        limit: usize,
    ) -> Result<Vec<IndexedDoc>, SearchError> {
        self.ensure_open()?;
        let terms = terms(query.search().unwrap_or_default());
        let docs = self.docs.read().await;

        let mut hits = Vec::new();
        for doc in docs.values().filter(|d| in_classes(d, classes)) {
            let Some(score) = score(doc, &terms) else {
                continue;
            };
            let object = serde_json::to_value(doc)
                .map_err(|e| SearchError::SerializationError(e.to_string()))?;
            let Value::Object(object) = object else {
                continue;
            };
            if matches(&object, query)? {
                hits.push(doc.clone().with_score(score));
            }
        }
        debug!(matched = hits.len(), limit, "Memory full-text search");
        Ok(ranked(hits, limit))
    }

    async fn search_string(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, SearchError> {
        self.ensure_open()?;
        let terms = terms(&query.query);
        let classes = query.classes.clone().unwrap_or_default();
        let docs = self.docs.read().await;

        let hits: Vec<IndexedDoc> = docs
            .values()
            .filter(|d| in_classes(d, &classes))
            .filter(|d| match &query.spaces {
                Some(spaces) => d
                    .fields
                    .get("space")
                    .and_then(Value::as_str)
                    .is_some_and(|space| spaces.iter().any(|s| s.as_str() == space)),
                None => true,
            })
            .filter_map(|d| score(d, &terms).map(|s| d.clone().with_score(s)))
            .collect();
        let total = hits.len();

        let docs = ranked(hits, options.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
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
        Ok(SearchResult {
            docs,
            total: Some(total),
        })
    }

    async fn update_many(&self, docs: &[IndexedDoc]) -> Result<(), SearchError> {
        self.ensure_open()?;
        let mut store = self.docs.write().await;
        for doc in docs {
            store.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn remove(&self, ids: &[DocRef]) -> Result<(), SearchError> {
        self.ensure_open()?;
        let mut store = self.docs.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    async fn init(&self) -> Result<(), SearchError> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<(), SearchError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens [`MemoryFullTextAdapter`]s; each tenant has its own index.
#[derive(Default)]
pub struct MemoryFullTextFactory {
    indexes: Mutex<HashMap<TenantKey, IndexStore>>,
}

impl MemoryFullTextFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FullTextAdapterFactory for MemoryFullTextFactory {
    async fn create(&self, tenant: &TenantKey) -> Result<Arc<dyn FullTextAdapter>, SearchError> {
        let store = self
            .indexes
            .lock()
            .map_err(|_| SearchError::index("memory index registry poisoned"))?
            .entry(tenant.clone())
            .or_default()
            .clone();
        Ok(Arc::new(MemoryFullTextAdapter::with_store(store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ISSUE: &str = "tracker:class:Issue";
    const COMMENT: &str = "chunter:class:ChatMessage";

    fn indexed(id: &str, class: &str, summary: &str) -> IndexedDoc {
        let mut doc = IndexedDoc::new(id, ClassRef::new(class));
        doc.fields.insert(SUMMARY_FIELD.to_string(), json!(summary));
        doc.fields.insert("space".to_string(), json!("s1"));
        doc
    }

    async fn seeded() -> MemoryFullTextAdapter {
        let adapter = MemoryFullTextAdapter::new();
        adapter
            .update_many(&[
                indexed("i1", ISSUE, "login fails on login page"),
                indexed("i2", ISSUE, "login is slow"),
                indexed("c1", COMMENT, "cannot reproduce login"),
                indexed("i3", ISSUE, "unrelated"),
            ])
            .await
            .unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_search_ranks_and_filters_classes() {
        let adapter = seeded().await;
        let query = DocumentQuery::new().with("$search", "login");
        let hits = adapter.search(&[ClassRef::new(ISSUE)], &query, 10).await.unwrap();

        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);
        assert_eq!(hits[0].score, Some(2.0));
    }

    #[tokio::test]
    async fn test_search_applies_field_filters_and_limit() {
        let adapter = seeded().await;
        let query = DocumentQuery::new()
            .with("$search", "login")
            .with("id", json!({ "$ne": "i1" }));
        let hits = adapter
            .search(&[ClassRef::new(ISSUE), ClassRef::new(COMMENT)], &query, 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "c1");
    }

    #[tokio::test]
    async fn test_search_string() {
        let adapter = seeded().await;
        let mut query = SearchQuery::new("login");
        query.classes = Some(vec![ClassRef::new(COMMENT)]);
        let result = adapter
            .search_string(&query, &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(result.total, Some(1));
        assert_eq!(result.docs[0].class.as_str(), COMMENT);
    }

    #[tokio::test]
    async fn test_remove_and_close() {
        let adapter = seeded().await;
        adapter.remove(&[DocRef::new("i1"), DocRef::new("missing")]).await.unwrap();
        assert_eq!(adapter.len().await, 3);

        adapter.close().await.unwrap();
        let query = DocumentQuery::new().with("$search", "login");
        assert!(matches!(
            adapter.search(&[], &query, 10).await,
            Err(SearchError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_factory_isolates_tenants() {
        let factory = MemoryFullTextFactory::new();
        let a = factory.create(&TenantKey::new("a")).await.unwrap();
        let b = factory.create(&TenantKey::new("b")).await.unwrap();
        a.update_many(&[indexed("i1", ISSUE, "secret")]).await.unwrap();

        let query = DocumentQuery::new().with("$search", "secret");
        assert_eq!(a.search(&[], &query, 10).await.unwrap().len(), 1);
        assert!(b.search(&[], &query, 10).await.unwrap().is_empty());

        let again = factory.create(&TenantKey::new("a")).await.unwrap();
        assert_eq!(again.search(&[], &query, 10).await.unwrap().len(), 1);
    }
}
