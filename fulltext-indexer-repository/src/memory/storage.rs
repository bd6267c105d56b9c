//! In-memory structured storage.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::matcher::{compare, matches};
use crate::errors::SearchError;
use crate::interfaces::{StorageAdapter, StorageAdapterFactory};
use fulltext_indexer_shared::query::SCORE_SORT_KEY;
use fulltext_indexer_shared::{
    ClassRef, Doc, DocRef, DocumentQuery, FindOptions, FindResult, Hierarchy, TenantKey, Tx,
};

type DocStore = Arc<RwLock<BTreeMap<DocRef, Doc>>>;

/// Scheme of storage URLs served by [`MemoryStorageFactory`].
pub const MEMORY_SCHEME: &str = "memory";

/// Structured storage kept in process memory.
pub struct MemoryStorageAdapter {
    hierarchy: Arc<Hierarchy>,
    docs: DocStore,
    closed: AtomicBool,
}

impl MemoryStorageAdapter {
    /// Create an empty store.
    pub fn new(hierarchy: Arc<Hierarchy>) -> Self {
        Self::with_store(hierarchy, DocStore::default())
    }

    fn with_store(hierarchy: Arc<Hierarchy>, docs: DocStore) -> Self {
        Self {
            hierarchy,
            docs,
            closed: AtomicBool::new(false),
        }
    }

    /// Insert or replace a document directly, bypassing transactions.
    pub async fn insert(&self, doc: Doc) {
        self.docs.write().await.insert(doc.id.clone(), doc);
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    fn ensure_open(&self) -> Result<(), SearchError> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(SearchError::Closed);
        }
        Ok(())
    }

    fn in_class(&self, doc: &Doc, class: &ClassRef, domain: &str) -> bool {
        let derived = doc.class == *class || self.hierarchy.is_derived(&doc.class, class);
        derived
            && self
                .hierarchy
                .find_domain(&doc.class)
                .map_or(true, |d| d == domain)
    }

    fn apply(docs: &mut BTreeMap<DocRef, Doc>, tx: Tx) {
        match tx.unwrap_collection() {
            Tx::CreateDoc(create) => {
                let doc = Doc::from(create);
                docs.insert(doc.id.clone(), doc);
            }
            Tx::UpdateDoc(update) => match docs.get_mut(&update.object_id) {
                Some(doc) => doc.apply_operations(&update.operations, &update.meta),
                None => debug!(doc_id = %update.object_id, "Update of unknown document ignored"),
            },
            Tx::RemoveDoc(remove) => {
                docs.remove(&remove.object_id);
            }
            Tx::Mixin(mixin) => match docs.get_mut(&mixin.object_id) {
                Some(doc) => doc.apply_mixin(&mixin.mixin, &mixin.attributes, &mixin.meta),
                None => debug!(doc_id = %mixin.object_id, "Mixin on unknown document ignored"),
            },
            Tx::CollectionCud(_) | Tx::WorkspaceEvent(_) => {}
        }
    }
}

fn to_object(doc: &Doc) -> Result<Map<String, Value>, SearchError> {
    match serde_json::to_value(doc) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SearchError::SerializationError(
            "document is not an object".to_string(),
        )),
        Err(e) => Err(SearchError::SerializationError(e.to_string())),
    }
}

fn sort_rows(rows: &mut [(Doc, Map<String, Value>)], options: &FindOptions) {
    let Some(sort) = &options.sort else {
        return;
    };
    // Relevance is not stored; the caller orders by it.
    let keys: Vec<_> = sort
        .iter()
        .filter(|(key, _)| key.as_str() != SCORE_SORT_KEY)
        .collect();
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|(_, a), (_, b)| {
        for (key, order) in &keys {
            let right = b.get(key.as_str()).unwrap_or(&Value::Null);
            let ord = compare(a.get(key.as_str()), right).unwrap_or(Ordering::Equal);
            let ord = if order.factor() < 0.0 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl StorageAdapter for MemoryStorageAdapter {
    async fn init(&self) -> Result<(), SearchError> {
        self.ensure_open()
    }

    async fn find_all(
        &self,
        domain: &str,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, SearchError> {
        self.ensure_open()?;
        let docs = self.docs.read().await;

        let mut rows = Vec::new();
        for doc in docs.values().filter(|d| self.in_class(d, class, domain)) {
            let object = to_object(doc)?;
            if matches(&object, query)? {
                rows.push((doc.clone(), object));
            }
        }
        sort_rows(&mut rows, options);

        let total = rows.len();
        let limit = options.limit.unwrap_or(total);
        let docs: Vec<Doc> = rows.into_iter().take(limit).map(|(doc, _)| doc).collect();
        debug!(class = %class, total, returned = docs.len(), "Memory find");
        Ok(FindResult::new(docs, total))
    }

    async fn tx(&self, txes: &[Tx]) -> Result<(), SearchError> {
        self.ensure_open()?;
        let mut docs = self.docs.write().await;
        for tx in txes {
            Self::apply(&mut docs, tx.clone());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SearchError> {
        self.closed.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }
}

/// Opens [`MemoryStorageAdapter`]s for `memory://` URLs.
#[derive(Default)]
pub struct MemoryStorageFactory {
    stores: Mutex<HashMap<TenantKey, DocStore>>,
}

impl MemoryStorageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, tenant: &TenantKey) -> Result<DocStore, SearchError> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| SearchError::storage("memory store registry poisoned"))?;
        Ok(stores.entry(tenant.clone()).or_default().clone())
    }
}

#[async_trait]
impl StorageAdapterFactory for MemoryStorageFactory {
    async fn create(
        &self,
        tenant: &TenantKey,
        db_url: &str,
        hierarchy: Arc<Hierarchy>,
    ) -> Result<Arc<dyn StorageAdapter>, SearchError> {
        let url = Url::parse(db_url).map_err(|e| SearchError::connection(e.to_string()))?;
        if url.scheme() != MEMORY_SCHEME {
            warn!(tenant = %tenant, scheme = url.scheme(), "Unsupported storage scheme");
            return Err(SearchError::connection(format!(
                "unsupported storage scheme {}",
                url.scheme()
            )));
        }
        let store = self.store(tenant)?;
        Ok(Arc::new(MemoryStorageAdapter::with_store(hierarchy, store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulltext_indexer_shared::classes;
    use fulltext_indexer_shared::hierarchy::builders::{class, mixin};
    use fulltext_indexer_shared::SortingOrder;
    use serde_json::json;

    const ISSUE: &str = "tracker:class:Issue";
    const SUB_ISSUE: &str = "tracker:class:SubIssue";
    const COMMENT: &str = "chunter:class:ChatMessage";

    fn hierarchy() -> Arc<Hierarchy> {
        let mut h = Hierarchy::new();
        for tx in [
            class(classes::DOC, None, None),
            class(ISSUE, Some(classes::DOC), Some("tracker")),
            class(SUB_ISSUE, Some(ISSUE), None),
            class(COMMENT, Some(classes::DOC), Some("chunter")),
            mixin("tags:mixin:Labels", ISSUE),
        ] {
            h.tx(&tx).unwrap();
        }
        Arc::new(h)
    }

    async fn seeded() -> MemoryStorageAdapter {
        let store = MemoryStorageAdapter::new(hierarchy());
        store.insert(Doc::new("i1", ISSUE, "s1").with_attribute("rank", 2)).await;
        store.insert(Doc::new("i2", SUB_ISSUE, "s1").with_attribute("rank", 1)).await;
        store.insert(Doc::new("i3", ISSUE, "s2").with_attribute("rank", 3)).await;
        store.insert(Doc::new("c1", COMMENT, "s1")).await;
        store
    }

    #[tokio::test]
    async fn test_find_includes_derived_classes() {
        let store = seeded().await;
        let result = store
            .find_all("tracker", &ClassRef::new(ISSUE), &DocumentQuery::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(result.total, 3);

        let result = store
            .find_all("tracker", &ClassRef::new(SUB_ISSUE), &DocumentQuery::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![&DocRef::new("i2")]);
    }

    #[tokio::test]
    async fn test_find_sorts_limits_and_reports_total() {
        let store = seeded().await;
        let options = FindOptions::default()
            .with_sort("rank", SortingOrder::Descending)
            .with_sort(SCORE_SORT_KEY, SortingOrder::Descending)
            .with_limit(2);
        let result = store
            .find_all("tracker", &ClassRef::new(ISSUE), &DocumentQuery::new(), &options)
            .await
            .unwrap();
        assert_eq!(result.total, 3);
        assert_eq!(result.ids(), vec![&DocRef::new("i3"), &DocRef::new("i1")]);
    }

    #[tokio::test]
    async fn test_find_applies_query() {
        let store = seeded().await;
        let query = DocumentQuery::new()
            .with("space", "s1")
            .with("_id", json!({ "$nin": ["i1"] }));
        let result = store
            .find_all("tracker", &ClassRef::new(ISSUE), &query, &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![&DocRef::new("i2")]);
    }

    #[tokio::test]
    async fn test_transactions() {
        let store = MemoryStorageAdapter::new(hierarchy());
        let mut attrs = Map::new();
        attrs.insert("title".to_string(), json!("first"));
        let comment = Tx::create(COMMENT, "c1", "s1", Map::new()).in_collection(ISSUE, "i1", "comments");
        store
            .tx(&[Tx::create(ISSUE, "i1", "s1", attrs), comment])
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        let result = store
            .find_all("chunter", &ClassRef::new(COMMENT), &DocumentQuery::new(), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(result.docs[0].attached_to, Some(DocRef::new("i1")));
        assert_eq!(result.docs[0].attached_to_class, Some(ClassRef::new(ISSUE)));

        store.tx(&[Tx::remove(ISSUE, "i1", "s1")]).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_factory_shares_data_per_tenant() {
        let factory = MemoryStorageFactory::new();
        let tenant = TenantKey::new("w1");
        let first = factory.create(&tenant, "memory://", hierarchy()).await.unwrap();
        first.tx(&[Tx::create(ISSUE, "i1", "s1", Map::new())]).await.unwrap();
        first.close().await.unwrap();
        assert!(matches!(
            first.tx(&[]).await,
            Err(SearchError::Closed)
        ));

        let reopened = factory.create(&tenant, "memory://", hierarchy()).await.unwrap();
        let other = factory.create(&TenantKey::new("w2"), "memory://", hierarchy()).await.unwrap();
        let query = DocumentQuery::new();
        let options = FindOptions::default();
        let issue = ClassRef::new(ISSUE);
        assert_eq!(reopened.find_all("tracker", &issue, &query, &options).await.unwrap().total, 1);
        assert_eq!(other.find_all("tracker", &issue, &query, &options).await.unwrap().total, 0);

        assert!(factory.create(&tenant, "postgres://db", hierarchy()).await.is_err());
    }
}
