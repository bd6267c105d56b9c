//! The search middleware.
//!
//! Finds carrying a `$search` clause are answered in two steps: the tenant's
//! indexer returns scored hits for a flattened copy of the query, then the
//! structured store below is asked for exactly the matching rows. Everything
//! else passes straight through.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::client::{HttpIndexerClient, IndexerClient};
use crate::config::FullTextMiddlewareConfig;
use crate::forwarder::TxForwarder;
use crate::routing::{select_endpoint, split_endpoints};
use fulltext_indexer_pipeline::{creator, Middleware, MiddlewareCreator, Next, PipelineContext, PipelineError};
use fulltext_indexer_shared::query::{ID_KEY, SEARCH_KEY};
use fulltext_indexer_shared::{
    doc_key, ClassRef, DocRef, DocSource, DocumentQuery, FindOptions, FindResult,
    FullTextSearchContext, IdConstraint, IndexedDoc, SearchOptions, SearchQuery, SearchResult,
    SortingOrder, Tx, SCORE_SORT_KEY,
};

/// Hard ceiling on the number of hits requested from the indexer.
const MAX_FULL_TEXT_LIMIT: usize = 5000;
/// Caller limit assumed when a `$search` find has none.
const DEFAULT_FIND_LIMIT: usize = 200;
/// Hits requested per row the caller asked for.
const OVER_FETCH_FACTOR: usize = 100;

/// Attributes the indexer stores under their plain name.
const STRUCTURAL_FIELDS: [&str; 6] = [
    "_class",
    "modifiedBy",
    "modifiedOn",
    "space",
    "attachedTo",
    "attachedToClass",
];

/// Hits reconciled into result ids, in first-seen order.
#[derive(Debug, Default)]
struct Matches {
    ids: Vec<DocRef>,
    seen: HashSet<DocRef>,
    scores: HashMap<DocRef, Option<f64>>,
}

impl Matches {
    fn add(&mut self, id: &DocRef, score: Option<f64>) {
        if self.seen.insert(id.clone()) {
            self.ids.push(id.clone());
        }
        self.scores.insert(id.clone(), score);
    }

    fn contains(&self, id: &DocRef) -> bool {
        self.seen.contains(id)
    }

    fn score(&self, id: &DocRef) -> Option<f64> {
        self.scores.get(id).copied().flatten()
    }
}

/// Which rows survive the caller's identifier constraint.
#[derive(Debug, PartialEq)]
enum Eligible {
    /// Exactly these ids.
    Only(Vec<DocRef>),
    /// Every row except these ids, hit or not.
    AllExcept(Vec<DocRef>),
}

/// Routes `$search` finds to the tenant's indexer and forwards indexable
/// writes to it.
pub struct FullTextMiddleware {
    context: Arc<PipelineContext>,
    next: Next,
    client: Arc<dyn IndexerClient>,
    contexts: HashMap<ClassRef, FullTextSearchContext>,
    forwarder: TxForwarder,
}

impl FullTextMiddleware {
    /// Creator that routes the tenant to one of `config.indexer_url`'s
    /// endpoints over HTTP.
    pub fn creator(config: FullTextMiddlewareConfig) -> Arc<dyn MiddlewareCreator> {
        let config = Arc::new(config);
        creator(move |context: Arc<PipelineContext>, next: Next| {
            let config = config.clone();
            async move {
                let endpoints = split_endpoints(&config.indexer_url);
                let endpoint = select_endpoint(&context.tenant, &endpoints)
                    .filter(|endpoint| !endpoint.is_empty())
                    .ok_or_else(|| PipelineError::middleware("No indexer endpoint configured"))?;
                info!(tenant = %context.tenant, endpoint = %endpoint, "Routing tenant to indexer");

                let client: Arc<dyn IndexerClient> =
                    Arc::new(HttpIndexerClient::new(endpoint, config.token.clone()));
                Ok::<_, PipelineError>(
                    Arc::new(Self::new(context, next, client, config.forward_queue_capacity))
                        as Arc<dyn Middleware>,
                )
            }
        })
    }

    /// Build the middleware around an existing indexer client. Indexing
    /// contexts are loaded from the tenant's model.
    pub fn new(
        context: Arc<PipelineContext>,
        next: Next,
        client: Arc<dyn IndexerClient>,
        forward_queue_capacity: usize,
    ) -> Self {
        let contexts = context.model.search_contexts();
        let forwarder = TxForwarder::start(context.tenant.clone(), client.clone(), forward_queue_capacity);
        Self {
            context,
            next,
            client,
            contexts,
            forwarder,
        }
    }

    /// Candidate classes and the flattened indexer query for a find on `class`.
    fn indexer_query(
        &self,
        class: &ClassRef,
        base: &ClassRef,
        search: &str,
        query: &DocumentQuery,
    ) -> (Vec<ClassRef>, DocumentQuery) {
        let hierarchy = &self.context.hierarchy;
        let concrete = |of: &ClassRef| -> Vec<ClassRef> {
            hierarchy
                .get_descendants(of)
                .into_iter()
                .filter(|c| !hierarchy.is_mixin(c))
                .collect()
        };

        let mut classes = concrete(base);
        let mut find_query = DocumentQuery::new().with(SEARCH_KEY, search);

        match hierarchy.get_all_attributes(class) {
            Ok(attributes) => {
                for (key, attr) in &attributes {
                    if attr.is_full_text() || attr.is_indexed() {
                        if let Some(value) = query.get(key).filter(|v| !v.is_null()) {
                            if STRUCTURAL_FIELDS.contains(&key.as_str()) {
                                find_query.insert(key.as_str(), value.clone());
                            } else {
                                find_query.insert(doc_key(&attr.name, Some(&attr.attribute_of)), value.clone());
                            }
                        }
                    }
                    // Hits on attached documents resolve back to their owner.
                    if let Some(of) = attr.collection_of() {
                        classes.extend(concrete(of));
                    }
                }
            }
            Err(e) => warn!(class = %class, error = %e, "Failed to resolve attributes for search"),
        }

        let mut seen = HashSet::new();
        classes.retain(|c| seen.insert(c.clone()));
        if let Some(constraint) = query.class_constraint() {
            classes.retain(|c| constraint.allows(c));
        }
        (classes, find_query)
    }

    /// Map hits to the ids of documents of `base`, re-keying attached hits to
    /// their owner.
    fn reconcile(&self, base: &ClassRef, hits: &[IndexedDoc]) -> Matches {
        let hierarchy = &self.context.hierarchy;
        let mut matches = Matches::default();

        for hit in hits {
            let own = hit
                .class
                .as_ref()
                .is_some_and(|set| set.iter().any(|c| hierarchy.is_derived(c, base)));
            if own {
                matches.add(&hit.id, hit.score);
            }

            if let Some(owner) = &hit.attached_to {
                match &hit.attached_to_class {
                    Some(owner_class) if !hierarchy.is_derived(owner_class, base) => {}
                    _ => matches.add(owner, hit.score),
                }
            }
        }
        matches
    }

    fn eligible(matches: &Matches, id: Option<IdConstraint>) -> Eligible {
        match id {
            None => Eligible::Only(matches.ids.clone()),
            Some(IdConstraint::Eq(id)) => {
                Eligible::Only(if matches.contains(&id) { vec![id] } else { Vec::new() })
            }
            Some(IdConstraint::In(ids)) => {
                let mut seen = HashSet::new();
                Eligible::Only(
                    ids.into_iter()
                        .filter(|id| matches.contains(id) && seen.insert(id.clone()))
                        .collect(),
                )
            }
            Some(IdConstraint::Nin(ids)) => Eligible::AllExcept(ids),
            Some(IdConstraint::Ne(id)) => Eligible::AllExcept(vec![id]),
        }
    }
}

#[async_trait]
impl Middleware for FullTextMiddleware {
    #[instrument(skip(self, query, options), fields(tenant = %self.context.tenant, class = %class))]
    async fn find_all(
        &self,
        class: &ClassRef,
        query: &DocumentQuery,
        options: &FindOptions,
    ) -> Result<FindResult, PipelineError> {
        let Some(parts) = query.clone().split_search() else {
            return self.next.provide_find_all(class, query, options).await;
        };
        if let Some(id) = &parts.unrecognised_id {
            debug!(id = %id, "Unsupported _id constraint in search find, answering empty");
            return Ok(FindResult::empty());
        }

        let base = self.context.hierarchy.get_base_class(class);
        let (classes, find_query) = self.indexer_query(class, &base, &parts.search, query);

        let limit = options
            .limit
            .unwrap_or(DEFAULT_FIND_LIMIT)
            .saturating_mul(OVER_FETCH_FACTOR)
            .min(MAX_FULL_TEXT_LIMIT);

        let hits = match self
            .client
            .search(&self.context.tenant, &classes, &find_query, limit)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Indexer search failed, answering empty");
                return Ok(FindResult::empty());
            }
        };
        if hits.is_empty() {
            return Ok(FindResult::empty());
        }

        let matches = self.reconcile(&base, &hits);
        let score_sort = options.score_sort();

        let mut store_query = parts.main;
        let store_limit = match Self::eligible(&matches, parts.id) {
            Eligible::Only(ids) => {
                if ids.is_empty() {
                    return Ok(FindResult::empty());
                }
                store_query.insert(ID_KEY, json!({ "$in": ids }));
                match score_sort {
                    Some(_) => Some(hits.len()),
                    None => options.limit,
                }
            }
            Eligible::AllExcept(ids) => {
                store_query.insert(ID_KEY, json!({ "$nin": ids }));
                match score_sort {
                    Some(_) => None,
                    None => options.limit,
                }
            }
        };

        let mut store_options = options.clone();
        store_options.limit = store_limit;
        if let Some(sort) = store_options.sort.as_mut() {
            sort.remove(SCORE_SORT_KEY);
        }
        if store_options.sort.as_ref().is_some_and(|sort| sort.is_empty()) {
            store_options.sort = None;
        }

        let mut result = self
            .next
            .provide_find_all(class, &store_query, &store_options)
            .await?;

        for doc in result.docs.iter_mut() {
            doc.source = Some(DocSource {
                score: matches.score(&doc.id),
            });
        }

        if let Some(order) = score_sort {
            result.docs.sort_by(|a, b| {
                let ordering = a
                    .score()
                    .unwrap_or_default()
                    .total_cmp(&b.score().unwrap_or_default());
                match order {
                    SortingOrder::Ascending => ordering,
                    SortingOrder::Descending => ordering.reverse(),
                }
            });
            if let Some(limit) = options.limit {
                result.docs.truncate(limit);
            }
        }

        debug!(hits = hits.len(), rows = result.docs.len(), total = result.total, "Search find completed");
        Ok(result)
    }

    async fn tx(&self, txes: &[Tx]) -> Result<(), PipelineError> {
        let hierarchy = &self.context.hierarchy;
        let requests: Vec<Tx> = txes
            .iter()
            .map(|tx| tx.clone().unwrap_collection())
            .filter(|tx| {
                tx.as_cud()
                    .is_some_and(|cud| hierarchy.is_class_indexable(cud.object_class(), &self.contexts))
            })
            .collect();

        if !requests.is_empty() {
            debug!(tenant = %self.context.tenant, count = requests.len(), "Forwarding transactions for indexing");
            self.forwarder.forward(requests);
        }
        self.next.provide_tx(txes).await
    }

    #[instrument(skip(self, query, options), fields(tenant = %self.context.tenant))]
    async fn search_fulltext(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Result<SearchResult, PipelineError> {
        match self
            .client
            .full_text_search(&self.context.tenant, query, options)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(error = %e, "Indexer full-text search failed, answering empty");
                Ok(SearchResult::empty())
            }
        }
    }

    async fn close(&self) -> Result<(), PipelineError> {
        self.forwarder.close().await
    }
}
