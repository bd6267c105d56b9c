//! # Full-text Indexer Shared
//!
//! Shared types for the tenant full-text indexer and the search middleware:
//! identifiers, transactions, structured queries, search hits, endpoint
//! request schemas, the class hierarchy and the model database.

pub mod classes;
pub mod doc;
pub mod hierarchy;
pub mod hit;
pub mod model;
pub mod query;
pub mod refs;
pub mod requests;
pub mod search;
pub mod token;
pub mod tx;

pub use doc::{Doc, DocSource, FindResult};
pub use hierarchy::{doc_key, AttributeDef, AttributeType, ClassKind, Hierarchy, HierarchyError, IndexKind};
pub use hit::{ClassSet, IndexedDoc, SUMMARY_FIELD, TITLE_FIELD};
pub use model::{FullTextSearchContext, ModelDb};
pub use query::{ClassConstraint, DocumentQuery, FindOptions, IdConstraint, SortingOrder, SCORE_SORT_KEY};
pub use refs::{ClassRef, DocRef, TenantKey};
pub use requests::{
    FullTextSearchRequest, IndexDocumentsRequest, IndexingUpdateEvent, SearchRequest,
};
pub use search::{SearchOptions, SearchQuery, SearchResult, SearchResultDoc};
pub use token::{Claims, TokenError};
pub use tx::{Tx, TxCud, TxMeta, WorkspaceEvent};
