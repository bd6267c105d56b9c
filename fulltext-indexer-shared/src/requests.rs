//! Request bodies of the indexer HTTP endpoints and the indexing-update event.
//!
//! Every endpoint body carries the caller's `token` and the `tenant` it
//! addresses; bodies that do not match these schemas are rejected before
//! any indexer is touched.

use serde::{Deserialize, Serialize};

use crate::query::DocumentQuery;
use crate::refs::{ClassRef, TenantKey};
use crate::search::{SearchOptions, SearchQuery};
use crate::tx::Tx;

/// `PUT /api/v1/search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub token: String,
    pub tenant: TenantKey,
    #[serde(rename = "_classes")]
    pub classes: Vec<ClassRef>,
    pub query: DocumentQuery,
    pub full_text_limit: usize,
}

/// `PUT /api/v1/full-text-search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullTextSearchRequest {
    pub token: String,
    pub tenant: TenantKey,
    pub query: SearchQuery,
    #[serde(default)]
    pub options: SearchOptions,
}

/// `PUT /api/v1/index-documents`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocumentsRequest {
    pub token: String,
    pub tenant: TenantKey,
    pub requests: Vec<Tx>,
}

/// Parameters of an `IndexingUpdate` workspace event: the classes whose
/// indexed documents changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexingUpdateEvent {
    #[serde(rename = "_class")]
    pub classes: Vec<ClassRef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_request_schema() {
        let request: SearchRequest = serde_json::from_value(json!({
            "token": "t",
            "tenant": "ws1",
            "_classes": ["c1"],
            "query": { "$search": "foo" },
            "fullTextLimit": 100
        }))
        .unwrap();
        assert_eq!(request.tenant.as_str(), "ws1");
        assert_eq!(request.query.search(), Some("foo"));
        assert_eq!(request.full_text_limit, 100);
    }

    #[test]
    fn test_malformed_request_is_rejected() {
        let result: Result<SearchRequest, _> = serde_json::from_value(json!({
            "token": "t",
            "tenant": "ws1",
            "_classes": "c1",
            "query": {},
            "fullTextLimit": 100
        }));
        assert!(result.is_err());

        let missing_tenant: Result<IndexDocumentsRequest, _> =
            serde_json::from_value(json!({ "token": "t", "requests": [] }));
        assert!(missing_tenant.is_err());
    }
}
