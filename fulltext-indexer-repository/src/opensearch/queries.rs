//! OpenSearch query builders.
//!
//! This module translates full-text finds and keyword searches into
//! OpenSearch request bodies.

use serde_json::{json, Value};

use fulltext_indexer_shared::query::{ID_KEY, SEARCH_KEY};
use fulltext_indexer_shared::{ClassRef, DocumentQuery, SearchQuery, SUMMARY_FIELD, TITLE_FIELD};

/// Build the body of a full-text find.
///
/// The query builder handles:
/// - `simple_query_string` over the summary and title, all terms required
/// - A `terms` filter restricting hits to the candidate classes
/// - Exact filters for the remaining field constraints (`$in`, `$nin`,
///   `$ne` and plain values); other operators cannot be expressed against
///   the index and are left to the structured store
pub fn build_search_query(classes: &[ClassRef], query: &DocumentQuery, limit: usize) -> Value {
    let text = query.search().unwrap_or_default();
    let (mut filter, must_not) = build_field_filters(query);
    if !classes.is_empty() {
        filter.push(json!({ "terms": { "_class": classes } }));
    }

    json!({
        "size": limit,
        "query": {
            "bool": {
                "must": [build_text_query(text)],
                "filter": filter,
                "must_not": must_not
            }
        }
    })
}

/// Build the body of a keyword search, optionally restricted to classes and spaces.
pub fn build_search_string_query(query: &SearchQuery, limit: usize) -> Value {
    let mut filter = Vec::new();
    if let Some(classes) = query.classes.as_ref().filter(|c| !c.is_empty()) {
        filter.push(json!({ "terms": { "_class": classes } }));
    }
    if let Some(spaces) = query.spaces.as_ref().filter(|s| !s.is_empty()) {
        filter.push(json!({ "terms": { "space": spaces } }));
    }

    json!({
        "size": limit,
        "track_total_hits": true,
        "query": {
            "bool": {
                "must": [build_text_query(&query.query)],
                "filter": filter
            }
        }
    })
}

fn build_text_query(text: &str) -> Value {
    json!({
        "simple_query_string": {
            "query": text,
            "fields": [SUMMARY_FIELD, format!("{}^2", TITLE_FIELD)],
            "default_operator": "and"
        }
    })
}

/// Index field addressed by a query key.
fn index_field(key: &str) -> &str {
    if key == ID_KEY {
        "id"
    } else {
        key
    }
}

fn build_field_filters(query: &DocumentQuery) -> (Vec<Value>, Vec<Value>) {
    let mut filter = Vec::new();
    let mut must_not = Vec::new();

    for (key, condition) in query.iter() {
        if key == SEARCH_KEY {
            continue;
        }
        let field = index_field(key);
        match condition {
            Value::Object(operators) => {
                for (op, operand) in operators {
                    match op.as_str() {
                        "$in" => filter.push(json!({ "terms": { field: operand } })),
                        "$nin" => must_not.push(json!({ "terms": { field: operand } })),
                        "$ne" => must_not.push(json!({ "term": { field: operand } })),
                        _ => {}
                    }
                }
            }
            Value::Null | Value::Array(_) => {}
            value => filter.push(json!({ "term": { field: value } })),
        }
    }

    (filter, must_not)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_structure() {
        let query = DocumentQuery::new()
            .with(SEARCH_KEY, "login page")
            .with("space", "s1")
            .with(ID_KEY, json!({ "$nin": ["a"] }))
            .with("rank", json!({ "$gt": 2 }));
        let body = build_search_query(&[ClassRef::new("tracker:class:Issue")], &query, 20);

        assert_eq!(body["size"], 20);
        let bool_query = &body["query"]["bool"];
        assert_eq!(
            bool_query["must"][0]["simple_query_string"]["query"],
            "login page"
        );
        let filters = bool_query["filter"].as_array().unwrap();
        assert!(filters.contains(&json!({ "term": { "space": "s1" } })));
        assert!(filters.contains(&json!({ "terms": { "_class": ["tracker:class:Issue"] } })));
        assert_eq!(filters.len(), 2);
        assert_eq!(
            bool_query["must_not"],
            json!([{ "terms": { "id": ["a"] } }])
        );
    }

    #[test]
    fn test_search_string_query_filters() {
        let mut query = SearchQuery::new("crash");
        query.spaces = Some(vec!["s1".into()]);
        let body = build_search_string_query(&query, 5);

        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters, &vec![json!({ "terms": { "space": ["s1"] } })]);
        assert_eq!(body["size"], 5);
    }
}
