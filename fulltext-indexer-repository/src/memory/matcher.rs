//! Evaluation of structured queries against JSON documents.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::errors::SearchError;
use fulltext_indexer_shared::query::SEARCH_KEY;
use fulltext_indexer_shared::DocumentQuery;

/// Whether `doc` satisfies every constraint of `query`. The free-text
/// clause is not evaluated here.
pub(crate) fn matches(doc: &Map<String, Value>, query: &DocumentQuery) -> Result<bool, SearchError> {
    for (key, condition) in query.iter() {
        if key == SEARCH_KEY {
            continue;
        }
        if !matches_condition(doc.get(key), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_object(condition: &Value) -> Option<&Map<String, Value>> {
    condition
        .as_object()
        .filter(|obj| !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')))
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> Result<bool, SearchError> {
    let Some(operators) = is_operator_object(condition) else {
        return Ok(equals(value, condition));
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$in" => list(op, operand)?.iter().any(|item| equals(value, item)),
            "$nin" => !list(op, operand)?.iter().any(|item| equals(value, item)),
            "$ne" => !equals(value, operand),
            "$exists" => operand.as_bool().unwrap_or(true) == value.is_some_and(|v| !v.is_null()),
            "$gt" => compare(value, operand) == Some(Ordering::Greater),
            "$gte" => matches!(compare(value, operand), Some(Ordering::Greater | Ordering::Equal)),
            "$lt" => compare(value, operand) == Some(Ordering::Less),
            "$lte" => matches!(compare(value, operand), Some(Ordering::Less | Ordering::Equal)),
            "$like" => like(value, operand),
            other => {
                return Err(SearchError::query(format!("unsupported operator {}", other)));
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list<'a>(op: &str, operand: &'a Value) -> Result<&'a Vec<Value>, SearchError> {
    operand
        .as_array()
        .ok_or_else(|| SearchError::query(format!("{} expects an array", op)))
}

/// Equality, where an array-valued field matches any of its elements.
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
        None => expected.is_null(),
    }
}

/// `%` matches any run of characters.
fn like(value: Option<&Value>, pattern: &Value) -> bool {
    let (Some(text), Some(pattern)) = (value.and_then(Value::as_str), pattern.as_str()) else {
        return false;
    };
    let text = text.to_lowercase();
    let parts: Vec<String> = pattern.to_lowercase().split('%').map(str::to_string).collect();

    let mut rest = text.as_str();
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part.as_str()) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part.as_str());
        } else {
            match rest.find(part.as_str()) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    rest.is_empty()
}

/// Order two JSON values of the same kind. Missing values sort first.
pub(crate) fn compare(left: Option<&Value>, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Some(Value::String(a)), Value::String(b)) => Some(a.cmp(b)),
        (Some(Value::Bool(a)), Value::Bool(b)) => Some(a.cmp(b)),
        (None | Some(Value::Null), Value::Null) => Some(Ordering::Equal),
        (None | Some(Value::Null), _) => Some(Ordering::Less),
        (Some(_), Value::Null) => Some(Ordering::Greater),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Map<String, Value> {
        match json!({
            "_id": "d1",
            "_class": "tracker:class:Issue",
            "rank": 3,
            "title": "Broken build",
            "labels": ["bug", "ci"]
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_equality_and_sets() {
        let d = doc();
        assert!(matches(&d, &DocumentQuery::new().with("_id", "d1")).unwrap());
        assert!(matches(&d, &DocumentQuery::new().with("labels", "ci")).unwrap());
        assert!(matches(&d, &DocumentQuery::new().with("_id", json!({ "$in": ["d0", "d1"] }))).unwrap());
        assert!(!matches(&d, &DocumentQuery::new().with("_id", json!({ "$nin": ["d1"] }))).unwrap());
        assert!(!matches(&d, &DocumentQuery::new().with("_id", json!({ "$ne": "d1" }))).unwrap());
    }

    #[test]
    fn test_ranges_and_exists() {
        let d = doc();
        assert!(matches(&d, &DocumentQuery::new().with("rank", json!({ "$gt": 2, "$lte": 3 }))).unwrap());
        assert!(!matches(&d, &DocumentQuery::new().with("rank", json!({ "$lt": 3 }))).unwrap());
        assert!(matches(&d, &DocumentQuery::new().with("missing", json!({ "$exists": false }))).unwrap());
        assert!(!matches(&d, &DocumentQuery::new().with("title", json!({ "$exists": false }))).unwrap());
    }

    #[test]
    fn test_like_and_search_key() {
        let d = doc();
        assert!(matches(&d, &DocumentQuery::new().with("title", json!({ "$like": "broken%" }))).unwrap());
        assert!(matches(&d, &DocumentQuery::new().with("title", json!({ "$like": "%bu%d" }))).unwrap());
        assert!(!matches(&d, &DocumentQuery::new().with("title", json!({ "$like": "build%" }))).unwrap());
        assert!(matches(&d, &DocumentQuery::new().with(SEARCH_KEY, "anything")).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let result = matches(&doc(), &DocumentQuery::new().with("rank", json!({ "$regex": "x" })));
        assert!(matches!(result, Err(SearchError::QueryError(_))));
    }
}
