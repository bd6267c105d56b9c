//! Structured query model.
//!
//! A [`DocumentQuery`] is a JSON object of field constraints. Three keys have
//! a reserved meaning: `$search` (free-text clause), `_id` (identifier
//! constraint) and `_class` (class restriction).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::refs::{ClassRef, DocRef};

/// Key of the free-text clause.
pub const SEARCH_KEY: &str = "$search";
/// Key of the identifier constraint.
pub const ID_KEY: &str = "_id";
/// Key of the class constraint.
pub const CLASS_KEY: &str = "_class";
/// Sort key requesting ordering by relevance.
pub const SCORE_SORT_KEY: &str = "#score";

/// Field constraints of a find request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentQuery(Map<String, Value>);

/// A `$search` query separated into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParts {
    /// The caller's identifier constraint, if it had a recognised shape.
    pub id: Option<IdConstraint>,
    /// An `_id` constraint whose shape is not understood. No row can be
    /// shown to satisfy it.
    pub unrecognised_id: Option<Value>,
    /// The free-text clause.
    pub search: String,
    /// Every remaining constraint.
    pub main: DocumentQuery,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The free-text clause, if present.
    pub fn search(&self) -> Option<&str> {
        self.0.get(SEARCH_KEY).and_then(Value::as_str)
    }

    /// The `_class` restriction, if it is an inclusion or exclusion.
    pub fn class_constraint(&self) -> Option<ClassConstraint> {
        self.0.get(CLASS_KEY).and_then(ClassConstraint::from_value)
    }

    /// Separate the identifier constraint and the free-text clause from the
    /// rest of the query. Returns `None` when there is no usable free-text
    /// clause: a `null`, array or object `$search` counts as absent.
    ///
    /// An `_id` constraint of an unrecognised shape is removed from the main
    /// query and reported in [`SearchParts::unrecognised_id`].
    pub fn split_search(mut self) -> Option<SearchParts> {
        let search = match self.0.remove(SEARCH_KEY)? {
            Value::String(text) => text,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => return None,
        };
        let (id, unrecognised_id) = match self.0.remove(ID_KEY) {
            Some(value) => match IdConstraint::from_value(&value) {
                Some(id) => (Some(id), None),
                None => (None, Some(value)),
            },
            None => (None, None),
        };
        Some(SearchParts {
            id,
            unrecognised_id,
            search,
            main: self,
        })
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for DocumentQuery {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Identifier constraint of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdConstraint {
    Eq(DocRef),
    In(Vec<DocRef>),
    Nin(Vec<DocRef>),
    Ne(DocRef),
}

impl IdConstraint {
    /// Parse the JSON form: a plain id, `{"$in": [..]}`, `{"$nin": [..]}` or `{"$ne": id}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(IdConstraint::Eq(DocRef::new(id.as_str()))),
            Value::Object(obj) => {
                if let Some(ids) = obj.get("$in") {
                    return refs_of(ids).map(IdConstraint::In);
                }
                if let Some(ids) = obj.get("$nin") {
                    return refs_of(ids).map(IdConstraint::Nin);
                }
                obj.get("$ne")
                    .and_then(Value::as_str)
                    .map(|id| IdConstraint::Ne(DocRef::new(id)))
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            IdConstraint::Eq(id) => json!(id),
            IdConstraint::In(ids) => json!({ "$in": ids }),
            IdConstraint::Nin(ids) => json!({ "$nin": ids }),
            IdConstraint::Ne(id) => json!({ "$ne": id }),
        }
    }
}

/// Class restriction of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassConstraint {
    In(Vec<ClassRef>),
    Nin(Vec<ClassRef>),
}

impl ClassConstraint {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if let Some(classes) = obj.get("$in") {
            return refs_of(classes).map(ClassConstraint::In);
        }
        obj.get("$nin")
            .and_then(refs_of::<ClassRef>)
            .map(ClassConstraint::Nin)
    }

    /// Whether `class` survives this restriction.
    pub fn allows(&self, class: &ClassRef) -> bool {
        match self {
            ClassConstraint::In(classes) => classes.contains(class),
            ClassConstraint::Nin(classes) => !classes.contains(class),
        }
    }
}

fn refs_of<T: From<String>>(value: &Value) -> Option<Vec<T>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(|s| T::from(s.to_string())))
        .collect()
}

/// Sort direction, serialized as `1` / `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum SortingOrder {
    Ascending,
    Descending,
}

impl SortingOrder {
    pub fn factor(self) -> f64 {
        match self {
            SortingOrder::Ascending => 1.0,
            SortingOrder::Descending => -1.0,
        }
    }
}

impl TryFrom<i8> for SortingOrder {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SortingOrder::Ascending),
            -1 => Ok(SortingOrder::Descending),
            other => Err(format!("invalid sorting order {}", other)),
        }
    }
}

impl From<SortingOrder> for i8 {
    fn from(order: SortingOrder) -> Self {
        match order {
            SortingOrder::Ascending => 1,
            SortingOrder::Descending => -1,
        }
    }
}

/// Options of a find request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<BTreeMap<String, SortingOrder>>,
}

impl FindOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, key: impl Into<String>, order: SortingOrder) -> Self {
        self.sort
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), order);
        self
    }

    /// Relevance ordering requested by the caller, if any.
    pub fn score_sort(&self) -> Option<SortingOrder> {
        self.sort.as_ref()?.get(SCORE_SORT_KEY).copied()
    }
}
