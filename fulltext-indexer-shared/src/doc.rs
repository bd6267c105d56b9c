//! Documents and find results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classes;
use crate::refs::{ClassRef, DocRef};
use crate::tx::{TxCreateDoc, TxMeta};

/// Relevance metadata attached to a row returned by a `$search` find.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocSource {
    #[serde(rename = "$score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doc {
    #[serde(rename = "_id")]
    pub id: DocRef,
    #[serde(rename = "_class")]
    pub class: ClassRef,
    pub space: DocRef,
    #[serde(default)]
    pub modified_on: i64,
    pub modified_by: DocRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<DocRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to_class: Option<ClassRef>,
    #[serde(rename = "$source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DocSource>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Doc {
    pub fn new(
        id: impl Into<DocRef>,
        class: impl Into<ClassRef>,
        space: impl Into<DocRef>,
    ) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            space: space.into(),
            modified_on: 0,
            modified_by: DocRef::new(classes::SYSTEM_ACCOUNT),
            attached_to: None,
            attached_to_class: None,
            source: None,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attached(mut self, owner: impl Into<DocRef>, owner_class: impl Into<ClassRef>) -> Self {
        self.attached_to = Some(owner.into());
        self.attached_to_class = Some(owner_class.into());
        self
    }

    /// Apply the plain-field operations of an update. Operator keys
    /// (`$push`, `$inc`, ...) are ignored.
    pub fn apply_operations(&mut self, operations: &Map<String, Value>, meta: &TxMeta) {
        for (key, value) in operations {
            if !key.starts_with('$') {
                self.attributes.insert(key.clone(), value.clone());
            }
        }
        self.modified_on = meta.modified_on;
        self.modified_by = meta.modified_by.clone();
    }

    /// Merge mixin attributes; they are stored under the mixin's class reference.
    pub fn apply_mixin(&mut self, mixin: &ClassRef, attributes: &Map<String, Value>, meta: &TxMeta) {
        let entry = self
            .attributes
            .entry(mixin.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(target) = entry {
            target.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self.modified_on = meta.modified_on;
        self.modified_by = meta.modified_by.clone();
    }

    /// Relevance score attached by a `$search` find.
    pub fn score(&self) -> Option<f64> {
        self.source.as_ref().and_then(|s| s.score)
    }
}

impl From<TxCreateDoc> for Doc {
    /// The document a create transaction produces. `attachedTo` and
    /// `attachedToClass` are lifted out of the attributes.
    fn from(create: TxCreateDoc) -> Self {
        let TxCreateDoc {
            meta,
            object_id,
            object_class,
            mut attributes,
        } = create;
        let mut take = |key: &str| match attributes.remove(key) {
            Some(Value::String(value)) => Some(value),
            Some(other) => {
                attributes.insert(key.to_string(), other);
                None
            }
            None => None,
        };
        let attached_to = take("attachedTo").map(DocRef::from);
        let attached_to_class = take("attachedToClass").map(ClassRef::from);

        let mut doc = Doc::new(object_id, object_class, meta.object_space);
        doc.modified_on = meta.modified_on;
        doc.modified_by = meta.modified_by;
        doc.attached_to = attached_to;
        doc.attached_to_class = attached_to_class;
        doc.attributes = attributes;
        doc
    }
}

/// Rows of a find together with the total number of matching rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FindResult {
    pub docs: Vec<Doc>,
    pub total: usize,
}

impl FindResult {
    pub fn new(docs: Vec<Doc>, total: usize) -> Self {
        Self { docs, total }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn ids(&self) -> Vec<&DocRef> {
        self.docs.iter().map(|d| &d.id).collect()
    }
}
