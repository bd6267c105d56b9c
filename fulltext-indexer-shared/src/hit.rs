//! Indexed documents as stored in, and returned by, the text engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::refs::{ClassRef, DocRef};

/// Field holding the concatenated full-text content of a document.
pub const SUMMARY_FIELD: &str = "fulltextSummary";

/// Field holding a short display title.
pub const TITLE_FIELD: &str = "searchTitle";

/// Class of an indexed document. The engine reports either a single class
/// or the class together with its ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassSet {
    One(ClassRef),
    Many(Vec<ClassRef>),
}

impl ClassSet {
    pub fn iter(&self) -> impl Iterator<Item = &ClassRef> {
        let slice: &[ClassRef] = match self {
            ClassSet::One(class) => std::slice::from_ref(class),
            ClassSet::Many(classes) => classes,
        };
        slice.iter()
    }

    pub fn contains(&self, class: &ClassRef) -> bool {
        self.iter().any(|c| c == class)
    }
}

impl From<ClassRef> for ClassSet {
    fn from(class: ClassRef) -> Self {
        ClassSet::One(class)
    }
}

impl From<Vec<ClassRef>> for ClassSet {
    fn from(classes: Vec<ClassRef>) -> Self {
        ClassSet::Many(classes)
    }
}

/// A document in the full-text index.
///
/// Search hits carry `_score`; documents sent for indexing carry the
/// searchable fields in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDoc {
    pub id: DocRef,
    #[serde(rename = "_class", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ClassSet>,
    #[serde(rename = "attachedTo", default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<DocRef>,
    #[serde(
        rename = "attachedToClass",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attached_to_class: Option<ClassRef>,
    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl IndexedDoc {
    pub fn new(id: impl Into<DocRef>, class: impl Into<ClassSet>) -> Self {
        Self {
            id: id.into(),
            class: Some(class.into()),
            attached_to: None,
            attached_to_class: None,
            score: None,
            fields: Map::new(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn attached(mut self, owner: impl Into<DocRef>, owner_class: impl Into<ClassRef>) -> Self {
        self.attached_to = Some(owner.into());
        self.attached_to_class = Some(owner_class.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_class_as_scalar_or_list() {
        let scalar: IndexedDoc =
            serde_json::from_value(json!({ "id": "a", "_class": "c1", "_score": 1.0 })).unwrap();
        assert_eq!(scalar.class, Some(ClassSet::One(ClassRef::new("c1"))));

        let list: IndexedDoc =
            serde_json::from_value(json!({ "id": "a", "_class": ["c1", "c0"] })).unwrap();
        let set = list.class.unwrap();
        assert!(set.contains(&ClassRef::new("c0")));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn test_missing_class_and_extra_fields() {
        let hit: IndexedDoc = serde_json::from_value(json!({
            "id": "a",
            "attachedTo": "owner",
            "attachedToClass": "c1",
            "fulltextSummary": "hello"
        }))
        .unwrap();
        assert!(hit.class.is_none());
        assert_eq!(hit.attached_to, Some(DocRef::new("owner")));
        assert_eq!(hit.fields["fulltextSummary"], json!("hello"));
    }
}
