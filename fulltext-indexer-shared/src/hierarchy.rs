//! Class hierarchy of a tenant model.
//!
//! The hierarchy is rebuilt by replaying model transactions: creation of
//! class and mixin classifiers, and of attribute definitions. It answers the
//! structural questions the search layer needs (ancestry, descendants,
//! attributes, domains, whether a class participates in indexing).

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::classes;
use crate::model::FullTextSearchContext;
use crate::refs::{ClassRef, DocRef};
use crate::tx::{Tx, TxCreateDoc};

/// Separator between the defining class and the attribute name in a composite key.
pub const DOC_KEY_SEPARATOR: &str = "%";

/// Composite key addressing `name` as defined on `class`.
///
/// Attributes of the root document class keep their plain name; everything
/// else is qualified by its defining class, the same way the index flattens
/// inherited and mixin fields.
pub fn doc_key(name: &str, class: Option<&ClassRef>) -> String {
    match class {
        Some(class) if class.as_str() != classes::DOC => {
            format!("{}{}{}", class, DOC_KEY_SEPARATOR, name)
        }
        _ => name.to_string(),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HierarchyError {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Class already defined: {0}")]
    DuplicateClass(String),

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("Invalid classifier: {0}")]
    InvalidClassifier(String),
}

impl HierarchyError {
    pub fn unknown_class(class: &ClassRef) -> Self {
        Self::UnknownClass(class.to_string())
    }

    pub fn invalid_attribute(msg: impl Into<String>) -> Self {
        Self::InvalidAttribute(msg.into())
    }

    pub fn invalid_classifier(msg: impl Into<String>) -> Self {
        Self::InvalidClassifier(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Mixin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub id: ClassRef,
    pub kind: ClassKind,
    pub extends: Option<ClassRef>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    FullText,
    Indexed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    /// A collection of documents attached to the owner.
    Collection { of: ClassRef },
    Other(ClassRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDef {
    pub name: String,
    pub attribute_of: ClassRef,
    pub ty: AttributeType,
    pub index: Option<IndexKind>,
}

impl AttributeDef {
    pub fn is_full_text(&self) -> bool {
        self.index == Some(IndexKind::FullText)
    }

    pub fn is_indexed(&self) -> bool {
        self.index == Some(IndexKind::Indexed)
    }

    /// Target class when this attribute is a collection of attached documents.
    pub fn collection_of(&self) -> Option<&ClassRef> {
        match &self.ty {
            AttributeType::Collection { of } => Some(of),
            AttributeType::Other(_) => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Hierarchy {
    classes: BTreeMap<ClassRef, ClassDef>,
    attributes: HashMap<ClassRef, BTreeMap<String, AttributeDef>>,
    attribute_ids: HashMap<DocRef, (ClassRef, String)>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a model transaction. Transactions that do not describe the
    /// model are ignored.
    pub fn tx(&mut self, tx: &Tx) -> Result<(), HierarchyError> {
        match tx {
            Tx::CreateDoc(create) => match create.object_class.as_str() {
                classes::CLASS => self.add_classifier(create, ClassKind::Class),
                classes::MIXIN => self.add_classifier(create, ClassKind::Mixin),
                classes::ATTRIBUTE => self.add_attribute(create),
                classes::FULL_TEXT_SEARCH_CONTEXT => self.check_search_context(create),
                _ => Ok(()),
            },
            Tx::RemoveDoc(remove) => {
                match remove.object_class.as_str() {
                    classes::CLASS | classes::MIXIN => {
                        let id = ClassRef::new(remove.object_id.as_str());
                        self.classes
                            .remove(&id)
                            .ok_or_else(|| HierarchyError::unknown_class(&id))?;
                        self.attributes.remove(&id);
                    }
                    classes::ATTRIBUTE => {
                        if let Some((class, name)) = self.attribute_ids.remove(&remove.object_id) {
                            if let Some(attrs) = self.attributes.get_mut(&class) {
                                attrs.remove(&name);
                            }
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
            Tx::CollectionCud(_) => self.tx(&tx.clone().unwrap_collection()),
            _ => Ok(()),
        }
    }

    /// A search context must target a registered class.
    fn check_search_context(&self, create: &TxCreateDoc) -> Result<(), HierarchyError> {
        match create.attributes.get("toClass").and_then(Value::as_str) {
            Some(to_class) => {
                let to_class = ClassRef::new(to_class);
                if self.classes.contains_key(&to_class) {
                    Ok(())
                } else {
                    Err(HierarchyError::unknown_class(&to_class))
                }
            }
            None => Err(HierarchyError::invalid_classifier(format!(
                "{}: search context without toClass",
                create.object_id.as_str()
            ))),
        }
    }

    fn add_classifier(&mut self, create: &TxCreateDoc, kind: ClassKind) -> Result<(), HierarchyError> {
        let id = ClassRef::new(create.object_id.as_str());
        if self.classes.contains_key(&id) {
            return Err(HierarchyError::DuplicateClass(id.to_string()));
        }

        let extends = match create.attributes.get("extends") {
            Some(Value::String(parent)) => Some(ClassRef::new(parent.as_str())),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(HierarchyError::invalid_classifier(format!(
                    "{}: extends must be a class reference, got {}",
                    id, other
                )))
            }
        };
        if let Some(parent) = &extends {
            if !self.classes.contains_key(parent) {
                return Err(HierarchyError::unknown_class(parent));
            }
        }
        if kind == ClassKind::Mixin && extends.is_none() {
            return Err(HierarchyError::invalid_classifier(format!(
                "{}: mixin must extend a class",
                id
            )));
        }

        let domain = create
            .attributes
            .get("domain")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.classes.insert(
            id.clone(),
            ClassDef {
                id,
                kind,
                extends,
                domain,
            },
        );
        Ok(())
    }

    fn add_attribute(&mut self, create: &TxCreateDoc) -> Result<(), HierarchyError> {
        let attrs = &create.attributes;
        let attribute_of = attrs
            .get("attributeOf")
            .and_then(Value::as_str)
            .map(ClassRef::new)
            .ok_or_else(|| HierarchyError::invalid_attribute("attributeOf is required"))?;
        if !self.classes.contains_key(&attribute_of) {
            return Err(HierarchyError::unknown_class(&attribute_of));
        }
        let name = attrs
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| HierarchyError::invalid_attribute("name is required"))?
            .to_string();
        let ty = parse_attribute_type(attrs.get("type"))?;
        let index = match attrs.get("index") {
            Some(Value::Null) | None => None,
            Some(value) => Some(
                serde_json::from_value::<IndexKind>(value.clone())
                    .map_err(|e| HierarchyError::invalid_attribute(format!("{}: {}", name, e)))?,
            ),
        };

        self.attribute_ids
            .insert(create.object_id.clone(), (attribute_of.clone(), name.clone()));
        self.attributes.entry(attribute_of.clone()).or_default().insert(
            name.clone(),
            AttributeDef {
                name,
                attribute_of,
                ty,
                index,
            },
        );
        Ok(())
    }

    pub fn get_class(&self, class: &ClassRef) -> Result<&ClassDef, HierarchyError> {
        self.classes
            .get(class)
            .ok_or_else(|| HierarchyError::unknown_class(class))
    }

    pub fn has_class(&self, class: &ClassRef) -> bool {
        self.classes.contains_key(class)
    }

    /// `class` followed by its ancestors, nearest first. Empty for an unknown class.
    pub fn ancestors(&self, class: &ClassRef) -> Vec<ClassRef> {
        let mut result = Vec::new();
        let mut current = self.classes.get(class);
        while let Some(def) = current {
            result.push(def.id.clone());
            current = def.extends.as_ref().and_then(|parent| self.classes.get(parent));
        }
        result
    }

    pub fn is_derived(&self, class: &ClassRef, base: &ClassRef) -> bool {
        self.ancestors(class).iter().any(|c| c == base)
    }

    pub fn is_mixin(&self, class: &ClassRef) -> bool {
        matches!(self.classes.get(class), Some(def) if def.kind == ClassKind::Mixin)
    }

    /// Nearest non-mixin class of `class` (itself when it is not a mixin).
    pub fn get_base_class(&self, class: &ClassRef) -> ClassRef {
        self.ancestors(class)
            .into_iter()
            .find(|c| !self.is_mixin(c))
            .unwrap_or_else(|| class.clone())
    }

    /// `class` and every class deriving from it.
    pub fn get_descendants(&self, class: &ClassRef) -> Vec<ClassRef> {
        self.classes
            .keys()
            .filter(|c| self.is_derived(c, class))
            .cloned()
            .collect()
    }

    /// Every attribute visible on `class`, inherited ones included. A
    /// subclass definition overrides an ancestor's attribute of the same name.
    pub fn get_all_attributes(
        &self,
        class: &ClassRef,
    ) -> Result<BTreeMap<String, AttributeDef>, HierarchyError> {
        self.get_class(class)?;
        let mut result = BTreeMap::new();
        for ancestor in self.ancestors(class).iter().rev() {
            if let Some(attrs) = self.attributes.get(ancestor) {
                for (name, attr) in attrs {
                    result.insert(name.clone(), attr.clone());
                }
            }
        }
        Ok(result)
    }

    /// Storage domain of `class`, inherited from the nearest ancestor declaring one.
    pub fn find_domain(&self, class: &ClassRef) -> Option<&str> {
        self.ancestors(class)
            .iter()
            .find_map(|c| self.classes.get(c).and_then(|def| def.domain.as_deref()))
    }

    /// Search context of `class` or of its nearest ancestor that has one.
    pub fn find_search_context<'a>(
        &self,
        class: &ClassRef,
        contexts: &'a HashMap<ClassRef, FullTextSearchContext>,
    ) -> Option<&'a FullTextSearchContext> {
        self.ancestors(class).iter().find_map(|c| contexts.get(c))
    }

    fn full_text_attributes(&self, class: &ClassRef) -> Vec<AttributeDef> {
        self.get_all_attributes(class)
            .map(|attrs| attrs.into_values().filter(AttributeDef::is_full_text).collect())
            .unwrap_or_default()
    }

    /// Whether documents of `class` participate in full-text indexing.
    ///
    /// A class needs a storage domain. It is indexable when it (or one of
    /// its mixins) has full-text attributes, when its search context forces
    /// indexing, or when one of its collections holds indexable documents.
    pub fn is_class_indexable(
        &self,
        class: &ClassRef,
        contexts: &HashMap<ClassRef, FullTextSearchContext>,
    ) -> bool {
        self.indexable(class, contexts, &mut HashSet::new())
    }

    fn indexable(
        &self,
        class: &ClassRef,
        contexts: &HashMap<ClassRef, FullTextSearchContext>,
        visited: &mut HashSet<ClassRef>,
    ) -> bool {
        if !visited.insert(class.clone()) {
            return false;
        }
        if self.find_domain(class).is_none() {
            return false;
        }

        let mut has_full_text = !self.full_text_attributes(class).is_empty();
        if !has_full_text {
            has_full_text = self
                .get_descendants(class)
                .iter()
                .filter(|d| self.is_mixin(d))
                .any(|mixin| !self.full_text_attributes(mixin).is_empty());
        }
        if has_full_text {
            return true;
        }
        if self
            .find_search_context(class, contexts)
            .is_some_and(|ctx| ctx.force_index)
        {
            return true;
        }

        let collections: Vec<ClassRef> = self
            .get_all_attributes(class)
            .map(|attrs| {
                attrs
                    .values()
                    .filter_map(|attr| attr.collection_of().cloned())
                    .collect()
            })
            .unwrap_or_default();
        collections
            .iter()
            .any(|of| self.indexable(of, contexts, visited))
    }
}

fn parse_attribute_type(value: Option<&Value>) -> Result<AttributeType, HierarchyError> {
    let ty: &Map<String, Value> = value
        .and_then(Value::as_object)
        .ok_or_else(|| HierarchyError::invalid_attribute("type is required"))?;
    let class = ty
        .get("_class")
        .and_then(Value::as_str)
        .ok_or_else(|| HierarchyError::invalid_attribute("type._class is required"))?;
    if class == classes::COLLECTION {
        let of = ty
            .get("of")
            .and_then(Value::as_str)
            .ok_or_else(|| HierarchyError::invalid_attribute("collection type requires `of`"))?;
        Ok(AttributeType::Collection {
            of: ClassRef::new(of),
        })
    } else {
        Ok(AttributeType::Other(ClassRef::new(class)))
    }
}

/// Builders for model transactions, used to seed hierarchies.
pub mod builders {
    use serde_json::{json, Map, Value};

    use crate::classes;
    use crate::tx::Tx;

    fn attributes(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    pub fn class(id: &str, extends: Option<&str>, domain: Option<&str>) -> Tx {
        Tx::create(
            classes::CLASS,
            id,
            classes::MODEL_SPACE,
            attributes(json!({ "extends": extends, "domain": domain })),
        )
    }

    pub fn mixin(id: &str, extends: &str) -> Tx {
        Tx::create(
            classes::MIXIN,
            id,
            classes::MODEL_SPACE,
            attributes(json!({ "extends": extends })),
        )
    }

    pub fn attribute(of: &str, name: &str, type_class: &str, index: Option<&str>) -> Tx {
        Tx::create(
            classes::ATTRIBUTE,
            format!("{}_{}", of, name),
            classes::MODEL_SPACE,
            attributes(json!({
                "attributeOf": of,
                "name": name,
                "type": { "_class": type_class },
                "index": index
            })),
        )
    }

    pub fn collection(of: &str, name: &str, target: &str) -> Tx {
        Tx::create(
            classes::ATTRIBUTE,
            format!("{}_{}", of, name),
            classes::MODEL_SPACE,
            attributes(json!({
                "attributeOf": of,
                "name": name,
                "type": { "_class": classes::COLLECTION, "of": target }
            })),
        )
    }

    pub fn search_context(to_class: &str, force_index: bool) -> Tx {
        Tx::create(
            classes::FULL_TEXT_SEARCH_CONTEXT,
            format!("{}_ctx", to_class),
            classes::MODEL_SPACE,
            attributes(json!({ "toClass": to_class, "forceIndex": force_index })),
        )
    }
}
