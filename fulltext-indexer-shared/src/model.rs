//! In-memory model database.
//!
//! Holds the model documents created by model transactions (search
//! contexts among them) so they can be looked up synchronously.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classes;
use crate::doc::Doc;
use crate::refs::ClassRef;
use crate::tx::Tx;

/// Per-class full-text configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullTextSearchContext {
    pub to_class: ClassRef,
    /// Index the class even when it has no full-text attributes.
    #[serde(default)]
    pub force_index: bool,
    #[serde(default)]
    pub full_text_summary: bool,
    /// Classes whose documents should be reindexed when this one changes.
    #[serde(default)]
    pub propagate: Vec<ClassRef>,
    #[serde(default)]
    pub child_processing_allowed: bool,
}

impl FullTextSearchContext {
    pub fn new(to_class: ClassRef) -> Self {
        Self {
            to_class,
            force_index: false,
            full_text_summary: false,
            propagate: Vec::new(),
            child_processing_allowed: false,
        }
    }

    pub fn force_index(mut self) -> Self {
        self.force_index = true;
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct ModelDb {
    docs: HashMap<ClassRef, Vec<Doc>>,
}

impl ModelDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply model transactions. Non-CUD transactions are ignored.
    pub fn add_txes(&mut self, txes: &[Tx]) {
        for tx in txes {
            self.apply(tx.clone().unwrap_collection());
        }
    }

    fn apply(&mut self, tx: Tx) {
        match tx {
            Tx::CreateDoc(create) => {
                let mut doc = Doc::new(create.object_id, create.object_class.clone(), create.meta.object_space);
                doc.modified_on = create.meta.modified_on;
                doc.modified_by = create.meta.modified_by;
                doc.attributes = create.attributes;
                let docs = self.docs.entry(create.object_class).or_default();
                docs.retain(|d| d.id != doc.id);
                docs.push(doc);
            }
            Tx::UpdateDoc(update) => {
                if let Some(doc) = self
                    .docs
                    .get_mut(&update.object_class)
                    .and_then(|docs| docs.iter_mut().find(|d| d.id == update.object_id))
                {
                    for (key, value) in update.operations {
                        if !key.starts_with('$') {
                            doc.attributes.insert(key, value);
                        }
                    }
                    doc.modified_on = update.meta.modified_on;
                }
            }
            Tx::RemoveDoc(remove) => {
                if let Some(docs) = self.docs.get_mut(&remove.object_class) {
                    docs.retain(|d| d.id != remove.object_id);
                }
            }
            _ => {}
        }
    }

    /// Model documents of exactly `class`.
    pub fn find_all_sync(&self, class: &str) -> &[Doc] {
        self.docs.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Search contexts keyed by the class they configure. Malformed context
    /// documents are left out.
    pub fn search_contexts(&self) -> HashMap<ClassRef, FullTextSearchContext> {
        self.find_all_sync(classes::FULL_TEXT_SEARCH_CONTEXT)
            .iter()
            .filter_map(|doc| {
                serde_json::from_value::<FullTextSearchContext>(Value::Object(doc.attributes.clone())).ok()
            })
            .map(|ctx| (ctx.to_class.clone(), ctx))
            .collect()
    }
}
