//! Transaction wire model.
//!
//! Transactions arrive as JSON objects discriminated by their `_class`
//! field. The shape is resolved once, at deserialization, into the [`Tx`]
//! union so downstream code never inspects raw JSON to find out what kind
//! of transaction it holds.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::classes;
use crate::refs::{ClassRef, DocRef};

/// Fields common to every transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMeta {
    #[serde(rename = "_id")]
    pub id: DocRef,
    pub space: DocRef,
    pub modified_by: DocRef,
    pub modified_on: i64,
    pub object_space: DocRef,
}

impl TxMeta {
    /// Metadata for a transaction issued now by `modified_by` into `object_space`.
    pub fn new(modified_by: impl Into<DocRef>, object_space: impl Into<DocRef>) -> Self {
        let object_space = object_space.into();
        Self {
            id: DocRef::new(Uuid::new_v4().to_string()),
            space: object_space.clone(),
            modified_by: modified_by.into(),
            modified_on: Utc::now().timestamp_millis(),
            object_space,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxCreateDoc {
    #[serde(flatten)]
    pub meta: TxMeta,
    pub object_id: DocRef,
    pub object_class: ClassRef,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxUpdateDoc {
    #[serde(flatten)]
    pub meta: TxMeta,
    pub object_id: DocRef,
    pub object_class: ClassRef,
    #[serde(default)]
    pub operations: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRemoveDoc {
    #[serde(flatten)]
    pub meta: TxMeta,
    pub object_id: DocRef,
    pub object_class: ClassRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxMixin {
    #[serde(flatten)]
    pub meta: TxMeta,
    pub object_id: DocRef,
    pub object_class: ClassRef,
    pub mixin: ClassRef,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// A CUD transaction on a document attached to `object_id` through `collection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxCollectionCud {
    #[serde(flatten)]
    pub meta: TxMeta,
    pub object_id: DocRef,
    pub object_class: ClassRef,
    pub collection: String,
    pub tx: Box<Tx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkspaceEvent {
    UpgradeScheduled,
    Upgrade,
    IndexingUpdate,
    SecurityChange,
    MaintenanceNotification,
    BulkUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxWorkspaceEvent {
    #[serde(flatten)]
    pub meta: TxMeta,
    pub event: WorkspaceEvent,
    #[serde(default)]
    pub params: Value,
}

/// A transaction, discriminated by its `_class`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_class")]
pub enum Tx {
    #[serde(rename = "core:class:TxCreateDoc")]
    CreateDoc(TxCreateDoc),
    #[serde(rename = "core:class:TxUpdateDoc")]
    UpdateDoc(TxUpdateDoc),
    #[serde(rename = "core:class:TxRemoveDoc")]
    RemoveDoc(TxRemoveDoc),
    #[serde(rename = "core:class:TxMixin")]
    Mixin(TxMixin),
    #[serde(rename = "core:class:TxCollectionCUD")]
    CollectionCud(TxCollectionCud),
    #[serde(rename = "core:class:TxWorkspaceEvent")]
    WorkspaceEvent(TxWorkspaceEvent),
}

/// Borrowed view over the create/update/remove/mixin family.
#[derive(Debug, Clone, Copy)]
pub enum TxCud<'a> {
    Create(&'a TxCreateDoc),
    Update(&'a TxUpdateDoc),
    Remove(&'a TxRemoveDoc),
    Mixin(&'a TxMixin),
}

impl<'a> TxCud<'a> {
    pub fn object_id(&self) -> &'a DocRef {
        match self {
            TxCud::Create(tx) => &tx.object_id,
            TxCud::Update(tx) => &tx.object_id,
            TxCud::Remove(tx) => &tx.object_id,
            TxCud::Mixin(tx) => &tx.object_id,
        }
    }

    pub fn object_class(&self) -> &'a ClassRef {
        match self {
            TxCud::Create(tx) => &tx.object_class,
            TxCud::Update(tx) => &tx.object_class,
            TxCud::Remove(tx) => &tx.object_class,
            TxCud::Mixin(tx) => &tx.object_class,
        }
    }

    pub fn meta(&self) -> &'a TxMeta {
        match self {
            TxCud::Create(tx) => &tx.meta,
            TxCud::Update(tx) => &tx.meta,
            TxCud::Remove(tx) => &tx.meta,
            TxCud::Mixin(tx) => &tx.meta,
        }
    }
}

impl Tx {
    /// Build a create transaction issued by the system account.
    pub fn create(
        object_class: impl Into<ClassRef>,
        object_id: impl Into<DocRef>,
        object_space: impl Into<DocRef>,
        attributes: Map<String, Value>,
    ) -> Self {
        Tx::CreateDoc(TxCreateDoc {
            meta: TxMeta::new(classes::SYSTEM_ACCOUNT, object_space),
            object_id: object_id.into(),
            object_class: object_class.into(),
            attributes,
        })
    }

    /// Build a remove transaction issued by the system account.
    pub fn remove(
        object_class: impl Into<ClassRef>,
        object_id: impl Into<DocRef>,
        object_space: impl Into<DocRef>,
    ) -> Self {
        Tx::RemoveDoc(TxRemoveDoc {
            meta: TxMeta::new(classes::SYSTEM_ACCOUNT, object_space),
            object_id: object_id.into(),
            object_class: object_class.into(),
        })
    }

    /// Wrap `self` as a collection transaction on `owner`.
    pub fn in_collection(
        self,
        owner_class: impl Into<ClassRef>,
        owner: impl Into<DocRef>,
        collection: impl Into<String>,
    ) -> Self {
        let meta = self.meta().clone();
        Tx::CollectionCud(TxCollectionCud {
            meta,
            object_id: owner.into(),
            object_class: owner_class.into(),
            collection: collection.into(),
            tx: Box::new(self),
        })
    }

    pub fn meta(&self) -> &TxMeta {
        match self {
            Tx::CreateDoc(tx) => &tx.meta,
            Tx::UpdateDoc(tx) => &tx.meta,
            Tx::RemoveDoc(tx) => &tx.meta,
            Tx::Mixin(tx) => &tx.meta,
            Tx::CollectionCud(tx) => &tx.meta,
            Tx::WorkspaceEvent(tx) => &tx.meta,
        }
    }

    /// The `_class` discriminator of this transaction.
    pub fn class(&self) -> &'static str {
        match self {
            Tx::CreateDoc(_) => classes::TX_CREATE_DOC,
            Tx::UpdateDoc(_) => classes::TX_UPDATE_DOC,
            Tx::RemoveDoc(_) => classes::TX_REMOVE_DOC,
            Tx::Mixin(_) => classes::TX_MIXIN,
            Tx::CollectionCud(_) => classes::TX_COLLECTION_CUD,
            Tx::WorkspaceEvent(_) => classes::TX_WORKSPACE_EVENT,
        }
    }

    /// View a CUD transaction. Collection wrappers are not CUDs themselves;
    /// call [`Tx::unwrap_collection`] first.
    pub fn as_cud(&self) -> Option<TxCud<'_>> {
        match self {
            Tx::CreateDoc(tx) => Some(TxCud::Create(tx)),
            Tx::UpdateDoc(tx) => Some(TxCud::Update(tx)),
            Tx::RemoveDoc(tx) => Some(TxCud::Remove(tx)),
            Tx::Mixin(tx) => Some(TxCud::Mixin(tx)),
            Tx::CollectionCud(_) | Tx::WorkspaceEvent(_) => None,
        }
    }

    /// Replace a collection wrapper by its inner transaction.
    ///
    /// The owner reference of the wrapper is carried into the attributes of
    /// an inner create as `attachedTo`/`attachedToClass`/`collection` so the
    /// attachment can still be resolved to its owner.
    pub fn unwrap_collection(self) -> Tx {
        match self {
            Tx::CollectionCud(wrapper) => {
                let TxCollectionCud {
                    object_id,
                    object_class,
                    collection,
                    tx,
                    ..
                } = wrapper;
                match *tx {
                    Tx::CreateDoc(mut create) => {
                        let attrs = &mut create.attributes;
                        attrs
                            .entry("attachedTo")
                            .or_insert_with(|| Value::String(object_id.to_string()));
                        attrs
                            .entry("attachedToClass")
                            .or_insert_with(|| Value::String(object_class.to_string()));
                        attrs
                            .entry("collection")
                            .or_insert_with(|| Value::String(collection));
                        Tx::CreateDoc(create)
                    }
                    inner => inner.unwrap_collection(),
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_create() {
        let tx: Tx = serde_json::from_value(json!({
            "_class": "core:class:TxCreateDoc",
            "_id": "tx1",
            "space": "core:space:Tx",
            "modifiedBy": "user1",
            "modifiedOn": 10,
            "objectSpace": "space1",
            "objectId": "doc1",
            "objectClass": "tracker:class:Issue",
            "attributes": { "title": "Broken build" }
        }))
        .unwrap();

        let cud = tx.as_cud().unwrap();
        assert_eq!(cud.object_id().as_str(), "doc1");
        assert_eq!(cud.object_class().as_str(), "tracker:class:Issue");
        assert_eq!(cud.meta().modified_on, 10);
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let result: Result<Tx, _> = serde_json::from_value(json!({
            "_class": "core:class:TxSomething",
            "_id": "tx1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unwrap_collection_keeps_owner() {
        let inner = Tx::create("chunter:class:ChatMessage", "msg1", "space1", Map::new());
        let wrapped = inner.in_collection("tracker:class:Issue", "issue1", "comments");
        assert!(wrapped.as_cud().is_none());

        let unwrapped = wrapped.unwrap_collection();
        match unwrapped {
            Tx::CreateDoc(create) => {
                assert_eq!(create.attributes["attachedTo"], json!("issue1"));
                assert_eq!(create.attributes["attachedToClass"], json!("tracker:class:Issue"));
                assert_eq!(create.attributes["collection"], json!("comments"));
            }
            other => panic!("unexpected transaction {:?}", other),
        }
    }

    #[test]
    fn test_collection_round_trips_through_json() {
        let inner = Tx::remove("chunter:class:ChatMessage", "msg1", "space1");
        let wrapped = inner.in_collection("tracker:class:Issue", "issue1", "comments");

        let value = serde_json::to_value(&wrapped).unwrap();
        assert_eq!(value["_class"], json!(classes::TX_COLLECTION_CUD));
        assert_eq!(value["tx"]["_class"], json!(classes::TX_REMOVE_DOC));

        let back: Tx = serde_json::from_value(value).unwrap();
        assert_eq!(back, wrapped);
    }
}
