//! Well-known class references of the core model.

/// Root of every document class.
pub const DOC: &str = "core:class:Doc";
/// Root of documents attached to another document through a collection.
pub const ATTACHED_DOC: &str = "core:class:AttachedDoc";
/// Classifier document describing a class.
pub const CLASS: &str = "core:class:Class";
/// Classifier document describing a mixin.
pub const MIXIN: &str = "core:class:Mixin";
/// Attribute definition document.
pub const ATTRIBUTE: &str = "core:class:Attribute";
/// Collection attribute type.
pub const COLLECTION: &str = "core:class:Collection";
/// Per-class full-text search configuration document.
pub const FULL_TEXT_SEARCH_CONTEXT: &str = "core:class:FullTextSearchContext";

pub const TX_CREATE_DOC: &str = "core:class:TxCreateDoc";
pub const TX_UPDATE_DOC: &str = "core:class:TxUpdateDoc";
pub const TX_REMOVE_DOC: &str = "core:class:TxRemoveDoc";
pub const TX_MIXIN: &str = "core:class:TxMixin";
pub const TX_COLLECTION_CUD: &str = "core:class:TxCollectionCUD";
pub const TX_WORKSPACE_EVENT: &str = "core:class:TxWorkspaceEvent";

/// Account used for service-originated transactions.
pub const SYSTEM_ACCOUNT: &str = "core:account:System";
/// Space holding derived transactions.
pub const DERIVED_TX_SPACE: &str = "core:space:DerivedTx";
/// Space holding model documents.
pub const MODEL_SPACE: &str = "core:space:Model";
