//! Document processor implementation.
//!
//! Transforms transactions into documents for the text index.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::errors::PipelineError;
use crate::middleware::Middleware;
use fulltext_indexer_repository::ContentAdapter;
use fulltext_indexer_shared::query::ID_KEY;
use fulltext_indexer_shared::{
    doc_key, AttributeDef, ClassRef, ClassSet, Doc, DocRef, DocumentQuery, FindOptions,
    FullTextSearchContext, Hierarchy, IndexedDoc, Tx, TxCud, SUMMARY_FIELD, TITLE_FIELD,
};

/// Processed result from the document processor.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedEvent {
    /// Document to be indexed (create or update).
    Index(IndexedDoc),
    /// Document to be removed.
    Remove(DocRef),
}

/// Output of one processed batch.
#[derive(Debug, Default)]
pub struct ProcessedBatch {
    pub events: Vec<ProcessedEvent>,
    /// Base classes of the documents the batch touched.
    pub classes: BTreeSet<ClassRef>,
}

/// Processor that transforms transactions into indexed documents.
///
/// The processor is responsible for:
/// - Dropping transactions on classes that do not participate in indexing
/// - Rebuilding the full document for updates and mixins from storage
/// - Flattening indexed attributes under composite keys
/// - Building the full-text summary, extracted attachment content included
pub struct DocumentProcessor {
    hierarchy: Arc<Hierarchy>,
    contexts: HashMap<ClassRef, FullTextSearchContext>,
    content: Arc<dyn ContentAdapter>,
    reader: Option<Arc<dyn Middleware>>,
}

impl DocumentProcessor {
    pub fn new(
        hierarchy: Arc<Hierarchy>,
        contexts: HashMap<ClassRef, FullTextSearchContext>,
        content: Arc<dyn ContentAdapter>,
    ) -> Self {
        Self {
            hierarchy,
            contexts,
            content,
            reader: None,
        }
    }

    /// Read current documents through `reader` when an update or mixin arrives.
    pub fn with_reader(mut self, reader: Arc<dyn Middleware>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Process a batch of transactions.
    ///
    /// A transaction that fails to process is logged and skipped; the rest of
    /// the batch still goes through.
    #[instrument(skip(self, txes), fields(tx_count = txes.len()))]
    pub async fn process_batch(&self, txes: Vec<Tx>) -> ProcessedBatch {
        let mut batch = ProcessedBatch::default();

        for tx in txes {
            match self.process_tx(tx).await {
                Ok(Some((class, event))) => {
                    batch.classes.insert(class);
                    batch.events.push(event);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to process transaction"),
            }
        }

        debug!(processed_count = batch.events.len(), "Processed transaction batch");
        batch
    }

    async fn process_tx(&self, tx: Tx) -> Result<Option<(ClassRef, ProcessedEvent)>, PipelineError> {
        let tx = tx.unwrap_collection();
        let Some(cud) = tx.as_cud() else {
            return Ok(None);
        };
        let base = self.hierarchy.get_base_class(cud.object_class());
        if !self.hierarchy.is_class_indexable(&base, &self.contexts) {
            debug!(class = %base, "Skipping non-indexable class");
            return Ok(None);
        }

        let event = match cud {
            TxCud::Remove(remove) => Some(ProcessedEvent::Remove(remove.object_id.clone())),
            TxCud::Update(update) => match self.load(&update.object_class, &update.object_id).await? {
                Some(mut doc) => {
                    doc.apply_operations(&update.operations, &update.meta);
                    Some(ProcessedEvent::Index(self.build_document(&doc).await?))
                }
                None => None,
            },
            TxCud::Mixin(mixin) => match self.load(&mixin.object_class, &mixin.object_id).await? {
                Some(mut doc) => {
                    doc.apply_mixin(&mixin.mixin, &mixin.attributes, &mixin.meta);
                    Some(ProcessedEvent::Index(self.build_document(&doc).await?))
                }
                None => None,
            },
            TxCud::Create(create) => {
                let doc = Doc::from(create.clone());
                Some(ProcessedEvent::Index(self.build_document(&doc).await?))
            }
        };
        Ok(event.map(|event| (base, event)))
    }

    async fn load(&self, class: &ClassRef, id: &DocRef) -> Result<Option<Doc>, PipelineError> {
        let Some(reader) = &self.reader else {
            return Ok(None);
        };
        let query = DocumentQuery::new().with(ID_KEY, id.as_str());
        let result = reader
            .find_all(class, &query, &FindOptions::default().with_limit(1))
            .await?;
        if result.is_empty() {
            debug!(doc_id = %id, class = %class, "Document to reindex is not in storage");
        }
        Ok(result.docs.into_iter().next())
    }

    /// Build the index representation of `doc`.
    pub async fn build_document(&self, doc: &Doc) -> Result<IndexedDoc, PipelineError> {
        let ancestors = self.hierarchy.ancestors(&doc.class);
        let class = if ancestors.is_empty() {
            ClassSet::One(doc.class.clone())
        } else {
            ClassSet::Many(ancestors)
        };

        let mut indexed = IndexedDoc::new(doc.id.clone(), class);
        indexed.attached_to = doc.attached_to.clone();
        indexed.attached_to_class = doc.attached_to_class.clone();
        indexed.fields.insert("space".to_string(), Value::String(doc.space.to_string()));
        indexed.fields.insert("modifiedOn".to_string(), Value::from(doc.modified_on));
        indexed
            .fields
            .insert("modifiedBy".to_string(), Value::String(doc.modified_by.to_string()));

        let mut summary = Vec::new();
        for attr in self.hierarchy.get_all_attributes(&doc.class)?.values() {
            if let Some(value) = doc.attributes.get(&attr.name) {
                index_attribute(&mut indexed.fields, &mut summary, attr, value);
            }
        }

        let base = self.hierarchy.get_base_class(&doc.class);
        for mixin in self.hierarchy.get_descendants(&base) {
            if !self.hierarchy.is_mixin(&mixin) {
                continue;
            }
            let Some(Value::Object(values)) = doc.attributes.get(mixin.as_str()) else {
                continue;
            };
            for attr in self.hierarchy.get_all_attributes(&mixin)?.values() {
                if attr.attribute_of != mixin {
                    continue;
                }
                if let Some(value) = values.get(&attr.name) {
                    index_attribute(&mut indexed.fields, &mut summary, attr, value);
                }
            }
        }

        if let Some(text) = self.extract_content(doc).await? {
            summary.push(text);
        }
        indexed
            .fields
            .insert(SUMMARY_FIELD.to_string(), Value::String(summary.join("\n")));

        let title = ["title", "name"]
            .iter()
            .find_map(|key| doc.attributes.get(*key).and_then(Value::as_str));
        if let Some(title) = title {
            indexed
                .fields
                .insert(TITLE_FIELD.to_string(), Value::String(title.to_string()));
        }

        Ok(indexed)
    }

    /// Text of an attachment payload (`contentType` plus inline `content`).
    async fn extract_content(&self, doc: &Doc) -> Result<Option<String>, PipelineError> {
        let attrs = &doc.attributes;
        let (Some(content_type), Some(data)) = (
            attrs.get("contentType").and_then(Value::as_str),
            attrs.get("content").and_then(Value::as_str),
        ) else {
            return Ok(None);
        };
        let name = attrs
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(doc.id.as_str());
        let text = self
            .content
            .content(name, content_type, data.as_bytes())
            .await?;
        Ok(Some(text).filter(|t| !t.trim().is_empty()))
    }
}

fn index_attribute(
    fields: &mut Map<String, Value>,
    summary: &mut Vec<String>,
    attr: &AttributeDef,
    value: &Value,
) {
    if !attr.is_full_text() && !attr.is_indexed() {
        return;
    }
    fields.insert(doc_key(&attr.name, Some(&attr.attribute_of)), value.clone());
    if attr.is_full_text() {
        let text = text_of(value);
        if !text.is_empty() {
            summary.push(text);
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Next;
    use async_trait::async_trait;
    use fulltext_indexer_repository::PlainTextContentAdapter;
    use fulltext_indexer_shared::classes;
    use fulltext_indexer_shared::hierarchy::builders::{attribute, class, collection, mixin};
    use fulltext_indexer_shared::tx::{TxMixin, TxUpdateDoc};
    use fulltext_indexer_shared::{FindResult, SearchOptions, SearchQuery, SearchResult, TxMeta};
    use serde_json::json;

    const ISSUE: &str = "tracker:class:Issue";
    const COMMENT: &str = "chunter:class:ChatMessage";
    const ATTACHMENT: &str = "attachment:class:Attachment";
    const PROJECT: &str = "tracker:class:Project";
    const LABELS: &str = "tags:mixin:Labels";

    fn hierarchy() -> Arc<Hierarchy> {
        let mut h = Hierarchy::new();
        for tx in [
            class(classes::DOC, None, None),
            class(classes::ATTACHED_DOC, Some(classes::DOC), None),
            class(ISSUE, Some(classes::DOC), Some("tracker")),
            class(COMMENT, Some(classes::ATTACHED_DOC), Some("chunter")),
            class(ATTACHMENT, Some(classes::ATTACHED_DOC), Some("attachment")),
            class(PROJECT, Some(classes::DOC), Some("tracker")),
            mixin(LABELS, ISSUE),
            attribute(ISSUE, "title", "core:class:TypeString", Some("FullText")),
            attribute(ISSUE, "priority", "core:class:TypeNumber", Some("Indexed")),
            attribute(ISSUE, "estimation", "core:class:TypeNumber", None),
            attribute(COMMENT, "message", "core:class:TypeMarkup", Some("FullText")),
            attribute(ATTACHMENT, "name", "core:class:TypeString", Some("FullText")),
            attribute(LABELS, "labels", "core:class:ArrOf", Some("FullText")),
            collection(ISSUE, "comments", COMMENT),
        ] {
            h.tx(&tx).unwrap();
        }
        Arc::new(h)
    }

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(hierarchy(), HashMap::new(), Arc::new(PlainTextContentAdapter::new()))
    }

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn only_index(batch: ProcessedBatch) -> IndexedDoc {
        match batch.events.into_iter().next() {
            Some(ProcessedEvent::Index(doc)) => doc,
            other => panic!("expected an index event, got {:?}", other),
        }
    }

    /// Serves a single stored document.
    struct StoredDoc(Doc);

    #[async_trait]
    impl Middleware for StoredDoc {
        async fn find_all(
            &self,
            _class: &ClassRef,
            query: &DocumentQuery,
            _options: &FindOptions,
        ) -> Result<FindResult, PipelineError> {
            let wanted = query.get(ID_KEY).and_then(Value::as_str);
            if wanted == Some(self.0.id.as_str()) {
                Ok(FindResult::new(vec![self.0.clone()], 1))
            } else {
                Ok(FindResult::empty())
            }
        }

        async fn tx(&self, _txes: &[Tx]) -> Result<(), PipelineError> {
            Ok(())
        }

        async fn search_fulltext(
            &self,
            query: &SearchQuery,
            options: &SearchOptions,
        ) -> Result<SearchResult, PipelineError> {
            Next::end().provide_search_fulltext(query, options).await
        }
    }

    #[tokio::test]
    async fn test_create_builds_flattened_document() {
        let tx = Tx::create(
            ISSUE,
            "i1",
            "s1",
            attrs(json!({ "title": "Login fails", "priority": 2, "estimation": 5 })),
        );
        let batch = processor().process_batch(vec![tx]).await;
        assert_eq!(batch.classes, BTreeSet::from([ClassRef::new(ISSUE)]));

        let doc = only_index(batch);
        assert_eq!(doc.id.as_str(), "i1");
        assert!(doc.class.as_ref().unwrap().contains(&ClassRef::new(classes::DOC)));
        assert_eq!(doc.fields["space"], json!("s1"));
        assert_eq!(doc.fields["tracker:class:Issue%title"], json!("Login fails"));
        assert_eq!(doc.fields["tracker:class:Issue%priority"], json!(2));
        assert!(!doc.fields.contains_key("tracker:class:Issue%estimation"));
        assert_eq!(doc.fields[SUMMARY_FIELD], json!("Login fails"));
        assert_eq!(doc.fields[TITLE_FIELD], json!("Login fails"));
    }

    #[tokio::test]
    async fn test_non_indexable_and_non_cud_are_skipped() {
        let batch = processor()
            .process_batch(vec![
                Tx::create(classes::DOC, "d1", "s1", Map::new()),
                Tx::create(PROJECT, "p1", "s1", attrs(json!({ "name": "Core" }))),
            ])
            .await;
        assert!(batch.events.is_empty());
        assert!(batch.classes.is_empty());
    }

    #[tokio::test]
    async fn test_attached_comment_keeps_owner() {
        let tx = Tx::create(COMMENT, "m1", "s1", attrs(json!({ "message": "cannot reproduce" })))
            .in_collection(ISSUE, "i1", "comments");
        let doc = only_index(processor().process_batch(vec![tx]).await);
        assert_eq!(doc.attached_to, Some(DocRef::new("i1")));
        assert_eq!(doc.attached_to_class, Some(ClassRef::new(ISSUE)));
        assert_eq!(doc.fields[SUMMARY_FIELD], json!("cannot reproduce"));
    }

    #[tokio::test]
    async fn test_attachment_content_is_extracted() {
        let tx = Tx::create(
            ATTACHMENT,
            "a1",
            "s1",
            attrs(json!({ "name": "notes.txt", "contentType": "text/plain", "content": "stack trace" })),
        );
        let doc = only_index(processor().process_batch(vec![tx]).await);
        assert_eq!(doc.fields[SUMMARY_FIELD], json!("notes.txt\nstack trace"));
    }

    #[tokio::test]
    async fn test_update_and_mixin_rebuild_from_storage() {
        let stored = Doc::new("i1", ISSUE, "s1").with_attribute("title", "Old title");
        let processor = processor().with_reader(Arc::new(StoredDoc(stored)));

        let update = Tx::UpdateDoc(TxUpdateDoc {
            meta: TxMeta::new(classes::SYSTEM_ACCOUNT, "s1"),
            object_id: DocRef::new("i1"),
            object_class: ClassRef::new(ISSUE),
            operations: attrs(json!({ "title": "New title" })),
        });
        let doc = only_index(processor.process_batch(vec![update]).await);
        assert_eq!(doc.fields[SUMMARY_FIELD], json!("New title"));

        let mixin_tx = Tx::Mixin(TxMixin {
            meta: TxMeta::new(classes::SYSTEM_ACCOUNT, "s1"),
            object_id: DocRef::new("i1"),
            object_class: ClassRef::new(ISSUE),
            mixin: ClassRef::new(LABELS),
            attributes: attrs(json!({ "labels": ["bug", "ui"] })),
        });
        let doc = only_index(processor.process_batch(vec![mixin_tx]).await);
        assert_eq!(doc.fields["tags:mixin:Labels%labels"], json!(["bug", "ui"]));
        assert_eq!(doc.fields[SUMMARY_FIELD], json!("Old title\nbug ui"));
    }

    #[tokio::test]
    async fn test_update_of_unknown_document_is_skipped() {
        let processor = processor().with_reader(Arc::new(StoredDoc(Doc::new("other", ISSUE, "s1"))));
        let tx = Tx::UpdateDoc(TxUpdateDoc {
            meta: TxMeta::new(classes::SYSTEM_ACCOUNT, "s1"),
            object_id: DocRef::new("missing"),
            object_class: ClassRef::new(ISSUE),
            operations: Map::new(),
        });
        assert!(processor.process_batch(vec![tx]).await.events.is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let batch = processor()
            .process_batch(vec![Tx::remove(ISSUE, "i1", "s1")])
            .await;
        assert_eq!(batch.events, vec![ProcessedEvent::Remove(DocRef::new("i1"))]);
    }

}
