//! Plain-text content extraction.
//!
//! Handles textual payloads directly; binary formats yield no text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::SearchError;
use crate::interfaces::{ContentAdapter, ContentAdapterFactory};
use fulltext_indexer_shared::TenantKey;

const TEXTUAL_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-yaml",
];

/// Content adapter that decodes textual payloads as UTF-8.
#[derive(Debug, Default)]
pub struct PlainTextContentAdapter {
    closed: AtomicBool,
}

impl PlainTextContentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_textual(content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        mime.starts_with("text/") || TEXTUAL_TYPES.contains(&mime.as_str())
    }
}

#[async_trait]
impl ContentAdapter for PlainTextContentAdapter {
    async fn content(&self, name: &str, content_type: &str, data: &[u8]) -> Result<String, SearchError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SearchError::Closed);
        }
        if !Self::is_textual(content_type) {
            debug!(name = %name, content_type = %content_type, "Skipping non-text content");
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    async fn close(&self) -> Result<(), SearchError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens a fresh [`PlainTextContentAdapter`] for every tenant.
#[derive(Debug, Default, Clone)]
pub struct PlainTextContentFactory;

#[async_trait]
impl ContentAdapterFactory for PlainTextContentFactory {
    async fn create(&self, _tenant: &TenantKey) -> Result<Arc<dyn ContentAdapter>, SearchError> {
        Ok(Arc::new(PlainTextContentAdapter::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_textual_content_is_decoded() {
        let adapter = PlainTextContentAdapter::new();
        let text = adapter
            .content("notes.md", "text/markdown; charset=utf-8", b"release notes")
            .await
            .unwrap();
        assert_eq!(text, "release notes");
    }

    #[tokio::test]
    async fn test_binary_content_is_skipped() {
        let adapter = PlainTextContentAdapter::new();
        let text = adapter
            .content("photo.png", "image/png", &[0x89, 0x50, 0x4e, 0x47])
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_closed_adapter_rejects_requests() {
        let adapter = PlainTextContentAdapter::new();
        adapter.close().await.unwrap();
        assert!(matches!(
            adapter.content("a.txt", "text/plain", b"x").await,
            Err(SearchError::Closed)
        ));
    }
}
