//! # Full-text Indexer Repository
//!
//! This crate provides the adapter traits the indexer is built on and their
//! implementations: the text-ranking engine (OpenSearch, or an in-memory
//! engine for local runs), content extraction, and structured storage.

pub mod config;
pub mod content;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;

pub use config::FullTextAdapterConfig;
pub use content::{PlainTextContentAdapter, PlainTextContentFactory};
pub use errors::SearchError;
pub use interfaces::{
    ContentAdapter, ContentAdapterFactory, FullTextAdapter, FullTextAdapterFactory,
    StorageAdapter, StorageAdapterFactory,
};
pub use memory::{MemoryFullTextAdapter, MemoryFullTextFactory, MemoryStorageAdapter, MemoryStorageFactory};
pub use opensearch::{OpenSearchAdapter, OpenSearchFactory};
