//! Interface definitions for the adapters a tenant indexer owns.
//!
//! Each adapter is a trait so the backend can be swapped (OpenSearch,
//! in-memory, mock) and each comes with a factory that opens one instance
//! per tenant.

mod content_adapter;
mod full_text_adapter;
mod storage_adapter;

pub use content_adapter::{ContentAdapter, ContentAdapterFactory};
pub use full_text_adapter::{FullTextAdapter, FullTextAdapterFactory};
pub use storage_adapter::{StorageAdapter, StorageAdapterFactory};
