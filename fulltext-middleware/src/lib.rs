//! # Full-text Search Middleware
//!
//! A document-pipeline layer that answers `$search` queries through the
//! tenant's indexer and keeps that indexer informed of writes.
//!
//! ## Architecture
//!
//! 1. **Routing**: each tenant is pinned to one indexer endpoint by a stable
//!    string hash
//! 2. **Read path**: `$search` finds are rewritten into an indexer search,
//!    then reconciled against the structured store
//! 3. **Write path**: transactions on indexable classes are forwarded to the
//!    indexer in the background while the full batch continues down the
//!    pipeline

pub mod client;
pub mod config;
pub mod forwarder;
pub mod middleware;
pub mod routing;

pub use client::{HttpIndexerClient, IndexerClient};
pub use config::FullTextMiddlewareConfig;
pub use forwarder::TxForwarder;
pub use middleware::FullTextMiddleware;
pub use routing::{hash_tenant, select_endpoint, split_endpoints};

#[cfg(test)]
mod test_support;
