//! # Full-text Indexer
//!
//! Pooled per-tenant full-text indexer service.
//!
//! This crate provides the indexer pool, the tenant indexers it manages and
//! the HTTP endpoints that expose them:
//!
//! - `PUT /api/v1/search`: raw text hits for a flattened structured query
//! - `PUT /api/v1/full-text-search`: keyword search returning ranked titles
//! - `PUT /api/v1/index-documents`: queue transactions for indexing

pub mod config;
pub mod dependencies;
pub mod errors;
pub mod indexer;
pub mod notifier;
pub mod pool;
pub mod server;

pub use config::{IndexerConfig, PoolConfig};
pub use dependencies::Dependencies;
pub use errors::IndexerError;
pub use indexer::{
    BroadcastConfig, IndexerFactory, IndexerServices, TenantIndexer, TenantIndexerFactory,
};
pub use notifier::BroadcastNotifier;
pub use pool::{IndexerLease, IndexerPool};
pub use server::{build_router, AppState};
