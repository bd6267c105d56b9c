//! OpenSearch implementation of the text-engine adapter.
//!
//! Every tenant gets its own index, named from the configured prefix and
//! the tenant key.

mod client;
mod index_config;
mod queries;

pub use client::{OpenSearchAdapter, OpenSearchFactory};
pub use index_config::{get_index_settings, index_name};
pub use queries::{build_search_query, build_search_string_query};
