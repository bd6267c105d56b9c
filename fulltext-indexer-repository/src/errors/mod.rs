//! Error types for the adapter layer.

mod search_error;

pub use search_error::SearchError;
