//! # Full-text Indexer Pipeline
//!
//! This crate provides the document pipeline a tenant indexer is built on
//! and the staged pipeline that turns transactions into indexed documents.
//!
//! ## Architecture
//!
//! 1. **Middleware**: composable read/write layers sharing a
//!    [`PipelineContext`]; each layer holds its successor
//! 2. **Processor**: transforms transactions into indexed documents
//! 3. **Loader**: writes documents into the text engine, with retries
//! 4. **Indexing pipeline**: a background worker feeding batches from a
//!    queue through the processor and loader, then reporting the touched
//!    classes to an [`IndexingNotifier`]

pub mod errors;
pub mod full_text;
pub mod indexing;
pub mod middleware;

pub use errors::PipelineError;
pub use full_text::FullTextIndex;
pub use indexing::{
    DocumentProcessor, IndexLoader, IndexingConfig, IndexingNotifier, IndexingPipeline,
    LoaderConfig, NoopNotifier, ProcessedBatch, ProcessedEvent,
};
pub use middleware::{
    create_pipeline, creator, ContextNameMiddleware, DbAdapterInitMiddleware,
    DbAdapterMiddleware, DomainFindMiddleware, LowLevelMiddleware, Middleware,
    MiddlewareCreator, Next, Pipeline, PipelineContext,
};
