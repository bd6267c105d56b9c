//! In-memory adapters.
//!
//! Both adapters keep their data in the factory, keyed by tenant, so an
//! adapter that is closed and reopened for the same tenant sees the same
//! documents. Used for local runs (`DB_URL=memory://`) and in tests.

mod full_text;
mod matcher;
mod storage;

pub use full_text::{MemoryFullTextAdapter, MemoryFullTextFactory};
pub use storage::{MemoryStorageAdapter, MemoryStorageFactory};
