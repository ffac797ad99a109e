//! Agent memory storage
//!
//! A single shared [`MemoryBackend`] lives on the registry and is used by
//! the `memory` evaluator and the `memory` module.

pub mod backend;
pub mod inmemory;

pub use backend::{MemoryBackend, MemoryRecord, QueryOptions, StoreOptions};
pub use inmemory::InMemoryBackend;
