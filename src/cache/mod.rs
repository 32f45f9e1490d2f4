//! Query cache for API responses
//!
//! An in-memory cache keyed by resolved request key, with optional SQLite
//! persistence so separate CLI runs can share fresh data.

pub mod key;
pub mod query;
pub mod storage;

pub use key::{QueryParams, resolve_query_key};
pub use query::{QueryCache, QueryPolicy};
pub use storage::CacheStorage;
