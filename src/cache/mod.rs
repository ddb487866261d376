//! Taskflow cache layer.
//!
//! A read-through cache over a byte-oriented key-value backend:
//!
//! - [`ReadThroughCache`] checks the backend, falls back to a producer on
//!   miss and stores the result with an expiry.
//! - Writers call [`ReadThroughCache::invalidate`] with the collection key
//!   after mutating the authoritative store.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! url = "redis://127.0.0.1:6379"   # omit for the in-process backend
//! tasks_ttl_seconds = 60
//! default_ttl_seconds = 300
//! ```

mod backend;
mod config;
mod keys;
mod memory;
mod read_through;

pub use backend::{CacheBackend, CacheError};
pub use config::CacheConfig;
pub use keys::CacheKey;
pub use memory::MemoryCacheBackend;
pub use read_through::ReadThroughCache;

pub(crate) use read_through::{
    METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE_FAILED, METRIC_CACHE_MISS, METRIC_CACHE_STORE_FAILED,
};
