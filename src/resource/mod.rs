//! Resource access layer
//!
//! - [`registry`] - the collections the engine reads and how to address them
//! - [`fetcher`] - the [`ResourceClient`] seam and list helpers
//! - [`cache`] - TTL response cache shared by every fetch
//! - [`batch`] - bounded-concurrency batch execution over the cache

pub mod batch;
pub mod cache;
pub mod fetcher;
pub mod registry;

pub use batch::{BatchExecutor, FetchResult, DEFAULT_CONCURRENCY};
pub use cache::{ResponseCache, DEFAULT_CACHE_TTL};
pub use fetcher::{extract_json_value, list_items, list_items_or_empty, ResourceClient};
pub use registry::{
    get_resource, FetchRequest, ResourceDef, ResourceKind, DEFAULT_STORAGE_NAMESPACE, UPGRADE_NAMESPACE,
};
