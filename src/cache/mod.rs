//! Resource caching layer
//!
//! Keeps resolved resources, open file handles included, for a fixed TTL
//! so hot paths skip the open/stat/close cycle.

pub mod resource;
pub mod store;

pub use resource::{Body, ResourceDescriptor};
pub use store::{CacheStats, ResourceCache, DEFAULT_CACHE_TTL};
