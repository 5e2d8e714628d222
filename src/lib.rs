//! staticfs - static file serving with cached file handles
//!
//! Resolves request paths below a root directory, keeps opened files in a
//! TTL cache and streams them through pooled positional readers.

pub mod cache;
pub mod config;
pub mod fs;
pub mod handler;
pub mod server;

pub use cache::{CacheStats, ResourceCache, ResourceDescriptor};
pub use config::Config;
pub use fs::{FsError, PooledReader, ReaderPool, ResourceResolver};
pub use handler::{FsHandler, RequestContext};
