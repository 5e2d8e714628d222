//! Request handler
//!
//! Ties normalization, the resource cache, resolution and the reader pool
//! together behind a narrow request-context trait implemented by the
//! surrounding request pipeline.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::cache::{ResourceCache, ResourceDescriptor};
use crate::config::Config;
use crate::fs::{self, FsError, PooledReader, ReaderPool, ResourceResolver};

/// What the handler needs from the request pipeline
pub trait RequestContext {
    /// Raw request path, starting with `/`
    fn path(&self) -> &[u8];
    /// Full request URI, used for directory listing links
    fn request_uri(&self) -> &str;
    /// Use `body` as the response body of `content_length` bytes
    fn set_body_stream(&mut self, body: PooledReader, content_length: usize);
    fn set_content_type(&mut self, content_type: &str);
    /// Fail the request with `status`
    fn error(&mut self, message: &str, status: u16);
}

/// Serves files below a root directory through the resource cache
pub struct FsHandler {
    resolver: ResourceResolver,
    strip_slashes: usize,
    cache: Arc<ResourceCache>,
    readers: Arc<ReaderPool>,
}

impl FsHandler {
    pub fn new(config: &Config) -> Self {
        Self {
            resolver: ResourceResolver::new(config.root_dir()),
            strip_slashes: config.strip_count(),
            cache: Arc::new(ResourceCache::new(config.cache_ttl())),
            readers: Arc::new(ReaderPool::new(config.max_idle_readers)),
        }
    }

    /// Start expiring cached resources in the background
    pub fn start(&self) {
        self.cache.start();
    }

    /// Stop the background expiration
    pub async fn stop(&self) {
        self.cache.stop().await;
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn readers(&self) -> &Arc<ReaderPool> {
        &self.readers
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    /// Find the resource for a raw request path, resolving it on a cache miss
    pub fn open(
        &self,
        raw_path: &[u8],
        request_uri: &str,
    ) -> Result<Arc<ResourceDescriptor>, FsError> {
        let normalized = fs::normalize(raw_path, self.strip_slashes);
        let path = fs::validate(normalized)?;

        if let Some(desc) = self.cache.lookup(path) {
            return Ok(desc);
        }

        let desc = self.resolver.resolve(path, request_uri)?;
        Ok(self.cache.insert(path, desc))
    }

    /// Answer one request
    pub fn handle<C: RequestContext + ?Sized>(&self, ctx: &mut C) {
        let desc = match self.open(ctx.path(), ctx.request_uri()) {
            Ok(desc) => desc,
            Err(e) => {
                log_failure(&e);
                ctx.error(e.client_message(), e.status_code());
                return;
            }
        };

        let reader = self.readers.acquire(&desc);
        ctx.set_body_stream(reader, desc.content_length());
        ctx.set_content_type(desc.content_type());
    }
}

fn log_failure(e: &FsError) {
    match e {
        FsError::InvalidPath { .. } => warn!(error = %e, "Rejected request path"),
        FsError::NotFound(_) | FsError::Forbidden(_) => debug!(error = %e, "Cannot open requested path"),
        FsError::Listing { .. } => error!(error = %e, "Cannot create directory index"),
        FsError::TooLarge { .. } | FsError::Io { .. } => error!(error = %e, "Cannot open file"),
    }
}
