//! Cached resource descriptors
//!
//! A descriptor is what the cache stores per normalized path: either an
//! open file handle or generated bytes, plus the metadata needed to answer
//! a request without touching the filesystem again.

use std::fs::File;
use std::sync::Arc;

use tokio::time::Instant;

/// Content backing a descriptor
#[derive(Clone, Debug)]
pub enum Body {
    /// Open regular file, read with positional reads only
    File(Arc<File>),
    /// In-memory content such as a directory listing
    Generated(Arc<[u8]>),
}

/// One servable entity
#[derive(Debug)]
pub struct ResourceDescriptor {
    body: Body,
    content_type: String,
    content_length: usize,
    /// Set when the descriptor enters the cache
    touched: Instant,
}

impl ResourceDescriptor {
    /// Describe an open regular file
    pub fn file(file: File, content_type: String, content_length: usize) -> Self {
        Self {
            body: Body::File(Arc::new(file)),
            content_type,
            content_length,
            touched: Instant::now(),
        }
    }

    /// Describe generated content; the length is taken from the bytes
    pub fn generated(content: Vec<u8>, content_type: impl Into<String>) -> Self {
        let content_length = content.len();
        Self {
            body: Body::Generated(content.into()),
            content_type: content_type.into(),
            content_length,
            touched: Instant::now(),
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Whether the descriptor holds an open file handle
    pub fn has_handle(&self) -> bool {
        matches!(self.body, Body::File(_))
    }

    pub fn touched(&self) -> Instant {
        self.touched
    }

    pub(crate) fn touch_at(&mut self, at: Instant) {
        self.touched = at;
    }
}
