//! Pooled resource readers
//!
//! Every request streaming a cached resource gets its own cursor with a
//! private offset. File-backed cursors use positional reads so any number
//! of them can share one open handle without a shared seek position.

use std::cmp;
use std::fs::File;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::cache::{Body, ResourceDescriptor};

/// Default number of idle cursors kept for reuse
pub const DEFAULT_MAX_IDLE_READERS: usize = 1024;

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Read progress of one consumer through one resource
#[derive(Debug, Default)]
pub struct ReaderCursor {
    /// Bound resource body, `None` while the cursor sits in the pool
    body: Option<Body>,
    /// Bytes this cursor may deliver, fixed when bound
    length: u64,
    /// Position of the next read, private to this cursor
    offset: u64,
}

impl ReaderCursor {
    fn bind(&mut self, descriptor: &ResourceDescriptor) {
        self.body = Some(descriptor.body().clone());
        self.length = descriptor.content_length() as u64;
        self.offset = 0;
    }

    /// Current read offset
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the cursor is attached to a resource
    pub fn is_bound(&self) -> bool {
        self.body.is_some()
    }

    /// Detach from the resource and rewind
    pub fn reset(&mut self) {
        self.body = None;
        self.length = 0;
        self.offset = 0;
    }
}

impl Read for ReaderCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.offset);
        let want = cmp::min(buf.len() as u64, remaining) as usize;
        if want == 0 {
            return Ok(0);
        }

        let n = match &self.body {
            Some(Body::File(file)) => read_at(file, &mut buf[..want], self.offset)?,
            Some(Body::Generated(content)) => {
                let start = self.offset as usize;
                let n = cmp::min(want, content.len().saturating_sub(start));
                buf[..n].copy_from_slice(&content[start..start + n]);
                n
            }
            None => 0,
        };
        self.offset += n as u64;
        Ok(n)
    }
}

/// Pool of reusable cursors
pub struct ReaderPool {
    /// Unbound cursors ready for reuse
    idle: Mutex<Vec<ReaderCursor>>,
    /// Cursors released while `idle` is this full are dropped
    max_idle: usize,
}

impl ReaderPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    fn idle_cursors(&self) -> MutexGuard<'_, Vec<ReaderCursor>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a cursor from the pool bound to `descriptor` at offset zero
    pub fn acquire_cursor(&self, descriptor: &ResourceDescriptor) -> ReaderCursor {
        let mut cursor = self.idle_cursors().pop().unwrap_or_default();
        cursor.bind(descriptor);
        cursor
    }

    /// Take a cursor wrapped in a guard that returns it to the pool on drop
    pub fn acquire(self: &Arc<Self>, descriptor: &ResourceDescriptor) -> PooledReader {
        PooledReader {
            cursor: Some(self.acquire_cursor(descriptor)),
            pool: Arc::clone(self),
        }
    }

    /// Return a cursor to the pool
    ///
    /// # Panics
    /// When the cursor's offset is not zero. Consumers must
    /// [`reset`](ReaderCursor::reset) a cursor before handing it back.
    pub fn release(&self, mut cursor: ReaderCursor) {
        cursor.body = None;
        assert_eq!(
            cursor.offset, 0,
            "BUG: ReaderCursor with non-zero offset released to the pool"
        );

        let mut idle = self.idle_cursors();
        if idle.len() < self.max_idle {
            idle.push(cursor);
        } else {
            trace!(max_idle = self.max_idle, "Reader pool full, dropping cursor");
        }
    }

    /// Number of cursors waiting for reuse
    pub fn idle(&self) -> usize {
        self.idle_cursors().len()
    }
}

impl Default for ReaderPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_READERS)
    }
}

/// Body stream handed to the response writer
pub struct PooledReader {
    cursor: Option<ReaderCursor>,
    pool: Arc<ReaderPool>,
}

impl PooledReader {
    /// Bytes delivered so far
    pub fn offset(&self) -> u64 {
        self.cursor.as_ref().map_or(0, ReaderCursor::offset)
    }
}

impl Read for PooledReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for PooledReader {
    fn drop(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.reset();
            self.pool.release(cursor);
        }
    }
}

impl std::fmt::Debug for PooledReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledReader")
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(content: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(content).unwrap();
        file
    }

    fn sample_content() -> Vec<u8> {
        (0..200_000u32).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_read_generated() {
        let pool = Arc::new(ReaderPool::default());
        let desc = ResourceDescriptor::generated(b"<ul></ul>".to_vec(), "text/html");

        let mut reader = pool.acquire(&desc);
        let mut small = [0u8; 4];
        assert_eq!(reader.read(&mut small).unwrap(), 4);
        assert_eq!(&small, b"<ul>");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"</ul>");
        assert_eq!(reader.read(&mut small).unwrap(), 0);
    }

    #[test]
    fn test_read_file() {
        let content = sample_content();
        let desc = ResourceDescriptor::file(file_with(&content), String::new(), content.len());
        let pool = Arc::new(ReaderPool::default());

        let mut out = Vec::new();
        pool.acquire(&desc).read_to_end(&mut out).unwrap();
        assert_eq!(out, content);
    }

    #[test]
    fn test_read_stops_at_declared_length() {
        let desc = ResourceDescriptor::file(file_with(b"0123456789"), String::new(), 4);
        let pool = Arc::new(ReaderPool::default());

        let mut out = Vec::new();
        pool.acquire(&desc).read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123");
    }

    #[test]
    fn test_concurrent_readers_share_handle() {
        let content = sample_content();
        let desc = Arc::new(ResourceDescriptor::file(
            file_with(&content),
            String::new(),
            content.len(),
        ));
        let pool = Arc::new(ReaderPool::default());

        for readers in [1, 2, 8, 32] {
            let outputs: Vec<Vec<u8>> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..readers)
                    .map(|i| {
                        let pool = Arc::clone(&pool);
                        let desc = Arc::clone(&desc);
                        s.spawn(move || {
                            let mut reader = pool.acquire(&desc);
                            // odd buffer sizes interleave reads at different offsets
                            let mut buf = vec![0u8; 1000 + i * 37];
                            let mut out = Vec::new();
                            loop {
                                let n = reader.read(&mut buf).unwrap();
                                if n == 0 {
                                    break;
                                }
                                out.extend_from_slice(&buf[..n]);
                            }
                            out
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(outputs.len(), readers);
            for out in outputs {
                assert_eq!(out, content);
            }
        }
    }

    #[test]
    fn test_cursor_reuse() {
        let pool = Arc::new(ReaderPool::default());
        let desc = ResourceDescriptor::generated(b"abc".to_vec(), "text/plain");

        let mut reader = pool.acquire(&desc);
        reader.read_to_end(&mut Vec::new()).unwrap();
        assert_eq!(reader.offset(), 3);
        drop(reader);
        assert_eq!(pool.idle(), 1);

        let reader = pool.acquire(&desc);
        assert_eq!(pool.idle(), 0);
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn test_pool_bound() {
        let pool = Arc::new(ReaderPool::new(1));
        let desc = ResourceDescriptor::generated(b"abc".to_vec(), "text/plain");

        let first = pool.acquire(&desc);
        let second = pool.acquire(&desc);
        drop(first);
        drop(second);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_release_after_reset() {
        let pool = ReaderPool::default();
        let desc = ResourceDescriptor::generated(b"abc".to_vec(), "text/plain");

        let mut cursor = pool.acquire_cursor(&desc);
        assert!(cursor.is_bound());
        cursor.read_to_end(&mut Vec::new()).unwrap();
        cursor.reset();
        assert!(!cursor.is_bound());
        pool.release(cursor);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    #[should_panic(expected = "non-zero offset")]
    fn test_release_with_offset_panics() {
        let pool = ReaderPool::default();
        let desc = ResourceDescriptor::generated(b"abc".to_vec(), "text/plain");

        let mut cursor = pool.acquire_cursor(&desc);
        let mut buf = [0u8; 2];
        cursor.read(&mut buf).unwrap();
        pool.release(cursor);
    }
}
