//! Resource Cache Implementation
//!
//! Path-keyed store of open resources with absolute TTL expiration.
//! A background sweep task, started and stopped explicitly, evicts entries
//! older than the TTL and releases their file handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::resource::ResourceDescriptor;

/// How long an opened resource stays cached
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10);

/// Lower bound for the sweep period so a tiny TTL cannot spin the task
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Handle to the running sweep task
struct Sweeper {
    /// Fired by `stop` to end the task after its current cycle
    stop_tx: oneshot::Sender<()>,
    /// The sweep loop, aborted if the cache is dropped while it runs
    task: JoinHandle<()>,
}

/// Lookup counters since creation or the last [`ResourceCache::clear`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Share of lookups served from the cache, in percent
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            total => self.hits as f64 * 100.0 / total as f64,
        }
    }
}

/// Cache of resolved resources keyed by normalized request path
///
/// Two concurrent misses for the same path may both resolve and insert;
/// the later insert replaces the earlier entry. The replaced descriptor is
/// dropped, so its handle closes as soon as readers still streaming from
/// it are done.
pub struct ResourceCache {
    /// Age at which an entry is evicted, counted from its insertion
    ttl: Duration,
    /// Cached descriptors by normalized path
    entries: Mutex<HashMap<String, Arc<ResourceDescriptor>>>,
    /// Running sweep task, `None` while stopped
    sweeper: Mutex<Option<Sweeper>>,
    /// Lookups answered from `entries`
    hits: AtomicU64,
    /// Lookups that found nothing
    misses: AtomicU64,
}

impl ResourceCache {
    /// Create an empty cache; the sweep is not running until [`start`](Self::start)
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Interval between two sweep cycles (half the TTL)
    pub fn sweep_period(&self) -> Duration {
        (self.ttl / 2).max(MIN_SWEEP_PERIOD)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<ResourceDescriptor>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<Sweeper>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a cached resource
    ///
    /// Reads never refresh the entry's age.
    pub fn lookup(&self, path: &str) -> Option<Arc<ResourceDescriptor>> {
        let found = self.entries().get(path).cloned();
        match found {
            Some(desc) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache HIT");
                Some(desc)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache MISS");
                None
            }
        }
    }

    /// Insert a freshly resolved resource, replacing any existing entry
    ///
    /// Returns the shared descriptor now stored under `path`.
    pub fn insert(&self, path: &str, mut descriptor: ResourceDescriptor) -> Arc<ResourceDescriptor> {
        descriptor.touch_at(Instant::now());
        let descriptor = Arc::new(descriptor);

        let replaced = self
            .entries()
            .insert(path.to_string(), Arc::clone(&descriptor));

        if replaced.is_some() {
            debug!(path = path, "Replaced concurrently resolved cache entry");
        } else {
            debug!(
                path = path,
                length = descriptor.content_length(),
                "Cached resource"
            );
        }
        descriptor
    }

    /// Run one sweep cycle against the current time
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict every entry older than the TTL as of `now`
    ///
    /// Evicted descriptors are dropped after the lock is released.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let expired: Vec<(String, Arc<ResourceDescriptor>)> = {
            let mut entries = self.entries();
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, desc)| now.saturating_duration_since(desc.touched()) > self.ttl)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.remove_entry(&key))
                .collect()
        };

        let count = expired.len();
        for (path, desc) in expired {
            trace!(path = %path, handle = desc.has_handle(), "Evicted expired resource");
        }
        if count > 0 {
            debug!(evicted = count, "Cache sweep finished");
        }
        count
    }

    /// Spawn the background sweep on the current tokio runtime
    ///
    /// Does nothing if the sweep is already running.
    ///
    /// # Panics
    /// When called outside of a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = self.sweeper();
        if sweeper.is_some() {
            debug!("Cache sweep already running");
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let period = self.sweep_period();
        let cache = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        cache.sweep();
                    }
                }
            }
            debug!("Cache sweep task exited");
        });

        debug!(period_ms = period.as_millis() as u64, "Cache sweep started");
        *sweeper = Some(Sweeper { stop_tx, task });
    }

    /// Signal the sweep task to exit and wait for it
    pub async fn stop(&self) {
        let sweeper = self.sweeper().take();
        let Some(sweeper) = sweeper else {
            return;
        };

        // the task may already be gone, in which case the send fails
        let _ = sweeper.stop_tx.send(());
        if let Err(e) = sweeper.task.await {
            warn!(error = %e, "Cache sweep task panicked");
        }
        debug!("Cache sweep stopped");
    }

    /// Whether the sweep task is currently running
    pub fn is_running(&self) -> bool {
        self.sweeper()
            .as_ref()
            .is_some_and(|sweeper| !sweeper.task.is_finished())
    }

    /// Drop every entry
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries().drain().collect();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!(evicted = drained.len(), "Cleared resource cache");
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Emit the lookup counters at debug level
    pub fn log_metrics(&self) {
        let stats = self.stats();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = format!("{:.1}%", stats.hit_rate()),
            entries = self.len(),
            "Cache metrics"
        );
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        let sweeper = self
            .sweeper
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::resource::Body;
    use std::fs::File;
    use std::sync::Weak;

    fn file_descriptor() -> (ResourceDescriptor, Weak<File>) {
        let desc = ResourceDescriptor::file(tempfile::tempfile().unwrap(), "text/plain".into(), 0);
        let weak = match desc.body() {
            Body::File(file) => Arc::downgrade(file),
            Body::Generated(_) => unreachable!(),
        };
        (desc, weak)
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = ResourceCache::default();

        assert!(cache.lookup("a.txt").is_none());
        cache.insert("a.txt", ResourceDescriptor::generated(b"abc".to_vec(), "text/plain"));
        let desc = cache.lookup("a.txt").unwrap();
        assert_eq!(desc.content_length(), 3);

        let stats = cache.stats();
        assert_eq!(stats, CacheStats { hits: 1, misses: 1 });
        assert_eq!(stats.lookups(), 2);
        assert!(stats.hit_rate() > 49.0 && stats.hit_rate() < 51.0);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_insert_overwrites() {
        let cache = ResourceCache::default();
        cache.insert("x", ResourceDescriptor::generated(b"one".to_vec(), "text/plain"));
        cache.insert("x", ResourceDescriptor::generated(b"three".to_vec(), "text/plain"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("x").unwrap().content_length(), 5);
    }

    #[test]
    fn test_overwrite_releases_displaced_handle() {
        let cache = ResourceCache::default();
        let (first, first_handle) = file_descriptor();
        let (second, _second_handle) = file_descriptor();

        cache.insert("x", first);
        cache.insert("x", second);
        assert!(first_handle.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_respects_ttl_boundary() {
        let cache = ResourceCache::new(Duration::from_secs(10));
        cache.insert("a", ResourceDescriptor::generated(b"a".to_vec(), "text/plain"));
        let inserted = Instant::now();

        assert_eq!(cache.sweep_at(inserted + Duration::from_secs(10)), 0);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.sweep_at(inserted + Duration::from_secs(11)), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_does_not_refresh_age() {
        let cache = ResourceCache::new(Duration::from_secs(10));
        cache.insert("a", ResourceDescriptor::generated(b"a".to_vec(), "text/plain"));

        for _ in 0..6 {
            tokio::time::advance(Duration::from_secs(2)).await;
            assert!(cache.lookup("a").is_some());
        }
        assert_eq!(cache.sweep(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_releases_handle_once() {
        let cache = ResourceCache::new(Duration::from_secs(10));
        let (desc, handle) = file_descriptor();
        cache.insert("f", desc);

        // an in-flight reader keeps the handle open past eviction
        let reader = cache.lookup("f").unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.sweep(), 1);
        assert!(handle.upgrade().is_some());

        drop(reader);
        assert!(handle.upgrade().is_none());
        assert_eq!(cache.sweep(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_evicts() {
        let cache = Arc::new(ResourceCache::new(Duration::from_secs(10)));
        cache.start();
        assert!(cache.is_running());

        let (desc, handle) = file_descriptor();
        cache.insert("f", desc);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_secs(7)).await;
        tokio::task::yield_now().await;
        assert!(cache.is_empty());
        assert!(handle.upgrade().is_none());

        cache.stop().await;
        assert!(!cache.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_and_restart() {
        let cache = Arc::new(ResourceCache::new(Duration::from_secs(10)));
        cache.start();
        cache.start();
        cache.stop().await;

        cache.insert("a", ResourceDescriptor::generated(b"a".to_vec(), "text/plain"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.len(), 1);

        cache.start();
        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert!(cache.is_empty());
        cache.stop().await;
    }

    #[test]
    fn test_cache_clear() {
        let cache = ResourceCache::default();
        cache.insert("a", ResourceDescriptor::generated(b"a".to_vec(), "text/plain"));
        cache.insert("b", ResourceDescriptor::generated(b"b".to_vec(), "text/plain"));
        cache.lookup("a");

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
