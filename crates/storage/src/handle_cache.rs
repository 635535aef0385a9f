//! Bounded LRU cache of open dataset handles.
//!
//! Opening a dataset (especially a remote aggregation) can take seconds, so
//! handles are kept open and shared between requests. The cache bounds the
//! number of open handles and closes the least recently used one when a new
//! handle would exceed capacity.
//!
//! ## Locking
//!
//! A single mutex guards the LRU map. It is held for lookups, inserts and
//! evict-and-close, but never while a handle is being opened, read or
//! checked for staleness, so callers working on different locations only
//! contend for the map update.
//!
//! ## Leases
//!
//! [`HandleCache::acquire`] returns a [`HandleLease`] which must be dropped
//! (or passed to [`HandleCache::release`]) at the end of the read. Releasing
//! does not close anything; only eviction, a forced refresh or shutdown
//! closes a handle.

use feature_common::{FeatureError, FeatureResult};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// An open, reusable connection to a backing data source.
pub trait CachedHandle: Send + Sync + 'static {
    /// The location this handle was opened for.
    fn location(&self) -> &str;

    /// Close the underlying resource.
    ///
    /// Called by the cache exactly once per successfully closed handle.
    fn close(&self) -> FeatureResult<()>;

    /// Whether the handle no longer reflects its location and must be reopened.
    fn is_stale(&self) -> bool {
        false
    }
}

/// Configuration for the handle cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleCacheConfig {
    /// Maximum number of open handles.
    pub capacity: usize,
}

impl Default for HandleCacheConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

impl HandleCacheConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FEATURE_HANDLE_CACHE_SIZE") {
            if let Ok(size) = val.parse() {
                config.capacity = size;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("handle cache capacity must be > 0".to_string());
        }
        Ok(())
    }
}

/// Snapshot of cache statistics.
#[derive(Debug, Default, Clone)]
pub struct HandleCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub close_failures: u64,
    pub entries: usize,
}

impl HandleCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct Entry<H> {
    handle: Arc<H>,
    /// Outstanding leases on this handle
    active: usize,
}

struct CacheState<H> {
    entries: LruCache<String, Entry<H>>,
    /// Handles no longer resident whose close failed
    orphans: Vec<Arc<H>>,
}

struct Shared<H> {
    state: Mutex<CacheState<H>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    close_failures: AtomicU64,
}

impl<H: CachedHandle> Shared<H> {
    fn release(&self, location: &str, handle: &Arc<H>) {
        let mut state = self.state.lock();
        match state.entries.peek_mut(location) {
            Some(entry) if Arc::ptr_eq(&entry.handle, handle) => {
                if entry.active == 0 {
                    warn!(
                        location = %location,
                        "Handle released more times than it was acquired"
                    );
                } else {
                    entry.active -= 1;
                    debug!(location = %location, active = entry.active, "Released handle");
                }
            }
            _ => {
                debug!(location = %location, "Released handle that is no longer cached");
            }
        }
    }

    fn close_handle(&self, handle: &H) -> bool {
        match handle.close() {
            Ok(()) => true,
            Err(e) => {
                self.close_failures.fetch_add(1, Ordering::Relaxed);
                error!(location = %handle.location(), error = %e, "Cannot close dataset handle");
                false
            }
        }
    }
}

/// Bounded LRU cache of dataset handles, ordered by access.
pub struct HandleCache<H: CachedHandle> {
    shared: Arc<Shared<H>>,
    capacity: usize,
}

impl<H: CachedHandle> HandleCache<H> {
    /// Create a new cache holding at most `capacity` open handles.
    pub fn new(capacity: usize) -> FeatureResult<Self> {
        if capacity == 0 {
            return Err(FeatureError::Config(
                "handle cache capacity must be > 0".to_string(),
            ));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState {
                    entries: LruCache::unbounded(),
                    orphans: Vec::new(),
                }),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
                close_failures: AtomicU64::new(0),
            }),
            capacity,
        })
    }

    /// Create a cache from configuration.
    pub fn from_config(config: &HandleCacheConfig) -> FeatureResult<Self> {
        config.validate().map_err(FeatureError::Config)?;
        Self::new(config.capacity)
    }

    /// Check out the handle for `location`, opening it with `open` on a miss.
    ///
    /// With `force_refresh` (or when the resident handle reports itself
    /// stale) any cached handle is closed and purged before a fresh one is
    /// opened. `open` runs without the cache lock held and may block.
    pub fn acquire<F>(
        &self,
        location: &str,
        force_refresh: bool,
        open: F,
    ) -> FeatureResult<HandleLease<H>>
    where
        F: FnOnce(&str) -> FeatureResult<H>,
    {
        // Staleness may touch the filesystem, so check it outside the lock
        let stale = if force_refresh {
            None
        } else {
            let resident = self
                .shared
                .state
                .lock()
                .entries
                .peek(location)
                .map(|e| e.handle.clone());
            resident.filter(|h| h.is_stale())
        };

        {
            let mut state = self.shared.state.lock();
            // A stale handle may have been replaced while we were checking it
            let refresh = force_refresh
                || match (&stale, state.entries.peek(location)) {
                    (Some(old), Some(entry)) => Arc::ptr_eq(old, &entry.handle),
                    _ => false,
                };

            if refresh {
                if let Some(entry) = state.entries.pop(location) {
                    debug!(location = %location, "Removing handle from cache for refresh");
                    if !self.shared.close_handle(&entry.handle) {
                        state.orphans.push(entry.handle);
                    }
                }
            } else if let Some(entry) = state.entries.get_mut(location) {
                entry.active += 1;
                self.shared.hits.fetch_add(1, Ordering::Relaxed);
                debug!(location = %location, active = entry.active, "Reading handle from cache");
                return Ok(self.lease(location, entry.handle.clone()));
            }
        }

        self.shared.misses.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(open(location)?);

        let mut state = self.shared.state.lock();
        if let Some(entry) = state.entries.get_mut(location) {
            // Another caller opened the same location while we were opening ours
            entry.active += 1;
            let existing = entry.handle.clone();
            drop(state);
            debug!(location = %location, "Discarding duplicate handle");
            if !self.shared.close_handle(&handle) {
                self.shared.state.lock().orphans.push(handle);
            }
            return Ok(self.lease(location, existing));
        }

        self.evict_to_fit(&mut state);
        state.entries.put(
            location.to_string(),
            Entry {
                handle: handle.clone(),
                active: 1,
            },
        );
        debug!(location = %location, entries = state.entries.len(), "Adding handle to cache");

        Ok(self.lease(location, handle))
    }

    /// Return a lease. Equivalent to dropping it.
    pub fn release(&self, lease: HandleLease<H>) {
        drop(lease);
    }

    /// Evict least recently used entries until there is room for one more.
    ///
    /// An entry whose close fails stays resident and is retried on the next
    /// insertion.
    fn evict_to_fit(&self, state: &mut CacheState<H>) {
        let shared = &self.shared;
        state.orphans.retain(|h| !shared.close_handle(h));

        while state.entries.len() >= self.capacity {
            let (location, handle, active) = match state.entries.peek_lru() {
                Some((k, e)) => (k.clone(), e.handle.clone(), e.active),
                None => break,
            };

            if !shared.close_handle(&handle) {
                break;
            }
            state.entries.pop(&location);
            shared.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(location = %location, active = active, "Closed evicted dataset handle");
        }
    }

    fn lease(&self, location: &str, handle: Arc<H>) -> HandleLease<H> {
        HandleLease {
            handle,
            location: location.to_string(),
            shared: self.shared.clone(),
        }
    }

    /// Close every cached handle. Used at shutdown.
    pub fn close_all(&self) {
        let mut state = self.shared.state.lock();
        let shared = &self.shared;
        state.orphans.retain(|h| !shared.close_handle(h));
        while let Some((location, entry)) = state.entries.pop_lru() {
            if entry.active > 0 {
                warn!(location = %location, active = entry.active, "Closing handle with active leases");
            }
            if !shared.close_handle(&entry.handle) {
                state.orphans.push(entry.handle);
            }
        }
    }

    /// Check if a handle for `location` is resident, without touching LRU order.
    pub fn contains(&self, location: &str) -> bool {
        self.shared.state.lock().entries.contains(location)
    }

    /// Number of outstanding leases on the resident handle for `location`.
    pub fn active_leases(&self, location: &str) -> usize {
        self.shared
            .state
            .lock()
            .entries
            .peek(location)
            .map_or(0, |e| e.active)
    }

    /// Resident locations, most recently used first.
    pub fn locations(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> HandleCacheStats {
        HandleCacheStats {
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
            close_failures: self.shared.close_failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Get cache capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get current number of resident handles.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H: CachedHandle> Drop for HandleCache<H> {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// A checked-out handle. Releases itself when dropped.
///
/// Do not keep a lease across calls: the handle may be evicted and closed
/// by another caller at any time after release.
pub struct HandleLease<H: CachedHandle> {
    handle: Arc<H>,
    location: String,
    shared: Arc<Shared<H>>,
}

impl<H: CachedHandle> HandleLease<H> {
    pub fn location(&self) -> &str {
        &self.location
    }
}

impl<H: CachedHandle> Deref for HandleLease<H> {
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H: CachedHandle> Drop for HandleLease<H> {
    fn drop(&mut self) {
        self.shared.release(&self.location, &self.handle);
    }
}
