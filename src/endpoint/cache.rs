use crate::endpoint::Service;
use crate::error::{EnrichError, Result};
use crate::metrics::ENRICH_METRICS;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// How a configured cache size is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Never cache: a handle is created for every call and stopped after it
    Disabled,
    /// Cache every handle, never evict
    Unbounded,
    /// Keep at most this many handles, evicting the least recently used
    Bounded(u64),
}

impl CacheMode {
    /// Negative sizes mean unbounded, zero disables caching, positive sizes bound it
    pub fn from_size(size: i64) -> Self {
        match size {
            s if s < 0 => CacheMode::Unbounded,
            0 => CacheMode::Disabled,
            s => CacheMode::Bounded(s as u64),
        }
    }
}

/// A cached handle together with the number of leases currently out on it
struct Slot<H: ?Sized> {
    handle: Arc<H>,
    leases: AtomicUsize,
    evicted: AtomicBool,
    stopped: AtomicBool,
}

impl<H: ?Sized + Service> Slot<H> {
    fn new(handle: Arc<H>) -> Arc<Self> {
        Arc::new(Self {
            handle,
            leases: AtomicUsize::new(0),
            evicted: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    fn stop_once(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.handle.stop();
        }
    }

    /// Mark the slot as out of the cache; the handle stops once no lease remains
    fn retire(&self) -> bool {
        self.evicted.store(true, Ordering::SeqCst);
        if self.leases.load(Ordering::SeqCst) == 0 {
            self.stop_once();
            true
        } else {
            false
        }
    }
}

/// A handle handed out by [`HandleCache::acquire`].
///
/// Dropping the lease releases it. An uncached handle is stopped then, and
/// so is a cached one that was evicted while the lease was out.
pub struct Lease<H: ?Sized + Service + 'static> {
    handle: Arc<H>,
    slot: Option<Arc<Slot<H>>>,
}

impl<H: ?Sized + Service + 'static> Lease<H> {
    pub fn handle(&self) -> &Arc<H> {
        &self.handle
    }

    /// Whether the handle lives in the cache (and must not be stopped by the caller)
    pub fn is_cached(&self) -> bool {
        self.slot.is_some()
    }
}

impl<H: ?Sized + Service + 'static> Drop for Lease<H> {
    fn drop(&mut self) {
        match &self.slot {
            None => self.handle.stop(),
            Some(slot) => {
                let last = slot.leases.fetch_sub(1, Ordering::SeqCst) == 1;
                if last && slot.evicted.load(Ordering::SeqCst) {
                    debug!("Stopping evicted handle after its last lease");
                    slot.stop_once();
                }
            }
        }
    }
}

/// Cache of producer or consumer handles keyed by endpoint URI.
///
/// Creation on a miss is coalesced: concurrent misses for the same URI wait
/// for a single creation. Handles leaving the cache are stopped, but never
/// while a lease on them is still out.
pub struct HandleCache<H>
where
    H: ?Sized + Service + 'static,
{
    kind: &'static str,
    mode: CacheMode,
    cache: Option<Cache<String, Arc<Slot<H>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<H> HandleCache<H>
where
    H: ?Sized + Service + 'static,
{
    /// Create a cache; `kind` labels logs and metrics ("producer", "consumer")
    pub fn new(kind: &'static str, mode: CacheMode) -> Self {
        let cache = match mode {
            CacheMode::Disabled => None,
            CacheMode::Unbounded => Some(
                Cache::builder()
                    .eviction_listener(Self::retire_on_removal)
                    .build(),
            ),
            CacheMode::Bounded(capacity) => Some(
                Cache::builder()
                    .max_capacity(capacity)
                    .eviction_policy(EvictionPolicy::lru())
                    .eviction_listener(Self::retire_on_removal)
                    .build(),
            ),
        };

        Self {
            kind,
            mode,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache from a configured size (see [`CacheMode::from_size`])
    pub fn from_size(kind: &'static str, size: i64) -> Self {
        Self::new(kind, CacheMode::from_size(size))
    }

    fn retire_on_removal(uri: Arc<String>, slot: Arc<Slot<H>>, cause: RemovalCause) {
        if slot.retire() {
            debug!(uri = %uri, cause = ?cause, "Stopped handle removed from cache");
        } else {
            debug!(
                uri = %uri,
                cause = ?cause,
                "Handle removed from cache, stop deferred to last lease"
            );
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Get the handle for `uri`, creating it with `create` on a miss
    pub async fn acquire<F>(&self, uri: &str, create: F) -> Result<Lease<H>>
    where
        F: Fn() -> Result<Arc<H>>,
    {
        let Some(cache) = &self.cache else {
            self.record(false);
            return Ok(Lease {
                handle: create()?,
                slot: None,
            });
        };

        loop {
            let entry = cache
                .entry_by_ref(uri)
                .or_try_insert_with(async { create().map(Slot::new) })
                .await
                .map_err(|e: Arc<EnrichError>| (*e).clone())?;

            let hit = !entry.is_fresh();
            let slot = entry.into_value();
            slot.leases.fetch_add(1, Ordering::SeqCst);
            let lease = Lease {
                handle: Arc::clone(&slot.handle),
                slot: Some(slot),
            };

            // Evicted between lookup and lease; the next lookup creates a new handle
            if lease.slot.as_ref().is_some_and(|s| s.evicted.load(Ordering::SeqCst)) {
                drop(lease);
                continue;
            }

            self.record(hit);
            if hit {
                debug!(kind = self.kind, uri = %uri, "Handle cache hit");
            } else {
                debug!(kind = self.kind, uri = %uri, "Created handle and stored it in cache");
            }
            return Ok(lease);
        }
    }

    fn record(&self, hit: bool) {
        let result = if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
            "hit"
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            "miss"
        };
        ENRICH_METRICS
            .endpoint_cache_total
            .with_label_values(&[self.kind, result])
            .inc();
    }

    /// Drop every cached handle; each is stopped once its leases are released
    pub async fn clear(&self) {
        if let Some(cache) = &self.cache {
            let uris: Vec<Arc<String>> = cache.iter().map(|(uri, _)| uri).collect();
            for uri in uris {
                cache.invalidate(uri.as_str()).await;
            }
            cache.run_pending_tasks().await;
        }
    }

    /// Apply pending evictions so that `stats().size` is exact
    pub async fn sync(&self) {
        if let Some(cache) = &self.cache {
            cache.run_pending_tasks().await;
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            mode: self.mode,
            size: self.cache.as_ref().map_or(0, |c| c.entry_count()),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub mode: CacheMode,
    pub size: u64,
    pub hits: u64,
    pub misses: u64,
}
