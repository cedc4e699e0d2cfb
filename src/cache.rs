//! Keyed TTL cache with single-flight population.
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding. One
//! `TtlCache` instance exists per cache class (customer pages, materialized
//! collections, per-customer order lists), each with its own fixed TTL.
//!
//! Expired entries are NOT evicted on read: they are kept as the "last good
//! value" so a failed refresh can fall back to stale data instead of an
//! error screen. Explicit invalidation removes them, because post-mutation
//! staleness must never be shown.

use crate::error::Result;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// A cached value with its population timestamp.
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub data: T,
    pub stored_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(data: T) -> Self {
        CacheEntry {
            data,
            stored_at: Instant::now(),
        }
    }

    /// An entry is fresh iff `now - stored_at < ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() < ttl
    }
}

/// Thread-safe async TTL cache, generic over the value type.
///
/// # Concurrency
///
/// - Distinct keys populate fully in parallel with no coordination.
/// - Concurrent `get_or_populate` calls for the same key are single-flight:
///   exactly one caller runs the populate closure, the rest wait on it and
///   receive the stored result.
/// - `invalidate`/`invalidate_all` take effect before they return. A
///   population in flight for an invalidated key finishes, but its result is
///   not written back (generation counters compared at write time).
///
/// # Example
///
/// ```no_run
/// use washboard::TtlCache;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache: TtlCache<Vec<u64>> = TtlCache::new("orders", Duration::from_secs(300));
///
///     let ids = cache
///         .get_or_populate("orders:customer:7", || async { Ok(vec![1, 2, 3]) }, false)
///         .await?;
///     assert_eq!(ids, vec![1, 2, 3]);
///
///     cache.invalidate("orders:customer:7");
///     Ok(())
/// }
/// ```
pub struct TtlCache<T: Clone + Send + Sync + 'static> {
    name: &'static str,
    ttl: Duration,
    store: Arc<DashMap<String, CacheEntry<T>>>,
    /// Per-key population locks; acquiring one serializes populates for that
    /// key only.
    flights: Arc<DashMap<String, Arc<Mutex<()>>>>,
    /// Per-key generation, bumped by `invalidate`.
    generations: Arc<DashMap<String, u64>>,
    /// Global epoch, bumped by `invalidate_all`.
    epoch: Arc<AtomicU64>,
}

impl<T: Clone + Send + Sync + 'static> Clone for TtlCache<T> {
    fn clone(&self) -> Self {
        TtlCache {
            name: self.name,
            ttl: self.ttl,
            store: Arc::clone(&self.store),
            flights: Arc::clone(&self.flights),
            generations: Arc::clone(&self.generations),
            epoch: Arc::clone(&self.epoch),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> TtlCache<T> {
    /// Create a cache with a fixed TTL. The name only appears in logs.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        TtlCache {
            name,
            ttl,
            store: Arc::new(DashMap::new()),
            flights: Arc::new(DashMap::new()),
            generations: Arc::new(DashMap::new()),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a fresh entry. Returns `None` if absent or past TTL.
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.store.get(key)?;
        if entry.is_fresh(self.ttl) {
            debug!("✓ {} GET {} -> HIT", self.name, key);
            Some(entry.clone())
        } else {
            debug!("✓ {} GET {} -> EXPIRED", self.name, key);
            None
        }
    }

    /// Get the last good entry regardless of freshness.
    ///
    /// Used for the stale-fallback path when a refresh fails.
    pub fn get_stale(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.get(key).map(|entry| entry.clone())
    }

    /// Read-through fetch with single-flight population.
    ///
    /// Returns the cached value if fresh and `force_refresh` is false.
    /// Otherwise runs `populate`, stores the result, and returns it.
    /// Concurrent callers for the same key wait on the in-flight population
    /// instead of duplicating it.
    ///
    /// # Errors
    ///
    /// Populate failures propagate and are never cached; the previous good
    /// entry (even expired) is kept for [`TtlCache::get_stale`].
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &str,
        populate: F,
        force_refresh: bool,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !force_refresh {
            if let Some(entry) = self.get(key) {
                return Ok(entry.data);
            }
        }

        let flight = self
            .flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = flight.lock().await;

        // Double-check after waiting: a concurrent caller may have landed
        // the value while we queued on the flight lock.
        if !force_refresh {
            if let Some(entry) = self.get(key) {
                debug!("✓ {} {} populated by concurrent flight", self.name, key);
                return Ok(entry.data);
            }
        }

        let generation = self.generation(key);
        let epoch = self.epoch.load(Ordering::SeqCst);

        debug!("» {} POPULATE {}", self.name, key);
        let value = populate().await?;

        // Stale-write guard: an invalidation during the populate means this
        // result must not land in the store.
        if self.generation(key) == generation && self.epoch.load(Ordering::SeqCst) == epoch {
            self.store
                .insert(key.to_string(), CacheEntry::new(value.clone()));
            debug!("✓ {} SET {} (TTL: {:?})", self.name, key, self.ttl);
        } else {
            debug!("✗ {} {} invalidated mid-flight, write discarded", self.name, key);
        }

        Ok(value)
    }

    /// Invalidate one key. Takes effect before returning.
    pub fn invalidate(&self, key: &str) {
        self.generations
            .entry(key.to_string())
            .and_modify(|g| *g += 1)
            .or_insert(1);
        self.store.remove(key);
        debug!("✓ {} DELETE {}", self.name, key);
    }

    /// Invalidate every key. Takes effect before returning.
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.store.clear();
        warn!("⚠ {} CLEAR_ALL executed - all entries invalidated", self.name);
    }

    /// Current number of stored entries (fresh and stale).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::AtomicUsize;

    fn cache(ttl_ms: u64) -> TtlCache<String> {
        TtlCache::new("test", Duration::from_millis(ttl_ms))
    }

    #[tokio::test]
    async fn test_get_returns_only_fresh_entries() {
        let cache = cache(100);
        cache
            .get_or_populate("k", || async { Ok("v".to_string()) }, false)
            .await
            .expect("Failed to populate");

        assert!(cache.get("k").is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        // Past TTL: fresh read misses, stale read still serves.
        assert!(cache.get("k").is_none());
        assert!(cache.get_stale("k").is_some());
    }

    #[tokio::test]
    async fn test_expiry_triggers_repopulation() {
        let cache = cache(50);
        let populates = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = populates.clone();
            cache
                .get_or_populate(
                    "k",
                    move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok("v".to_string())
                    },
                    false,
                )
                .await
                .expect("Failed to populate");
        }
        // Second call within TTL: cache hit, no repopulation.
        assert_eq!(populates.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let counter = populates.clone();
        cache
            .get_or_populate(
                "k",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("v2".to_string())
                },
                false,
            )
            .await
            .expect("Failed to populate");
        assert_eq!(populates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_deduplicates_concurrent_population() {
        let cache: TtlCache<String> = TtlCache::new("test", Duration::from_secs(60));
        let populates = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let counter = populates.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_populate(
                        "k",
                        move || async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok("slow".to_string())
                        },
                        false,
                    )
                    .await
                    .expect("Failed to populate")
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.expect("Task failed"), "slow");
        }
        assert_eq!(populates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_then_fetch_repopulates_within_ttl() {
        let cache: TtlCache<String> = TtlCache::new("test", Duration::from_secs(60));
        let populates = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let counter = populates.clone();
            cache
                .get_or_populate(
                    "k",
                    move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok("v".to_string())
                    },
                    false,
                )
                .await
                .expect("Failed to populate");
        }
        assert_eq!(populates.load(Ordering::SeqCst), 1);

        cache.invalidate("k");
        assert!(cache.get("k").is_none());
        assert!(cache.get_stale("k").is_none());

        let counter = populates.clone();
        cache
            .get_or_populate(
                "k",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("v".to_string())
                },
                false,
            )
            .await
            .expect("Failed to populate");
        assert_eq!(populates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_fresh_entry() {
        let cache: TtlCache<String> = TtlCache::new("test", Duration::from_secs(60));

        cache
            .get_or_populate("k", || async { Ok("old".to_string()) }, false)
            .await
            .expect("Failed to populate");

        let value = cache
            .get_or_populate("k", || async { Ok("new".to_string()) }, true)
            .await
            .expect("Failed to refresh");

        assert_eq!(value, "new");
        assert_eq!(cache.get("k").expect("Entry missing").data, "new");
    }

    #[tokio::test]
    async fn test_stale_write_guard_discards_result_after_invalidate() {
        let cache: TtlCache<String> = TtlCache::new("test", Duration::from_secs(60));

        let slow_cache = cache.clone();
        let flight = tokio::spawn(async move {
            slow_cache
                .get_or_populate(
                    "k",
                    || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok("mid-flight".to_string())
                    },
                    false,
                )
                .await
        });

        // Invalidate while the population is sleeping.
        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.invalidate("k");

        // The caller still receives the populated value...
        let value = flight
            .await
            .expect("Task failed")
            .expect("Populate failed");
        assert_eq!(value, "mid-flight");

        // ...but it was never written back.
        assert!(cache.get_stale("k").is_none());
    }

    #[tokio::test]
    async fn test_invalidate_all_guards_inflight_writes() {
        let cache: TtlCache<String> = TtlCache::new("test", Duration::from_secs(60));

        let slow_cache = cache.clone();
        let flight = tokio::spawn(async move {
            slow_cache
                .get_or_populate(
                    "k",
                    || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok("mid-flight".to_string())
                    },
                    false,
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.invalidate_all();

        flight
            .await
            .expect("Task failed")
            .expect("Populate failed");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_populate_failure_not_cached_and_stale_kept() {
        let cache = cache(50);

        cache
            .get_or_populate("k", || async { Ok("good".to_string()) }, false)
            .await
            .expect("Failed to populate");

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Refresh fails: error propagates, last good value survives as stale.
        let result = cache
            .get_or_populate(
                "k",
                || async { Err(Error::Network("down".to_string())) },
                false,
            )
            .await;
        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(cache.get_stale("k").expect("Stale entry missing").data, "good");

        // Next call retries against the populate, it is not a cached error.
        let value = cache
            .get_or_populate("k", || async { Ok("recovered".to_string()) }, false)
            .await
            .expect("Failed to recover");
        assert_eq!(value, "recovered");
    }

    #[tokio::test]
    async fn test_distinct_keys_populate_in_parallel() {
        let cache: TtlCache<String> = TtlCache::new("test", Duration::from_secs(60));
        let started = Instant::now();

        let mut handles = Vec::new();
        for i in 0..4 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_populate(
                        &format!("k{}", i),
                        || async {
                            tokio::time::sleep(Duration::from_millis(80)).await;
                            Ok("v".to_string())
                        },
                        false,
                    )
                    .await
                    .expect("Failed to populate")
            }));
        }
        for handle in handles {
            handle.await.expect("Task failed");
        }

        // Four 80ms populates in parallel must not take four times as long.
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(cache.len(), 4);
    }
}
