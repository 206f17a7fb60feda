//! In-memory LRU cache for rendered tile PNGs.
//!
//! Eviction is by memory, not entry count: when an insert would push the
//! cache past its limit, roughly 5% of the limit is freed in one batch from
//! the least recently used end. Entries also expire lazily on read.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::clock::Clock;

struct CachedTile {
    data: Bytes,
    inserted_at: DateTime<Utc>,
}

/// Counters readable without taking the cache lock.
#[derive(Debug, Default)]
pub struct TileCacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expired: AtomicU64,
    pub size_bytes: AtomicU64,
    pub entry_count: AtomicU64,
}

impl TileCacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }
}

/// Memory-bounded LRU of encoded tiles keyed by `layer/z/x/y`.
pub struct TileMemoryCache {
    cache: Mutex<LruCache<String, CachedTile>>,
    max_bytes: u64,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    stats: TileCacheStats,
}

impl TileMemoryCache {
    pub fn new(max_size_mb: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            // Bounded by bytes, so the entry count is left unbounded
            cache: Mutex::new(LruCache::unbounded()),
            max_bytes: max_size_mb as u64 * 1024 * 1024,
            ttl,
            clock,
            stats: TileCacheStats::default(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let mut cache = self.cache.lock().await;
        let now = self.clock.now();

        let fresh = cache
            .get(key)
            .map(|tile| (now - tile.inserted_at < self.ttl, tile.data.clone()));

        let expired = match fresh {
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some((true, data)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(data);
            }
            Some((false, _)) => cache.pop(key),
        };

        if let Some(tile) = expired {
            self.stats
                .size_bytes
                .fetch_sub(tile.data.len() as u64, Ordering::Relaxed);
            self.stats.entry_count.fetch_sub(1, Ordering::Relaxed);
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a tile. Tiles larger than the whole cache are not stored.
    pub async fn insert(&self, key: &str, data: Bytes) {
        let tile_size = data.len() as u64;
        if tile_size > self.max_bytes {
            return;
        }

        let mut cache = self.cache.lock().await;

        if let Some(previous) = cache.pop(key) {
            self.stats
                .size_bytes
                .fetch_sub(previous.data.len() as u64, Ordering::Relaxed);
            self.stats.entry_count.fetch_sub(1, Ordering::Relaxed);
        }

        if self.stats.size_bytes.load(Ordering::Relaxed) + tile_size > self.max_bytes {
            self.evict_batch(&mut cache, tile_size);
        }

        cache.put(
            key.to_string(),
            CachedTile {
                data,
                inserted_at: self.clock.now(),
            },
        );
        self.stats.size_bytes.fetch_add(tile_size, Ordering::Relaxed);
        self.stats.entry_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Free at least 5% of the limit, and enough to fit `incoming` bytes.
    fn evict_batch(&self, cache: &mut LruCache<String, CachedTile>, incoming: u64) {
        let current = self.stats.size_bytes.load(Ordering::Relaxed);
        let needed = (current + incoming).saturating_sub(self.max_bytes);
        let target = needed.max(self.max_bytes / 20);

        let mut freed = 0u64;
        let mut evicted = 0u64;
        while freed < target {
            match cache.pop_lru() {
                Some((_, tile)) => {
                    freed += tile.data.len() as u64;
                    evicted += 1;
                }
                None => break,
            }
        }

        self.stats.size_bytes.fetch_sub(freed, Ordering::Relaxed);
        self.stats.entry_count.fetch_sub(evicted, Ordering::Relaxed);
        self.stats.evictions.fetch_add(evicted, Ordering::Relaxed);

        info!(
            entries_evicted = evicted,
            bytes_freed = freed,
            max_bytes = self.max_bytes,
            "Tile cache batch eviction"
        );
    }

    pub fn stats(&self) -> &TileCacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.stats.entry_count.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.stats.size_bytes.load(Ordering::Relaxed)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(max_mb: usize, clock: Arc<ManualClock>) -> TileMemoryCache {
        TileMemoryCache::new(max_mb, Duration::seconds(60), clock)
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let cache = cache(1, Arc::new(ManualClock::default()));
        assert!(cache.get("2024/3/1/2").await.is_none());

        cache.insert("2024/3/1/2", Bytes::from_static(b"png")).await;
        assert_eq!(cache.get("2024/3/1/2").await, Some(Bytes::from_static(b"png")));

        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().hit_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(1, clock.clone());

        cache.insert("k", Bytes::from_static(b"png")).await;
        clock.advance(Duration::seconds(60));

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().expired.load(Ordering::Relaxed), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[tokio::test]
    async fn test_replacing_tracks_size() {
        let cache = cache(1, Arc::new(ManualClock::default()));
        cache.insert("a", Bytes::from_static(b"hello")).await;
        cache.insert("b", Bytes::from_static(b"world!")).await;
        cache.insert("a", Bytes::from_static(b"hello world")).await;

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.size_bytes(), 17);
    }

    #[tokio::test]
    async fn test_memory_bound_evicts_least_recent() {
        let cache = cache(1, Arc::new(ManualClock::default()));
        let tile = Bytes::from(vec![0u8; 100 * 1024]);

        for i in 0..15 {
            cache.insert(&format!("t{}", i), tile.clone()).await;
        }

        assert!(cache.size_bytes() <= cache.max_bytes());
        assert!(cache.stats().evictions.load(Ordering::Relaxed) > 0);
        assert!(cache.get("t0").await.is_none());
        assert!(cache.get("t14").await.is_some());
    }

    #[tokio::test]
    async fn test_oversized_tile_not_stored() {
        let cache = cache(1, Arc::new(ManualClock::default()));
        cache.insert("big", Bytes::from(vec![0u8; 2 * 1024 * 1024])).await;
        assert!(cache.is_empty());
    }
}
