//! Application metrics collection and reporting.

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::diagnostics::TileEvent;
use storage::TileCacheStats;

/// Metrics collector for the tile API.
#[derive(Debug)]
pub struct MetricsCollector {
    pub tile_requests: AtomicU64,
    pub tiles_rendered: AtomicU64,
    pub tiles_empty: AtomicU64,
    pub tile_failures: AtomicU64,
    pub archive_requests: AtomicU64,
    pub archive_failures: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub tile_requests: u64,
    pub tiles_rendered: u64,
    pub tiles_empty: u64,
    pub tile_failures: u64,
    pub archive_requests: u64,
    pub archive_failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tile_requests: AtomicU64::new(0),
            tiles_rendered: AtomicU64::new(0),
            tiles_empty: AtomicU64::new(0),
            tile_failures: AtomicU64::new(0),
            archive_requests: AtomicU64::new(0),
            archive_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_tile_request(&self, layer: &str) {
        self.tile_requests.fetch_add(1, Ordering::Relaxed);
        counter!("tile_requests_total", "layer" => layer.to_string()).increment(1);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        counter!("tile_cache_hits_total").increment(1);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        counter!("tile_cache_misses_total").increment(1);
    }

    /// Record a finished synthesis and how long it took.
    pub fn record_tile(&self, event: TileEvent, elapsed: Duration) {
        match event {
            TileEvent::Rendered => self.tiles_rendered.fetch_add(1, Ordering::Relaxed),
            TileEvent::Empty => self.tiles_empty.fetch_add(1, Ordering::Relaxed),
            TileEvent::Failed => self.tile_failures.fetch_add(1, Ordering::Relaxed),
        };
        if event == TileEvent::Failed {
            counter!("tile_failures_total").increment(1);
        }
        histogram!("tile_render_seconds", "outcome" => event.as_str()).record(elapsed.as_secs_f64());
    }

    pub fn record_archive_request(&self, status: u16) {
        self.archive_requests.fetch_add(1, Ordering::Relaxed);
        if status >= 500 {
            self.archive_failures.fetch_add(1, Ordering::Relaxed);
        }
        counter!("archive_requests_total", "status" => status.to_string()).increment(1);
    }

    /// Publish the rendered-tile cache gauges.
    pub fn record_tile_cache_stats(&self, stats: &TileCacheStats) {
        gauge!("tile_memory_cache_size_bytes").set(stats.size_bytes.load(Ordering::Relaxed) as f64);
        gauge!("tile_memory_cache_entries").set(stats.entry_count.load(Ordering::Relaxed) as f64);
        gauge!("tile_memory_cache_hit_rate_percent").set(stats.hit_rate());
        gauge!("tile_memory_cache_evictions_total").set(stats.evictions.load(Ordering::Relaxed) as f64);
        gauge!("tile_memory_cache_expired_total").set(stats.expired.load(Ordering::Relaxed) as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            tile_requests: load(&self.tile_requests),
            tiles_rendered: load(&self.tiles_rendered),
            tiles_empty: load(&self.tiles_empty),
            tile_failures: load(&self.tile_failures),
            archive_requests: load(&self.archive_requests),
            archive_failures: load(&self.archive_failures),
            cache_hits: load(&self.cache_hits),
            cache_misses: load(&self.cache_misses),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer guard for measuring operation duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let m = MetricsCollector::new();
        m.record_tile_request("2024");
        m.record_tile(TileEvent::Rendered, Duration::from_millis(5));
        m.record_tile(TileEvent::Failed, Duration::from_millis(5));
        m.record_archive_request(206);
        m.record_archive_request(500);

        let s = m.snapshot();
        assert_eq!(s.tile_requests, 1);
        assert_eq!(s.tiles_rendered, 1);
        assert_eq!(s.tile_failures, 1);
        assert_eq!(s.archive_requests, 2);
        assert_eq!(s.archive_failures, 1);
    }
}
