//! Cached object size and change token.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::object_store::ObjectReader;
use crate::ttl_cache::{KeyedStore, Stamped, TtlCache};
use tile_common::TileResult;

/// Default lifetime of a metadata entry.
pub const DEFAULT_METADATA_TTL_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadataEntry {
    pub object_key: String,
    pub size_bytes: u64,
    pub change_token: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Object metadata, refreshed synchronously once older than the TTL.
pub struct ObjectMetadataCache {
    reader: Arc<dyn ObjectReader>,
    entries: TtlCache<ObjectMetadataEntry>,
}

impl ObjectMetadataCache {
    pub fn new(
        reader: Arc<dyn ObjectReader>,
        store: Arc<dyn KeyedStore<Stamped<ObjectMetadataEntry>>>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            reader,
            entries: TtlCache::new(store, clock, ttl),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.entries.ttl()
    }

    pub async fn get(&self, object_key: &str) -> TileResult<ObjectMetadataEntry> {
        if let Some(entry) = self.entries.get_fresh(object_key).await {
            return Ok(entry);
        }

        let meta = self.reader.head(object_key).await?;
        let entry = ObjectMetadataEntry {
            object_key: object_key.to_string(),
            size_bytes: meta.size,
            change_token: meta.e_tag,
            fetched_at: self.entries.now(),
        };
        self.entries.insert(object_key, entry.clone()).await;
        debug!(object_key = %object_key, size = entry.size_bytes, "Refreshed object metadata");
        Ok(entry)
    }
}
