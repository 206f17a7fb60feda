//! Reuse of opened raster sources.
//!
//! Opening a COG costs a header fetch and IFD parsing, so parsed sources are
//! kept per object key. A handle is dropped once its credential is older than
//! the renewal window, so a pooled handle never outlives the URL it reads.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use object_store::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use cog_reader::{HttpRangeReader, ObjectStoreRangeReader, RasterSource};
use storage::{Clock, SignedAccessCache};
use tile_common::TileResult;

/// A freshly opened source and when its credential was issued.
pub struct OpenedSource {
    pub source: RasterSource,
    /// `None` when reads do not depend on an expiring credential
    pub issued_at: Option<DateTime<Utc>>,
}

/// Opens raster sources by object key.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, object_key: &str) -> TileResult<OpenedSource>;
}

/// Reads through signed URLs from the access cache.
pub struct SignedUrlOpener {
    access: Arc<SignedAccessCache>,
    client: reqwest::Client,
}

impl SignedUrlOpener {
    pub fn new(access: Arc<SignedAccessCache>, client: reqwest::Client) -> Self {
        Self { access, client }
    }
}

#[async_trait]
impl SourceOpener for SignedUrlOpener {
    async fn open(&self, object_key: &str) -> TileResult<OpenedSource> {
        let entry = self.access.get_entry(object_key).await?;
        let reader = HttpRangeReader::open(self.client.clone(), entry.url, object_key).await?;
        Ok(OpenedSource {
            source: RasterSource::open(Arc::new(reader)).await?,
            issued_at: Some(entry.issued_at),
        })
    }
}

/// Reads through the object store client.
pub struct ObjectStoreOpener {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreOpener {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourceOpener for ObjectStoreOpener {
    async fn open(&self, object_key: &str) -> TileResult<OpenedSource> {
        let reader = ObjectStoreRangeReader::open(self.store.clone(), object_key).await?;
        Ok(OpenedSource {
            source: RasterSource::open(Arc::new(reader)).await?,
            issued_at: None,
        })
    }
}

struct PooledSource {
    source: Arc<RasterSource>,
    valid_from: DateTime<Utc>,
}

/// Opened sources keyed by object key.
///
/// Concurrent misses for one key may open it twice; the last insert wins.
pub struct RasterPool {
    opener: Arc<dyn SourceOpener>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    handles: RwLock<HashMap<String, PooledSource>>,
}

impl RasterPool {
    pub fn new(opener: Arc<dyn SourceOpener>, clock: Arc<dyn Clock>, max_age: Duration) -> Self {
        Self {
            opener,
            clock,
            max_age,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, object_key: &str) -> TileResult<Arc<RasterSource>> {
        let now = self.clock.now();
        if let Some(pooled) = self.handles.read().await.get(object_key) {
            if now - pooled.valid_from < self.max_age {
                return Ok(pooled.source.clone());
            }
            debug!(object_key = %object_key, "Pooled raster handle expired");
        }

        let opened = self.opener.open(object_key).await?;
        let source = Arc::new(opened.source);
        info!(
            object_key = %object_key,
            levels = source.levels().len(),
            width = source.levels().first().map(|l| l.width).unwrap_or(0),
            "Opened raster source"
        );

        self.handles.write().await.insert(
            object_key.to_string(),
            PooledSource {
                source: source.clone(),
                valid_from: opened.issued_at.unwrap_or(now),
            },
        );
        Ok(source)
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
