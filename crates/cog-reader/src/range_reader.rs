//! Range-based reader interface for COG files.
//!
//! COGs are designed to be read through byte ranges, so every source the
//! tile pipeline opens is reduced to "read `length` bytes at `offset`". Readers
//! never retry; failures propagate to the caller.

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{path::Path, ObjectStore};
use reqwest::{header, StatusCode};
use std::sync::Arc;
use tracing::{debug, instrument};

use tile_common::{TileError, TileResult};

/// Bytes fetched up front when opening an HTTP source. Large enough to hold
/// the header and IFD chain of a typical COG.
pub const HEADER_PREFETCH: usize = 16 * 1024;

/// Trait for reading byte ranges from any source.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `length` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, length: usize) -> TileResult<Bytes>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// Human-readable identifier for logging. Never contains credentials.
    fn identifier(&self) -> &str;
}

fn check_bounds(identifier: &str, size: u64, offset: u64, length: usize) -> TileResult<()> {
    let end = offset.checked_add(length as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(TileError::InvalidRaster(format!(
            "{}: range {}+{} past end of object ({} bytes)",
            identifier, offset, length, size
        ))),
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Reader over bytes already in memory.
pub struct MemoryRangeReader {
    data: Bytes,
    name: String,
}

impl MemoryRangeReader {
    pub fn new(data: impl Into<Bytes>, name: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_range(&self, offset: u64, length: usize) -> TileResult<Bytes> {
        check_bounds(&self.name, self.size(), offset, length)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + length))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Object store
// ============================================================================

/// Reader issuing bounded `get_range` calls against an object store.
pub struct ObjectStoreRangeReader {
    store: Arc<dyn ObjectStore>,
    location: Path,
    key: String,
    size: u64,
}

impl ObjectStoreRangeReader {
    /// Open an object, fetching its size with a HEAD request.
    pub async fn open(store: Arc<dyn ObjectStore>, key: &str) -> TileResult<Self> {
        let location = Path::from(key);
        let meta = store.head(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => TileError::NotFound(key.to_string()),
            other => TileError::RemoteRead(format!("HEAD {} failed: {}", key, other)),
        })?;

        Ok(Self {
            store,
            location,
            key: key.to_string(),
            size: meta.size as u64,
        })
    }
}

#[async_trait]
impl RangeReader for ObjectStoreRangeReader {
    #[instrument(skip(self), fields(key = %self.key))]
    async fn read_range(&self, offset: u64, length: usize) -> TileResult<Bytes> {
        check_bounds(&self.key, self.size, offset, length)?;
        let start = offset as usize;
        let bytes = self
            .store
            .get_range(&self.location, start..start + length)
            .await
            .map_err(|e| TileError::RemoteRead(format!("{}: {}", self.key, e)))?;
        debug!(bytes = bytes.len(), "Read range");
        Ok(bytes)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.key
    }
}

// ============================================================================
// HTTP (signed URL)
// ============================================================================

/// Reader over a time-limited HTTP URL.
///
/// Signed URLs are bound to a single method, so the object size is learned
/// from the `Content-Range` of an initial ranged GET rather than a HEAD. The
/// first [`HEADER_PREFETCH`] bytes are kept and serve header/IFD reads.
pub struct HttpRangeReader {
    client: reqwest::Client,
    url: String,
    label: String,
    size: u64,
    prefix: Bytes,
}

impl HttpRangeReader {
    /// Open `url`, labelling it `label` in logs and errors.
    pub async fn open(
        client: reqwest::Client,
        url: String,
        label: impl Into<String>,
    ) -> TileResult<Self> {
        let label = label.into();
        let response = client
            .get(&url)
            .header(header::RANGE, format!("bytes=0-{}", HEADER_PREFETCH - 1))
            .send()
            .await
            .map_err(|e| TileError::RemoteRead(format!("{}: {}", label, e)))?;

        let status = response.status();
        let total = match status {
            StatusCode::PARTIAL_CONTENT => {
                let value = response
                    .headers()
                    .get(header::CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(content_range_total);
                Some(value.ok_or_else(|| {
                    TileError::RemoteRead(format!("{}: missing or invalid Content-Range", label))
                })?)
            }
            StatusCode::OK => None,
            other => return Err(status_error(&label, other)),
        };

        let prefix = response
            .bytes()
            .await
            .map_err(|e| TileError::RemoteRead(format!("{}: {}", label, e)))?;
        let size = total.unwrap_or(prefix.len() as u64);
        debug!(source = %label, size, prefetched = prefix.len(), "Opened HTTP range source");

        Ok(Self {
            client,
            url,
            label,
            size,
            prefix,
        })
    }
}

/// Total object size from a `Content-Range: bytes a-b/total` header value.
pub fn content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}

fn status_error(label: &str, status: StatusCode) -> TileError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
            TileError::CredentialError(format!("{}: access URL rejected ({})", label, status))
        }
        StatusCode::NOT_FOUND => TileError::NotFound(label.to_string()),
        other => TileError::RemoteRead(format!("{}: HTTP {}", label, other)),
    }
}

#[async_trait]
impl RangeReader for HttpRangeReader {
    #[instrument(skip(self), fields(source = %self.label))]
    async fn read_range(&self, offset: u64, length: usize) -> TileResult<Bytes> {
        check_bounds(&self.label, self.size, offset, length)?;
        let start = offset as usize;
        if start + length <= self.prefix.len() {
            return Ok(self.prefix.slice(start..start + length));
        }
        if length == 0 {
            return Ok(Bytes::new());
        }

        let end = offset + length as u64 - 1;
        let response = self
            .client
            .get(&self.url)
            .header(header::RANGE, format!("bytes={}-{}", offset, end))
            .send()
            .await
            .map_err(|e| TileError::RemoteRead(format!("{}: {}", self.label, e)))?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(status_error(&self.label, status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TileError::RemoteRead(format!("{}: {}", self.label, e)))?;

        // A server that ignores Range answers 200 with the whole object
        let body = if status == StatusCode::OK && body.len() as u64 == self.size {
            body.slice(start..start + length)
        } else {
            body
        };

        if body.len() != length {
            return Err(TileError::RemoteRead(format!(
                "{}: expected {} bytes, got {}",
                self.label,
                length,
                body.len()
            )));
        }
        Ok(body)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.label
    }
}
