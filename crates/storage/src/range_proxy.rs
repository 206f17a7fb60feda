//! Serves byte ranges of stored archives.
//!
//! Request flow: parse the `Range` header, validate it against the cached
//! object size, then either answer with size and validator only or read the
//! exact inclusive range.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::metadata_cache::ObjectMetadataCache;
use crate::object_store::ObjectReader;
use crate::range::{parse_range_header, ResolvedRange};
use tile_common::TileResult;

/// Outcome of a proxied archive request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyResponse {
    /// No usable range: size and validator only.
    Metadata { size: u64, e_tag: Option<String> },
    /// The requested bytes.
    Partial {
        body: Bytes,
        range: ResolvedRange,
        size: u64,
        e_tag: Option<String>,
    },
}

pub struct RangeProxy {
    reader: Arc<dyn ObjectReader>,
    metadata: ObjectMetadataCache,
}

impl RangeProxy {
    pub fn new(reader: Arc<dyn ObjectReader>, metadata: ObjectMetadataCache) -> Self {
        Self { reader, metadata }
    }

    pub fn metadata(&self) -> &ObjectMetadataCache {
        &self.metadata
    }

    /// Answer a request for `object_key`. A missing, malformed or
    /// out-of-bounds range degrades to [`ProxyResponse::Metadata`].
    #[instrument(skip(self))]
    pub async fn serve(&self, object_key: &str, range_header: Option<&str>) -> TileResult<ProxyResponse> {
        let meta = self.metadata.get(object_key).await?;

        let range = range_header
            .and_then(parse_range_header)
            .and_then(|r| r.resolve(meta.size_bytes));

        let Some(range) = range else {
            if range_header.is_some() {
                debug!(size = meta.size_bytes, "Unusable range, answering with metadata");
            }
            return Ok(ProxyResponse::Metadata {
                size: meta.size_bytes,
                e_tag: meta.change_token,
            });
        };

        let body = self.reader.read_range(object_key, range).await?;
        Ok(ProxyResponse::Partial {
            body,
            range,
            size: meta.size_bytes,
            e_tag: meta.change_token,
        })
    }
}
