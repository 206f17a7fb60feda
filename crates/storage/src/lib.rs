//! Storage access and caches for the tile service.
//!
//! Provides:
//! - Object storage (S3-compatible) reads, metadata and signed URLs
//! - Signed-access and object-metadata caches over an injectable keyed store
//! - Byte-range parsing and the archive range proxy
//! - An in-memory LRU for rendered tiles

pub mod access_cache;
pub mod clock;
pub mod metadata_cache;
pub mod object_store;
pub mod range;
pub mod range_proxy;
pub mod tile_memory_cache;
pub mod ttl_cache;

pub use self::object_store::{
    ObjectMetadata, ObjectReader, ObjectStorage, ObjectStorageConfig, UrlSigner,
};
pub use access_cache::{SignedAccessCache, SignedAccessEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use metadata_cache::{ObjectMetadataCache, ObjectMetadataEntry, DEFAULT_METADATA_TTL_SECS};
pub use range::{parse_range_header, ByteRange, ResolvedRange};
pub use range_proxy::{ProxyResponse, RangeProxy};
pub use tile_memory_cache::{TileCacheStats, TileMemoryCache};
pub use ttl_cache::{KeyedStore, MemoryStore, Stamped, TtlCache};
