//! Range proxy behavior against an in-memory bucket.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use object_store::{memory::InMemory, path::Path, ObjectStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use storage::{
    ManualClock, MemoryStore, ObjectMetadata, ObjectMetadataCache, ObjectReader, ObjectStorage,
    ProxyResponse, RangeProxy, ResolvedRange,
};
use tile_common::{TileError, TileResult};

const KEY: &str = "vector/roads.pmtiles";

/// Counts metadata round-trips made through the wrapped reader.
struct CountingReader {
    inner: ObjectStorage,
    heads: AtomicUsize,
}

#[async_trait]
impl ObjectReader for CountingReader {
    async fn head(&self, key: &str) -> TileResult<ObjectMetadata> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.inner.head(key).await
    }

    async fn read_range(&self, key: &str, range: ResolvedRange) -> TileResult<Bytes> {
        self.inner.read_range(key, range).await
    }
}

async fn proxy_over(size: usize) -> (RangeProxy, Arc<CountingReader>, Arc<ManualClock>) {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    store.put(&Path::from(KEY), Bytes::from(data)).await.unwrap();

    let reader = Arc::new(CountingReader {
        inner: ObjectStorage::from_store(store, "test"),
        heads: AtomicUsize::new(0),
    });
    let clock = Arc::new(ManualClock::default());
    let metadata = ObjectMetadataCache::new(
        reader.clone(),
        Arc::new(MemoryStore::new()),
        clock.clone(),
        Duration::seconds(300),
    );
    (RangeProxy::new(reader.clone(), metadata), reader, clock)
}

#[tokio::test]
async fn test_closed_range_returns_exact_bytes() {
    let (proxy, _, _) = proxy_over(1000).await;

    let response = proxy.serve(KEY, Some("bytes=100-199")).await.unwrap();
    match response {
        ProxyResponse::Partial {
            body,
            range,
            size,
            e_tag,
        } => {
            assert_eq!(body.len(), 100);
            assert_eq!(body[0], 100);
            assert_eq!(range.content_range(size), "bytes 100-199/1000");
            assert!(e_tag.is_some());
        }
        other => panic!("expected partial response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_open_range_returns_whole_object() {
    let (proxy, _, _) = proxy_over(1000).await;

    match proxy.serve(KEY, Some("bytes=0-")).await.unwrap() {
        ProxyResponse::Partial {
            body, range, size, ..
        } => {
            assert_eq!(body.len(), 1000);
            assert_eq!(range.content_range(size), "bytes 0-999/1000");
        }
        other => panic!("expected partial response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_ranges_fall_back_to_metadata() {
    let (proxy, _, _) = proxy_over(1000).await;

    for header in [None, Some("bytes=1000-"), Some("bytes=0-1000"), Some("bytes=9-3"), Some("garbage")] {
        match proxy.serve(KEY, header).await.unwrap() {
            ProxyResponse::Metadata { size, e_tag } => {
                assert_eq!(size, 1000);
                assert!(e_tag.is_some());
            }
            other => panic!("{:?}: expected metadata response, got {:?}", header, other),
        }
    }
}

#[tokio::test]
async fn test_metadata_is_cached_for_ttl() {
    let (proxy, reader, clock) = proxy_over(64).await;

    proxy.serve(KEY, None).await.unwrap();
    proxy.serve(KEY, Some("bytes=0-9")).await.unwrap();
    clock.advance(Duration::seconds(299));
    proxy.serve(KEY, Some("bytes=10-19")).await.unwrap();
    assert_eq!(reader.heads.load(Ordering::SeqCst), 1);

    clock.advance(Duration::seconds(1));
    proxy.serve(KEY, None).await.unwrap();
    assert_eq!(reader.heads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_object_is_an_error_and_not_cached() {
    let (proxy, reader, _) = proxy_over(10).await;

    let result = proxy.serve("vector/missing.pmtiles", Some("bytes=0-1")).await;
    assert!(matches!(result, Err(TileError::NotFound(_))));
    let _ = proxy.serve("vector/missing.pmtiles", None).await;
    assert_eq!(reader.heads.load(Ordering::SeqCst), 2);
}
