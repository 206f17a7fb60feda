//! Keyed stores with time-based freshness.
//!
//! Writers overwrite, readers take a clone; the last writer wins. Entries are
//! only ever written after the value was obtained successfully.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clock::Clock;

/// Minimal key-value store the caches are built on.
#[async_trait]
pub trait KeyedStore<V: Clone + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, key: &str) -> Option<V>;
    async fn set(&self, key: &str, value: V);
    async fn remove(&self, key: &str);
    async fn len(&self) -> usize;
}

/// Process-wide in-memory store.
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> KeyedStore<V> for MemoryStore<V> {
    async fn get(&self, key: &str) -> Option<V> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: V) {
        self.entries.write().await.insert(key.to_string(), value);
    }

    async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// A value with the time it was stored.
#[derive(Debug, Clone)]
pub struct Stamped<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
}

/// A keyed store whose entries are fresh for `ttl` after being set.
pub struct TtlCache<V: Clone + Send + Sync + 'static> {
    store: Arc<dyn KeyedStore<Stamped<V>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    pub fn new(store: Arc<dyn KeyedStore<Stamped<V>>>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Cache over a fresh [`MemoryStore`].
    pub fn in_memory(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), clock, ttl)
    }

    /// The value for `key` if it was stored less than `ttl` ago.
    pub async fn get_fresh(&self, key: &str) -> Option<V> {
        let entry = self.store.get(key).await?;
        if self.is_fresh(&entry) {
            Some(entry.value)
        } else {
            None
        }
    }

    pub async fn insert(&self, key: &str, value: V) {
        self.insert_at(key, value, self.clock.now()).await;
    }

    /// Store `value` as if it had been obtained at `stored_at`.
    pub async fn insert_at(&self, key: &str, value: V, stored_at: DateTime<Utc>) {
        self.store.set(key, Stamped { value, stored_at }).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.store.remove(key).await;
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn is_fresh(&self, entry: &Stamped<V>) -> bool {
        self.clock.now() - entry.stored_at < self.ttl
    }
}
