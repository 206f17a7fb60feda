//! Memoized time-limited read URLs, one per object key.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::object_store::UrlSigner;
use crate::ttl_cache::{KeyedStore, Stamped, TtlCache};
use tile_common::{TileError, TileResult};

/// A signed URL and when it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAccessEntry {
    pub object_key: String,
    pub url: String,
    pub issued_at: DateTime<Utc>,
}

/// Reissues URLs once they are older than `validity - safety_margin`.
///
/// Concurrent misses for the same key may both sign; the last write wins.
pub struct SignedAccessCache {
    signer: Arc<dyn UrlSigner>,
    entries: TtlCache<SignedAccessEntry>,
    validity: Duration,
    safety_margin: Duration,
}

impl SignedAccessCache {
    pub fn new(
        signer: Arc<dyn UrlSigner>,
        store: Arc<dyn KeyedStore<Stamped<SignedAccessEntry>>>,
        clock: Arc<dyn Clock>,
        validity: Duration,
        safety_margin: Duration,
    ) -> TileResult<Self> {
        if safety_margin >= validity || safety_margin < Duration::zero() {
            return Err(TileError::invalid(
                "safety_margin",
                format!(
                    "must be between 0 and the {}s validity window",
                    validity.num_seconds()
                ),
            ));
        }
        Ok(Self {
            signer,
            entries: TtlCache::new(store, clock, validity - safety_margin),
            validity,
            safety_margin,
        })
    }

    /// Age after which a cached URL is reissued.
    pub fn renewal_window(&self) -> Duration {
        self.validity - self.safety_margin
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// A URL for `object_key` that stays valid for at least the safety margin.
    pub async fn get_access_url(&self, object_key: &str) -> TileResult<String> {
        Ok(self.get_entry(object_key).await?.url)
    }

    /// Like [`get_access_url`](Self::get_access_url), with the issue time.
    pub async fn get_entry(&self, object_key: &str) -> TileResult<SignedAccessEntry> {
        if let Some(entry) = self.entries.get_fresh(object_key).await {
            debug!(object_key = %object_key, issued_at = %entry.issued_at, "Signed URL cache hit");
            return Ok(entry);
        }

        let expires_in = self
            .validity
            .to_std()
            .map_err(|e| TileError::InternalError(format!("invalid validity window: {}", e)))?;
        let issued_at = self.entries.now();
        let url = self.signer.signed_url(object_key, expires_in).await?;

        let entry = SignedAccessEntry {
            object_key: object_key.to_string(),
            url,
            issued_at,
        };
        // Age counts from before signing
        self.entries
            .insert_at(object_key, entry.clone(), issued_at)
            .await;
        debug!(object_key = %object_key, "Issued signed URL");
        Ok(entry)
    }
}
