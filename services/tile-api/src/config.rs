//! Service configuration from environment variables.

use chrono::Duration;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use storage::ObjectStorageConfig;
use tile_common::{TileError, TileResult};

/// How raster sources are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterAccess {
    /// Through time-limited signed URLs
    Signed,
    /// Directly through the object store client
    Direct,
}

impl FromStr for RasterAccess {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "signed" => Ok(RasterAccess::Signed),
            "direct" => Ok(RasterAccess::Direct),
            other => Err(TileError::invalid(
                "RASTER_ACCESS",
                format!("expected 'signed' or 'direct', got '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: ObjectStorageConfig,
    pub signed_url_validity: Duration,
    pub signed_url_safety_margin: Duration,
    pub archive_metadata_ttl: Duration,
    pub tile_cache_max_mb: usize,
    pub tile_cache_ttl: Duration,
    pub raster_access: RasterAccess,
    pub slow_tile_ms: u64,
    pub layers_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: ObjectStorageConfig::default(),
            signed_url_validity: Duration::seconds(3600),
            signed_url_safety_margin: Duration::seconds(600),
            archive_metadata_ttl: Duration::seconds(storage::DEFAULT_METADATA_TTL_SECS),
            tile_cache_max_mb: 64,
            tile_cache_ttl: Duration::seconds(86_400),
            raster_access: RasterAccess::Signed,
            slow_tile_ms: 100,
            layers_file: None,
        }
    }
}

impl ServiceConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> TileResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TileResult<Self> {
        let defaults = Self::default();
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let storage = ObjectStorageConfig {
            endpoint: string("S3_ENDPOINT", &defaults.storage.endpoint),
            bucket: string("S3_BUCKET", &defaults.storage.bucket),
            access_key_id: string("S3_ACCESS_KEY", ""),
            secret_access_key: string("S3_SECRET_KEY", ""),
            region: string("S3_REGION", &defaults.storage.region),
            allow_http: parse_or(&lookup, "S3_ALLOW_HTTP", defaults.storage.allow_http)?,
        };

        let seconds = |key: &str, default: Duration| -> TileResult<Duration> {
            Ok(Duration::seconds(parse_or(&lookup, key, default.num_seconds())?))
        };

        let config = Self {
            storage,
            signed_url_validity: seconds("SIGNED_URL_VALIDITY_SECS", defaults.signed_url_validity)?,
            signed_url_safety_margin: seconds(
                "SIGNED_URL_SAFETY_MARGIN_SECS",
                defaults.signed_url_safety_margin,
            )?,
            archive_metadata_ttl: seconds("ARCHIVE_METADATA_TTL_SECS", defaults.archive_metadata_ttl)?,
            tile_cache_max_mb: parse_or(&lookup, "TILE_CACHE_MAX_MB", defaults.tile_cache_max_mb)?,
            tile_cache_ttl: seconds("TILE_CACHE_TTL_SECS", defaults.tile_cache_ttl)?,
            raster_access: parse_or(&lookup, "RASTER_ACCESS", defaults.raster_access)?,
            slow_tile_ms: parse_or(&lookup, "SLOW_TILE_MS", defaults.slow_tile_ms)?,
            layers_file: lookup("LAYERS_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Age after which signed URLs, and handles opened through them, are renewed.
    pub fn renewal_window(&self) -> Duration {
        self.signed_url_validity - self.signed_url_safety_margin
    }

    fn validate(&self) -> TileResult<()> {
        if self.signed_url_validity <= Duration::zero() {
            return Err(TileError::invalid("SIGNED_URL_VALIDITY_SECS", "must be positive"));
        }
        if self.signed_url_safety_margin < Duration::zero()
            || self.signed_url_safety_margin >= self.signed_url_validity
        {
            return Err(TileError::invalid(
                "SIGNED_URL_SAFETY_MARGIN_SECS",
                "must be smaller than the validity window",
            ));
        }
        if self.archive_metadata_ttl <= Duration::zero() || self.tile_cache_ttl <= Duration::zero() {
            return Err(TileError::invalid("TTL", "cache lifetimes must be positive"));
        }
        Ok(())
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> TileResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| TileError::invalid(key, format!("'{}': {}", value, e))),
        _ => Ok(default),
    }
}
