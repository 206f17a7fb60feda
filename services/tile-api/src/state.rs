//! Application state and shared resources.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

use cog_reader::SelectionStrategy;
use storage::{
    Clock, MemoryStore, ObjectMetadataCache, ObjectReader, ObjectStorage, RangeProxy,
    SignedAccessCache, SystemClock, TileMemoryCache,
};
use tile_common::{LayerCatalog, TileError, TileResult};

use crate::config::{RasterAccess, ServiceConfig};
use crate::diagnostics::{TileDiagnostics, TracingDiagnostics};
use crate::metrics::MetricsCollector;
use crate::raster_pool::{ObjectStoreOpener, RasterPool, SignedUrlOpener, SourceOpener};
use crate::synthesis::TileSynthesizer;

/// Shared application state.
pub struct AppState {
    pub config: ServiceConfig,
    pub catalog: LayerCatalog,
    pub rasters: RasterPool,
    pub archives: RangeProxy,
    pub tile_cache: TileMemoryCache,
    pub synthesizer: TileSynthesizer,
    pub metrics: Arc<MetricsCollector>,
    pub prometheus: Option<PrometheusHandle>,
}

/// The collaborators [`AppState`] is assembled from.
pub struct StateParts {
    pub catalog: LayerCatalog,
    pub reader: Arc<dyn ObjectReader>,
    pub opener: Arc<dyn SourceOpener>,
    pub clock: Arc<dyn Clock>,
    pub diagnostics: Arc<dyn TileDiagnostics>,
}

impl AppState {
    /// Connect to the bucket described by `config`.
    pub fn new(config: ServiceConfig, prometheus: Option<PrometheusHandle>) -> TileResult<Self> {
        let catalog = match &config.layers_file {
            Some(path) => LayerCatalog::load(path)?,
            None => LayerCatalog::builtin(),
        };

        let storage = ObjectStorage::new(&config.storage)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let opener: Arc<dyn SourceOpener> = match config.raster_access {
            RasterAccess::Signed => {
                let signer = storage.url_signer().ok_or_else(|| {
                    TileError::CredentialError("object storage client cannot sign URLs".into())
                })?;
                let access = SignedAccessCache::new(
                    signer,
                    Arc::new(MemoryStore::new()),
                    clock.clone(),
                    config.signed_url_validity,
                    config.signed_url_safety_margin,
                )?;
                Arc::new(SignedUrlOpener::new(Arc::new(access), reqwest::Client::new()))
            }
            RasterAccess::Direct => Arc::new(ObjectStoreOpener::new(storage.store())),
        };

        info!(
            bucket = %config.storage.bucket,
            endpoint = %config.storage.endpoint,
            raster_access = ?config.raster_access,
            rasters = catalog.rasters.len(),
            archives = catalog.archives.len(),
            "Initialized tile service state"
        );

        let parts = StateParts {
            catalog,
            reader: Arc::new(storage),
            opener,
            clock,
            diagnostics: Arc::new(TracingDiagnostics),
        };
        Ok(Self::from_parts(config, parts, prometheus))
    }

    /// Assemble state from explicit collaborators.
    pub fn from_parts(
        config: ServiceConfig,
        parts: StateParts,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        let metadata = ObjectMetadataCache::new(
            parts.reader.clone(),
            Arc::new(MemoryStore::new()),
            parts.clock.clone(),
            config.archive_metadata_ttl,
        );

        Self {
            catalog: parts.catalog,
            rasters: RasterPool::new(parts.opener, parts.clock.clone(), config.renewal_window()),
            archives: RangeProxy::new(parts.reader, metadata),
            tile_cache: TileMemoryCache::new(config.tile_cache_max_mb, config.tile_cache_ttl, parts.clock),
            synthesizer: TileSynthesizer::new(SelectionStrategy::default(), parts.diagnostics),
            metrics: Arc::new(MetricsCollector::new()),
            prometheus,
            config,
        }
    }
}
