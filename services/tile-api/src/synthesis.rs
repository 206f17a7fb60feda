//! Tile synthesis: XYZ coordinate to a fixed-size PNG.
//!
//! bounds -> level -> pixel window -> windowed read -> RGBA -> composite.

use bytes::Bytes;
use std::sync::Arc;

use cog_reader::{compute_window, fractional_window, read_window, select_level, RasterSource, SelectionStrategy};
use renderer::{composite, compute_placement, to_rgba, AlphaPolicy};
use tile_common::{TileCoord, TileError, TileResult, TILE_SIZE};

use crate::diagnostics::TileDiagnostics;

/// Result of a successful synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileOutcome {
    /// PNG of `TILE_SIZE` x `TILE_SIZE`
    Rendered(Bytes),
    /// The tile does not intersect the raster
    Empty,
}

pub struct TileSynthesizer {
    strategy: SelectionStrategy,
    diagnostics: Arc<dyn TileDiagnostics>,
}

impl TileSynthesizer {
    pub fn new(strategy: SelectionStrategy, diagnostics: Arc<dyn TileDiagnostics>) -> Self {
        Self {
            strategy,
            diagnostics,
        }
    }

    pub fn diagnostics(&self) -> &dyn TileDiagnostics {
        self.diagnostics.as_ref()
    }

    /// Render `coord` of `source` for the layer named `layer`.
    pub async fn synthesize(
        &self,
        layer: &str,
        source: &RasterSource,
        coord: TileCoord,
        policy: AlphaPolicy,
    ) -> TileResult<TileOutcome> {
        let bounds = coord.bounds();
        self.diagnostics.bounds(layer, coord, &bounds);

        let target = coord.ground_resolution();
        let level = source.level(select_level(source.levels(), target, self.strategy))?;
        self.diagnostics.level_selected(layer, coord, level, target);

        let window = compute_window(level, &bounds);
        self.diagnostics.window(layer, coord, &window);
        if window.is_empty() {
            return Ok(TileOutcome::Empty);
        }

        let placement = compute_placement(&fractional_window(level, &bounds), &window, TILE_SIZE)
            .oriented(level.flips_x(), level.flips_y(), TILE_SIZE);
        self.diagnostics.placement(layer, coord, &placement);

        let block = read_window(
            source,
            level,
            &window,
            placement.width as usize,
            placement.height as usize,
        )
        .await?;

        // Color conversion and PNG encoding are CPU bound
        let png = tokio::task::spawn_blocking(move || {
            let rgba = to_rgba(&block, policy)?;
            composite(rgba, &placement, TILE_SIZE)
        })
        .await
        .map_err(|e| TileError::InternalError(format!("tile encoding task failed: {}", e)))??;

        Ok(TileOutcome::Rendered(Bytes::from(png)))
    }
}
