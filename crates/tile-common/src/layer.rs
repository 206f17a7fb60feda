//! Layer allow-list.
//!
//! Every object key the services touch comes from this catalog. Caller
//! supplied identifiers are only ever used to look entries up, never to build
//! storage paths.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::{TileError, TileResult};

/// Unique identifier for a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A COG-backed imagery layer served as PNG tiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterLayer {
    /// Identifier used by the `year` query parameter
    pub id: LayerId,

    /// Alternative names accepted in tile paths (e.g. `satellite_2024`)
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Object key of the COG inside the bucket
    pub object_key: String,

    /// Treat pixels whose color bands are all zero as transparent
    #[serde(default = "default_black_is_nodata")]
    pub black_is_nodata: bool,
}

fn default_black_is_nodata() -> bool {
    true
}

impl RasterLayer {
    fn matches(&self, name: &str) -> bool {
        self.id.as_str() == name || self.aliases.iter().any(|a| a == name)
    }
}

/// A single-file vector tile archive served through byte ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveLayer {
    pub id: LayerId,
    pub object_key: String,
}

/// The fixed set of layers this deployment serves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerCatalog {
    #[serde(default)]
    pub rasters: Vec<RasterLayer>,
    #[serde(default)]
    pub archives: Vec<ArchiveLayer>,
}

impl LayerCatalog {
    /// Default catalog: the two satellite mosaics and no vector archives.
    pub fn builtin() -> Self {
        let raster = |year: &str| RasterLayer {
            id: LayerId::new(year),
            aliases: vec![format!("satellite_{}", year)],
            object_key: format!("raster/satellite_{}_cog.tif", year),
            black_is_nodata: true,
        };

        Self {
            rasters: vec![raster("2017"), raster("2024")],
            archives: Vec::new(),
        }
    }

    /// Parse a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> TileResult<Self> {
        let catalog: LayerCatalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> TileResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_yaml_str(&content)?;
        info!(
            path = %path.display(),
            rasters = catalog.rasters.len(),
            archives = catalog.archives.len(),
            "Loaded layer catalog"
        );
        Ok(catalog)
    }

    /// Look up a raster layer by id or alias.
    pub fn raster(&self, name: &str) -> TileResult<&RasterLayer> {
        self.rasters
            .iter()
            .find(|l| l.matches(name))
            .ok_or_else(|| TileError::UnknownLayer(name.to_string()))
    }

    /// Look up a vector archive by id.
    pub fn archive(&self, name: &str) -> TileResult<&ArchiveLayer> {
        self.archives
            .iter()
            .find(|l| l.id.as_str() == name)
            .ok_or_else(|| TileError::UnknownLayer(name.to_string()))
    }

    /// Ids of all raster layers, in catalog order.
    pub fn raster_ids(&self) -> Vec<String> {
        self.rasters.iter().map(|l| l.id.to_string()).collect()
    }

    fn validate(&self) -> TileResult<()> {
        let mut seen = std::collections::HashSet::new();
        for name in self
            .rasters
            .iter()
            .flat_map(|l| std::iter::once(l.id.as_str()).chain(l.aliases.iter().map(String::as_str)))
        {
            if !seen.insert(name) {
                return Err(TileError::InternalError(format!(
                    "duplicate raster layer name '{}'",
                    name
                )));
            }
        }
        for layer in &self.archives {
            if layer.object_key.is_empty() {
                return Err(TileError::InternalError(format!(
                    "archive layer '{}' has an empty object key",
                    layer.id
                )));
            }
        }
        Ok(())
    }
}
