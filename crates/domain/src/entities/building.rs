use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BuildingCostId, BuildingId, BuildingTypeId, PlayerId, TileId};

use super::Resource;

/// Render path used when a building type does not name a model.
pub const DEFAULT_BUILDING_RENDER_PATH: &str = "Building_Default.glb";

/// Catalog entry describing what can be built. Read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingType {
    pub id: BuildingTypeId,
    pub name: String,
    /// Hex radius of the footprint around the origin tile
    pub tile_radius: u32,
    pub description: Option<String>,
    pub render_path: Option<String>,
    pub cost: BuildingCost,
}

impl BuildingType {
    pub fn new(name: impl Into<String>, tile_radius: u32, cost: BuildingCost) -> Self {
        Self {
            id: BuildingTypeId::new(),
            name: name.into(),
            tile_radius,
            description: None,
            render_path: None,
            cost,
        }
    }

    pub fn render_path_or_default(&self) -> &str {
        self.render_path
            .as_deref()
            .unwrap_or(DEFAULT_BUILDING_RENDER_PATH)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingCost {
    pub id: BuildingCostId,
    pub level: u32,
    pub level_multiplier: u32,
    pub line_items: Vec<Resource>,
}

impl BuildingCost {
    /// Level-1 cost with the default multiplier of 2.
    ///
    /// Items are `(resource name, required amount)`.
    pub fn new(items: &[(&str, i64)]) -> Self {
        let id = BuildingCostId::new();
        Self {
            id,
            level: 1,
            level_multiplier: 2,
            line_items: items
                .iter()
                .map(|(name, qty)| Resource::cost_line(*name, *qty, id))
                .collect(),
        }
    }
}

/// A placed building and the tiles it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: BuildingId,
    pub owner: Option<PlayerId>,
    pub building_type: BuildingTypeId,
    pub origin_tile: TileId,
    /// Whole footprint, origin included
    pub occupied_tiles: Vec<TileId>,
    pub last_updated: DateTime<Utc>,
}
