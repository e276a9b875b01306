//! Development bootstrap: a hexagonal world and a starter building catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hexworld_domain::{BuildingCost, BuildingType, HexCoord, Resource, Tile};

use crate::infrastructure::ports::WorldTx;
use crate::use_cases::game_action::{ActionError, GameAction, Validation};

/// Map pickups placed on a fresh world, skipped when outside the radius.
const PICKUPS: &[((i32, i32), &str, i64)] = &[
    ((3, -1), "Gold", 25),
    ((-2, 3), "Wood", 40),
    ((1, -4), "Stone", 30),
];

pub fn starter_catalog() -> Vec<BuildingType> {
    vec![
        BuildingType::new("Outpost", 0, BuildingCost::new(&[("Gold", 20)])),
        BuildingType::new("Mine", 1, BuildingCost::new(&[("Gold", 60), ("Stone", 20)])),
    ]
}

/// Seeds only when the store holds no tiles.
pub struct SeedWorld {
    pub radius: u32,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SeedReport {
    AlreadySeeded,
    Seeded {
        tiles: usize,
        building_types: Vec<BuildingType>,
    },
}

#[async_trait]
impl GameAction for SeedWorld {
    type Plan = bool;
    type Output = SeedReport;

    fn name(&self) -> &'static str {
        "seed_world"
    }

    async fn validate(&self, tx: &mut dyn WorldTx) -> Result<Validation<bool>, ActionError> {
        Ok(Validation::Valid(tx.tile_count().await? == 0))
    }

    async fn execute(&self, tx: &mut dyn WorldTx, empty: bool) -> Result<SeedReport, ActionError> {
        if !empty {
            return Ok(SeedReport::AlreadySeeded);
        }

        let coords = HexCoord::ORIGIN.coords_in_radius(self.radius);
        let mut tiles = Vec::with_capacity(coords.len());
        for coord in coords {
            let tile = Tile::new(coord, self.now);
            tx.save_tile(&tile).await?;
            tiles.push(tile);
        }

        for ((q, r), name, quantity) in PICKUPS {
            let coord = HexCoord::new(*q, *r);
            if let Some(tile) = tiles.iter().find(|t| t.coord == coord) {
                tx.save_map_resource(&Resource::map_pickup(*name, *quantity, tile.id))
                    .await?;
            }
        }

        let catalog = starter_catalog();
        for building_type in &catalog {
            tx.save_building_type(building_type).await?;
        }

        tracing::info!(
            radius = self.radius,
            tiles = tiles.len(),
            building_types = catalog.len(),
            "Seeded world"
        );
        Ok(SeedReport::Seeded {
            tiles: tiles.len(),
            building_types: catalog,
        })
    }
}
