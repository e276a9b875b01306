use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;
use crate::ids::{BuildingCostId, ResourceId, TileId};

/// A named signed quantity.
///
/// The same shape serves account balances, building cost line items and
/// pickups lying on the map; [`ResourceKind`] says which.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub quantity: i64,
    pub description: Option<String>,
    pub kind: ResourceKind,
    /// Set for map pickups
    pub origin_tile: Option<TileId>,
    /// Set for cost line items
    pub building_cost: Option<BuildingCostId>,
}

impl Resource {
    fn with_kind(name: impl Into<String>, quantity: i64, kind: ResourceKind) -> Self {
        Self {
            id: ResourceId::new(),
            name: name.into(),
            quantity,
            description: None,
            kind,
            origin_tile: None,
            building_cost: None,
        }
    }

    pub fn balance(name: impl Into<String>, quantity: i64) -> Self {
        Self::with_kind(name, quantity, ResourceKind::AccountBalance)
    }

    /// A cost line item holding the *required* amount, subtracted at placement.
    pub fn cost_line(name: impl Into<String>, quantity: i64, cost: BuildingCostId) -> Self {
        Self {
            building_cost: Some(cost),
            ..Self::with_kind(name, quantity, ResourceKind::BuildingCostLineItem)
        }
    }

    pub fn map_pickup(name: impl Into<String>, quantity: i64, tile: TileId) -> Self {
        Self {
            origin_tile: Some(tile),
            ..Self::with_kind(name, quantity, ResourceKind::MapPickup)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Generic,
    AccountBalance,
    BuildingCostLineItem,
    MapPickup,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "Generic",
            Self::AccountBalance => "AccountBalance",
            Self::BuildingCostLineItem => "BuildingCostLineItem",
            Self::MapPickup => "MapPickup",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Generic" => Ok(Self::Generic),
            "AccountBalance" => Ok(Self::AccountBalance),
            "BuildingCostLineItem" => Ok(Self::BuildingCostLineItem),
            "MapPickup" => Ok(Self::MapPickup),
            _ => Err(DomainError::parse(format!("Unknown resource kind: {}", s))),
        }
    }
}
