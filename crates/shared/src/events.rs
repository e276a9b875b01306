//! Event payloads published on the events exchange

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileContentData {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub progress: u8,
    pub owner_id: Option<Uuid>,
    pub render_hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileData {
    pub id: Uuid,
    pub q: i32,
    pub r: i32,
    pub owner_id: Option<Uuid>,
    pub color: Option<String>,
    pub contents: Vec<TileContentData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub id: Uuid,
    pub session_id: String,
    pub name: String,
    pub color: String,
}

/// `game.events.tile.claimed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileClaimedEvent {
    pub tile: TileData,
    pub player_id: Uuid,
}

/// `game.events.building.built`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingBuiltEvent {
    pub building_id: Uuid,
    pub building_type_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub origin: TileData,
    /// Every footprint tile after the placement, origin included
    pub footprint: Vec<TileData>,
}

/// `game.events.player.joined`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedEvent {
    pub player: PlayerData,
    /// False when an existing player reconnected
    pub created: bool,
}

/// `game.events.<domain>.rejected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRejectedEvent {
    pub command_topic: String,
    pub reason: String,
}
