//! World persistence port.
//!
//! All reads and writes go through a [`WorldTx`]. A transaction reads its own
//! writes; nothing it writes is visible to other transactions until
//! [`WorldTx::commit`]. Dropping a transaction without committing discards it.

use async_trait::async_trait;
use hexworld_domain::{
    Account, Building, BuildingType, BuildingTypeId, HexColor, HexCoord, Player, PlayerId,
    Resource, SessionId, Tile, TileId,
};

use super::error::RepoError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorldStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn WorldTx>, RepoError>;
}

#[async_trait]
pub trait WorldTx: Send {
    // -------------------------------------------------------------------------
    // Players and accounts
    // -------------------------------------------------------------------------
    async fn player_by_session(&mut self, session: &SessionId)
        -> Result<Option<Player>, RepoError>;

    async fn color_in_use(&mut self, color: HexColor) -> Result<bool, RepoError>;

    /// Create a player together with its account. Session ids are unique.
    async fn insert_player(&mut self, player: &Player, account: &Account) -> Result<(), RepoError>;

    async fn save_player(&mut self, player: &Player) -> Result<(), RepoError>;

    async fn account_for_player(&mut self, player: PlayerId) -> Result<Option<Account>, RepoError>;

    /// Upsert the account and every balance it holds.
    async fn save_account(&mut self, account: &Account) -> Result<(), RepoError>;

    /// Every player paired with its account.
    async fn list_holdings(&mut self) -> Result<Vec<(Player, Account)>, RepoError>;

    // -------------------------------------------------------------------------
    // Tiles
    // -------------------------------------------------------------------------
    async fn tile_at(&mut self, coord: HexCoord) -> Result<Option<Tile>, RepoError>;

    /// Tiles within `radius` hex steps of `center`, via a bounded window query.
    async fn tiles_in_radius(
        &mut self,
        center: HexCoord,
        radius: u32,
    ) -> Result<Vec<Tile>, RepoError>;

    /// Upsert the tile row and replace its content list. Coordinates are unique.
    async fn save_tile(&mut self, tile: &Tile) -> Result<(), RepoError>;

    async fn tile_count(&mut self) -> Result<u64, RepoError>;

    async fn has_map_resource(&mut self, tile: TileId) -> Result<bool, RepoError>;

    async fn save_map_resource(&mut self, resource: &Resource) -> Result<(), RepoError>;

    // -------------------------------------------------------------------------
    // Buildings
    // -------------------------------------------------------------------------
    async fn building_type(&mut self, id: BuildingTypeId)
        -> Result<Option<BuildingType>, RepoError>;

    async fn save_building_type(&mut self, building_type: &BuildingType)
        -> Result<(), RepoError>;

    async fn insert_building(&mut self, building: &Building) -> Result<(), RepoError>;

    /// The building whose origin is `origin`, if any.
    async fn building_at(&mut self, origin: TileId) -> Result<Option<Building>, RepoError>;

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    async fn commit(self: Box<Self>) -> Result<(), RepoError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepoError>;
}
