//! In-memory world store
//!
//! The committed world lives behind one mutex. A transaction stages whole rows
//! and overlays them on committed reads; commit replaces each staged row in
//! the committed world. Two transactions writing the same row both succeed and
//! the later commit wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hexworld_domain::{
    Account, Building, BuildingId, BuildingType, BuildingTypeId, HexColor, HexCoord, HexWindow,
    Player, PlayerId, Resource, ResourceId, SessionId, Tile, TileId,
};
use tokio::sync::Mutex;

use crate::infrastructure::ports::{RepoError, WorldStore, WorldTx};

/// Committed state of an in-memory world.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    tiles: HashMap<TileId, Tile>,
    coords: HashMap<HexCoord, TileId>,
    players: HashMap<PlayerId, Player>,
    /// Keyed by owning player
    accounts: HashMap<PlayerId, Account>,
    building_types: HashMap<BuildingTypeId, BuildingType>,
    buildings: HashMap<BuildingId, Building>,
    map_resources: HashMap<ResourceId, Resource>,
}

impl World {
    pub fn tile_at(&self, coord: HexCoord) -> Option<&Tile> {
        self.coords.get(&coord).and_then(|id| self.tiles.get(id))
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn player_by_session(&self, session: &SessionId) -> Option<&Player> {
        self.players.values().find(|p| &p.session_id == session)
    }

    pub fn account_for(&self, player: PlayerId) -> Option<&Account> {
        self.accounts.get(&player)
    }

    pub fn buildings(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    fn apply(&mut self, staged: Staged) -> Result<(), RepoError> {
        for player in staged.players.values() {
            if let Some(other) = self
                .players
                .values()
                .find(|p| p.session_id == player.session_id && p.id != player.id)
            {
                return Err(RepoError::constraint(format!(
                    "session {} already belongs to player {}",
                    player.session_id, other.id
                )));
            }
        }
        for tile in staged.tiles.values() {
            if let Some(existing) = self.coords.get(&tile.coord) {
                if *existing != tile.id {
                    return Err(RepoError::constraint(format!(
                        "tile at {} already exists",
                        tile.coord
                    )));
                }
            }
        }

        for (id, tile) in staged.tiles {
            self.coords.insert(tile.coord, id);
            self.tiles.insert(id, tile);
        }
        self.players.extend(staged.players);
        self.accounts.extend(staged.accounts);
        self.building_types.extend(staged.building_types);
        self.buildings.extend(staged.buildings);
        self.map_resources.extend(staged.map_resources);
        Ok(())
    }
}

#[derive(Default)]
struct Staged {
    tiles: HashMap<TileId, Tile>,
    players: HashMap<PlayerId, Player>,
    accounts: HashMap<PlayerId, Account>,
    building_types: HashMap<BuildingTypeId, BuildingType>,
    buildings: HashMap<BuildingId, Building>,
    map_resources: HashMap<ResourceId, Resource>,
}

#[derive(Clone, Default)]
pub struct MemoryWorldStore {
    world: Arc<Mutex<World>>,
}

impl MemoryWorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed world.
    pub async fn snapshot(&self) -> World {
        self.world.lock().await.clone()
    }
}

#[async_trait]
impl WorldStore for MemoryWorldStore {
    async fn begin(&self) -> Result<Box<dyn WorldTx>, RepoError> {
        Ok(Box::new(MemoryTx {
            world: self.world.clone(),
            staged: Staged::default(),
        }))
    }
}

struct MemoryTx {
    world: Arc<Mutex<World>>,
    staged: Staged,
}

impl MemoryTx {
    fn staged_tile_at(&self, coord: HexCoord) -> Option<&Tile> {
        self.staged.tiles.values().find(|t| t.coord == coord)
    }
}

#[async_trait]
impl WorldTx for MemoryTx {
    async fn player_by_session(
        &mut self,
        session: &SessionId,
    ) -> Result<Option<Player>, RepoError> {
        if let Some(p) = self
            .staged
            .players
            .values()
            .find(|p| &p.session_id == session)
        {
            return Ok(Some(p.clone()));
        }
        let world = self.world.lock().await;
        Ok(world
            .player_by_session(session)
            .map(|p| self.staged.players.get(&p.id).unwrap_or(p).clone()))
    }

    async fn color_in_use(&mut self, color: HexColor) -> Result<bool, RepoError> {
        if self.staged.players.values().any(|p| p.color == color) {
            return Ok(true);
        }
        let world = self.world.lock().await;
        Ok(world
            .players
            .values()
            .filter(|p| !self.staged.players.contains_key(&p.id))
            .any(|p| p.color == color))
    }

    async fn insert_player(&mut self, player: &Player, account: &Account) -> Result<(), RepoError> {
        if self.player_by_session(&player.session_id).await?.is_some() {
            return Err(RepoError::constraint(format!(
                "session {} already has a player",
                player.session_id
            )));
        }
        self.staged.players.insert(player.id, player.clone());
        self.staged.accounts.insert(player.id, account.clone());
        Ok(())
    }

    async fn save_player(&mut self, player: &Player) -> Result<(), RepoError> {
        self.staged.players.insert(player.id, player.clone());
        Ok(())
    }

    async fn account_for_player(&mut self, player: PlayerId) -> Result<Option<Account>, RepoError> {
        if let Some(account) = self.staged.accounts.get(&player) {
            return Ok(Some(account.clone()));
        }
        Ok(self.world.lock().await.accounts.get(&player).cloned())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), RepoError> {
        self.staged
            .accounts
            .insert(account.player_id, account.clone());
        Ok(())
    }

    async fn list_holdings(&mut self) -> Result<Vec<(Player, Account)>, RepoError> {
        let world = self.world.lock().await;
        let mut players: HashMap<PlayerId, Player> = world.players.clone();
        players.extend(self.staged.players.clone());

        let mut holdings = Vec::with_capacity(players.len());
        for (id, player) in players {
            let account = self
                .staged
                .accounts
                .get(&id)
                .or_else(|| world.accounts.get(&id));
            if let Some(account) = account {
                holdings.push((player, account.clone()));
            }
        }
        holdings.sort_by_key(|(p, _)| p.id);
        Ok(holdings)
    }

    async fn tile_at(&mut self, coord: HexCoord) -> Result<Option<Tile>, RepoError> {
        if let Some(tile) = self.staged_tile_at(coord) {
            return Ok(Some(tile.clone()));
        }
        Ok(self.world.lock().await.tile_at(coord).cloned())
    }

    async fn tiles_in_radius(
        &mut self,
        center: HexCoord,
        radius: u32,
    ) -> Result<Vec<Tile>, RepoError> {
        let window = HexWindow::around(center, radius);
        let world = self.world.lock().await;

        let mut found: HashMap<TileId, Tile> = world
            .tiles
            .values()
            .filter(|t| window.contains(t.coord))
            .map(|t| (t.id, t.clone()))
            .collect();
        for tile in self.staged.tiles.values() {
            if window.contains(tile.coord) {
                found.insert(tile.id, tile.clone());
            }
        }

        let mut tiles: Vec<Tile> = found
            .into_values()
            .filter(|t| t.coord.is_within(center, radius))
            .collect();
        tiles.sort_by_key(|t| t.coord);
        Ok(tiles)
    }

    async fn save_tile(&mut self, tile: &Tile) -> Result<(), RepoError> {
        if let Some(other) = self.staged_tile_at(tile.coord) {
            if other.id != tile.id {
                return Err(RepoError::constraint(format!(
                    "tile at {} already exists",
                    tile.coord
                )));
            }
        }
        self.staged.tiles.insert(tile.id, tile.clone());
        Ok(())
    }

    async fn tile_count(&mut self) -> Result<u64, RepoError> {
        let world = self.world.lock().await;
        let fresh = self
            .staged
            .tiles
            .values()
            .filter(|t| !world.coords.contains_key(&t.coord))
            .count();
        Ok((world.tiles.len() + fresh) as u64)
    }

    async fn has_map_resource(&mut self, tile: TileId) -> Result<bool, RepoError> {
        let on_tile = |r: &Resource| r.origin_tile == Some(tile);
        if self.staged.map_resources.values().any(on_tile) {
            return Ok(true);
        }
        Ok(self.world.lock().await.map_resources.values().any(on_tile))
    }

    async fn save_map_resource(&mut self, resource: &Resource) -> Result<(), RepoError> {
        self.staged
            .map_resources
            .insert(resource.id, resource.clone());
        Ok(())
    }

    async fn building_type(
        &mut self,
        id: BuildingTypeId,
    ) -> Result<Option<BuildingType>, RepoError> {
        if let Some(bt) = self.staged.building_types.get(&id) {
            return Ok(Some(bt.clone()));
        }
        Ok(self.world.lock().await.building_types.get(&id).cloned())
    }

    async fn save_building_type(&mut self, building_type: &BuildingType) -> Result<(), RepoError> {
        self.staged
            .building_types
            .insert(building_type.id, building_type.clone());
        Ok(())
    }

    async fn insert_building(&mut self, building: &Building) -> Result<(), RepoError> {
        if self.world.lock().await.buildings.contains_key(&building.id) {
            return Err(RepoError::constraint(format!(
                "building {} already exists",
                building.id
            )));
        }
        self.staged.buildings.insert(building.id, building.clone());
        Ok(())
    }

    async fn building_at(&mut self, origin: TileId) -> Result<Option<Building>, RepoError> {
        if let Some(building) = self
            .staged
            .buildings
            .values()
            .find(|b| b.origin_tile == origin)
        {
            return Ok(Some(building.clone()));
        }
        Ok(self
            .world
            .lock()
            .await
            .buildings
            .values()
            .find(|b| b.origin_tile == origin)
            .cloned())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        let MemoryTx { world, staged } = *self;
        let mut committed = world.lock().await;
        committed.apply(staged)
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }
}
