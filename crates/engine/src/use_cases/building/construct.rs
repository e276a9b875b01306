//! Place a building: validate the site and the player's funds, then deduct
//! the cost and stamp the footprint in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hexworld_domain::rules::{
    deduct_cost, stamp_footprint, validate_placement, validate_resources, PlacementSite,
};
use hexworld_domain::{
    Account, Building, BuildingType, BuildingTypeId, HexCoord, Player, RuleViolation, SessionId,
    Tile, TileId,
};

use crate::infrastructure::ports::WorldTx;
use crate::use_cases::game_action::{ActionError, GameAction, Validation};

pub struct ConstructBuilding {
    pub session: SessionId,
    pub building_type: BuildingTypeId,
    pub origin: HexCoord,
    pub now: DateTime<Utc>,
}

pub enum PlacementPlan {
    Place {
        player: Player,
        account: Account,
        building_type: BuildingType,
        origin_tile: TileId,
        /// Every tile within the type's radius of the origin
        footprint: Vec<Tile>,
    },
    /// A redelivered command whose building already stands
    AlreadyPlaced(PlacedBuilding),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedBuilding {
    pub building: Building,
    pub building_type: BuildingType,
    /// Origin first
    pub footprint: Vec<Tile>,
    pub account: Account,
}

impl PlacedBuilding {
    pub fn origin(&self) -> Option<&Tile> {
        self.footprint.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementResult {
    Placed(PlacedBuilding),
    /// The same player already has a building of this type at the origin.
    /// Nothing was written; the stored building is returned for re-announcing.
    AlreadyPlaced(PlacedBuilding),
}

impl PlacementResult {
    pub fn placed(&self) -> &PlacedBuilding {
        match self {
            Self::Placed(placed) | Self::AlreadyPlaced(placed) => placed,
        }
    }
}

fn origin_first(footprint: &mut [Tile], origin: HexCoord) {
    footprint.sort_by_key(|t| (t.coord != origin, t.coord));
}

#[async_trait]
impl GameAction for ConstructBuilding {
    type Plan = PlacementPlan;
    type Output = PlacementResult;

    fn name(&self) -> &'static str {
        "construct_building"
    }

    async fn validate(
        &self,
        tx: &mut dyn WorldTx,
    ) -> Result<Validation<PlacementPlan>, ActionError> {
        let Some(player) = tx.player_by_session(&self.session).await? else {
            return Ok(Validation::Rejected(RuleViolation::PlayerNotFound));
        };
        let Some(account) = tx.account_for_player(player.id).await? else {
            return Ok(Validation::Rejected(RuleViolation::AccountNotFound));
        };
        let Some(building_type) = tx.building_type(self.building_type).await? else {
            return Ok(Validation::Rejected(RuleViolation::UnknownBuildingType {
                id: self.building_type,
            }));
        };
        let Some(origin) = tx.tile_at(self.origin).await? else {
            return Ok(Validation::Rejected(RuleViolation::TileNotFound {
                coord: self.origin,
            }));
        };

        let neighborhood = tx
            .tiles_in_radius(self.origin, building_type.tile_radius)
            .await?;

        if origin.has_active_building() {
            if let Some(existing) = tx.building_at(origin.id).await? {
                if existing.owner == Some(player.id) && existing.building_type == building_type.id
                {
                    let mut footprint: Vec<Tile> = neighborhood
                        .into_iter()
                        .filter(|t| existing.occupied_tiles.contains(&t.id))
                        .collect();
                    origin_first(&mut footprint, self.origin);
                    return Ok(Validation::Valid(PlacementPlan::AlreadyPlaced(
                        PlacedBuilding {
                            building: existing,
                            building_type,
                            footprint,
                            account,
                        },
                    )));
                }
            }
        }

        let map_resource_at_origin = tx.has_map_resource(origin.id).await?;

        let site = PlacementSite {
            origin: &origin,
            neighborhood: &neighborhood,
            map_resource_at_origin,
        };
        if let Err(violation) = validate_placement(&building_type, site) {
            return Ok(Validation::Rejected(violation));
        }
        if let Err(violation) = validate_resources(&account, &building_type.cost) {
            return Ok(Validation::Rejected(violation));
        }

        Ok(Validation::Valid(PlacementPlan::Place {
            player,
            account,
            building_type,
            origin_tile: origin.id,
            footprint: neighborhood,
        }))
    }

    async fn execute(
        &self,
        tx: &mut dyn WorldTx,
        plan: PlacementPlan,
    ) -> Result<PlacementResult, ActionError> {
        let (player, mut account, building_type, origin_tile, mut footprint) = match plan {
            PlacementPlan::Place {
                player,
                account,
                building_type,
                origin_tile,
                footprint,
            } => (player, account, building_type, origin_tile, footprint),
            PlacementPlan::AlreadyPlaced(placed) => {
                return Ok(PlacementResult::AlreadyPlaced(placed));
            }
        };

        // Not locked since validation
        if tx.has_map_resource(origin_tile).await? {
            return Err(ActionError::Integrity(format!(
                "a resource pickup appeared at {} during placement",
                self.origin
            )));
        }

        deduct_cost(&mut account, &building_type.cost);
        let building = stamp_footprint(
            &building_type,
            &player,
            self.origin,
            &mut footprint,
            self.now,
        )
        .map_err(|violation| ActionError::Integrity(violation.to_string()))?;

        tx.save_account(&account).await?;
        for tile in &footprint {
            tx.save_tile(tile).await?;
        }
        tx.insert_building(&building).await?;

        origin_first(&mut footprint, self.origin);
        tracing::debug!(
            player_id = %player.id,
            building_type = %building_type.name,
            origin = %self.origin,
            tiles = footprint.len(),
            "Building placed"
        );

        Ok(PlacementResult::Placed(PlacedBuilding {
            building,
            building_type,
            footprint,
            account,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::MemoryWorldStore;
    use crate::infrastructure::ports::WorldStore;
    use crate::use_cases::game_action::{ActionOutcome, GameActionService};
    use chrono::TimeZone;
    use hexworld_domain::{
        BuildingCost, ContentKind, HexColor, PlayerName, Resource, TileContent,
    };
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 18, 0, 0).unwrap()
    }

    struct Fixture {
        store: MemoryWorldStore,
        service: GameActionService,
        player: Player,
        hut: BuildingType,
    }

    /// Radius-2 world, one player, a radius-1 "Hut" costing the given items.
    async fn fixture(balances: &[(&str, i64)], cost: &[(&str, i64)]) -> Fixture {
        let store = MemoryWorldStore::new();
        let player = Player::new(
            SessionId::new("builder").unwrap(),
            PlayerName::new("Builder").unwrap(),
            HexColor::from_rgb(0x20, 0x40, 0x60),
            now(),
        );
        let account = Account::new(
            player.id,
            balances
                .iter()
                .map(|(name, qty)| Resource::balance(*name, *qty))
                .collect(),
        );
        let hut = BuildingType::new("Hut", 1, BuildingCost::new(cost));

        let mut tx = store.begin().await.unwrap();
        for coord in HexCoord::ORIGIN.coords_in_radius(2) {
            tx.save_tile(&Tile::new(coord, now())).await.unwrap();
        }
        tx.insert_player(&player, &account).await.unwrap();
        tx.save_building_type(&hut).await.unwrap();
        tx.commit().await.unwrap();

        Fixture {
            service: GameActionService::new(Arc::new(store.clone())),
            store,
            player,
            hut,
        }
    }

    fn build(building_type: BuildingTypeId, origin: HexCoord) -> ConstructBuilding {
        ConstructBuilding {
            session: SessionId::new("builder").unwrap(),
            building_type,
            origin,
            now: now(),
        }
    }

    #[tokio::test]
    async fn placement_marks_footprint_and_deducts_cost() {
        let fx = fixture(
            &[("Energy", 1000), ("Metal", 1000)],
            &[("Energy", 300), ("Metal", -300)],
        )
        .await;

        let outcome = fx.service.run(&build(fx.hut.id, HexCoord::ORIGIN)).await.unwrap();
        let ActionOutcome::Applied(PlacementResult::Placed(placed)) = outcome else {
            panic!("expected placement, got {outcome:?}");
        };

        assert_eq!(placed.footprint.len(), 7);
        assert_eq!(placed.origin().unwrap().coord, HexCoord::ORIGIN);
        assert_eq!(placed.account.balance("Energy"), Some(700));
        assert_eq!(placed.account.balance("Metal"), Some(1300));

        let world = fx.store.snapshot().await;
        let origin = world.tile_at(HexCoord::ORIGIN).unwrap();
        assert_eq!(origin.contents[0].kind, ContentKind::Building);
        assert_eq!(origin.color, Some(fx.player.color));
        let busy = world
            .tiles()
            .filter(|t| t.contents.iter().any(|c| c.kind == ContentKind::Busy))
            .count();
        assert_eq!(busy, 6);
        assert_eq!(world.buildings().count(), 1);
        assert_eq!(
            world.account_for(fx.player.id).unwrap().balance("Metal"),
            Some(1300)
        );
    }

    #[tokio::test]
    async fn repeated_placement_returns_the_standing_building() {
        let fx = fixture(&[("Gold", 500)], &[("Gold", 60)]).await;
        let first = fx.service.run(&build(fx.hut.id, HexCoord::ORIGIN)).await.unwrap();
        let ActionOutcome::Applied(PlacementResult::Placed(placed)) = first else {
            panic!("expected placement, got {first:?}");
        };
        let before = fx.store.snapshot().await;

        let again = fx.service.run(&build(fx.hut.id, HexCoord::ORIGIN)).await.unwrap();

        let ActionOutcome::Applied(PlacementResult::AlreadyPlaced(existing)) = again else {
            panic!("expected the standing building, got {again:?}");
        };
        assert_eq!(existing.building, placed.building);
        assert_eq!(existing.footprint, placed.footprint);
        assert_eq!(existing.account.balance("Gold"), Some(440));
        assert_eq!(fx.store.snapshot().await, before);
    }

    #[tokio::test]
    async fn another_type_on_a_standing_building_is_rejected() {
        let fx = fixture(&[("Gold", 500)], &[("Gold", 60)]).await;
        let shed = BuildingType::new("Shed", 0, BuildingCost::new(&[("Gold", 10)]));
        let mut tx = fx.store.begin().await.unwrap();
        tx.save_building_type(&shed).await.unwrap();
        tx.commit().await.unwrap();
        fx.service
            .run(&build(fx.hut.id, HexCoord::ORIGIN))
            .await
            .unwrap();

        let outcome = fx.service.run(&build(shed.id, HexCoord::ORIGIN)).await.unwrap();

        assert_eq!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::TileAlreadyOwned {
                coord: HexCoord::ORIGIN
            })
        );
    }

    #[tokio::test]
    async fn failed_validation_mutates_nothing() {
        let fx = fixture(&[("Gold", 10)], &[("Gold", 60)]).await;
        let before = fx.store.snapshot().await;

        let outcome = fx.service.run(&build(fx.hut.id, HexCoord::ORIGIN)).await.unwrap();

        assert_eq!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::InsufficientResources {
                name: "Gold".into(),
                need: 60,
                have: 10
            })
        );
        assert_eq!(fx.store.snapshot().await, before);
    }

    #[tokio::test]
    async fn overlapping_radius_is_rejected() {
        let fx = fixture(&[("Gold", 500)], &[("Gold", 60)]).await;
        let keep = BuildingType::new("Keep", 2, BuildingCost::new(&[("Gold", 60)]));
        let mut tx = fx.store.begin().await.unwrap();
        tx.save_building_type(&keep).await.unwrap();
        tx.commit().await.unwrap();
        fx.service
            .run(&build(fx.hut.id, HexCoord::ORIGIN))
            .await
            .unwrap();
        let before = fx.store.snapshot().await;

        // Two steps out: the origin is free but the hut sits inside the keep's radius
        let outcome = fx
            .service
            .run(&build(keep.id, HexCoord::new(2, -1)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::RadiusOccupied {
                origin: HexCoord::new(2, -1),
                blocking: HexCoord::ORIGIN
            })
        );
        assert_eq!(fx.store.snapshot().await, before);
    }

    #[tokio::test]
    async fn occupied_origin_and_unknown_type_are_rejected() {
        let fx = fixture(&[("Gold", 500)], &[("Gold", 60)]).await;
        let mut tx = fx.store.begin().await.unwrap();
        let mut tile = tx.tile_at(HexCoord::new(1, 0)).await.unwrap().unwrap();
        tile.push_content(TileContent::new(ContentKind::Resource, None, "tree.glb", now()));
        tx.save_tile(&tile).await.unwrap();
        tx.commit().await.unwrap();

        let outcome = fx.service.run(&build(fx.hut.id, HexCoord::new(1, 0))).await.unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::TileNotEmpty {
                coord: HexCoord::new(1, 0)
            })
        );

        let unknown = BuildingTypeId::new();
        let outcome = fx.service.run(&build(unknown, HexCoord::ORIGIN)).await.unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::UnknownBuildingType { id: unknown })
        );
    }

    #[tokio::test]
    async fn map_pickup_at_origin_is_rejected() {
        let fx = fixture(&[("Gold", 500)], &[("Gold", 60)]).await;
        let mut tx = fx.store.begin().await.unwrap();
        let origin = tx.tile_at(HexCoord::ORIGIN).await.unwrap().unwrap();
        tx.save_map_resource(&Resource::map_pickup("Stone", 10, origin.id))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let outcome = fx.service.run(&build(fx.hut.id, HexCoord::ORIGIN)).await.unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::MapResourcePresent {
                coord: HexCoord::ORIGIN
            })
        );
    }

    #[tokio::test]
    async fn footprint_leaving_the_map_is_rejected() {
        let fx = fixture(&[("Gold", 500)], &[("Gold", 60)]).await;

        // Edge of a radius-2 world: a radius-1 footprint sticks out
        let outcome = fx
            .service
            .run(&build(fx.hut.id, HexCoord::new(2, 0)))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::FootprintOutOfBounds { .. })
        ));
    }
}
