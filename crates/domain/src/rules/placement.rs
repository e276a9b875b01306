//! Building placement: site checks, affordability, cost deduction and the
//! footprint mutation.

use chrono::{DateTime, Utc};

use crate::entities::{
    Account, Building, BuildingCost, BuildingType, ContentKind, Player, Tile, TileContent,
    BUSY_RENDER_HINT,
};
use crate::hex::HexCoord;
use crate::ids::BuildingId;

use super::RuleViolation;

/// Everything placement validation needs to know about the ground.
#[derive(Debug, Clone, Copy)]
pub struct PlacementSite<'a> {
    pub origin: &'a Tile,
    /// Stored tiles within the building type's radius of `origin`
    pub neighborhood: &'a [Tile],
    pub map_resource_at_origin: bool,
}

/// Site checks, in order: origin unowned, origin empty, no building inside
/// the radius, no map pickup at the origin, footprint fully on the map.
pub fn validate_placement(
    building_type: &BuildingType,
    site: PlacementSite<'_>,
) -> Result<(), RuleViolation> {
    let origin = site.origin.coord;
    let radius = building_type.tile_radius;

    if site.origin.is_owned() {
        return Err(RuleViolation::TileAlreadyOwned { coord: origin });
    }
    if !site.origin.is_empty() {
        return Err(RuleViolation::TileNotEmpty { coord: origin });
    }
    if let Some(blocking) = site
        .neighborhood
        .iter()
        .find(|t| t.coord.is_within(origin, radius) && t.has_active_building())
    {
        return Err(RuleViolation::RadiusOccupied {
            origin,
            blocking: blocking.coord,
        });
    }
    if site.map_resource_at_origin {
        return Err(RuleViolation::MapResourcePresent { coord: origin });
    }
    if let Some(missing) = origin
        .coords_in_radius(radius)
        .into_iter()
        .find(|c| !site.neighborhood.iter().any(|t| t.coord == *c))
    {
        return Err(RuleViolation::FootprintOutOfBounds { origin, missing });
    }
    Ok(())
}

/// Every line item's required amount must be covered by the matching balance.
/// A missing balance counts as zero.
pub fn validate_resources(account: &Account, cost: &BuildingCost) -> Result<(), RuleViolation> {
    for item in &cost.line_items {
        let have = account.balance(&item.name).unwrap_or(0);
        if have < item.quantity {
            return Err(RuleViolation::InsufficientResources {
                name: item.name.clone(),
                need: item.quantity,
                have,
            });
        }
    }
    Ok(())
}

/// Subtract each line item's stored amount from the matching balance,
/// whatever its sign.
pub fn deduct_cost(account: &mut Account, cost: &BuildingCost) {
    for item in &cost.line_items {
        let balance = account.balance_mut(&item.name);
        balance.quantity = balance.quantity.saturating_sub(item.quantity);
    }
}

/// Occupy every tile within the type's radius of `origin` and return the
/// building linking them.
///
/// The origin gets a built "Building" content and the owner's color; every
/// other footprint tile gets a built "Busy" content and the secondary color.
/// Tiles outside the radius are left untouched.
pub fn stamp_footprint(
    building_type: &BuildingType,
    owner: &Player,
    origin: HexCoord,
    tiles: &mut [Tile],
    now: DateTime<Utc>,
) -> Result<Building, RuleViolation> {
    let origin_tile = tiles
        .iter()
        .find(|t| t.coord == origin)
        .map(|t| t.id)
        .ok_or(RuleViolation::TileNotFound { coord: origin })?;

    let mut occupied = Vec::new();
    for tile in tiles
        .iter_mut()
        .filter(|t| t.coord.is_within(origin, building_type.tile_radius))
    {
        if tile.coord == origin {
            tile.push_content(TileContent::built(
                ContentKind::Building,
                Some(owner.id),
                building_type.render_path_or_default(),
                now,
            ));
            tile.assign_owner(owner.id, owner.color, now);
        } else {
            tile.push_content(TileContent::built(
                ContentKind::Busy,
                Some(owner.id),
                BUSY_RENDER_HINT,
                now,
            ));
            tile.assign_owner(owner.id, owner.color.secondary(), now);
        }
        occupied.push(tile.id);
    }

    Ok(Building {
        id: BuildingId::new(),
        owner: Some(owner.id),
        building_type: building_type.id,
        origin_tile,
        occupied_tiles: occupied,
        last_updated: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ContentStatus, Resource};
    use crate::ids::PlayerId;
    use crate::value_objects::{HexColor, PlayerName, SessionId};

    fn world(radius: u32) -> Vec<Tile> {
        HexCoord::ORIGIN
            .coords_in_radius(radius)
            .into_iter()
            .map(|c| Tile::new(c, Utc::now()))
            .collect()
    }

    fn player() -> Player {
        Player::new(
            SessionId::new("s-1").unwrap(),
            PlayerName::new("Ada").unwrap(),
            HexColor::parse("#E91E63").unwrap(),
            Utc::now(),
        )
    }

    fn site<'a>(tiles: &'a [Tile], origin: HexCoord) -> PlacementSite<'a> {
        PlacementSite {
            origin: tiles.iter().find(|t| t.coord == origin).unwrap(),
            neighborhood: tiles,
            map_resource_at_origin: false,
        }
    }

    fn mine() -> BuildingType {
        BuildingType::new("Mine", 1, BuildingCost::new(&[("Gold", 30)]))
    }

    #[test]
    fn empty_neighbourhood_accepts_placement() {
        let tiles = world(2);
        assert_eq!(validate_placement(&mine(), site(&tiles, HexCoord::ORIGIN)), Ok(()));
    }

    #[test]
    fn owned_origin_is_rejected() {
        let mut tiles = world(1);
        tiles[3].assign_owner(PlayerId::new(), HexColor::WHITE, Utc::now());
        let coord = tiles[3].coord;
        assert_eq!(
            validate_placement(&BuildingType::new("Hut", 0, BuildingCost::new(&[])), site(&tiles, coord)),
            Err(RuleViolation::TileAlreadyOwned { coord })
        );
    }

    #[test]
    fn origin_with_content_is_rejected() {
        let mut tiles = world(1);
        let idx = tiles.iter().position(|t| t.coord == HexCoord::ORIGIN).unwrap();
        tiles[idx].push_content(TileContent::new(ContentKind::Resource, None, "ore.glb", Utc::now()));
        assert_eq!(
            validate_placement(&mine(), site(&tiles, HexCoord::ORIGIN)),
            Err(RuleViolation::TileNotEmpty { coord: HexCoord::ORIGIN })
        );
    }

    #[test]
    fn building_inside_radius_blocks_placement() {
        let mut tiles = world(2);
        let neighbour = HexCoord::new(1, 0);
        let idx = tiles.iter().position(|t| t.coord == neighbour).unwrap();
        tiles[idx].push_content(TileContent::built(ContentKind::Building, None, "x.glb", Utc::now()));

        assert_eq!(
            validate_placement(&mine(), site(&tiles, HexCoord::ORIGIN)),
            Err(RuleViolation::RadiusOccupied {
                origin: HexCoord::ORIGIN,
                blocking: neighbour
            })
        );
    }

    #[test]
    fn destroyed_building_inside_radius_does_not_block() {
        let mut tiles = world(2);
        let idx = tiles.iter().position(|t| t.coord == HexCoord::new(0, 1)).unwrap();
        let mut ruin = TileContent::built(ContentKind::Building, None, "x.glb", Utc::now());
        ruin.destroy(Utc::now());
        tiles[idx].push_content(ruin);

        assert_eq!(validate_placement(&mine(), site(&tiles, HexCoord::ORIGIN)), Ok(()));
    }

    #[test]
    fn map_pickup_at_origin_is_rejected() {
        let tiles = world(1);
        let mut site = site(&tiles, HexCoord::ORIGIN);
        site.map_resource_at_origin = true;
        assert_eq!(
            validate_placement(&mine(), site),
            Err(RuleViolation::MapResourcePresent { coord: HexCoord::ORIGIN })
        );
    }

    #[test]
    fn footprint_leaving_the_map_is_rejected() {
        let tiles = world(1);
        let edge = HexCoord::new(1, 0);
        let err = validate_placement(&mine(), site(&tiles, edge)).unwrap_err();
        assert!(matches!(err, RuleViolation::FootprintOutOfBounds { origin, .. } if origin == edge));
    }

    #[test]
    fn insufficient_balance_names_the_resource() {
        let account = Account::new(PlayerId::new(), vec![Resource::balance("Gold", 10)]);
        let cost = BuildingCost::new(&[("Gold", 30)]);
        let err = validate_resources(&account, &cost).unwrap_err();
        assert_eq!(err.to_string(), "Not enough Gold: need 30, have 10");
    }

    #[test]
    fn missing_balance_counts_as_zero() {
        let account = Account::new(PlayerId::new(), vec![]);
        let cost = BuildingCost::new(&[("Stone", 1)]);
        assert_eq!(
            validate_resources(&account, &cost),
            Err(RuleViolation::InsufficientResources {
                name: "Stone".into(),
                need: 1,
                have: 0
            })
        );
    }

    #[test]
    fn deduction_subtracts_stored_amount_regardless_of_sign() {
        let mut account = Account::new(
            PlayerId::new(),
            vec![Resource::balance("Energy", 1000), Resource::balance("Metal", 1000)],
        );
        let cost = BuildingCost::new(&[("Energy", 300), ("Metal", -300)]);

        assert_eq!(validate_resources(&account, &cost), Ok(()));
        deduct_cost(&mut account, &cost);

        assert_eq!(account.balance("Energy"), Some(700));
        assert_eq!(account.balance("Metal"), Some(1300));
    }

    #[test]
    fn radius_one_footprint_marks_seven_tiles() {
        let mut tiles = world(1);
        let owner = player();
        let building = stamp_footprint(&mine(), &owner, HexCoord::ORIGIN, &mut tiles, Utc::now()).unwrap();

        assert_eq!(building.occupied_tiles.len(), 7);
        assert!(tiles.iter().all(|t| t.is_owned_by(owner.id)));

        let kinds: Vec<_> = tiles.iter().map(|t| t.contents[0].kind.clone()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == ContentKind::Building).count(), 1);
        assert_eq!(kinds.iter().filter(|k| **k == ContentKind::Busy).count(), 6);

        let origin = tiles.iter().find(|t| t.coord == HexCoord::ORIGIN).unwrap();
        assert_eq!(origin.id, building.origin_tile);
        assert_eq!(origin.color, Some(owner.color));
        assert_eq!(origin.contents[0].status, ContentStatus::Built);
        assert_eq!(origin.contents[0].progress, 100);
        assert_eq!(origin.contents[0].render_hint, "Building_Default.glb");

        let ring = tiles.iter().find(|t| t.coord == HexCoord::new(0, 1)).unwrap();
        assert_eq!(ring.color, Some(owner.color.secondary()));
        assert_eq!(ring.contents[0].render_hint, BUSY_RENDER_HINT);
    }

    #[test]
    fn footprint_leaves_tiles_outside_radius_alone() {
        let mut tiles = world(2);
        stamp_footprint(&mine(), &player(), HexCoord::ORIGIN, &mut tiles, Utc::now()).unwrap();

        let untouched = tiles.iter().filter(|t| t.contents.is_empty() && !t.is_owned()).count();
        assert_eq!(untouched, 19 - 7);
    }
}
