use std::fmt::Debug;

use crate::entities::Tile;
use crate::ids::PlayerId;

use super::RuleViolation;

/// Result of evaluating a claim that passed the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Tile changes hands (or is taken for the first time)
    Assign,
    /// Claimant already owns the tile
    Unchanged,
}

/// Decides whether a claimant may take a tile owned by someone else.
///
/// Same-owner claims never reach the policy; they are always
/// [`ClaimDecision::Unchanged`].
pub trait ClaimPolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn permits(&self, tile: &Tile, claimant: PlayerId) -> Result<(), RuleViolation>;
}

/// Only unowned tiles can be claimed.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnownedOnly;

impl ClaimPolicy for UnownedOnly {
    fn name(&self) -> &'static str {
        "unowned-only"
    }

    fn permits(&self, tile: &Tile, _claimant: PlayerId) -> Result<(), RuleViolation> {
        if tile.is_owned() {
            return Err(RuleViolation::TileAlreadyOwned { coord: tile.coord });
        }
        Ok(())
    }
}

/// Any tile can be taken from its current owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenContest;

impl ClaimPolicy for OpenContest {
    fn name(&self) -> &'static str {
        "open-contest"
    }

    fn permits(&self, _tile: &Tile, _claimant: PlayerId) -> Result<(), RuleViolation> {
        Ok(())
    }
}

pub fn evaluate_claim(
    tile: &Tile,
    claimant: PlayerId,
    policy: &dyn ClaimPolicy,
) -> Result<ClaimDecision, RuleViolation> {
    if tile.is_owned_by(claimant) {
        return Ok(ClaimDecision::Unchanged);
    }
    policy.permits(tile, claimant)?;
    Ok(ClaimDecision::Assign)
}
