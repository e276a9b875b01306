//! Claim a tile for the player behind a session.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hexworld_domain::rules::{evaluate_claim, ClaimDecision};
use hexworld_domain::{ClaimPolicy, HexCoord, Player, RuleViolation, SessionId, Tile};

use crate::infrastructure::ports::WorldTx;
use crate::use_cases::game_action::{ActionError, GameAction, Validation};

pub struct ClaimTile {
    pub session: SessionId,
    pub coord: HexCoord,
    pub policy: Arc<dyn ClaimPolicy>,
    pub now: DateTime<Utc>,
}

pub enum ClaimPlan {
    Assign { player: Player, tile: Tile },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimResult {
    /// Ownership changed; the caller publishes the updated tile
    Claimed(Tile),
    /// Already owned by this player; nothing to announce
    Unchanged,
}

#[async_trait]
impl GameAction for ClaimTile {
    type Plan = ClaimPlan;
    type Output = ClaimResult;

    fn name(&self) -> &'static str {
        "claim_tile"
    }

    async fn validate(&self, tx: &mut dyn WorldTx) -> Result<Validation<ClaimPlan>, ActionError> {
        let Some(player) = tx.player_by_session(&self.session).await? else {
            return Ok(Validation::Rejected(RuleViolation::PlayerNotFound));
        };
        let Some(tile) = tx.tile_at(self.coord).await? else {
            return Ok(Validation::Rejected(RuleViolation::TileNotFound {
                coord: self.coord,
            }));
        };

        Ok(match evaluate_claim(&tile, player.id, self.policy.as_ref()) {
            Ok(ClaimDecision::Assign) => Validation::Valid(ClaimPlan::Assign { player, tile }),
            Ok(ClaimDecision::Unchanged) => Validation::Valid(ClaimPlan::Unchanged),
            Err(violation) => Validation::Rejected(violation),
        })
    }

    async fn execute(
        &self,
        tx: &mut dyn WorldTx,
        plan: ClaimPlan,
    ) -> Result<ClaimResult, ActionError> {
        let ClaimPlan::Assign { player, mut tile } = plan else {
            return Ok(ClaimResult::Unchanged);
        };

        tile.assign_owner(player.id, player.color, self.now);
        tx.save_tile(&tile).await?;

        tracing::debug!(
            player_id = %player.id,
            coord = %tile.coord,
            policy = self.policy.name(),
            "Tile claimed"
        );
        Ok(ClaimResult::Claimed(tile))
    }
}
