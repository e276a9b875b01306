//! Tile command worker.

use std::sync::Arc;

use async_trait::async_trait;
use hexworld_domain::{ClaimPolicy, HexCoord, SessionId};
use hexworld_shared::topics::{commands, events};
use hexworld_shared::{ClaimTileCommand, TileClaimedEvent};
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::{AckDecision, HandlerError};
use crate::use_cases::{ActionOutcome, ClaimResult, ClaimTile};

use super::dispatch::{decode_payload, CommandFamily, CommandHandler, DecodeError, MessageScope};
use super::events::tile_data;

#[derive(Debug, Clone, PartialEq)]
pub enum TileCommand {
    Claim(ClaimTileCommand),
}

impl CommandFamily for TileCommand {
    const FAMILY: &'static str = "tile";

    fn decode(topic: &str, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        match topic {
            commands::TILE_CLAIM => Ok(Self::Claim(decode_payload(topic, payload)?)),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }
}

pub struct TileCommandHandler {
    policy: Arc<dyn ClaimPolicy>,
}

impl TileCommandHandler {
    pub fn new(policy: Arc<dyn ClaimPolicy>) -> Self {
        Self { policy }
    }

    async fn claim(
        &self,
        command: ClaimTileCommand,
        origin: SessionId,
        scope: MessageScope,
    ) -> Result<AckDecision, HandlerError> {
        let action = ClaimTile {
            session: origin.clone(),
            coord: HexCoord::new(command.q, command.r),
            policy: self.policy.clone(),
            now: scope.clock.now(),
        };

        match scope.actions.run(&action).await? {
            ActionOutcome::Applied(ClaimResult::Claimed(tile)) => {
                let player_id = tile
                    .owner
                    .ok_or_else(|| HandlerError::permanent("claimed tile has no owner"))?;
                let event = TileClaimedEvent {
                    tile: tile_data(&tile),
                    player_id: player_id.to_uuid(),
                };
                scope.events.publish(events::TILE_CLAIMED, &origin, &event).await?;
            }
            ActionOutcome::Applied(ClaimResult::Unchanged) => {
                tracing::debug!(origin = %origin, coord = %action.coord, "Tile already owned by claimant");
            }
            ActionOutcome::Rejected(violation) => {
                scope
                    .events
                    .reject(events::TILE_REJECTED, commands::TILE_CLAIM, &origin, &violation)
                    .await?;
            }
        }
        Ok(AckDecision::Ack)
    }
}

#[async_trait]
impl CommandHandler for TileCommandHandler {
    type Command = TileCommand;

    async fn handle(
        &self,
        command: TileCommand,
        origin: SessionId,
        scope: MessageScope,
        _cancel: CancellationToken,
    ) -> Result<AckDecision, HandlerError> {
        match command {
            TileCommand::Claim(claim) => self.claim(claim, origin, scope).await,
        }
    }
}
