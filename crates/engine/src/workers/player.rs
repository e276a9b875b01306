//! Player command worker.

use async_trait::async_trait;
use hexworld_domain::SessionId;
use hexworld_shared::topics::{commands, events};
use hexworld_shared::{JoinPlayerCommand, PlayerJoinedEvent};
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::{AckDecision, HandlerError};
use crate::use_cases::{ActionOutcome, JoinPlayer, Joined};

use super::dispatch::{decode_payload, CommandFamily, CommandHandler, DecodeError, MessageScope};
use super::events::player_data;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Join(JoinPlayerCommand),
}

impl CommandFamily for PlayerCommand {
    const FAMILY: &'static str = "player";

    fn decode(topic: &str, payload: &serde_json::Value) -> Result<Self, DecodeError> {
        match topic {
            commands::PLAYER_JOIN => Ok(Self::Join(decode_payload(topic, payload)?)),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct PlayerCommandHandler;

#[async_trait]
impl CommandHandler for PlayerCommandHandler {
    type Command = PlayerCommand;

    async fn handle(
        &self,
        command: PlayerCommand,
        origin: SessionId,
        scope: MessageScope,
        _cancel: CancellationToken,
    ) -> Result<AckDecision, HandlerError> {
        let PlayerCommand::Join(join) = command;
        let action = JoinPlayer {
            session: origin.clone(),
            name: join.name,
            random: scope.random.clone(),
            now: scope.clock.now(),
        };

        match scope.actions.run(&action).await? {
            ActionOutcome::Applied(Joined { player, created }) => {
                let event = PlayerJoinedEvent {
                    player: player_data(&player),
                    created,
                };
                scope.events.publish(events::PLAYER_JOINED, &origin, &event).await?;
            }
            ActionOutcome::Rejected(violation) => {
                scope
                    .events
                    .reject(events::PLAYER_REJECTED, commands::PLAYER_JOIN, &origin, &violation)
                    .await?;
            }
        }
        Ok(AckDecision::Ack)
    }
}
