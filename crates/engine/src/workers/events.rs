//! Publishing game events and converting domain rows to wire DTOs.

use std::sync::Arc;

use hexworld_domain::{Player, RuleViolation, SessionId, Tile, TileContent};
use hexworld_shared::topics::EVENTS_EXCHANGE;
use hexworld_shared::{ActionRejectedEvent, GameEnvelope, PlayerData, TileContentData, TileData};
use serde::Serialize;

use crate::infrastructure::ports::{HandlerError, MessageProducer};

#[derive(Clone)]
pub struct EventPublisher {
    producer: Arc<dyn MessageProducer>,
}

impl EventPublisher {
    pub fn new(producer: Arc<dyn MessageProducer>) -> Self {
        Self { producer }
    }

    /// Publish `payload` on the events exchange under `topic`.
    ///
    /// A broker failure is transient so the command is redelivered.
    pub async fn publish<T: Serialize + Sync>(
        &self,
        topic: &str,
        origin: &SessionId,
        payload: &T,
    ) -> Result<(), HandlerError> {
        let body = GameEnvelope::wrap(topic, origin.as_str(), payload)
            .and_then(|envelope| envelope.to_bytes())
            .map_err(HandlerError::permanent)?;
        self.producer
            .publish(EVENTS_EXCHANGE, topic, body)
            .await
            .map_err(HandlerError::transient)
    }

    /// Tell the origin session why its command was refused.
    pub async fn reject(
        &self,
        topic: &str,
        command_topic: &str,
        origin: &SessionId,
        violation: &RuleViolation,
    ) -> Result<(), HandlerError> {
        tracing::info!(
            command_topic,
            origin = %origin,
            reason = %violation,
            "Command rejected"
        );
        let event = ActionRejectedEvent {
            command_topic: command_topic.to_string(),
            reason: violation.to_string(),
        };
        self.publish(topic, origin, &event).await
    }
}

pub fn tile_data(tile: &Tile) -> TileData {
    TileData {
        id: tile.id.to_uuid(),
        q: tile.coord.q,
        r: tile.coord.r,
        owner_id: tile.owner.map(|owner| owner.to_uuid()),
        color: tile.color.map(|color| color.to_string()),
        contents: tile.contents.iter().map(content_data).collect(),
    }
}

fn content_data(content: &TileContent) -> TileContentData {
    TileContentData {
        id: content.id.to_uuid(),
        kind: content.kind.to_string(),
        status: content.status.to_string(),
        progress: content.progress,
        owner_id: content.owner.map(|owner| owner.to_uuid()),
        render_hint: content.render_hint.clone(),
    }
}

pub fn player_data(player: &Player) -> PlayerData {
    PlayerData {
        id: player.id.to_uuid(),
        session_id: player.session_id.to_string(),
        name: player.name.to_string(),
        color: player.color.to_string(),
    }
}
