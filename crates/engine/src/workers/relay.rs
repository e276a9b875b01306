//! Relays game events to connected clients.
//!
//! Successful world changes are broadcast; rejections go back to the session
//! that sent the command.

use std::sync::Arc;

use async_trait::async_trait;
use hexworld_domain::SessionId;
use hexworld_shared::topics::events;
use hexworld_shared::GameEnvelope;

use crate::infrastructure::ports::{
    AckDecision, DeliveryHandler, HandlerError, NotifyTarget, RealtimeNotifier,
};

const REJECTED_SUFFIX: &str = ".rejected";

fn notification_name(topic: &str) -> Option<&'static str> {
    match topic {
        events::TILE_CLAIMED => Some("TileClaimed"),
        events::BUILDING_BUILT => Some("BuildingBuilt"),
        events::PLAYER_JOINED => Some("UserJoined"),
        t if t.starts_with("game.events.") && t.ends_with(REJECTED_SUFFIX) => {
            Some("ActionRejected")
        }
        _ => None,
    }
}

pub struct EventRelay {
    notifier: Arc<dyn RealtimeNotifier>,
}

impl EventRelay {
    pub fn new(notifier: Arc<dyn RealtimeNotifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl DeliveryHandler for EventRelay {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Result<AckDecision, HandlerError> {
        let envelope = GameEnvelope::from_bytes(body).map_err(HandlerError::permanent)?;
        let Some(name) = notification_name(&envelope.topic) else {
            return Err(HandlerError::permanent(format!(
                "no notification for event topic {}",
                envelope.topic
            )));
        };

        let target = if envelope.topic.ends_with(REJECTED_SUFFIX) {
            let session = SessionId::new(envelope.origin_session_id.as_str())
                .map_err(HandlerError::permanent)?;
            NotifyTarget::Session(session)
        } else {
            NotifyTarget::Broadcast
        };

        self.notifier
            .notify(target, name, envelope.payload)
            .await
            .map_err(HandlerError::transient)?;
        tracing::debug!(routing_key, event = name, "Event relayed");
        Ok(AckDecision::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockRealtimeNotifier, NotifyError};

    fn body(topic: &str, origin: &str) -> Vec<u8> {
        GameEnvelope::new(topic, origin, serde_json::json!({ "ok": true }))
            .to_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn world_changes_are_broadcast() {
        let mut notifier = MockRealtimeNotifier::new();
        notifier
            .expect_notify()
            .withf(|target, name, payload| {
                *target == NotifyTarget::Broadcast && name == "TileClaimed" && payload["ok"] == true
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        notifier
            .expect_notify()
            .withf(|target, name, _| *target == NotifyTarget::Broadcast && name == "UserJoined")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let relay = EventRelay::new(Arc::new(notifier));

        for topic in [events::TILE_CLAIMED, events::PLAYER_JOINED] {
            let decision = relay.handle(topic, &body(topic, "s-1")).await.unwrap();
            assert_eq!(decision, AckDecision::Ack);
        }
    }

    #[tokio::test]
    async fn rejections_go_to_origin_only() {
        let mut notifier = MockRealtimeNotifier::new();
        notifier
            .expect_notify()
            .withf(|target, name, _| {
                *target == NotifyTarget::Session(SessionId::new("s-42").unwrap())
                    && name == "ActionRejected"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let relay = EventRelay::new(Arc::new(notifier));

        let topic = events::BUILDING_REJECTED;
        assert_eq!(
            relay.handle(topic, &body(topic, "s-42")).await.unwrap(),
            AckDecision::Ack
        );
    }

    #[tokio::test]
    async fn unknown_topic_is_permanent() {
        let relay = EventRelay::new(Arc::new(MockRealtimeNotifier::new()));
        let err = relay
            .handle("game.events.weather.changed", &body("game.events.weather.changed", "s"))
            .await
            .unwrap_err();
        assert_eq!(err.ack_decision(), AckDecision::NackDrop);
    }

    #[tokio::test]
    async fn hub_outage_is_transient() {
        let mut notifier = MockRealtimeNotifier::new();
        notifier
            .expect_notify()
            .returning(|_, _, _| Err(NotifyError::Unavailable("hub down".into())));
        let relay = EventRelay::new(Arc::new(notifier));

        let topic = events::BUILDING_BUILT;
        let err = relay.handle(topic, &body(topic, "s")).await.unwrap_err();
        assert_eq!(err.ack_decision(), AckDecision::NackRequeue);
    }
}
