//! The envelope every command and event travels in

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope is missing a topic")]
    MissingTopic,
}

/// `{ topic, originSessionId, payload }`
///
/// `payload` stays opaque JSON until a worker resolves the topic to a typed
/// payload. `ownerSessionId` is accepted as an alias of `originSessionId` for
/// producers that still send the older field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEnvelope {
    pub topic: String,
    #[serde(alias = "ownerSessionId", default)]
    pub origin_session_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl GameEnvelope {
    pub fn new(
        topic: impl Into<String>,
        origin_session_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            origin_session_id: origin_session_id.into(),
            payload,
        }
    }

    /// Wrap a typed payload.
    pub fn wrap<T: Serialize>(
        topic: impl Into<String>,
        origin_session_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EnvelopeError> {
        Ok(Self::new(topic, origin_session_id, serde_json::to_value(payload)?))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(body: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(body)?;
        if envelope.topic.trim().is_empty() {
            return Err(EnvelopeError::MissingTopic);
        }
        Ok(envelope)
    }

    /// Deserialize the payload into the type registered for this topic.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ClaimTileCommand;
    use crate::topics;

    #[test]
    fn envelope_uses_camel_case_field_names() {
        let envelope =
            GameEnvelope::wrap(topics::commands::TILE_CLAIM, "s-1", &ClaimTileCommand { q: 1, r: -2 })
                .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(json["originSessionId"], "s-1");
        assert_eq!(json["payload"]["q"], 1);
    }

    #[test]
    fn owner_session_alias_is_accepted() {
        let body = br#"{"topic":"game.commands.tile.claim","ownerSessionId":"s-9","payload":{"q":0,"r":0}}"#;
        let envelope = GameEnvelope::from_bytes(body).unwrap();
        assert_eq!(envelope.origin_session_id, "s-9");
        assert_eq!(envelope.payload_as::<ClaimTileCommand>().unwrap(), ClaimTileCommand { q: 0, r: 0 });
    }

    #[test]
    fn blank_topic_is_rejected() {
        let body = br#"{"topic":" ","originSessionId":"s","payload":null}"#;
        assert!(matches!(GameEnvelope::from_bytes(body), Err(EnvelopeError::MissingTopic)));
    }

    #[test]
    fn non_json_body_is_malformed() {
        assert!(matches!(GameEnvelope::from_bytes(b"\x00\x01"), Err(EnvelopeError::Malformed(_))));
    }
}
