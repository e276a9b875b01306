//! Messaging ports: publishing, delivery handling and client notification.

use async_trait::async_trait;
use hexworld_domain::SessionId;

use super::error::{BrokerError, NotifyError};

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// Done; remove from the queue
    Ack,
    /// Put back for redelivery
    NackRequeue,
    /// Discard; redelivery cannot succeed
    NackDrop,
}

/// A failure a handler classified itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// Infrastructure hiccup; the message should be redelivered
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The message can never succeed
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn transient(message: impl ToString) -> Self {
        Self::Transient(message.to_string())
    }

    pub fn permanent(message: impl ToString) -> Self {
        Self::Permanent(message.to_string())
    }

    pub fn ack_decision(&self) -> AckDecision {
        match self {
            Self::Transient(_) => AckDecision::NackRequeue,
            Self::Permanent(_) => AckDecision::NackDrop,
        }
    }
}

/// Publishes raw bytes to a topic exchange. Messages are always persistent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageProducer: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<(), BrokerError>;
}

/// Processes one delivery taken from a queue.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Result<AckDecision, HandlerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    Session(SessionId),
    Broadcast,
}

/// The realtime hub that fans named events out to connected clients.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealtimeNotifier: Send + Sync {
    async fn notify(
        &self,
        target: NotifyTarget,
        event_name: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}
