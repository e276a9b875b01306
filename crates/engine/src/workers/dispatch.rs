//! Command dispatch.
//!
//! A [`CommandFamily`] is a closed enum of the commands one worker accepts,
//! one variant per topic. [`CommandDispatcher`] turns a raw delivery into a
//! typed command, runs the family's [`CommandHandler`] inside a fresh
//! [`MessageScope`] and classifies the result into an [`AckDecision`]:
//!
//! | failure | decision |
//! |---|---|
//! | body is not an envelope, unknown topic, payload mismatch | NackDrop |
//! | `HandlerError::Transient` | NackRequeue |
//! | `HandlerError::Permanent` | NackDrop |
//! | handler panic | NackDrop |
//! | worker shutting down before the handler starts | NackRequeue |

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use hexworld_domain::SessionId;
use hexworld_shared::GameEnvelope;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::infrastructure::messaging::{BrokerConsumer, QueueBinding};
use crate::infrastructure::ports::{
    AckDecision, ClockPort, DeliveryHandler, HandlerError, MessageProducer, RandomPort, WorldStore,
};
use crate::use_cases::{ActionError, GameActionService};

use super::events::EventPublisher;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("No handler registered for topic {0}")]
    UnknownTopic(String),

    #[error("Malformed payload for {topic}: {source}")]
    Malformed {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Deserialize the payload registered for `topic`.
pub fn decode_payload<T: DeserializeOwned>(
    topic: &str,
    payload: &serde_json::Value,
) -> Result<T, DecodeError> {
    T::deserialize(payload).map_err(|source| DecodeError::Malformed {
        topic: topic.to_string(),
        source,
    })
}

impl From<ActionError> for HandlerError {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::Repo(_) | ActionError::Integrity(_) => Self::transient(e),
            ActionError::Domain(_) => Self::permanent(e),
        }
    }
}

pub trait CommandFamily: Sized + Send + 'static {
    /// Short label used in logs
    const FAMILY: &'static str;

    fn decode(topic: &str, payload: &serde_json::Value) -> Result<Self, DecodeError>;
}

/// Per-message resources. Built fresh for every delivery and never shared.
pub struct MessageScope {
    pub id: Uuid,
    pub actions: GameActionService,
    pub events: EventPublisher,
    pub clock: Arc<dyn ClockPort>,
    pub random: Arc<dyn RandomPort>,
}

/// The long-lived handles a [`MessageScope`] is built from.
#[derive(Clone)]
pub struct ScopeFactory {
    store: Arc<dyn WorldStore>,
    producer: Arc<dyn MessageProducer>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
}

impl ScopeFactory {
    pub fn new(
        store: Arc<dyn WorldStore>,
        producer: Arc<dyn MessageProducer>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            store,
            producer,
            clock,
            random,
        }
    }

    pub fn scope(&self) -> MessageScope {
        MessageScope {
            id: Uuid::new_v4(),
            actions: GameActionService::new(self.store.clone()),
            events: EventPublisher::new(self.producer.clone()),
            clock: self.clock.clone(),
            random: self.random.clone(),
        }
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    type Command: CommandFamily;

    async fn handle(
        &self,
        command: Self::Command,
        origin: SessionId,
        scope: MessageScope,
        cancel: CancellationToken,
    ) -> Result<AckDecision, HandlerError>;
}

pub struct CommandDispatcher<H> {
    handler: H,
    scopes: ScopeFactory,
    cancel: CancellationToken,
}

impl<H: CommandHandler> CommandDispatcher<H> {
    pub fn new(handler: H, scopes: ScopeFactory, cancel: CancellationToken) -> Self {
        Self {
            handler,
            scopes,
            cancel,
        }
    }
}

#[async_trait]
impl<H: CommandHandler> DeliveryHandler for CommandDispatcher<H> {
    async fn handle(&self, routing_key: &str, body: &[u8]) -> Result<AckDecision, HandlerError> {
        let family = <H::Command as CommandFamily>::FAMILY;

        let envelope = match GameEnvelope::from_bytes(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(family, routing_key, error = %e, "Dropping undecodable envelope");
                return Ok(AckDecision::NackDrop);
            }
        };
        let topic = envelope.topic.as_str();

        let command = match <H::Command as CommandFamily>::decode(topic, &envelope.payload) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    family,
                    topic,
                    origin = %envelope.origin_session_id,
                    error = %e,
                    "Dropping undispatchable command"
                );
                return Ok(AckDecision::NackDrop);
            }
        };

        let origin = match SessionId::new(envelope.origin_session_id.as_str()) {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!(family, topic, error = %e, "Dropping command without origin session");
                return Ok(AckDecision::NackDrop);
            }
        };

        if self.cancel.is_cancelled() {
            return Ok(AckDecision::NackRequeue);
        }

        let scope = self.scopes.scope();
        let scope_id = scope.id;
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.handler.handle(
            command,
            origin.clone(),
            scope,
            self.cancel.clone(),
        ))
        .catch_unwind()
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let decision = match outcome {
            Ok(Ok(decision)) => {
                tracing::debug!(family, topic, origin = %origin, %scope_id, elapsed_ms, ?decision, "Command handled");
                decision
            }
            Ok(Err(e)) => {
                let decision = e.ack_decision();
                tracing::error!(
                    family,
                    topic,
                    origin = %origin,
                    %scope_id,
                    elapsed_ms,
                    ?decision,
                    error = %e,
                    "Command handler failed"
                );
                decision
            }
            Err(_) => {
                tracing::error!(
                    family,
                    topic,
                    origin = %origin,
                    %scope_id,
                    elapsed_ms,
                    "Command handler panicked, dropping message"
                );
                AckDecision::NackDrop
            }
        };
        Ok(decision)
    }
}

/// Runs one consumer and restarts it after transport failures until cancelled.
pub struct QueueWorker {
    name: &'static str,
    consumer: BrokerConsumer,
    binding: QueueBinding,
    handler: Arc<dyn DeliveryHandler>,
    restart_backoff: Duration,
}

impl QueueWorker {
    pub fn new(
        name: &'static str,
        consumer: BrokerConsumer,
        binding: QueueBinding,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Self {
        Self {
            name,
            consumer,
            binding,
            handler,
            restart_backoff: Duration::from_secs(2),
        }
    }

    pub fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(worker = self.name, queue = %self.binding.queue, "Starting worker");
        loop {
            let result = self
                .consumer
                .consume(&self.binding, self.handler.clone(), cancel.clone())
                .await;
            if cancel.is_cancelled() {
                break;
            }
            match result {
                Ok(()) => tracing::warn!(worker = self.name, "Consumer ended, restarting"),
                Err(e) => tracing::error!(
                    worker = self.name,
                    error = %e,
                    backoff_ms = self.restart_backoff.as_millis() as u64,
                    "Consumer failed, restarting"
                ),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.restart_backoff) => {}
            }
        }
        tracing::info!(worker = self.name, "Worker stopped");
    }
}
