//! Broker transport.
//!
//! A connection hands out channels; a channel declares topology, publishes,
//! and consumes from at most one queue at a time with manual acknowledgment.
//! Two backends implement the same contract:
//!
//! - [`memory::InMemoryBroker`] - process-local, for tests and single-process runs
//! - [`sqlite::SqliteBroker`] - messages survive restarts
//!
//! [`ConnectionProvider`] caches one connection and reopens it when closed;
//! the producer and every consumer share it.

pub mod memory;
pub mod sqlite;
mod topic;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::infrastructure::ports::BrokerError;

pub use topic::topic_matches;

/// Channel-scoped delivery tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerTag(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishProperties {
    /// Survives a broker restart
    pub persistent: bool,
}

impl Default for PublishProperties {
    fn default() -> Self {
        Self { persistent: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Set when the message was handed out before and came back
    pub redelivered: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: usize,
    pub unacked: usize,
    /// Rejected without requeue
    pub dropped: usize,
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    fn is_open(&self) -> bool;

    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;

    /// Close every channel (requeueing their unacked deliveries) and the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a durable topic exchange. Idempotent.
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError>;

    /// Declare a durable queue. Idempotent.
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError>;

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str)
        -> Result<(), BrokerError>;

    /// Maximum unacknowledged deliveries on this channel. 0 means unlimited.
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    /// Route to every queue bound with a matching pattern. A message that
    /// matches nothing is discarded.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: PublishProperties,
    ) -> Result<(), BrokerError>;

    async fn consume(&self, queue: &str) -> Result<ConsumerTag, BrokerError>;

    /// Wait for the next delivery. `Ok(None)` once the consumer is cancelled.
    ///
    /// Cancel-safe: dropping the future never loses a message.
    async fn next_delivery(&self) -> Result<Option<Delivery>, BrokerError>;

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;

    async fn cancel(&self, consumer: &ConsumerTag) -> Result<(), BrokerError>;

    /// Requeue everything still unacknowledged and release the channel.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Opens new broker connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError>;
}

/// Lazily opened, cached broker connection.
pub struct ConnectionProvider {
    connector: Arc<dyn Connector>,
    current: Mutex<Option<Arc<dyn BrokerConnection>>>,
}

impl ConnectionProvider {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            current: Mutex::new(None),
        }
    }

    /// The cached connection, reconnecting if it has closed.
    pub async fn connection(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let mut current = self.current.lock().await;
        if let Some(conn) = current.as_ref() {
            if conn.is_open() {
                return Ok(conn.clone());
            }
            tracing::warn!("Broker connection closed, reconnecting");
        }
        let conn = self.connector.connect().await?;
        tracing::info!("Broker connection opened");
        *current = Some(conn.clone());
        Ok(conn)
    }

    pub async fn channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        self.connection().await?.create_channel().await
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        if let Some(conn) = self.current.lock().await.take() {
            conn.close().await?;
        }
        Ok(())
    }
}
