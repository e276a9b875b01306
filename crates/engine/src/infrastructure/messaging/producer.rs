use std::sync::Arc;

use async_trait::async_trait;

use crate::infrastructure::broker::{ConnectionProvider, PublishProperties};
use crate::infrastructure::ports::{BrokerError, MessageProducer};

/// Publishes persistent messages over a short-lived channel.
///
/// The exchange is declared on every publish so a producer never depends on a
/// consumer having started first.
pub struct BrokerProducer {
    connections: Arc<ConnectionProvider>,
}

impl BrokerProducer {
    pub fn new(connections: Arc<ConnectionProvider>) -> Self {
        Self { connections }
    }
}

#[async_trait]
impl MessageProducer for BrokerProducer {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let channel = self.connections.channel().await?;

        let result = async {
            channel.declare_exchange(exchange).await?;
            channel
                .publish(
                    exchange,
                    routing_key,
                    &body,
                    PublishProperties { persistent: true },
                )
                .await
        }
        .await;

        if let Err(e) = channel.close().await {
            tracing::debug!(error = %e, "Failed to close publish channel");
        }
        result?;

        tracing::debug!(exchange, routing_key, bytes = body.len(), "Published message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::broker::memory::InMemoryBroker;
    use crate::infrastructure::broker::QueueStats;

    #[tokio::test]
    async fn publish_declares_exchange_and_routes() {
        let broker = InMemoryBroker::new();
        let provider = Arc::new(ConnectionProvider::new(Arc::new(broker.clone())));

        let setup = provider.channel().await.unwrap();
        setup.declare_exchange("game.commands.exchange").await.unwrap();
        setup.declare_queue("tiles").await.unwrap();
        setup
            .bind_queue("tiles", "game.commands.exchange", "game.commands.tile.*")
            .await
            .unwrap();

        let producer = BrokerProducer::new(provider);
        producer
            .publish(
                "game.commands.exchange",
                "game.commands.tile.claim",
                b"{}".to_vec(),
            )
            .await
            .unwrap();

        assert_eq!(
            broker.queue_stats("tiles").await,
            Some(QueueStats {
                ready: 1,
                unacked: 0,
                dropped: 0
            })
        );
    }

    #[tokio::test]
    async fn publish_reconnects_after_connection_close() {
        let broker = InMemoryBroker::new();
        let provider = Arc::new(ConnectionProvider::new(Arc::new(broker)));
        let producer = BrokerProducer::new(provider.clone());

        // Fresh exchange with no bindings: accepted and discarded
        producer
            .publish("game.events.exchange", "game.events.tile.claimed", vec![1])
            .await
            .unwrap();

        let conn = provider.connection().await.unwrap();
        conn.close().await.unwrap();
        // Provider reconnects transparently
        producer
            .publish("game.events.exchange", "game.events.tile.claimed", vec![2])
            .await
            .unwrap();
    }
}
