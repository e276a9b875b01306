//! Bounded-concurrency consume loop.
//!
//! One channel per consumer. A semaphore permit is taken *before* the next
//! delivery is pulled, so at most `concurrency` handlers are ever in flight and
//! no delivery sits unacknowledged waiting for a slot. Each handler runs in its
//! own task; the decision it returns is applied with ack or nack.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::broker::{BrokerChannel, ConnectionProvider, Delivery};
use crate::infrastructure::ports::{AckDecision, BrokerError, DeliveryHandler};

/// Where a consumer reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub exchange: String,
    pub pattern: String,
    pub queue: String,
}

impl QueueBinding {
    pub fn new(
        exchange: impl Into<String>,
        pattern: impl Into<String>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            pattern: pattern.into(),
            queue: queue.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Unacknowledged deliveries the broker may hand this channel
    pub prefetch: u16,
    /// Handlers running at once
    pub concurrency: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            prefetch: 5,
            concurrency: 5,
        }
    }
}

pub struct BrokerConsumer {
    connections: Arc<ConnectionProvider>,
    settings: ConsumerSettings,
}

impl BrokerConsumer {
    pub fn new(connections: Arc<ConnectionProvider>, settings: ConsumerSettings) -> Self {
        Self {
            connections,
            settings,
        }
    }

    /// Consume until `cancel` fires or the transport fails.
    ///
    /// Cancellation returns `Ok(())` after the subscription is cancelled,
    /// in-flight handlers have settled and the channel is closed.
    pub async fn consume(
        &self,
        binding: &QueueBinding,
        handler: Arc<dyn DeliveryHandler>,
        cancel: CancellationToken,
    ) -> Result<(), BrokerError> {
        let channel: Arc<dyn BrokerChannel> = Arc::from(self.connections.channel().await?);
        channel.declare_exchange(&binding.exchange).await?;
        channel.declare_queue(&binding.queue).await?;
        channel
            .bind_queue(&binding.queue, &binding.exchange, &binding.pattern)
            .await?;
        channel.set_prefetch(self.settings.prefetch).await?;
        let consumer_tag = channel.consume(&binding.queue).await?;

        tracing::info!(
            queue = %binding.queue,
            exchange = %binding.exchange,
            pattern = %binding.pattern,
            concurrency = self.settings.concurrency,
            "Consumer started"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        let result = loop {
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(queue = %binding.queue, error = %e, "Delivery task failed");
                }
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                next = channel.next_delivery() => match next {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },
            };

            let channel = channel.clone();
            let handler = handler.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                let decision = run_handler(handler.as_ref(), &delivery).await;
                settle(channel.as_ref(), &delivery, decision).await;
            });
        };

        if let Err(e) = channel.cancel(&consumer_tag).await {
            tracing::debug!(queue = %binding.queue, error = %e, "Consumer cancel failed");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(queue = %binding.queue, error = %e, "Delivery task failed");
            }
        }
        if let Err(e) = channel.close().await {
            tracing::debug!(queue = %binding.queue, error = %e, "Channel close failed");
        }

        match &result {
            Ok(()) => tracing::info!(queue = %binding.queue, "Consumer stopped"),
            Err(e) => tracing::warn!(queue = %binding.queue, error = %e, "Consumer stopped on transport error"),
        }
        result
    }
}

async fn run_handler(handler: &dyn DeliveryHandler, delivery: &Delivery) -> AckDecision {
    let outcome = AssertUnwindSafe(handler.handle(&delivery.routing_key, &delivery.body))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(decision)) => decision,
        Ok(Err(e)) => {
            let decision = e.ack_decision();
            tracing::warn!(
                routing_key = %delivery.routing_key,
                tag = %delivery.tag,
                ?decision,
                error = %e,
                "Delivery handler failed"
            );
            decision
        }
        Err(_) => {
            tracing::error!(
                routing_key = %delivery.routing_key,
                tag = %delivery.tag,
                "Delivery handler panicked, requeueing"
            );
            AckDecision::NackRequeue
        }
    }
}

async fn settle(channel: &dyn BrokerChannel, delivery: &Delivery, decision: AckDecision) {
    let result = match decision {
        AckDecision::Ack => channel.ack(delivery.tag).await,
        AckDecision::NackRequeue => channel.nack(delivery.tag, true).await,
        AckDecision::NackDrop => channel.nack(delivery.tag, false).await,
    };
    if let Err(e) = result {
        // The channel is gone; the broker requeues the delivery on its own
        tracing::warn!(
            routing_key = %delivery.routing_key,
            tag = %delivery.tag,
            ?decision,
            error = %e,
            "Failed to settle delivery"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::broker::memory::InMemoryBroker;
    use crate::infrastructure::broker::{PublishProperties, QueueStats};
    use crate::infrastructure::ports::HandlerError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const EXCHANGE: &str = "game.commands.exchange";

    fn binding() -> QueueBinding {
        QueueBinding::new(EXCHANGE, "game.commands.tile.*", "tiles")
    }

    async fn publish_all(provider: &ConnectionProvider, bodies: &[&[u8]]) {
        let ch = provider.channel().await.unwrap();
        ch.declare_exchange(EXCHANGE).await.unwrap();
        for body in bodies {
            ch.publish(
                EXCHANGE,
                "game.commands.tile.claim",
                body,
                PublishProperties::default(),
            )
            .await
            .unwrap();
        }
    }

    async fn wait_for(broker: &InMemoryBroker, queue: &str, expected: QueueStats) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if broker.queue_stats(queue).await == Some(expected) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn setup(settings: ConsumerSettings) -> (InMemoryBroker, Arc<ConnectionProvider>, BrokerConsumer) {
        let broker = InMemoryBroker::new();
        let provider = Arc::new(ConnectionProvider::new(Arc::new(broker.clone())));
        let consumer = BrokerConsumer::new(provider.clone(), settings);
        (broker, provider, consumer)
    }

    /// Decides by body: `ok` acks, `bad` drops, `flaky` fails transiently once.
    #[derive(Default)]
    struct ScriptedHandler {
        calls: AtomicUsize,
        flaky_seen: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryHandler for ScriptedHandler {
        async fn handle(&self, _key: &str, body: &[u8]) -> Result<AckDecision, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match body {
                b"ok" => Ok(AckDecision::Ack),
                b"bad" => Ok(AckDecision::NackDrop),
                b"flaky" if self.flaky_seen.fetch_add(1, Ordering::SeqCst) == 0 => {
                    Err(HandlerError::transient("store unavailable"))
                }
                b"flaky" => Ok(AckDecision::Ack),
                _ => Err(HandlerError::permanent("unexpected body")),
            }
        }
    }

    #[tokio::test]
    async fn applies_handler_decisions() {
        let (broker, provider, consumer) = setup(ConsumerSettings::default());
        let handler = Arc::new(ScriptedHandler::default());
        let cancel = CancellationToken::new();

        let task = {
            let handler: Arc<dyn DeliveryHandler> = handler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.consume(&binding(), handler, cancel).await })
        };
        // Give the consumer time to declare and bind its queue
        tokio::time::sleep(Duration::from_millis(50)).await;
        publish_all(&provider, &[b"ok".as_slice(), b"bad".as_slice(), b"flaky".as_slice(), b"???".as_slice()]).await;

        wait_for(
            &broker,
            "tiles",
            QueueStats {
                ready: 0,
                unacked: 0,
                dropped: 2,
            },
        )
        .await;
        // flaky ran twice
        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    struct PanicOnce {
        calls: AtomicUsize,
        redelivered: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryHandler for PanicOnce {
        async fn handle(&self, _key: &str, _body: &[u8]) -> Result<AckDecision, HandlerError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("handler bug");
            }
            self.redelivered.fetch_add(1, Ordering::SeqCst);
            Ok(AckDecision::Ack)
        }
    }

    #[tokio::test]
    async fn handler_panic_requeues() {
        let (broker, provider, consumer) = setup(ConsumerSettings::default());
        let handler = Arc::new(PanicOnce {
            calls: AtomicUsize::new(0),
            redelivered: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let task = {
            let handler: Arc<dyn DeliveryHandler> = handler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.consume(&binding(), handler, cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        publish_all(&provider, &[b"x".as_slice()]).await;

        wait_for(&broker, "tiles", QueueStats::default()).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(handler.redelivered.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    struct SlowHandler {
        current: AtomicUsize,
        peak: AtomicUsize,
        done: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryHandler for SlowHandler {
        async fn handle(&self, _key: &str, _body: &[u8]) -> Result<AckDecision, HandlerError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(AckDecision::Ack)
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let (broker, provider, consumer) = setup(ConsumerSettings {
            prefetch: 10,
            concurrency: 2,
        });
        let handler = Arc::new(SlowHandler {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let task = {
            let handler: Arc<dyn DeliveryHandler> = handler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.consume(&binding(), handler, cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        publish_all(&provider, &[b"1".as_slice(); 8]).await;

        wait_for(&broker, "tiles", QueueStats::default()).await;
        assert_eq!(handler.done.load(Ordering::SeqCst), 8);
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancellation_returns_cleanly_and_leaves_messages() {
        let (broker, provider, consumer) = setup(ConsumerSettings::default());
        let cancel = CancellationToken::new();
        let handler: Arc<dyn DeliveryHandler> = Arc::new(ScriptedHandler::default());

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { consumer.consume(&binding(), handler, cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // Queue outlives the consumer; new messages wait for the next one
        publish_all(&provider, &[b"ok".as_slice()]).await;
        assert_eq!(
            broker.queue_stats("tiles").await,
            Some(QueueStats {
                ready: 1,
                unacked: 0,
                dropped: 0
            })
        );
    }
}
