//! In-memory broker for development and testing
//!
//! Topology lives in concurrent maps; each queue keeps its ready and
//! unacknowledged messages behind its own lock with a [`Notify`] that wakes
//! waiting consumers on publish, ack, nack, cancel and close. Nothing survives
//! the process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};

use super::{
    topic_matches, BrokerChannel, BrokerConnection, Connector, ConsumerTag, Delivery, DeliveryTag,
    PublishProperties, QueueStats,
};
use crate::infrastructure::ports::BrokerError;

/// Shared broker state. Clones refer to the same broker.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: DashMap<String, Vec<Binding>>,
    queues: DashMap<String, Arc<QueueCell>>,
    next_tag: AtomicU64,
    next_channel: AtomicU64,
    connections_opened: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    queue: String,
    pattern: String,
}

#[derive(Default)]
struct QueueCell {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Message>,
    unacked: HashMap<DeliveryTag, Unacked>,
    dropped: usize,
}

#[derive(Debug, Clone)]
struct Message {
    exchange: String,
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

struct Unacked {
    channel: u64,
    message: Message,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts for a declared queue, `None` if it does not exist.
    pub async fn queue_stats(&self, queue: &str) -> Option<QueueStats> {
        let cell = self.queue(queue)?;
        let state = cell.state.lock().await;
        Some(QueueStats {
            ready: state.ready.len(),
            unacked: state.unacked.len(),
            dropped: state.dropped,
        })
    }

    pub fn connections_opened(&self) -> usize {
        self.state.connections_opened.load(Ordering::SeqCst)
    }

    fn queue(&self, name: &str) -> Option<Arc<QueueCell>> {
        self.state.queues.get(name).map(|q| q.value().clone())
    }

    fn next_tag(&self) -> DeliveryTag {
        DeliveryTag(self.state.next_tag.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn close_channel(&self, channel: &ChannelShared) {
        if channel.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(consuming) = channel.consumer.lock().await.take() else {
            return;
        };
        let mut state = consuming.queue.state.lock().await;
        let mut tags: Vec<DeliveryTag> = state
            .unacked
            .iter()
            .filter(|(_, u)| u.channel == channel.id)
            .map(|(tag, _)| *tag)
            .collect();
        // Oldest delivery ends up at the front
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some(mut unacked) = state.unacked.remove(&tag) {
                unacked.message.redelivered = true;
                state.ready.push_front(unacked.message);
            }
        }
        drop(state);
        consuming.queue.notify.notify_waiters();
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryConnection {
            broker: self.clone(),
            shared: Arc::new(ConnectionShared {
                open: AtomicBool::new(true),
                channels: DashMap::new(),
            }),
        }))
    }
}

struct ConnectionShared {
    open: AtomicBool,
    channels: DashMap<u64, Arc<ChannelShared>>,
}

pub struct InMemoryConnection {
    broker: InMemoryBroker,
    shared: Arc<ConnectionShared>,
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::ConnectionClosed);
        }
        let id = self.broker.state.next_channel.fetch_add(1, Ordering::SeqCst) + 1;
        let channel = Arc::new(ChannelShared {
            id,
            closed: AtomicBool::new(false),
            prefetch: AtomicU16::new(0),
            consumer: Mutex::new(None),
        });
        self.shared.channels.insert(id, channel.clone());
        Ok(Box::new(InMemoryChannel {
            broker: self.broker.clone(),
            connection: self.shared.clone(),
            shared: channel,
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.shared.open.store(false, Ordering::SeqCst);
        let channels: Vec<Arc<ChannelShared>> = self
            .shared
            .channels
            .iter()
            .map(|c| c.value().clone())
            .collect();
        self.shared.channels.clear();
        for channel in channels {
            self.broker.close_channel(&channel).await;
        }
        Ok(())
    }
}

struct ChannelShared {
    id: u64,
    closed: AtomicBool,
    prefetch: AtomicU16,
    consumer: Mutex<Option<Consuming>>,
}

struct Consuming {
    tag: ConsumerTag,
    queue: Arc<QueueCell>,
    active: bool,
}

pub struct InMemoryChannel {
    broker: InMemoryBroker,
    connection: Arc<ConnectionShared>,
    shared: Arc<ChannelShared>,
}

impl InMemoryChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if !self.connection.open.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(())
    }

    /// Queue this channel consumes (or consumed) from.
    async fn consumed_queue(&self) -> Result<Arc<QueueCell>, BrokerError> {
        self.shared
            .consumer
            .lock()
            .await
            .as_ref()
            .map(|c| c.queue.clone())
            .ok_or(BrokerError::NotConsuming)
    }

    async fn settle(&self, tag: DeliveryTag, requeue: Option<bool>) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let queue = self.consumed_queue().await?;
        let mut state = queue.state.lock().await;
        let owned = state
            .unacked
            .get(&tag)
            .is_some_and(|u| u.channel == self.shared.id);
        if !owned {
            return Err(BrokerError::UnknownDelivery(tag.0));
        }
        if let Some(mut unacked) = state.unacked.remove(&tag) {
            match requeue {
                None => {}
                Some(true) => {
                    unacked.message.redelivered = true;
                    state.ready.push_front(unacked.message);
                }
                Some(false) => state.dropped += 1,
            }
        }
        drop(state);
        queue.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for InMemoryChannel {
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker
            .state
            .exchanges
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker.state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        if !self.broker.state.queues.contains_key(queue) {
            return Err(BrokerError::not_found("queue", queue));
        }
        let mut bindings = self
            .broker
            .state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::not_found("exchange", exchange))?;
        let binding = Binding {
            queue: queue.to_string(),
            pattern: pattern.to_string(),
        };
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.shared.prefetch.store(count, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        _properties: PublishProperties,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let bindings = self
            .broker
            .state
            .exchanges
            .get(exchange)
            .map(|b| b.value().clone())
            .ok_or_else(|| BrokerError::not_found("exchange", exchange))?;

        let targets: Vec<Arc<QueueCell>> = bindings
            .iter()
            .filter(|b| topic_matches(&b.pattern, routing_key))
            .filter_map(|b| self.broker.queue(&b.queue))
            .collect();

        if targets.is_empty() {
            tracing::debug!(exchange, routing_key, "Message matched no binding, discarded");
            return Ok(());
        }

        for queue in targets {
            queue.state.lock().await.ready.push_back(Message {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                body: body.to_vec(),
                redelivered: false,
            });
            queue.notify.notify_waiters();
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<ConsumerTag, BrokerError> {
        self.ensure_open()?;
        let cell = self
            .broker
            .queue(queue)
            .ok_or_else(|| BrokerError::not_found("queue", queue))?;
        let mut consumer = self.shared.consumer.lock().await;
        if consumer.is_some() {
            return Err(BrokerError::AlreadyConsuming(queue.to_string()));
        }
        let tag = ConsumerTag(format!("ctag-{}-{}", self.shared.id, queue));
        *consumer = Some(Consuming {
            tag: tag.clone(),
            queue: cell,
            active: true,
        });
        Ok(tag)
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, BrokerError> {
        loop {
            self.ensure_open()?;
            let queue = match self.shared.consumer.lock().await.as_ref() {
                Some(c) if c.active => c.queue.clone(),
                _ => return Ok(None),
            };

            let notified = queue.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // Re-check after registering so a concurrent cancel/close is not missed
            self.ensure_open()?;
            if !self
                .shared
                .consumer
                .lock()
                .await
                .as_ref()
                .is_some_and(|c| c.active)
            {
                return Ok(None);
            }

            {
                let mut state = queue.state.lock().await;
                let prefetch = usize::from(self.shared.prefetch.load(Ordering::SeqCst));
                let in_flight = state
                    .unacked
                    .values()
                    .filter(|u| u.channel == self.shared.id)
                    .count();
                if prefetch == 0 || in_flight < prefetch {
                    if let Some(message) = state.ready.pop_front() {
                        let tag = self.broker.next_tag();
                        let delivery = Delivery {
                            tag,
                            exchange: message.exchange.clone(),
                            routing_key: message.routing_key.clone(),
                            body: message.body.clone(),
                            redelivered: message.redelivered,
                        };
                        state.unacked.insert(
                            tag,
                            Unacked {
                                channel: self.shared.id,
                                message,
                            },
                        );
                        return Ok(Some(delivery));
                    }
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        self.settle(tag, None).await
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        self.settle(tag, Some(requeue)).await
    }

    async fn cancel(&self, consumer: &ConsumerTag) -> Result<(), BrokerError> {
        let mut guard = self.shared.consumer.lock().await;
        let current = guard.as_mut().ok_or(BrokerError::NotConsuming)?;
        if current.tag != *consumer {
            return Err(BrokerError::not_found("consumer", consumer.0.clone()));
        }
        current.active = false;
        let queue = current.queue.clone();
        drop(guard);
        queue.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.connection.channels.remove(&self.shared.id);
        self.broker.close_channel(&self.shared).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const EXCHANGE: &str = "game.commands.exchange";

    async fn channel(broker: &InMemoryBroker) -> Box<dyn BrokerChannel> {
        broker
            .connect()
            .await
            .unwrap()
            .create_channel()
            .await
            .unwrap()
    }

    async fn bound_queue(broker: &InMemoryBroker, queue: &str, pattern: &str) -> Box<dyn BrokerChannel> {
        let ch = channel(broker).await;
        ch.declare_exchange(EXCHANGE).await.unwrap();
        ch.declare_queue(queue).await.unwrap();
        ch.bind_queue(queue, EXCHANGE, pattern).await.unwrap();
        ch
    }

    async fn publish(ch: &dyn BrokerChannel, key: &str, body: &str) {
        ch.publish(EXCHANGE, key, body.as_bytes(), PublishProperties::default())
            .await
            .unwrap();
    }

    async fn expect_nothing(ch: &dyn BrokerChannel) {
        let waited = tokio::time::timeout(Duration::from_millis(50), ch.next_delivery()).await;
        assert!(waited.is_err(), "expected no delivery");
    }

    #[tokio::test]
    async fn routes_by_pattern_and_discards_unmatched() {
        let broker = InMemoryBroker::new();
        let tiles = bound_queue(&broker, "tiles", "game.commands.tile.*").await;
        let _all = bound_queue(&broker, "all", "game.#").await;

        publish(tiles.as_ref(), "game.commands.tile.claim", "a").await;
        publish(tiles.as_ref(), "game.commands.building.build", "b").await;
        publish(tiles.as_ref(), "other.key", "c").await;

        assert_eq!(broker.queue_stats("tiles").await.unwrap().ready, 1);
        assert_eq!(broker.queue_stats("all").await.unwrap().ready, 2);
    }

    #[tokio::test]
    async fn publish_to_undeclared_exchange_fails() {
        let broker = InMemoryBroker::new();
        let ch = channel(&broker).await;
        let err = ch
            .publish("missing", "k", b"x", PublishProperties::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { kind: "exchange", .. }));
    }

    #[tokio::test]
    async fn prefetch_bounds_unacked_deliveries() {
        let broker = InMemoryBroker::new();
        let ch = bound_queue(&broker, "q", "#").await;
        ch.set_prefetch(2).await.unwrap();
        for body in ["1", "2", "3"] {
            publish(ch.as_ref(), "k", body).await;
        }
        ch.consume("q").await.unwrap();

        let first = ch.next_delivery().await.unwrap().unwrap();
        let _second = ch.next_delivery().await.unwrap().unwrap();
        expect_nothing(ch.as_ref()).await;

        ch.ack(first.tag).await.unwrap();
        let third = ch.next_delivery().await.unwrap().unwrap();
        assert_eq!(third.body, b"3");
    }

    #[tokio::test]
    async fn nack_requeue_goes_to_front_marked_redelivered() {
        let broker = InMemoryBroker::new();
        let ch = bound_queue(&broker, "q", "#").await;
        publish(ch.as_ref(), "k", "first").await;
        publish(ch.as_ref(), "k", "second").await;
        ch.consume("q").await.unwrap();

        let first = ch.next_delivery().await.unwrap().unwrap();
        assert!(!first.redelivered);
        ch.nack(first.tag, true).await.unwrap();

        let again = ch.next_delivery().await.unwrap().unwrap();
        assert_eq!(again.body, b"first");
        assert!(again.redelivered);
        assert_ne!(again.tag, first.tag);
    }

    #[tokio::test]
    async fn nack_drop_discards() {
        let broker = InMemoryBroker::new();
        let ch = bound_queue(&broker, "q", "#").await;
        publish(ch.as_ref(), "k", "poison").await;
        ch.consume("q").await.unwrap();

        let d = ch.next_delivery().await.unwrap().unwrap();
        ch.nack(d.tag, false).await.unwrap();

        assert_eq!(
            broker.queue_stats("q").await.unwrap(),
            QueueStats {
                ready: 0,
                unacked: 0,
                dropped: 1
            }
        );
    }

    #[tokio::test]
    async fn closing_channel_requeues_unacked() {
        let broker = InMemoryBroker::new();
        let ch = bound_queue(&broker, "q", "#").await;
        publish(ch.as_ref(), "k", "a").await;
        publish(ch.as_ref(), "k", "b").await;
        ch.consume("q").await.unwrap();
        let _a = ch.next_delivery().await.unwrap().unwrap();
        let _b = ch.next_delivery().await.unwrap().unwrap();

        ch.close().await.unwrap();

        assert_eq!(broker.queue_stats("q").await.unwrap().ready, 2);
        let other = channel(&broker).await;
        other.consume("q").await.unwrap();
        let redelivered = other.next_delivery().await.unwrap().unwrap();
        assert_eq!(redelivered.body, b"a");
        assert!(redelivered.redelivered);
        assert!(matches!(ch.next_delivery().await, Err(BrokerError::ChannelClosed)));
    }

    #[tokio::test]
    async fn cancel_wakes_a_waiting_consumer() {
        let broker = InMemoryBroker::new();
        let ch: Arc<dyn BrokerChannel> = Arc::from(bound_queue(&broker, "q", "#").await);
        let tag = ch.consume("q").await.unwrap();

        let waiter = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.next_delivery().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        ch.cancel(&tag).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn settling_unknown_tag_fails() {
        let broker = InMemoryBroker::new();
        let ch = bound_queue(&broker, "q", "#").await;
        ch.consume("q").await.unwrap();
        assert!(matches!(
            ch.ack(DeliveryTag(999)).await,
            Err(BrokerError::UnknownDelivery(999))
        ));
    }

    #[tokio::test]
    async fn closing_connection_closes_its_channels() {
        let broker = InMemoryBroker::new();
        let conn = broker.connect().await.unwrap();
        let ch = conn.create_channel().await.unwrap();
        ch.declare_exchange(EXCHANGE).await.unwrap();

        conn.close().await.unwrap();

        assert!(matches!(
            ch.declare_exchange(EXCHANGE).await,
            Err(BrokerError::ConnectionClosed)
        ));
        assert!(conn.create_channel().await.is_err());
    }
}
