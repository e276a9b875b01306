//! SQLite-backed broker for durable messaging
//!
//! Exchanges, queues, bindings and messages are rows. A delivery is claimed
//! atomically with `UPDATE .. RETURNING`, so several channels can consume the
//! same queue without double delivery. Waiting consumers are woken in-process
//! through a shared [`Notify`] and fall back to polling.
//!
//! On open, transient messages are discarded and deliveries left
//! unacknowledged by a previous process are requeued as redelivered. The file
//! must therefore be owned by a single broker process.
//!
//! Dropped deliveries stay as `dead` rows for inspection and are purged once
//! older than [`DEAD_RETENTION`], on open or through [`SqliteBroker::purge_dead`].

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::{Row, SqlitePool};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use super::{
    topic_matches, BrokerChannel, BrokerConnection, Connector, ConsumerTag, Delivery, DeliveryTag,
    PublishProperties, QueueStats,
};
use crate::infrastructure::ports::BrokerError;

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS broker_exchanges (
        name TEXT PRIMARY KEY,
        kind TEXT NOT NULL DEFAULT 'topic',
        durable INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS broker_queues (
        name TEXT PRIMARY KEY,
        durable INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS broker_bindings (
        queue TEXT NOT NULL REFERENCES broker_queues(name),
        exchange TEXT NOT NULL REFERENCES broker_exchanges(name),
        pattern TEXT NOT NULL,
        PRIMARY KEY (queue, exchange, pattern)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS broker_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue TEXT NOT NULL,
        exchange TEXT NOT NULL,
        routing_key TEXT NOT NULL,
        body BLOB NOT NULL,
        persistent INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'ready',
        redelivered INTEGER NOT NULL DEFAULT 0,
        channel TEXT,
        enqueued_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_broker_messages_ready
    ON broker_messages(queue, status, redelivered DESC, id)
    "#,
];

const STATUS_READY: &str = "ready";
const STATUS_UNACKED: &str = "unacked";
const STATUS_DEAD: &str = "dead";

pub const DEAD_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct SqliteBroker {
    pool: SqlitePool,
    notify: Arc<Notify>,
    poll_interval: Duration,
    connections_opened: Arc<AtomicUsize>,
}

impl SqliteBroker {
    pub async fn open(db_path: &str, poll_interval: Duration) -> Result<Self, BrokerError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| BrokerError::backend("open", e))?;
        Self::with_pool(pool, poll_interval).await
    }

    pub async fn with_pool(pool: SqlitePool, poll_interval: Duration) -> Result<Self, BrokerError> {
        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| BrokerError::backend("create_schema", e))?;
        }

        let discarded = sqlx::query("DELETE FROM broker_messages WHERE persistent = 0")
            .execute(&pool)
            .await
            .map_err(|e| BrokerError::backend("recover", e))?
            .rows_affected();

        let requeued = sqlx::query(
            r#"
            UPDATE broker_messages
            SET status = ?, redelivered = 1, channel = NULL, updated_at = ?
            WHERE status = ?
            "#,
        )
        .bind(STATUS_READY)
        .bind(Utc::now().to_rfc3339())
        .bind(STATUS_UNACKED)
        .execute(&pool)
        .await
        .map_err(|e| BrokerError::backend("recover", e))?
        .rows_affected();

        if discarded > 0 || requeued > 0 {
            tracing::info!(discarded, requeued, "Recovered broker state from previous run");
        }

        let broker = Self {
            pool,
            notify: Arc::new(Notify::new()),
            poll_interval,
            connections_opened: Arc::new(AtomicUsize::new(0)),
        };
        broker.purge_dead(DEAD_RETENTION).await?;
        Ok(broker)
    }

    /// Delete dropped deliveries last touched at least `older_than` ago.
    pub async fn purge_dead(&self, older_than: Duration) -> Result<u64, BrokerError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| BrokerError::backend("purge_dead", e))?;
        let cutoff = Utc::now() - age;
        let purged = sqlx::query(
            "DELETE FROM broker_messages WHERE status = ? AND julianday(updated_at) <= julianday(?)",
        )
        .bind(STATUS_DEAD)
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| BrokerError::backend("purge_dead", e))?
        .rows_affected();

        if purged > 0 {
            tracing::info!(purged, "Purged dead broker messages");
        }
        Ok(purged)
    }

    pub async fn queue_stats(&self, queue: &str) -> Result<QueueStats, BrokerError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM broker_messages WHERE queue = ? GROUP BY status",
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BrokerError::backend("queue_stats", e))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            let n = n as usize;
            match status.as_str() {
                STATUS_READY => stats.ready = n,
                STATUS_UNACKED => stats.unacked = n,
                STATUS_DEAD => stats.dropped = n,
                _ => {}
            }
        }
        Ok(stats)
    }

    pub fn connections_opened(&self) -> usize {
        self.connections_opened.load(Ordering::SeqCst)
    }

    async fn close_channel(&self, channel: &ChannelShared) -> Result<(), BrokerError> {
        if channel.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        channel.consumer.lock().await.take();
        let requeued = sqlx::query(
            r#"
            UPDATE broker_messages
            SET status = ?, redelivered = 1, channel = NULL, updated_at = ?
            WHERE channel = ? AND status = ?
            "#,
        )
        .bind(STATUS_READY)
        .bind(Utc::now().to_rfc3339())
        .bind(&channel.id)
        .bind(STATUS_UNACKED)
        .execute(&self.pool)
        .await
        .map_err(|e| BrokerError::backend("close_channel", e))?
        .rows_affected();

        if requeued > 0 {
            tracing::debug!(channel = %channel.id, requeued, "Requeued unacked deliveries on close");
        }
        self.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl Connector for SqliteBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        if self.pool.is_closed() {
            return Err(BrokerError::ConnectionClosed);
        }
        self.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SqliteConnection {
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
    channels: DashMap<String, Arc<ChannelShared>>,
}

pub struct SqliteConnection {
    broker: SqliteBroker,
    shared: Arc<ConnectionShared>,
}

#[async_trait]
impl BrokerConnection for SqliteConnection {
    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst) && !self.broker.pool.is_closed()
    }

    async fn create_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::ConnectionClosed);
        }
        let channel = Arc::new(ChannelShared {
            id: Uuid::new_v4().to_string(),
            closed: AtomicBool::new(false),
            prefetch: AtomicU16::new(0),
            consumer: Mutex::new(None),
        });
        self.shared
            .channels
            .insert(channel.id.clone(), channel.clone());
        Ok(Box::new(SqliteChannel {
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
            self.broker.close_channel(&channel).await?;
        }
        Ok(())
    }
}

struct ChannelShared {
    id: String,
    closed: AtomicBool,
    prefetch: AtomicU16,
    consumer: Mutex<Option<Consuming>>,
}

struct Consuming {
    tag: ConsumerTag,
    queue: String,
    active: bool,
}

pub struct SqliteChannel {
    broker: SqliteBroker,
    connection: Arc<ConnectionShared>,
    shared: Arc<ChannelShared>,
}

impl SqliteChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if !self.connection.open.load(Ordering::SeqCst) || self.broker.pool.is_closed() {
            return Err(BrokerError::ConnectionClosed);
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(())
    }

    async fn active_queue(&self) -> Option<String> {
        self.shared
            .consumer
            .lock()
            .await
            .as_ref()
            .filter(|c| c.active)
            .map(|c| c.queue.clone())
    }

    async fn try_claim(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let prefetch = i64::from(self.shared.prefetch.load(Ordering::SeqCst));
        if prefetch > 0 {
            let in_flight: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM broker_messages WHERE channel = ? AND status = ?",
            )
            .bind(&self.shared.id)
            .bind(STATUS_UNACKED)
            .fetch_one(&self.broker.pool)
            .await
            .map_err(|e| BrokerError::backend("next_delivery", e))?;
            if in_flight >= prefetch {
                return Ok(None);
            }
        }

        // Atomic select-and-claim so concurrent channels never share a message
        let row = sqlx::query(
            r#"
            UPDATE broker_messages
            SET status = ?, channel = ?, updated_at = ?
            WHERE id = (
                SELECT id FROM broker_messages
                WHERE queue = ? AND status = ?
                ORDER BY redelivered DESC, id ASC
                LIMIT 1
            )
            AND status = ?
            RETURNING id, exchange, routing_key, body, redelivered
            "#,
        )
        .bind(STATUS_UNACKED)
        .bind(&self.shared.id)
        .bind(Utc::now().to_rfc3339())
        .bind(queue)
        .bind(STATUS_READY)
        .bind(STATUS_READY)
        .fetch_optional(&self.broker.pool)
        .await
        .map_err(|e| BrokerError::backend("next_delivery", e))?;

        Ok(row.map(|row| {
            let id: i64 = row.get("id");
            Delivery {
                tag: DeliveryTag(id as u64),
                exchange: row.get("exchange"),
                routing_key: row.get("routing_key"),
                body: row.get("body"),
                redelivered: row.get("redelivered"),
            }
        }))
    }

    async fn settle(&self, tag: DeliveryTag, requeue: Option<bool>) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let now = Utc::now().to_rfc3339();
        let id = tag.0 as i64;
        let query = match requeue {
            None => sqlx::query(
                "DELETE FROM broker_messages WHERE id = ? AND channel = ? AND status = ?",
            )
            .bind(id)
            .bind(&self.shared.id)
            .bind(STATUS_UNACKED),
            Some(requeue) => sqlx::query(
                r#"
                UPDATE broker_messages
                SET status = ?, redelivered = ?, channel = NULL, updated_at = ?
                WHERE id = ? AND channel = ? AND status = ?
                "#,
            )
            .bind(if requeue { STATUS_READY } else { STATUS_DEAD })
            .bind(requeue)
            .bind(now)
            .bind(id)
            .bind(&self.shared.id)
            .bind(STATUS_UNACKED),
        };

        let result = query
            .execute(&self.broker.pool)
            .await
            .map_err(|e| BrokerError::backend("settle", e))?;

        if result.rows_affected() == 0 {
            return Err(BrokerError::UnknownDelivery(tag.0));
        }

        self.broker.notify.notify_waiters();
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for SqliteChannel {
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        sqlx::query("INSERT INTO broker_exchanges (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.broker.pool)
            .await
            .map_err(|e| BrokerError::backend("declare_exchange", e))?;
        Ok(())
    }

    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        sqlx::query("INSERT INTO broker_queues (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.broker.pool)
            .await
            .map_err(|e| BrokerError::backend("declare_queue", e))?;
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let queue_exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM broker_queues WHERE name = ?")
                .bind(queue)
                .fetch_one(&self.broker.pool)
                .await
                .map_err(|e| BrokerError::backend("bind_queue", e))?;
        if queue_exists == 0 {
            return Err(BrokerError::not_found("queue", queue));
        }
        let exchange_exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM broker_exchanges WHERE name = ?")
                .bind(exchange)
                .fetch_one(&self.broker.pool)
                .await
                .map_err(|e| BrokerError::backend("bind_queue", e))?;
        if exchange_exists == 0 {
            return Err(BrokerError::not_found("exchange", exchange));
        }

        sqlx::query(
            r#"
            INSERT INTO broker_bindings (queue, exchange, pattern) VALUES (?, ?, ?)
            ON CONFLICT(queue, exchange, pattern) DO NOTHING
            "#,
        )
        .bind(queue)
        .bind(exchange)
        .bind(pattern)
        .execute(&self.broker.pool)
        .await
        .map_err(|e| BrokerError::backend("bind_queue", e))?;
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
        properties: PublishProperties,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut tx = self
            .broker
            .pool
            .begin()
            .await
            .map_err(|e| BrokerError::backend("publish", e))?;

        let exchange_exists: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM broker_exchanges WHERE name = ?")
                .bind(exchange)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| BrokerError::backend("publish", e))?;
        if exchange_exists == 0 {
            return Err(BrokerError::not_found("exchange", exchange));
        }

        let bindings = sqlx::query("SELECT queue, pattern FROM broker_bindings WHERE exchange = ? ORDER BY queue")
            .bind(exchange)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| BrokerError::backend("publish", e))?;

        let mut targets: Vec<String> = bindings
            .iter()
            .filter(|row| topic_matches(row.get::<&str, _>("pattern"), routing_key))
            .map(|row| row.get::<String, _>("queue"))
            .collect();
        targets.dedup();

        if targets.is_empty() {
            tracing::debug!(exchange, routing_key, "Message matched no binding, discarded");
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        for queue in &targets {
            sqlx::query(
                r#"
                INSERT INTO broker_messages
                (queue, exchange, routing_key, body, persistent, status, redelivered, enqueued_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(queue)
            .bind(exchange)
            .bind(routing_key)
            .bind(body)
            .bind(properties.persistent)
            .bind(STATUS_READY)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| BrokerError::backend("publish", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| BrokerError::backend("publish", e))?;

        self.broker.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<ConsumerTag, BrokerError> {
        self.ensure_open()?;
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM broker_queues WHERE name = ?")
            .bind(queue)
            .fetch_one(&self.broker.pool)
            .await
            .map_err(|e| BrokerError::backend("consume", e))?;
        if exists == 0 {
            return Err(BrokerError::not_found("queue", queue));
        }

        let mut consumer = self.shared.consumer.lock().await;
        if consumer.is_some() {
            return Err(BrokerError::AlreadyConsuming(queue.to_string()));
        }
        let tag = ConsumerTag(format!("ctag-{}", Uuid::new_v4()));
        *consumer = Some(Consuming {
            tag: tag.clone(),
            queue: queue.to_string(),
            active: true,
        });
        Ok(tag)
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, BrokerError> {
        loop {
            self.ensure_open()?;
            let notified = self.broker.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let Some(queue) = self.active_queue().await else {
                return Ok(None);
            };
            if let Some(delivery) = self.try_claim(&queue).await? {
                return Ok(Some(delivery));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.broker.poll_interval) => {}
            }
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
        drop(guard);
        self.broker.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.connection.channels.remove(&self.shared.id);
        self.broker.close_channel(&self.shared).await
    }
}
