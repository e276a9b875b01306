//! Application composition.
//!
//! [`App`] owns the long-lived handles (store, broker connection, notifier,
//! clock, random) and knows how to wire them into workers. Backends are chosen
//! by the binary; tests hand in in-memory ones.

use std::sync::Arc;
use std::time::Duration;

use hexworld_domain::rules::{OpenContest, RegenerationRules, UnownedOnly};
use hexworld_domain::ClaimPolicy;
use hexworld_shared::topics::{self, queues};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::broker::{ConnectionProvider, Connector};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::messaging::{BrokerConsumer, BrokerProducer, ConsumerSettings, QueueBinding};
use crate::infrastructure::ports::{
    ClockPort, DeliveryHandler, MessageProducer, RandomPort, RealtimeNotifier, WorldStore,
};
use crate::use_cases::{ActionError, ActionOutcome, GameActionService, ResourceTickService, SeedReport, SeedWorld};
use crate::workers::{
    BuildingCommandHandler, CommandDispatcher, EventRelay, PlayerCommandHandler, QueueWorker,
    ScopeFactory, TileCommandHandler,
};

pub struct App {
    pub config: AppConfig,
    pub store: Arc<dyn WorldStore>,
    pub connections: Arc<ConnectionProvider>,
    pub producer: Arc<dyn MessageProducer>,
    pub notifier: Arc<dyn RealtimeNotifier>,
    pub clock: Arc<dyn ClockPort>,
    pub random: Arc<dyn RandomPort>,
    restart_backoff: Duration,
}

impl App {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn WorldStore>,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn RealtimeNotifier>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        let connections = Arc::new(ConnectionProvider::new(connector));
        let producer: Arc<dyn MessageProducer> = Arc::new(BrokerProducer::new(connections.clone()));
        Self {
            config,
            store,
            connections,
            producer,
            notifier,
            clock,
            random,
            restart_backoff: Duration::from_secs(2),
        }
    }

    /// Delay before a worker whose consumer failed starts consuming again.
    pub fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    pub fn claim_policy(&self) -> Arc<dyn ClaimPolicy> {
        match self.config.game.claim_policy.as_str() {
            "open-contest" => Arc::new(OpenContest),
            _ => Arc::new(UnownedOnly),
        }
    }

    fn scopes(&self) -> ScopeFactory {
        ScopeFactory::new(
            self.store.clone(),
            self.producer.clone(),
            self.clock.clone(),
            self.random.clone(),
        )
    }

    fn worker(
        &self,
        name: &'static str,
        binding: QueueBinding,
        handler: Arc<dyn DeliveryHandler>,
    ) -> QueueWorker {
        let settings = ConsumerSettings {
            prefetch: self.config.consumer.prefetch,
            concurrency: self.config.consumer.concurrency,
        };
        QueueWorker::new(
            name,
            BrokerConsumer::new(self.connections.clone(), settings),
            binding,
            handler,
        )
        .with_restart_backoff(self.restart_backoff)
    }

    /// Seed an empty store with the starter world.
    pub async fn seed_world(&self) -> Result<SeedReport, ActionError> {
        let action = SeedWorld {
            radius: self.config.game.world_radius,
            now: self.clock.now(),
        };
        match GameActionService::new(self.store.clone()).run(&action).await? {
            ActionOutcome::Applied(report) => Ok(report),
            ActionOutcome::Rejected(_) => Ok(SeedReport::AlreadySeeded),
        }
    }

    /// Spawn the command workers, the event relay and the resource tick.
    ///
    /// Every task stops when `cancel` fires.
    pub fn spawn_workers(&self, cancel: &CancellationToken) -> JoinSet<()> {
        let scopes = self.scopes();
        let workers = [
            self.worker(
                "tile",
                QueueBinding::new(
                    topics::COMMANDS_EXCHANGE,
                    topics::commands::TILE_PATTERN,
                    queues::TILE_WORKER,
                ),
                Arc::new(CommandDispatcher::new(
                    TileCommandHandler::new(self.claim_policy()),
                    scopes.clone(),
                    cancel.clone(),
                )),
            ),
            self.worker(
                "building",
                QueueBinding::new(
                    topics::COMMANDS_EXCHANGE,
                    topics::commands::BUILDING_PATTERN,
                    queues::BUILDING_WORKER,
                ),
                Arc::new(CommandDispatcher::new(
                    BuildingCommandHandler,
                    scopes.clone(),
                    cancel.clone(),
                )),
            ),
            self.worker(
                "player",
                QueueBinding::new(
                    topics::COMMANDS_EXCHANGE,
                    topics::commands::PLAYER_PATTERN,
                    queues::PLAYER_WORKER,
                ),
                Arc::new(CommandDispatcher::new(
                    PlayerCommandHandler,
                    scopes,
                    cancel.clone(),
                )),
            ),
            self.worker(
                "event-relay",
                QueueBinding::new(
                    topics::EVENTS_EXCHANGE,
                    topics::events::ALL_PATTERN,
                    queues::EVENT_RELAY,
                ),
                Arc::new(EventRelay::new(self.notifier.clone())),
            ),
        ];

        let mut tasks = JoinSet::new();
        for worker in workers {
            let cancel = cancel.clone();
            tasks.spawn(async move { worker.run(cancel).await });
        }

        let tick = ResourceTickService::new(
            GameActionService::new(self.store.clone()),
            self.clock.clone(),
            RegenerationRules::default(),
            self.config.game.tick_interval,
        );
        let cancel = cancel.clone();
        tasks.spawn(async move { tick.run(cancel).await });

        tasks
    }

    /// Close the shared broker connection after the workers have stopped.
    pub async fn shutdown(&self) {
        if let Err(e) = self.connections.close().await {
            tracing::warn!(error = %e, "Failed to close broker connection");
        }
    }
}
