//! Periodic regeneration loop.

use std::sync::Arc;
use std::time::Duration;

use hexworld_domain::rules::RegenerationRules;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::ClockPort;
use crate::use_cases::game_action::{ActionError, ActionOutcome, GameActionService};

use super::{RegenerateResources, TickSummary};

pub struct ResourceTickService {
    actions: GameActionService,
    clock: Arc<dyn ClockPort>,
    rules: RegenerationRules,
    interval: Duration,
}

impl ResourceTickService {
    pub fn new(
        actions: GameActionService,
        clock: Arc<dyn ClockPort>,
        rules: RegenerationRules,
        interval: Duration,
    ) -> Self {
        Self {
            actions,
            clock,
            rules,
            interval,
        }
    }

    /// One regeneration pass at the clock's current time.
    pub async fn tick(&self) -> Result<TickSummary, ActionError> {
        let action = RegenerateResources {
            rules: self.rules.clone(),
            now: self.clock.now(),
        };
        match self.actions.run(&action).await? {
            ActionOutcome::Applied(summary) => Ok(summary),
            // Regeneration has no rules that reject
            ActionOutcome::Rejected(violation) => {
                tracing::warn!(reason = %violation, "Resource tick rejected");
                Ok(TickSummary::default())
            }
        }
    }

    /// Tick every interval until cancelled. A failed tick is retried on the
    /// next period.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Starting resource tick service");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.tick().await {
                Ok(summary) => tracing::debug!(
                    updated = summary.updated,
                    skipped = summary.skipped,
                    "Resource tick complete"
                ),
                Err(e) => tracing::error!(error = %e, "Resource tick failed"),
            }
        }
        tracing::info!("Resource tick service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::MemoryWorldStore;
    use crate::infrastructure::ports::{MockClockPort, MockWorldStore, RepoError, WorldStore};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use hexworld_domain::{Account, HexColor, Player, PlayerName, Resource, SessionId};

    #[tokio::test]
    async fn tick_uses_the_injected_clock() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let store = MemoryWorldStore::new();
        let player = Player::new(
            SessionId::new("s").unwrap(),
            PlayerName::new("P").unwrap(),
            HexColor::WHITE,
            t0,
        );
        let mut tx = store.begin().await.unwrap();
        tx.insert_player(&player, &Account::new(player.id, vec![Resource::balance("Wood", 0)]))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut clock = MockClockPort::new();
        clock
            .expect_now()
            .return_const(t0 + ChronoDuration::minutes(4));
        let service = ResourceTickService::new(
            GameActionService::new(Arc::new(store.clone())),
            Arc::new(clock),
            RegenerationRules::default(),
            Duration::from_secs(10),
        );

        let summary = service.tick().await.unwrap();
        assert_eq!(summary.updated, 1);
        let world = store.snapshot().await;
        // Wood regenerates at 1.0 per minute
        assert_eq!(world.account_for(player.id).unwrap().balance("Wood"), Some(4));
    }

    #[tokio::test]
    async fn run_survives_failures_and_stops_on_cancel() {
        let mut store = MockWorldStore::new();
        store
            .expect_begin()
            .returning(|| Err(RepoError::database("begin", "unavailable")));
        let mut clock = MockClockPort::new();
        clock.expect_now().returning(Utc::now);

        let service = Arc::new(ResourceTickService::new(
            GameActionService::new(Arc::new(store)),
            Arc::new(clock),
            RegenerationRules::default(),
            Duration::from_millis(10),
        ));
        let cancel = CancellationToken::new();
        let task = {
            let service = service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { service.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
