//! Get-or-create the player behind a session.
//!
//! A new player gets a random color not already assigned to anyone, retrying
//! up to [`MAX_COLOR_ATTEMPTS`] times, and an account holding the starting
//! balances.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hexworld_domain::rules::{starting_balances, MAX_COLOR_ATTEMPTS};
use hexworld_domain::{Account, HexColor, Player, PlayerName, RuleViolation, SessionId};

use crate::infrastructure::ports::{RandomPort, WorldTx};
use crate::use_cases::game_action::{ActionError, GameAction, Validation};

const MAX_COLOR: i32 = 0xFF_FFFF;

pub struct JoinPlayer {
    pub session: SessionId,
    pub name: String,
    pub random: Arc<dyn RandomPort>,
    pub now: DateTime<Utc>,
}

pub enum JoinPlan {
    Existing(Player),
    Create(PlayerName),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub player: Player,
    /// False when the session already had a player
    pub created: bool,
}

impl JoinPlayer {
    async fn pick_color(&self, tx: &mut dyn WorldTx) -> Result<HexColor, ActionError> {
        let mut candidate = HexColor::NEUTRAL;
        for attempt in 1..=MAX_COLOR_ATTEMPTS {
            candidate = HexColor::from_u24(self.random.gen_range(0, MAX_COLOR).unsigned_abs());
            if !tx.color_in_use(candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(attempt, color = %candidate, "Color already assigned");
        }
        tracing::warn!(
            session = %self.session,
            color = %candidate,
            "No free color found, reusing one"
        );
        Ok(candidate)
    }
}

#[async_trait]
impl GameAction for JoinPlayer {
    type Plan = JoinPlan;
    type Output = Joined;

    fn name(&self) -> &'static str {
        "join_player"
    }

    async fn validate(&self, tx: &mut dyn WorldTx) -> Result<Validation<JoinPlan>, ActionError> {
        if let Some(player) = tx.player_by_session(&self.session).await? {
            return Ok(Validation::Valid(JoinPlan::Existing(player)));
        }
        Ok(match PlayerName::new(self.name.as_str()) {
            Ok(name) => Validation::Valid(JoinPlan::Create(name)),
            Err(e) => Validation::Rejected(RuleViolation::InvalidName(e.to_string())),
        })
    }

    async fn execute(&self, tx: &mut dyn WorldTx, plan: JoinPlan) -> Result<Joined, ActionError> {
        let name = match plan {
            JoinPlan::Existing(player) => {
                return Ok(Joined {
                    player,
                    created: false,
                })
            }
            JoinPlan::Create(name) => name,
        };

        let color = self.pick_color(tx).await?;
        let player = Player::new(self.session.clone(), name, color, self.now);
        let account = Account::new(player.id, starting_balances());
        tx.insert_player(&player, &account).await?;

        tracing::info!(
            player_id = %player.id,
            session = %player.session_id,
            color = %player.color,
            "Player created"
        );
        Ok(Joined {
            player,
            created: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedRandom;
    use crate::infrastructure::persistence::MemoryWorldStore;
    use crate::infrastructure::ports::{MockRandomPort, WorldStore};
    use crate::use_cases::game_action::{ActionOutcome, GameActionService};

    fn join(session: &str, name: &str, random: Arc<dyn RandomPort>) -> JoinPlayer {
        JoinPlayer {
            session: SessionId::new(session).unwrap(),
            name: name.to_string(),
            random,
            now: Utc::now(),
        }
    }

    fn applied(outcome: ActionOutcome<Joined>) -> Joined {
        match outcome {
            ActionOutcome::Applied(joined) => joined,
            other => panic!("expected join, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_session_creates_player_with_starting_balances() {
        let store = MemoryWorldStore::new();
        let service = GameActionService::new(Arc::new(store.clone()));

        let joined = applied(
            service
                .run(&join("s-1", "Ada", Arc::new(FixedRandom(0x00FF00))))
                .await
                .unwrap(),
        );

        assert!(joined.created);
        assert_eq!(joined.player.name.as_str(), "Ada");
        assert_eq!(joined.player.color.to_string(), "#00FF00");
        let world = store.snapshot().await;
        let account = world.account_for(joined.player.id).unwrap();
        assert_eq!(account.balance("Gold"), Some(100));
        assert_eq!(account.balance("Wood"), Some(50));
        assert_eq!(account.balance("Stone"), Some(50));
    }

    #[tokio::test]
    async fn existing_session_is_returned_unchanged() {
        let store = MemoryWorldStore::new();
        let service = GameActionService::new(Arc::new(store.clone()));
        let first = applied(
            service
                .run(&join("s-1", "Ada", Arc::new(FixedRandom(1))))
                .await
                .unwrap(),
        );
        let before = store.snapshot().await;

        let again = applied(
            service
                .run(&join("s-1", "Someone else", Arc::new(FixedRandom(2))))
                .await
                .unwrap(),
        );

        assert!(!again.created);
        assert_eq!(again.player, first.player);
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn taken_colors_are_retried() {
        let store = MemoryWorldStore::new();
        let service = GameActionService::new(Arc::new(store.clone()));
        service
            .run(&join("first", "One", Arc::new(FixedRandom(0x112233))))
            .await
            .unwrap();

        let mut random = MockRandomPort::new();
        let mut seq = mockall::Sequence::new();
        random
            .expect_gen_range()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(0x112233);
        random
            .expect_gen_range()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(0x445566);

        let joined = applied(
            service
                .run(&join("second", "Two", Arc::new(random)))
                .await
                .unwrap(),
        );
        assert_eq!(joined.player.color, HexColor::from_u24(0x445566));
    }

    #[tokio::test]
    async fn exhausted_attempts_accept_a_duplicate() {
        let store = MemoryWorldStore::new();
        let service = GameActionService::new(Arc::new(store.clone()));
        service
            .run(&join("first", "One", Arc::new(FixedRandom(7))))
            .await
            .unwrap();

        let mut random = MockRandomPort::new();
        random
            .expect_gen_range()
            .times(MAX_COLOR_ATTEMPTS)
            .return_const(7);

        let joined = applied(
            service
                .run(&join("second", "Two", Arc::new(random)))
                .await
                .unwrap(),
        );
        assert!(joined.created);
        assert_eq!(joined.player.color, HexColor::from_u24(7));
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let store = MemoryWorldStore::new();
        let service = GameActionService::new(Arc::new(store.clone()));

        let outcome = service
            .run(&join("s-1", "   ", Arc::new(FixedRandom(1))))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ActionOutcome::Rejected(RuleViolation::InvalidName(_))
        ));
        let mut tx = store.begin().await.unwrap();
        assert!(tx
            .player_by_session(&SessionId::new("s-1").unwrap())
            .await
            .unwrap()
            .is_none());
    }
}
