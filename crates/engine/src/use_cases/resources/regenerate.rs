use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hexworld_domain::rules::{RegenerationRules, TickOutcome};
use hexworld_domain::{Account, Player};

use crate::infrastructure::ports::WorldTx;
use crate::use_cases::game_action::{ActionError, GameAction, Validation};

/// Regenerate every account for the time elapsed since its player's last update.
pub struct RegenerateResources {
    pub rules: RegenerationRules,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub updated: usize,
    pub skipped: usize,
}

#[async_trait]
impl GameAction for RegenerateResources {
    type Plan = Vec<(Player, Account)>;
    type Output = TickSummary;

    fn name(&self) -> &'static str {
        "regenerate_resources"
    }

    async fn validate(
        &self,
        tx: &mut dyn WorldTx,
    ) -> Result<Validation<Self::Plan>, ActionError> {
        Ok(Validation::Valid(tx.list_holdings().await?))
    }

    async fn execute(
        &self,
        tx: &mut dyn WorldTx,
        holdings: Self::Plan,
    ) -> Result<TickSummary, ActionError> {
        let mut summary = TickSummary::default();
        for (mut player, mut account) in holdings {
            match self.rules.apply_tick(&mut player, &mut account, self.now) {
                TickOutcome::Skipped => summary.skipped += 1,
                TickOutcome::Applied { .. } => {
                    tx.save_account(&account).await?;
                    tx.save_player(&player).await?;
                    summary.updated += 1;
                }
            }
        }
        Ok(summary)
    }
}
