//! Time-based resource regeneration.

use chrono::{DateTime, Utc};

use crate::entities::{Account, Player};

#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationRate {
    pub resource: String,
    pub per_minute: f64,
    pub cap: i64,
}

impl RegenerationRate {
    pub fn new(resource: impl Into<String>, per_minute: f64, cap: i64) -> Self {
        Self {
            resource: resource.into(),
            per_minute,
            cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationRules {
    pub rates: Vec<RegenerationRate>,
    /// Multiplier applied to every rate
    pub bonus: f64,
}

impl Default for RegenerationRules {
    fn default() -> Self {
        const CAP: i64 = 1_000_000_000;
        Self {
            rates: vec![
                RegenerationRate::new("Gold", 2.0, CAP),
                RegenerationRate::new("Wood", 1.0, CAP),
                RegenerationRate::new("Stone", 0.5, CAP),
            ],
            bonus: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No time elapsed since the last tick; nothing was touched
    Skipped,
    /// `(resource, new balance)` for every regenerating balance
    Applied { balances: Vec<(String, i64)> },
}

impl RegenerationRules {
    fn rate_for(&self, resource: &str) -> Option<&RegenerationRate> {
        self.rates.iter().find(|r| r.resource == resource)
    }

    /// Regenerate `account` for the time elapsed since `player.last_updated`.
    ///
    /// Each balance with a rate becomes
    /// `min(cap, old + floor(per_minute * minutes * bonus))`. When any time has
    /// elapsed the player's clock moves to `now`, so a second tick at the same
    /// instant is [`TickOutcome::Skipped`].
    pub fn apply_tick(
        &self,
        player: &mut Player,
        account: &mut Account,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let delta = now - player.last_updated;
        if delta <= chrono::Duration::zero() {
            return TickOutcome::Skipped;
        }
        let minutes = delta.num_milliseconds() as f64 / 60_000.0;

        let mut balances = Vec::new();
        for resource in account.resources.iter_mut() {
            let Some(rate) = self.rate_for(&resource.name) else {
                continue;
            };
            let gain = (rate.per_minute * minutes * self.bonus).floor() as i64;
            resource.quantity = resource.quantity.saturating_add(gain).min(rate.cap);
            balances.push((resource.name.clone(), resource.quantity));
        }

        player.last_updated = now;
        TickOutcome::Applied { balances }
    }
}
