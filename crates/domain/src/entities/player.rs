use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, PlayerId};
use crate::value_objects::{HexColor, PlayerName, SessionId};

use super::Resource;

/// A participant, keyed by the session that first contacted the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub session_id: SessionId,
    pub name: PlayerName,
    pub color: HexColor,
    /// Also the regeneration clock for the player's account
    pub last_updated: DateTime<Utc>,
}

impl Player {
    pub fn new(
        session_id: SessionId,
        name: PlayerName,
        color: HexColor,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PlayerId::new(),
            session_id,
            name,
            color,
            last_updated: now,
        }
    }
}

/// Resource holdings of exactly one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub player_id: PlayerId,
    pub resources: Vec<Resource>,
}

impl Account {
    pub fn new(player_id: PlayerId, resources: Vec<Resource>) -> Self {
        Self {
            id: AccountId::new(),
            player_id,
            resources,
        }
    }

    pub fn balance(&self, name: &str) -> Option<i64> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.quantity)
    }

    /// Mutable access to the named balance, creating a zero balance if absent.
    pub fn balance_mut(&mut self, name: &str) -> &mut Resource {
        let idx = match self.resources.iter().position(|r| r.name == name) {
            Some(idx) => idx,
            None => {
                self.resources.push(Resource::balance(name, 0));
                self.resources.len() - 1
            }
        };
        &mut self.resources[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_mut_creates_missing_entries_at_zero() {
        let mut account = Account::new(PlayerId::new(), vec![Resource::balance("Gold", 10)]);
        account.balance_mut("Wood").quantity += 5;
        account.balance_mut("Gold").quantity -= 3;

        assert_eq!(account.balance("Gold"), Some(7));
        assert_eq!(account.balance("Wood"), Some(5));
        assert_eq!(account.balance("Stone"), None);
    }
}
