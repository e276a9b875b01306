//! Wall-clock time and the random source used for player colors.
//!
//! Workers read time once per message through [`ClockPort`], so every write
//! made while handling one command carries the same timestamp.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::infrastructure::ports::{ClockPort, RandomPort};

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared generator behind [`RandomPort`]. Entropy-seeded in production;
/// [`SystemRandom::seeded`] replays the same color picks.
pub struct SystemRandom {
    rng: Mutex<StdRng>,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn gen_range(&self, min: i32, max: i32) -> i32 {
        // A panic mid-draw leaves the generator usable
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(min..=max)
    }
}

#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Always draws the same channel value.
#[cfg(test)]
pub struct FixedRandom(pub i32);

#[cfg(test)]
impl RandomPort for FixedRandom {
    fn gen_range(&self, _min: i32, _max: i32) -> i32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_draws_repeat_and_stay_in_channel_range() {
        let a = SystemRandom::seeded(7);
        let b = SystemRandom::seeded(7);

        let first: Vec<i32> = (0..32).map(|_| a.gen_range(0, 255)).collect();
        let second: Vec<i32> = (0..32).map(|_| b.gen_range(0, 255)).collect();

        assert_eq!(first, second);
        assert!(first.iter().all(|v| (0..=255).contains(v)));
    }

    #[test]
    fn degenerate_range_returns_its_bound() {
        assert_eq!(SystemRandom::new().gen_range(9, 9), 9);
    }
}
