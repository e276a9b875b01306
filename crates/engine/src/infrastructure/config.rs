//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub consumer: ConsumerConfig,
    pub game: GameConfig,
}

/// Where a backend keeps its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("unknown backend {other:?} (expected \"memory\" or \"sqlite\")"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    /// Broker backend: memory or sqlite
    pub backend: Backend,
    /// SQLite database path (if using sqlite backend)
    pub sqlite_path: String,
    /// Poll fallback for waiting consumers of the sqlite broker
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub backend: Backend,
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Unacknowledged deliveries per channel
    pub prefetch: u16,
    /// Handlers in flight per consumer
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub tick_interval: Duration,
    /// Radius of the world seeded into an empty store
    pub world_radius: u32,
    /// Name of the tile claim policy
    pub claim_policy: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset keys take their default; set keys that fail to parse are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let parsed = |key: &'static str, default: &str| {
            let raw = string(key, default);
            raw.trim()
                .to_string()
                .parse::<u64>()
                .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}"))
        };

        let claim_policy = string("CLAIM_POLICY", "unowned-only");
        if !matches!(claim_policy.as_str(), "unowned-only" | "open-contest") {
            bail!("CLAIM_POLICY must be \"unowned-only\" or \"open-contest\", got {claim_policy:?}");
        }

        Ok(Self {
            broker: BrokerConfig {
                backend: string("BROKER_BACKEND", "sqlite")
                    .parse()
                    .context("BROKER_BACKEND")?,
                sqlite_path: string("BROKER_SQLITE_PATH", "./data/broker.db"),
                poll_interval: Duration::from_millis(parsed("BROKER_POLL_INTERVAL_MS", "500")?),
            },
            store: StoreConfig {
                backend: string("STORE_BACKEND", "sqlite")
                    .parse()
                    .context("STORE_BACKEND")?,
                sqlite_path: string("STORE_SQLITE_PATH", "./data/world.db"),
            },
            consumer: ConsumerConfig {
                prefetch: u16::try_from(parsed("CONSUMER_PREFETCH", "5")?)
                    .context("CONSUMER_PREFETCH is out of range")?,
                concurrency: usize::try_from(parsed("CONSUMER_CONCURRENCY", "5")?)
                    .context("CONSUMER_CONCURRENCY is out of range")?,
            },
            game: GameConfig {
                tick_interval: Duration::from_secs(parsed("TICK_INTERVAL_SECONDS", "120")?),
                world_radius: u32::try_from(parsed("WORLD_RADIUS", "10")?)
                    .context("WORLD_RADIUS is out of range")?,
                claim_policy,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.broker.backend, Backend::Sqlite);
        assert_eq!(cfg.broker.sqlite_path, "./data/broker.db");
        assert_eq!(cfg.broker.poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.store.sqlite_path, "./data/world.db");
        assert_eq!(
            cfg.consumer,
            ConsumerConfig {
                prefetch: 5,
                concurrency: 5
            }
        );
        assert_eq!(cfg.game.tick_interval, Duration::from_secs(120));
        assert_eq!(cfg.game.world_radius, 10);
        assert_eq!(cfg.game.claim_policy, "unowned-only");
    }

    #[test]
    fn default_tick_regenerates_every_default_resource() {
        let cfg = config(&[]).unwrap();
        let minutes = cfg.game.tick_interval.as_secs_f64() / 60.0;
        let rules = hexworld_domain::rules::RegenerationRules::default();
        for rate in &rules.rates {
            let gain = (rate.per_minute * minutes * rules.bonus).floor();
            assert!(gain >= 1.0, "{} gains nothing per tick", rate.resource);
        }
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("BROKER_BACKEND", "memory"),
            ("STORE_BACKEND", "Memory"),
            ("CONSUMER_CONCURRENCY", "3"),
            ("CLAIM_POLICY", "open-contest"),
        ])
        .unwrap();
        assert_eq!(cfg.broker.backend, Backend::Memory);
        assert_eq!(cfg.store.backend, Backend::Memory);
        assert_eq!(cfg.consumer.concurrency, 3);
        assert_eq!(cfg.game.claim_policy, "open-contest");
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let err = config(&[("CONSUMER_PREFETCH", "lots")]).unwrap_err();
        assert!(err.to_string().contains("CONSUMER_PREFETCH"));

        assert!(config(&[("CONSUMER_PREFETCH", "70000")]).is_err());
        assert!(config(&[("WORLD_RADIUS", "-1")]).is_err());
    }

    #[test]
    fn unknown_backend_or_policy_is_rejected() {
        assert!(config(&[("BROKER_BACKEND", "rabbit")]).is_err());
        assert!(config(&[("CLAIM_POLICY", "anything-goes")]).is_err());
    }
}
