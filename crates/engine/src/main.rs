//! Hexworld Engine - Main entry point.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hexworld_engine::infrastructure::broker::memory::InMemoryBroker;
use hexworld_engine::infrastructure::broker::sqlite::SqliteBroker;
use hexworld_engine::infrastructure::broker::Connector;
use hexworld_engine::infrastructure::clock::{SystemClock, SystemRandom};
use hexworld_engine::infrastructure::config::{AppConfig, Backend};
use hexworld_engine::infrastructure::notifier::TracingNotifier;
use hexworld_engine::infrastructure::persistence::{MemoryWorldStore, SqliteWorldStore};
use hexworld_engine::infrastructure::ports::WorldStore;
use hexworld_engine::use_cases::SeedReport;
use hexworld_engine::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hexworld_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Hexworld Engine");

    let config = AppConfig::from_env().context("Invalid configuration")?;

    let store: Arc<dyn WorldStore> = match config.store.backend {
        Backend::Memory => Arc::new(MemoryWorldStore::new()),
        Backend::Sqlite => {
            ensure_parent_dir(&config.store.sqlite_path)?;
            tracing::info!(path = %config.store.sqlite_path, "Opening world store");
            Arc::new(SqliteWorldStore::open(&config.store.sqlite_path).await?)
        }
    };

    let connector: Arc<dyn Connector> = match config.broker.backend {
        Backend::Memory => Arc::new(InMemoryBroker::new()),
        Backend::Sqlite => {
            ensure_parent_dir(&config.broker.sqlite_path)?;
            tracing::info!(path = %config.broker.sqlite_path, "Opening durable broker");
            Arc::new(
                SqliteBroker::open(&config.broker.sqlite_path, config.broker.poll_interval).await?,
            )
        }
    };

    let app = App::new(
        config,
        store,
        connector,
        Arc::new(TracingNotifier),
        Arc::new(SystemClock::new()),
        Arc::new(SystemRandom::new()),
    );

    match app.seed_world().await? {
        SeedReport::AlreadySeeded => tracing::info!("World already seeded"),
        SeedReport::Seeded {
            tiles,
            building_types,
        } => {
            for building_type in &building_types {
                tracing::info!(
                    id = %building_type.id,
                    name = %building_type.name,
                    radius = building_type.tile_radius,
                    "Building type available"
                );
            }
            tracing::info!(tiles, "Seeded new world");
        }
    }

    let cancel = CancellationToken::new();
    let mut tasks = app.spawn_workers(&cancel);
    tracing::info!(
        claim_policy = %app.config.game.claim_policy,
        prefetch = app.config.consumer.prefetch,
        concurrency = app.config.consumer.concurrency,
        "Workers running, press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    cancel.cancel();

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Worker task failed");
        }
    }
    app.shutdown().await;

    tracing::info!("Hexworld Engine stopped");
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
    let _ = dotenvy::dotenv();
}

fn ensure_parent_dir(db_path: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}
