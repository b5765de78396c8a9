use anyhow::{Context, Result};
use simbridge::config::{load_config, BridgeConfig};
use simbridge::messaging::NatsBus;
use simbridge::world::ScriptedWorld;
use simbridge::{Bridge, BridgeOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "simbridge.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simbridge=info".into()),
        )
        .init();

    info!("Simbridge starting...");

    let config = load_bridge_config()?;
    info!(
        tick_interval_ms = config.world.tick_interval_ms,
        ego_role_names = ?config.ego_vehicle.role_name,
        reconcile_cooldown_ms = config.reconcile.cooldown_ms,
        nats_url = %config.nats.url,
        "Configuration loaded"
    );

    let world = Arc::new(match &config.world.scenario {
        Some(path) => ScriptedWorld::from_scenario(path)?,
        None => ScriptedWorld::new(config.world.map.clone()),
    });

    let bus = Arc::new(
        NatsBus::connect(&config.nats, config.parameters())
            .await
            .context("Failed to initialize message bus")?,
    );

    let bridge = Bridge::new(world.clone(), bus, BridgeOptions::from(&config));

    // Drive the world clock; callbacks run on their own threads
    let tick_interval = config.tick_interval();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            drop(world.advance(tick_interval.as_secs_f64()));
        }
    });

    // Blocks until ctrl-c, then drains both passes
    let runner = Arc::clone(&bridge);
    tokio::task::spawn_blocking(move || runner.run())
        .await
        .context("Bridge event loop failed")?;

    ticker.abort();

    let stats = bridge.stats().snapshot();
    info!(
        passes = stats.passes,
        busy_skips = stats.busy_skips,
        stale_skips = stats.stale_skips,
        update_failures = stats.update_failures,
        actors_created = stats.actors_created,
        actors_removed = stats.actors_removed,
        "Simbridge stopped"
    );

    Ok(())
}

/// Config path from argv[1], else `simbridge.toml` if present, else defaults
fn load_bridge_config() -> Result<BridgeConfig> {
    let path = std::env::args().nth(1).map(PathBuf::from).or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    });

    let config = match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            load_config(&path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?
        }
        None => {
            info!("No config file found, using defaults");
            BridgeConfig::default()
        }
    };

    Ok(config.with_env_overrides())
}
