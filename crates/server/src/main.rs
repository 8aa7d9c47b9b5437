//! Lantern server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use lantern_core::SystemClock;
use lantern_core::config::AppConfig;
use lantern_export::KeyVault;
use lantern_server::{AppState, create_router, scheduler};
use lantern_store::KeyStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lantern - a GAEN exposure-notification backend
#[derive(Parser, Debug)]
#[command(name = "lanternd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "LANTERN_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Lantern v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override
    // everything)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!("No config file found at {}, using defaults and env vars", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("LANTERN_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    // Initialize the key store
    let store = lantern_store::from_config(&config.database, config.gaen.release_bucket())
        .await
        .context("failed to initialize key store")?;
    store
        .health_check()
        .await
        .context("key store health check failed")?;
    tracing::info!("Key store initialized");

    // Load the key vault
    let vault =
        KeyVault::from_config(&config.signing.keys).context("failed to load key vault")?;
    tracing::info!("Key vault loaded");

    // Create application state
    let bind = config.server.bind.clone();
    let state = AppState::new(config, store, &vault, Arc::new(SystemClock));

    // Seed the fake-key padding before accepting requests, then keep it
    // fresh on the daily schedule.
    let seeded = state
        .fake_keys
        .update_fake_keys(state.clock.now())
        .await
        .context("failed to seed fake keys")?;
    if seeded > 0 {
        tracing::info!(keys = seeded, "Fake key padding seeded");
    }

    // Spawn scheduled maintenance
    let _scheduler_handles = scheduler::spawn(state.clone());
    tracing::info!("Scheduler spawned");

    // Create router
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
