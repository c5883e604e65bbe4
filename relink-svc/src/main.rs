//! relink-svc - subscription/order reference repair service
//!
//! Opens the shared database, builds one repair engine, and serves the hook,
//! pairing and orphan endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use relink_common::api::load_shared_secret;
use relink_common::config::{Config, ConfigOverrides};
use relink_common::db::init_database;
use relink_engine::entitlement::HttpEntitlementConnector;
use relink_engine::sqlite::{sqlite_stores, SqliteAuthorizer};
use relink_engine::store::EntitlementConnector;
use relink_engine::{EngineSettings, RepairEngine};
use relink_svc::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "relink-svc", version, about = "Subscription/order reference repair service")]
struct Args {
    /// TOML config file (default: ~/.config/relink/config.toml, then /etc/relink/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file
    #[arg(long, env = "RELINK_DATABASE")]
    database: Option<PathBuf>,

    /// Listen address
    #[arg(long, env = "RELINK_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(ConfigOverrides {
        config_file: args.config,
        database_path: args.database,
        bind: args.bind,
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting relink-svc v{} (database: {})",
        env!("CARGO_PKG_VERSION"),
        config.database_path.display()
    );
    match &config.source {
        Some(path) => info!("Loaded TOML configuration from {}", path.display()),
        None => warn!("No config file found, using built-in defaults"),
    }

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let shared_secret = load_shared_secret(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load shared secret: {}", e))?;
    if shared_secret == 0 {
        warn!(
            "API authentication disabled (shared_secret = 0); pairing user ids are unverified"
        );
    } else {
        info!("Loaded shared secret for API authentication");
    }

    let entitlements: Option<Arc<dyn EntitlementConnector>> = match &config.entitlement.base_url {
        Some(base_url) => {
            let connector = HttpEntitlementConnector::new(
                base_url,
                Duration::from_millis(config.entitlement.timeout_ms),
            )?;
            info!("Entitlement connector: {}", base_url);
            Some(Arc::new(connector))
        }
        None => None,
    };

    let authorizer = Arc::new(SqliteAuthorizer::new(
        pool.clone(),
        config.pairing.nonce_ttl_secs,
    ));
    match authorizer.purge_expired().await {
        Ok(0) => {}
        Ok(purged) => info!("Purged {} stale pairing nonces", purged),
        Err(e) => warn!("Failed to purge pairing nonces: {}", e),
    }

    let engine = RepairEngine::new(
        sqlite_stores(&pool),
        authorizer.clone(),
        entitlements,
        EngineSettings {
            match_window: chrono::Duration::seconds(config.pairing.match_window_secs),
        },
    );

    let state = AppState::new(pool, shared_secret, Arc::new(engine), authorizer);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("relink-svc listening on http://{}", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
