//! Tradeyard API server entry point

use anyhow::Context;
use tradeyard_api::{routes, AppState, Config};
use tradeyard_billing::BillingService;
use tradeyard_shared::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradeyard_api=info,tradeyard_billing=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let billing = BillingService::from_env(pool.clone())
        .context("Failed to initialize billing service")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, pool, billing);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;

    tracing::info!("Tradeyard API listening on {}", bind_address);

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
