//! Fiscal closure API server.
//!
//! Main entry point: configuration, tracing, database and router.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use closure_api::{AppState, create_router};
use closure_core::closure::{ClosureOrchestrator, ClosureSettings};
use closure_db::{ClosureRunRepository, LedgerRepository, PeriodLockRepository, closure_sources, connect};
use closure_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "closure=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    let settings = ClosureSettings::from_config(&config.closure)?;
    info!(
        functional_currency = %settings.functional_currency,
        profit_tax_rate = %settings.profit_tax_rate,
        "Closure settings loaded"
    );

    let db = connect(&config.database).await?;
    info!("Connected to database");

    let orchestrator = ClosureOrchestrator::new(
        closure_sources(&db),
        Arc::new(LedgerRepository::new(db.clone())),
        Arc::new(PeriodLockRepository::new(db.clone())),
        Arc::new(ClosureRunRepository::new(db)),
        settings,
    );

    let ttl_secs = i64::try_from(config.jwt.access_token_expiry_secs)?;
    let jwt_service = JwtService::new(JwtConfig {
        secret: config.jwt.secret.clone(),
        issuer: config.jwt.issuer.clone(),
        access_token_ttl: chrono::Duration::try_seconds(ttl_secs)
            .context("jwt.access_token_expiry_secs out of range")?,
    });

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        jwt_service: Arc::new(jwt_service),
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
