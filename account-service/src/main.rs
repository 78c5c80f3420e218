use std::sync::Arc;

use account_service::auth::JwtSecret;
use account_service::config::Settings;
use account_service::engine::BalanceEngine;
use account_service::http::{router, AppState};
use account_service::store::postgres::PostgresLedgerBackend;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(&settings.database_url)
        .await?;

    let backend = PostgresLedgerBackend::new(pool);
    let engine = Arc::new(BalanceEngine::new(backend));
    let state = AppState {
        engine,
        jwt_secret: JwtSecret(settings.jwt_secret.clone()),
    };

    let app = router(state);

    tracing::info!(bind_addr = %settings.bind_addr, "starting account-service");
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
