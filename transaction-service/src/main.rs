use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use transaction_service::auth::JwtSecret;
use transaction_service::cache::HistoryCache;
use transaction_service::client::ResilientAccountClient;
use transaction_service::config::Settings;
use transaction_service::http::{router, AppState};
use transaction_service::limits::LimitProfiles;
use transaction_service::limits::LimitEvaluator;
use transaction_service::observer::TracingObserver;
use transaction_service::orchestrator::TransactionOrchestrator;
use transaction_service::store::postgres::PostgresTransactionRepository;
use transaction_service::store::SharedTransactionRepository;
use transaction_service::sweeper;

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
    let store: SharedTransactionRepository = Arc::new(PostgresTransactionRepository::new(pool));

    let account_client = Arc::new(ResilientAccountClient::new(
        settings.account_service_base_url.clone(),
        settings.account_service_token.clone(),
        settings.resilience.clone(),
    ));

    let profiles = LimitProfiles::load_from_file(&settings.limit_profile_path)?;
    let limits = Arc::new(LimitEvaluator::new(profiles, Arc::clone(&store)));

    let cache = Arc::new(HistoryCache::connect(&settings.cache_url));

    let orchestrator = Arc::new(TransactionOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&account_client),
        limits,
        Arc::clone(&cache),
        TracingObserver,
    ));

    tokio::spawn(sweeper::run(Arc::clone(&store), TracingObserver));

    let state = AppState {
        orchestrator,
        store,
        cache,
        account_client,
        jwt_secret: JwtSecret(settings.jwt_secret.clone()),
    };

    let app = router(state);

    tracing::info!(bind_addr = %settings.bind_addr, "starting transaction-service");
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
