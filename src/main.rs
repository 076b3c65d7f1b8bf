use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradesense::application::handlers::{router, AppState};
use tradesense::application::services::ledger_service::{run_daily_rollover, LedgerService};
use tradesense::auth::ApiKeys;
use tradesense::config::LedgerConfig;
use tradesense::domain::repositories::market_data::HttpMarketData;
use tradesense::persistence::repository::SqliteLedgerStore;
use tradesense::persistence::{init_database, DatabaseConfig};
use tradesense::rate_limit::{create_rate_limiter, RateLimiterConfig};
use tradesense::task_runner::CircuitBreakerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tradesense=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("TradeSense challenge ledger starting...");

    let config = LedgerConfig::from_env();
    let api_keys = ApiKeys::from_env()?;
    let db_config = DatabaseConfig::from_env();
    let pool = init_database(&db_config.url, db_config.max_connections).await?;

    let mut service = LedgerService::new(Arc::new(SqliteLedgerStore::new(pool)), &config);
    match &config.market_data_url {
        Some(url) => {
            service = service.with_market_data(Arc::new(HttpMarketData::new(
                url,
                config.market_data_timeout(),
            )?));
            info!("Market data source: {}", url);
        }
        None => warn!("MARKET_DATA_URL not set; closing a trade requires an exit price"),
    }
    let service = Arc::new(service);

    if config.daily_rollover_enabled {
        let rollover_service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = run_daily_rollover(rollover_service, CircuitBreakerConfig::default()).await {
                error!("Daily rollover stopped: {}", e);
            }
        });
        info!("Daily rollover scheduled at 00:00 UTC");
    }

    let limiter = create_rate_limiter(&RateLimiterConfig::from_env());
    let app = router(AppState { service }, api_keys, limiter);

    info!("Listening on http://{}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Shutdown complete");
    Ok(())
}
