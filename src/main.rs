use std::net::SocketAddr;
use std::sync::Arc;

use papertrade::{
    config::{self, StoreBackend},
    routes,
    services::{
        db_init,
        finnhub::FinnhubClient,
        memory_store::MemoryStore,
        mongo_store::MongoStore,
        price_oracle::PriceOracle,
        store::TradingStore,
    },
    AppState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("papertrade=info,tower_http=info")),
        )
        .init();

    let settings = config::load();

    let store: Arc<dyn TradingStore> = match settings.store_backend {
        StoreBackend::Mongo => {
            let mongo = MongoStore::connect(
                &settings.mongodb_uri,
                &settings.mongodb_db,
                settings.starting_balance,
            )
            .await?;
            db_init::ensure_indexes(mongo.database()).await?;
            tracing::info!(db = %settings.mongodb_db, "using mongodb store");
            Arc::new(mongo)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, state is lost on exit");
            Arc::new(MemoryStore::new(settings.starting_balance))
        }
    };

    if settings.finnhub_api_key.trim().is_empty() {
        tracing::warn!("FINNHUB_API_KEY not set, every price lookup will be unavailable");
    }
    let oracle: Arc<dyn PriceOracle> = Arc::new(FinnhubClient::new(settings.finnhub_api_key.clone()));

    let state = AppState::new(settings.clone(), store, oracle);

    let scanner = state.scanner().spawn();

    let app = routes::app(state);

    let addr = SocketAddr::from((settings.host.parse::<std::net::IpAddr>()?, settings.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    scanner.stop().await;

    Ok(())
}
