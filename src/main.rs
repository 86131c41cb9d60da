mod api;
mod config;
mod error;
mod live;
mod quotes;
mod store;
mod websocket;

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::net::TcpListener;
use tokio::time::interval;
use tower_http::cors::CorsLayer;

use crate::api::{create_api_router, ApiState};
use crate::config::{Config, STATS_INTERVAL_SECS};
use crate::live::{ActiveSymbolResolver, ClientRegistry, PriceCache, PriceUpdater};
use crate::quotes::{QuoteFetcher, QuoteProvider, YahooQuoteProvider};
use crate::store::Database;
use crate::websocket::WebSocketHandler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    // Log configuration
    config.log_config();

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    // Open the holdings/watchlist store
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Opened store at {}", config.db_path);

    // Initialize the price pipeline
    let provider: Arc<dyn QuoteProvider> = Arc::new(YahooQuoteProvider::new()?);
    let cache = Arc::new(PriceCache::new());
    let registry = Arc::new(ClientRegistry::new());

    let updater = PriceUpdater::new(
        ActiveSymbolResolver::new(db.clone()),
        QuoteFetcher::new(provider.clone()),
        cache.clone(),
        registry.clone(),
        config.update_interval_secs,
    );

    // Fetch once before the listeners come up so the first clients get
    // real prices immediately.
    updater.prime().await;
    tokio::spawn(updater.run());

    // Start background tasks
    start_background_tasks(registry.clone(), cache.clone()).await;

    // Start API server
    let api_state = ApiState {
        db: db.clone(),
        cache: cache.clone(),
        registry: registry.clone(),
        provider: provider.clone(),
    };

    let api_router = create_api_router(api_state).layer(CorsLayer::permissive()); // Enable CORS for web clients

    let api_bind_address = config.api_bind_address.clone();
    let api_listener = TcpListener::bind(&api_bind_address).await?;
    info!("🌐 HTTP API server running at http://{}", api_bind_address);

    let api_server = async move { axum::serve(api_listener, api_router).await };

    // Start WebSocket server
    let ws_bind_address = config.ws_bind_address.clone();
    let ws_listener = TcpListener::bind(&ws_bind_address).await?;
    info!("🚀 WebSocket server running at ws://{}", ws_bind_address);
    info!("🔗 Live price stream: ws://{}/ws", ws_bind_address);

    let ws_registry = registry.clone();
    let ws_cache = cache.clone();

    // WebSocket connection loop
    let websocket_server = async move {
        info!("Ready to accept WebSocket connections");

        while let Ok((stream, addr)) = ws_listener.accept().await {
            let handler =
                WebSocketHandler::new(ws_registry.clone(), ws_cache.clone(), addr.to_string());

            tokio::spawn(async move {
                handler.handle_connection(stream).await;
            });
        }
    };

    // Run both servers concurrently
    info!("🎯 Starting WebSocket and HTTP API servers...");
    tokio::select! {
        result = api_server => {
            error!("API server stopped: {:?}", result);
        }
        _ = websocket_server => {
            error!("WebSocket server stopped");
        }
    }

    Ok(())
}

async fn start_background_tasks(registry: Arc<ClientRegistry>, cache: Arc<PriceCache>) {
    // Stats task
    tokio::spawn(async move {
        let mut interval_timer = interval(Duration::from_secs(STATS_INTERVAL_SECS));

        loop {
            interval_timer.tick().await;
            let clients = registry.client_count();
            let symbols = cache.symbol_count();
            let priced = cache.priced_count();

            if clients > 0 || symbols > 0 {
                info!(
                    "Stats - Clients: {}, Symbols: {}, Priced: {}",
                    clients, symbols, priced
                );
            }
        }
    });

    info!(
        "📈 Started stats monitoring task (every {} seconds)",
        STATS_INTERVAL_SECS
    );
}
