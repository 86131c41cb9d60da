use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::live::symbols::normalize_symbol;
use crate::live::{ClientRegistry, LivePricesMessage, PriceCache};
use crate::quotes::{Quote, QuoteProvider};
use crate::store::{Database, Investment};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<Database>,
    pub cache: Arc<PriceCache>,
    pub registry: Arc<ClientRegistry>,
    pub provider: Arc<dyn QuoteProvider>,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistRequest {
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub success: bool,
    pub message: String,
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvestmentRequest {
    pub symbol: String,
    pub quantity: f64,
    pub buy_price: f64,
}

#[derive(Debug, Serialize)]
pub struct InvestmentResponse {
    pub success: bool,
    pub message: String,
    pub investment: Option<Investment>,
}

#[derive(Debug, Serialize)]
pub struct InvestmentListResponse {
    pub success: bool,
    pub investments: Vec<Investment>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub success: bool,
    pub message: String,
    pub quote: Option<Quote>,
}

fn store_error_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::InvalidSymbol(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// GET /api/health - Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "stockcast_api",
        "timestamp": chrono::Utc::now()
    }))
}

// GET /api/prices - Latest cached snapshot, same shape as the WS frame
pub async fn get_prices(State(state): State<ApiState>) -> Json<LivePricesMessage> {
    Json(LivePricesMessage::from_snapshot(&state.cache.snapshot()))
}

// GET /api/stats - Connection and cache counters
pub async fn get_stats(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let snapshot = state.cache.snapshot();
    Json(serde_json::json!({
        "connected_clients": state.registry.client_count(),
        "tracked_symbols": snapshot.prices.len(),
        "priced_symbols": snapshot.prices.values().filter(|p| p.is_some()).count(),
        "last_updated": snapshot.last_updated
    }))
}

// GET /api/stocks/{symbol} - Live single-symbol quote from the provider
pub async fn get_stock(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<StockResponse>, (StatusCode, Json<StockResponse>)> {
    let symbol = normalize_symbol(&symbol).ok_or((
        StatusCode::BAD_REQUEST,
        Json(StockResponse {
            success: false,
            message: "Invalid symbol".to_string(),
            quote: None,
        }),
    ))?;

    match state.provider.quote_single(&symbol).await {
        Ok(Some(quote)) => Ok(Json(StockResponse {
            success: true,
            message: "Quote retrieved successfully".to_string(),
            quote: Some(quote),
        })),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(StockResponse {
                success: false,
                message: format!("No quote available for {}", symbol),
                quote: None,
            }),
        )),
        Err(e) => {
            warn!("Quote lookup failed for {}: {}", symbol, e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(StockResponse {
                    success: false,
                    message: "Quote provider unavailable".to_string(),
                    quote: None,
                }),
            ))
        }
    }
}

// GET /api/watchlist/{user_id} - Get a user's watchlist
pub async fn get_watchlist(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<WatchlistResponse>, (StatusCode, Json<WatchlistResponse>)> {
    match state.db.watchlist_for_user(&user_id) {
        Ok(symbols) => Ok(Json(WatchlistResponse {
            success: true,
            message: "Watchlist retrieved successfully".to_string(),
            symbols,
        })),
        Err(e) => {
            error!("Failed to load watchlist for {}: {}", user_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WatchlistResponse {
                    success: false,
                    message: "Failed to load watchlist".to_string(),
                    symbols: Vec::new(),
                }),
            ))
        }
    }
}

// POST /api/watchlist/{user_id} - Add a symbol to a user's watchlist
pub async fn add_watchlist_symbol(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(request): Json<WatchlistRequest>,
) -> Result<Json<WatchlistResponse>, (StatusCode, Json<WatchlistResponse>)> {
    let added = state
        .db
        .watchlist_add(&user_id, &request.symbol)
        .map_err(|e| {
            warn!("Failed to add {} for {}: {}", request.symbol, user_id, e);
            (
                store_error_status(&e),
                Json(WatchlistResponse {
                    success: false,
                    message: e.to_string(),
                    symbols: Vec::new(),
                }),
            )
        })?;

    let symbols = state.db.watchlist_for_user(&user_id).unwrap_or_default();
    let message = if added {
        info!("Added {} to watchlist for {}", request.symbol, user_id);
        "Symbol added to watchlist".to_string()
    } else {
        "Symbol already on watchlist".to_string()
    };

    Ok(Json(WatchlistResponse {
        success: true,
        message,
        symbols,
    }))
}

// DELETE /api/watchlist/{user_id}/{symbol} - Remove a watchlist symbol
pub async fn remove_watchlist_symbol(
    State(state): State<ApiState>,
    Path((user_id, symbol)): Path<(String, String)>,
) -> Result<Json<WatchlistResponse>, (StatusCode, Json<WatchlistResponse>)> {
    match state.db.watchlist_remove(&user_id, &symbol) {
        Ok(true) => {
            info!("Removed {} from watchlist for {}", symbol, user_id);
            let symbols = state.db.watchlist_for_user(&user_id).unwrap_or_default();
            Ok(Json(WatchlistResponse {
                success: true,
                message: "Symbol removed from watchlist".to_string(),
                symbols,
            }))
        }
        Ok(false) => Err((
            StatusCode::NOT_FOUND,
            Json(WatchlistResponse {
                success: false,
                message: "Symbol not on watchlist".to_string(),
                symbols: Vec::new(),
            }),
        )),
        Err(e) => {
            error!("Failed to remove {} for {}: {}", symbol, user_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WatchlistResponse {
                    success: false,
                    message: "Failed to update watchlist".to_string(),
                    symbols: Vec::new(),
                }),
            ))
        }
    }
}

// GET /api/portfolio/{user_id}/investments - List a user's holdings
pub async fn get_investments(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<InvestmentListResponse>, (StatusCode, Json<InvestmentListResponse>)> {
    match state.db.investments_for_user(&user_id) {
        Ok(investments) => {
            let total = investments.len();
            Ok(Json(InvestmentListResponse {
                success: true,
                investments,
                total,
            }))
        }
        Err(e) => {
            error!("Failed to load investments for {}: {}", user_id, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InvestmentListResponse {
                    success: false,
                    investments: Vec::new(),
                    total: 0,
                }),
            ))
        }
    }
}

// POST /api/portfolio/{user_id}/investments - Record a new holding
pub async fn record_investment(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(request): Json<InvestmentRequest>,
) -> Result<Json<InvestmentResponse>, (StatusCode, Json<InvestmentResponse>)> {
    if !(request.quantity.is_finite() && request.quantity > 0.0) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(InvestmentResponse {
                success: false,
                message: "Quantity must be positive".to_string(),
                investment: None,
            }),
        ));
    }
    if !(request.buy_price.is_finite() && request.buy_price > 0.0) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(InvestmentResponse {
                success: false,
                message: "Buy price must be positive".to_string(),
                investment: None,
            }),
        ));
    }

    let investment = Investment::new(request.symbol, request.quantity, request.buy_price);
    match state.db.add_investment(&user_id, &investment) {
        Ok(()) => {
            info!(
                "Recorded investment {} in {} for {}",
                investment.id, investment.symbol, user_id
            );
            Ok(Json(InvestmentResponse {
                success: true,
                message: "Investment recorded successfully".to_string(),
                investment: Some(investment),
            }))
        }
        Err(e) => {
            warn!("Failed to record investment for {}: {}", user_id, e);
            Err((
                store_error_status(&e),
                Json(InvestmentResponse {
                    success: false,
                    message: e.to_string(),
                    investment: None,
                }),
            ))
        }
    }
}

// Create the API router
pub fn create_api_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/prices", get(get_prices))
        .route("/stats", get(get_stats))
        .route("/stocks/:symbol", get(get_stock))
        .route("/watchlist/:user_id", get(get_watchlist))
        .route("/watchlist/:user_id", post(add_watchlist_symbol))
        .route("/watchlist/:user_id/:symbol", delete(remove_watchlist_symbol))
        .route("/portfolio/:user_id/investments", get(get_investments))
        .route("/portfolio/:user_id/investments", post(record_investment))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct OfflineProvider;

    #[async_trait]
    impl QuoteProvider for OfflineProvider {
        async fn quote_batch(
            &self,
            _symbols: &[String],
        ) -> Result<HashMap<String, Quote>, ProviderError> {
            Ok(HashMap::new())
        }

        async fn quote_single(&self, symbol: &str) -> Result<Option<Quote>, ProviderError> {
            if symbol == "AAPL" {
                Ok(Some(Quote {
                    symbol: symbol.to_string(),
                    price: 150.25,
                    currency: "USD".to_string(),
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn test_state() -> ApiState {
        ApiState {
            db: Arc::new(Database::open_in_memory().unwrap()),
            cache: Arc::new(PriceCache::new()),
            registry: Arc::new(ClientRegistry::new()),
            provider: Arc::new(OfflineProvider),
        }
    }

    #[tokio::test]
    async fn test_watchlist_round_trip_through_handlers() {
        let state = test_state();

        let response = add_watchlist_symbol(
            State(state.clone()),
            Path("u1".to_string()),
            Json(WatchlistRequest {
                symbol: "aapl".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(response.0.success);
        assert_eq!(response.0.symbols, vec!["AAPL".to_string()]);

        let response = remove_watchlist_symbol(
            State(state.clone()),
            Path(("u1".to_string(), "AAPL".to_string())),
        )
        .await
        .unwrap();
        assert!(response.0.symbols.is_empty());

        let err = remove_watchlist_symbol(
            State(state),
            Path(("u1".to_string(), "AAPL".to_string())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blank_watchlist_symbol_is_rejected() {
        let err = add_watchlist_symbol(
            State(test_state()),
            Path("u1".to_string()),
            Json(WatchlistRequest {
                symbol: "   ".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_positive_investment_is_rejected() {
        let err = record_investment(
            State(test_state()),
            Path("u1".to_string()),
            Json(InvestmentRequest {
                symbol: "AAPL".to_string(),
                quantity: 0.0,
                buy_price: 150.0,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_recorded_investment_shows_up_in_the_listing() {
        let state = test_state();

        let response = record_investment(
            State(state.clone()),
            Path("u1".to_string()),
            Json(InvestmentRequest {
                symbol: "msft".to_string(),
                quantity: 4.0,
                buy_price: 300.0,
            }),
        )
        .await
        .unwrap();
        assert_eq!(
            response.0.investment.as_ref().map(|i| i.symbol.as_str()),
            Some("MSFT")
        );

        let listing = get_investments(State(state), Path("u1".to_string()))
            .await
            .unwrap();
        assert_eq!(listing.0.total, 1);
        assert_eq!(listing.0.investments[0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn test_stock_lookup_hits_and_misses() {
        let state = test_state();

        let hit = get_stock(State(state.clone()), Path("AAPL".to_string()))
            .await
            .unwrap();
        assert_eq!(hit.0.quote.as_ref().map(|q| q.price), Some(150.25));

        let miss = get_stock(State(state), Path("NOSUCH".to_string()))
            .await
            .unwrap_err();
        assert_eq!(miss.0, StatusCode::NOT_FOUND);
    }
}
