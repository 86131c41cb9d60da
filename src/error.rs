use thiserror::Error;

/// Failures raised by the holdings/watchlist store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Failures raised by the market-quote provider client.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("quote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    BadResponse(String),
}
