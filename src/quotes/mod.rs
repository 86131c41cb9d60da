pub mod fetcher;
pub mod provider;

pub use fetcher::QuoteFetcher;
pub use provider::{Quote, QuoteProvider, YahooQuoteProvider};
