use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::quotes::provider::QuoteProvider;

pub const QUOTE_CHUNK_SIZE: usize = 30;
// Pause between chunk requests so the vendor does not rate-limit us.
pub const CHUNK_PAUSE_MS: u64 = 400;

pub struct QuoteFetcher {
    provider: Arc<dyn QuoteProvider>,
}

impl QuoteFetcher {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self { provider }
    }

    /// Resolves every requested symbol to a price or `None`. The result
    /// always carries exactly the requested key set, whatever the
    /// vendor did or did not return.
    pub async fn fetch(&self, symbols: &HashSet<String>) -> HashMap<String, Option<f64>> {
        let mut prices = HashMap::with_capacity(symbols.len());
        if symbols.is_empty() {
            return prices;
        }

        let mut ordered: Vec<String> = symbols.iter().cloned().collect();
        ordered.sort();

        let chunk_count = (ordered.len() + QUOTE_CHUNK_SIZE - 1) / QUOTE_CHUNK_SIZE;

        for (idx, chunk) in ordered.chunks(QUOTE_CHUNK_SIZE).enumerate() {
            match self.provider.quote_batch(chunk).await {
                Ok(quotes) => {
                    for symbol in chunk {
                        let price = match quotes.get(symbol) {
                            Some(quote) => Some(quote.price),
                            None => self.fetch_single(symbol).await,
                        };
                        prices.insert(symbol.clone(), price.and_then(sanitize_price));
                    }
                }
                Err(e) => {
                    warn!(
                        "Batch quote request failed for {} symbols: {}",
                        chunk.len(),
                        e
                    );
                    for symbol in chunk {
                        prices.insert(symbol.clone(), None);
                    }
                }
            }

            if idx + 1 < chunk_count {
                tokio::time::sleep(Duration::from_millis(CHUNK_PAUSE_MS)).await;
            }
        }

        prices
    }

    async fn fetch_single(&self, symbol: &str) -> Option<f64> {
        match self.provider.quote_single(symbol).await {
            Ok(Some(quote)) => Some(quote.price),
            Ok(None) => {
                debug!("No quote available for {}", symbol);
                None
            }
            Err(e) => {
                warn!("Single quote request failed for {}: {}", symbol, e);
                None
            }
        }
    }
}

fn sanitize_price(price: f64) -> Option<f64> {
    if price.is_finite() && price > 0.0 {
        Some((price * 100.0).round() / 100.0)
    } else {
        None
    }
}
