use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use crate::live::cache::{PriceCache, PriceSnapshot};
use crate::live::registry::ClientRegistry;
use crate::live::symbols::ActiveSymbolResolver;
use crate::quotes::QuoteFetcher;

/// The frame every client receives on each refresh cycle. Symbols the
/// vendor could not price map to `null` so the client can tell "no
/// quote" apart from "not tracked".
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LivePricesMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: HashMap<String, Option<f64>>,
    pub last_updated: Option<String>,
}

impl LivePricesMessage {
    pub fn from_snapshot(snapshot: &PriceSnapshot) -> Self {
        Self {
            message_type: "live_prices".to_string(),
            data: snapshot.prices.clone(),
            last_updated: snapshot.last_updated.map(|t| t.to_rfc3339()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Greeting sent once per connection before the first snapshot.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HelloMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub message: String,
}

impl HelloMessage {
    pub fn new() -> Self {
        Self {
            message_type: "hello".to_string(),
            message: "Connected to live price stream".to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub struct PriceUpdater {
    resolver: ActiveSymbolResolver,
    fetcher: QuoteFetcher,
    cache: Arc<PriceCache>,
    registry: Arc<ClientRegistry>,
    interval_secs: u64,
}

impl PriceUpdater {
    pub fn new(
        resolver: ActiveSymbolResolver,
        fetcher: QuoteFetcher,
        cache: Arc<PriceCache>,
        registry: Arc<ClientRegistry>,
        interval_secs: u64,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            cache,
            registry,
            interval_secs,
        }
    }

    /// One full resolve-fetch-cache-broadcast pass. Failures are
    /// logged and contained here so the loop never dies.
    pub async fn run_cycle(&self) {
        let symbols = self.resolver.resolve();
        info!("Refreshing prices for {} active symbol(s)", symbols.len());

        let prices = self.fetcher.fetch(&symbols).await;

        // Replace the snapshot wholesale, then fan the new one out.
        // An empty symbol set still goes through so clients keep
        // getting a heartbeat and a fresh timestamp.
        let snapshot = match self.cache.replace(prices) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Failed to update price cache: {}", e);
                return;
            }
        };

        let message = LivePricesMessage::from_snapshot(&snapshot);
        match message.to_json() {
            Ok(json) => {
                let delivered = self.registry.broadcast(&json);
                if delivered > 0 {
                    info!(
                        "Broadcasted {} price(s) to {} client(s)",
                        snapshot.prices.len(),
                        delivered
                    );
                }
            }
            Err(e) => {
                error!("Failed to serialize price update: {}", e);
            }
        }
    }

    /// Runs the first cycle before the listeners come up so early
    /// connections see real prices instead of an empty snapshot.
    pub async fn prime(&self) {
        info!("Priming price cache with initial fetch");
        self.run_cycle().await;
    }

    pub async fn run(self) {
        let mut timer = tokio::time::interval(Duration::from_secs(self.interval_secs));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the cache was
        // already primed at startup, so consume it before the loop.
        timer.tick().await;

        info!(
            "📊 Price updater running - refresh every {}s",
            self.interval_secs
        );

        loop {
            timer.tick().await;
            self.run_cycle().await;
        }
    }
}
