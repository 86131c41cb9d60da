use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// View of the most recent completed fetch cycle. `last_updated` is
/// `None` only before the first cycle has run.
#[derive(Debug, Clone, Default)]
pub struct PriceSnapshot {
    pub prices: HashMap<String, Option<f64>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PriceSnapshot {
    pub fn is_primed(&self) -> bool {
        self.last_updated.is_some()
    }
}

pub struct PriceCache {
    snapshot: Arc<Mutex<PriceSnapshot>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(PriceSnapshot::default())),
        }
    }

    /// Swaps in a freshly fetched price map and stamps it. Symbols
    /// absent from the new map are gone from the cache entirely;
    /// nothing is merged from earlier cycles.
    pub fn replace(&self, prices: HashMap<String, Option<f64>>) -> Result<PriceSnapshot, String> {
        let mut guard = self
            .snapshot
            .lock()
            .map_err(|_| "Lock poisoned".to_string())?;

        *guard = PriceSnapshot {
            prices,
            last_updated: Some(Utc::now()),
        };

        Ok(guard.clone())
    }

    pub fn snapshot(&self) -> PriceSnapshot {
        self.snapshot
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn symbol_count(&self) -> usize {
        self.snapshot
            .lock()
            .map(|guard| guard.prices.len())
            .unwrap_or(0)
    }

    pub fn priced_count(&self) -> usize {
        self.snapshot
            .lock()
            .map(|guard| guard.prices.values().filter(|p| p.is_some()).count())
            .unwrap_or(0)
    }
}
