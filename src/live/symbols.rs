use std::collections::HashSet;
use std::sync::Arc;

use log::error;

use crate::store::Database;

// Internally priced pseudo-instruments. These never go to the external
// quote provider; their NAVs are simulated elsewhere in the platform.
pub const SIMULATED_FUND_IDS: [&str; 20] = [
    "UTINIFTY",
    "PARA-FLEXI",
    "AXIS-BLUE",
    "QUAN-SMALL",
    "PGIM-MID",
    "VTSAX-SIM",
    "MIRAE-LARGE",
    "SBI-BLUE",
    "HDFC-MID",
    "KOTAK-EMG",
    "NIPPON-SMALL",
    "ICICI-PRU-BLUE",
    "DSP-FLEXI",
    "EDEL-MID",
    "INV-CONTRA",
    "FRANK-BLUE",
    "TATA-DIGITAL",
    "ICICI-TECH",
    "SBI-CONTRA",
    "HDFC-FLEXI",
];

pub fn is_simulated_fund(symbol: &str) -> bool {
    SIMULATED_FUND_IDS.contains(&symbol)
}

pub fn normalize_symbol(raw: &str) -> Option<String> {
    let candidate = raw.trim().to_uppercase();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate)
    }
}

// Computes the set of symbols worth quoting: everything held in any
// portfolio plus everything on any watchlist, minus simulated funds.
// Recomputed from scratch on every call; nothing is tracked between
// calls.
pub struct ActiveSymbolResolver {
    db: Arc<Database>,
}

impl ActiveSymbolResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn resolve(&self) -> HashSet<String> {
        let mut raw: HashSet<String> = HashSet::new();

        // One feed failing must not cost us the other feed's symbols.
        match self.db.portfolio_symbols() {
            Ok(symbols) => raw.extend(symbols),
            Err(e) => error!("Error fetching symbols from portfolios: {}", e),
        }

        match self.db.watchlist_symbols() {
            Ok(symbols) => raw.extend(symbols),
            Err(e) => error!("Error fetching symbols from watchlists: {}", e),
        }

        raw.iter()
            .filter_map(|s| normalize_symbol(s))
            .filter(|s| !is_simulated_fund(s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Investment;

    fn resolver_with_db() -> (ActiveSymbolResolver, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (ActiveSymbolResolver::new(db.clone()), db)
    }

    #[test]
    fn test_empty_sources_resolve_to_empty_set() {
        let (resolver, _db) = resolver_with_db();
        assert!(resolver.resolve().is_empty());
    }

    #[test]
    fn test_watchlist_only_resolution() {
        let (resolver, db) = resolver_with_db();
        db.watchlist_add("alice", "AAPL").unwrap();
        db.watchlist_add("bob", "MSFT").unwrap();

        let expected: HashSet<String> =
            ["AAPL".to_string(), "MSFT".to_string()].into_iter().collect();
        assert_eq!(resolver.resolve(), expected);
    }

    #[test]
    fn test_holdings_and_watchlists_are_unioned_and_deduplicated() {
        let (resolver, db) = resolver_with_db();
        db.add_investment("alice", &Investment::new("AAPL".to_string(), 1.0, 150.0))
            .unwrap();
        db.add_investment("bob", &Investment::new("RELIANCE.NS".to_string(), 2.0, 2900.0))
            .unwrap();
        db.watchlist_add("alice", "AAPL").unwrap();
        db.watchlist_add("carol", "TSLA").unwrap();

        let resolved = resolver.resolve();
        assert_eq!(resolved.len(), 3);
        assert!(resolved.contains("AAPL"));
        assert!(resolved.contains("RELIANCE.NS"));
        assert!(resolved.contains("TSLA"));
    }

    #[test]
    fn test_simulated_funds_are_excluded() {
        let (resolver, db) = resolver_with_db();
        db.watchlist_add("alice", "AAPL").unwrap();
        db.watchlist_add("alice", "UTINIFTY").unwrap();
        db.add_investment("bob", &Investment::new("HDFC-FLEXI".to_string(), 10.0, 85.0))
            .unwrap();

        let resolved = resolver.resolve();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains("AAPL"));
    }

    #[test]
    fn test_one_broken_feed_degrades_instead_of_failing() {
        let (resolver, db) = resolver_with_db();
        db.watchlist_add("alice", "INFY.NS").unwrap();
        db.raw_execute("DROP TABLE investments;");

        let resolved = resolver.resolve();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains("INFY.NS"));
    }

    #[test]
    fn test_both_feeds_broken_yields_empty_set() {
        let (resolver, db) = resolver_with_db();
        db.raw_execute("DROP TABLE investments; DROP TABLE watchlists;");
        assert!(resolver.resolve().is_empty());
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("  aapl "), Some("AAPL".to_string()));
        assert_eq!(normalize_symbol("msft"), Some("MSFT".to_string()));
        assert_eq!(normalize_symbol("   "), None);
        assert_eq!(normalize_symbol(""), None);
    }
}
