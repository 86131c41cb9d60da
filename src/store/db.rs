//! SQLite persistence for user holdings and watchlists.
//!
//! The wider platform owns buy/sell flows, balances and currency
//! conversion; this store only keeps the rows the broadcast service
//! needs to answer "which symbols does anyone care about right now".
//! Uses `rusqlite` with the `bundled` feature so no system SQLite is
//! required.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: String,
    pub symbol: String,
    pub quantity: f64,
    pub buy_price: f64,
    pub buy_date: DateTime<Utc>,
}

impl Investment {
    pub fn new(symbol: String, quantity: f64, buy_price: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.trim().to_uppercase(),
            quantity,
            buy_price,
            buy_date: Utc::now(),
        }
    }
}

/// Thread-safe wrapper around a SQLite connection.
/// `Mutex<Connection>` makes it `Send + Sync` for `Arc` sharing.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories and the tables if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS investments (
                id        TEXT PRIMARY KEY,
                user_id   TEXT NOT NULL,
                symbol    TEXT NOT NULL,
                quantity  REAL NOT NULL,
                buy_price REAL NOT NULL,
                buy_date  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_investments_user
                ON investments(user_id);
            CREATE TABLE IF NOT EXISTS watchlists (
                user_id TEXT NOT NULL,
                symbol  TEXT NOT NULL,
                PRIMARY KEY (user_id, symbol)
            );",
        )?;
        Ok(())
    }

    /// Every distinct symbol held in any portfolio.
    pub fn portfolio_symbols(&self) -> Result<HashSet<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare("SELECT DISTINCT symbol FROM investments")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut symbols = HashSet::new();
        for row in rows {
            symbols.insert(row?);
        }
        Ok(symbols)
    }

    /// Every distinct symbol on any user's watchlist.
    pub fn watchlist_symbols(&self) -> Result<HashSet<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare("SELECT DISTINCT symbol FROM watchlists")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut symbols = HashSet::new();
        for row in rows {
            symbols.insert(row?);
        }
        Ok(symbols)
    }

    pub fn add_investment(&self, user_id: &str, investment: &Investment) -> Result<(), StoreError> {
        let symbol = investment.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(StoreError::InvalidSymbol(investment.symbol.clone()));
        }

        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        conn.execute(
            "INSERT INTO investments (id, user_id, symbol, quantity, buy_price, buy_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                investment.id,
                user_id,
                symbol,
                investment.quantity,
                investment.buy_price,
                investment.buy_date.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn investments_for_user(&self, user_id: &str) -> Result<Vec<Investment>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, symbol, quantity, buy_price, buy_date
             FROM investments WHERE user_id = ?1 ORDER BY buy_date",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut investments = Vec::new();
        for row in rows {
            let (id, symbol, quantity, buy_price, buy_date) = row?;
            let buy_date = buy_date
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now());
            investments.push(Investment {
                id,
                symbol,
                quantity,
                buy_price,
                buy_date,
            });
        }
        Ok(investments)
    }

    pub fn watchlist_for_user(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT symbol FROM watchlists WHERE user_id = ?1 ORDER BY symbol",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row?);
        }
        Ok(symbols)
    }

    /// Adds a symbol to a user's watchlist. Returns false when it was
    /// already present (add-to-set semantics).
    pub fn watchlist_add(&self, user_id: &str, symbol: &str) -> Result<bool, StoreError> {
        let normalized = symbol.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(StoreError::InvalidSymbol(symbol.to_string()));
        }

        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO watchlists (user_id, symbol) VALUES (?1, ?2)",
            params![user_id, normalized],
        )?;
        Ok(changed > 0)
    }

    /// Removes a symbol from a user's watchlist. Returns false when the
    /// symbol was not on the list.
    pub fn watchlist_remove(&self, user_id: &str, symbol: &str) -> Result<bool, StoreError> {
        let normalized = symbol.trim().to_uppercase();
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        let changed = conn.execute(
            "DELETE FROM watchlists WHERE user_id = ?1 AND symbol = ?2",
            params![user_id, normalized],
        )?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
impl Database {
    /// Test hook for breaking the schema (e.g. dropping a table to make
    /// one feed fail while the other keeps working).
    pub fn raw_execute(&self, sql: &str) {
        self.conn.lock().unwrap().execute_batch(sql).unwrap();
    }
}
