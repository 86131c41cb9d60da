use std::env;

// Server Configuration
pub const DEFAULT_WS_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_API_BIND_ADDRESS: &str = "127.0.0.1:8081";

// Refresh Configuration
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 30;
pub const STATS_INTERVAL_SECS: u64 = 60;

// Storage Configuration
pub const DEFAULT_DB_PATH: &str = "./data/stockcast.db";

pub struct Config {
    pub ws_bind_address: String,
    pub api_bind_address: String,
    pub db_path: String,
    pub update_interval_secs: u64,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            ws_bind_address: env::var("WS_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_WS_BIND_ADDRESS.to_string()),
            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_API_BIND_ADDRESS.to_string()),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            update_interval_secs: env::var("UPDATE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.update_interval_secs == 0 {
            return Err("Update interval must be at least 1 second".to_string());
        }

        if self.ws_bind_address == self.api_bind_address {
            return Err("WebSocket and API servers cannot share a bind address".to_string());
        }

        Ok(())
    }

    pub fn log_config(&self) {
        println!("Server Configuration:");
        println!("  WebSocket Bind Address: {}", self.ws_bind_address);
        println!("  API Bind Address: {}", self.api_bind_address);
        println!("  Database Path: {}", self.db_path);
        println!("  Update Interval: {}s", self.update_interval_secs);
        println!("  Log Level: {}", self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env_fills_defaults() {
        let config = Config::from_env();
        assert!(!config.ws_bind_address.is_empty());
        assert!(!config.api_bind_address.is_empty());
        assert!(!config.db_path.is_empty());
        assert!(config.update_interval_secs > 0);
    }

    #[test]
    fn test_zero_interval_fails_validation() {
        let mut config = Config::from_env();
        config.update_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_bind_address_fails_validation() {
        let mut config = Config::from_env();
        config.ws_bind_address = "127.0.0.1:9000".to_string();
        config.api_bind_address = "127.0.0.1:9000".to_string();
        assert!(config.validate().is_err());
    }
}
