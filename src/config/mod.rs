//! Configuration module for the Convivencia backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Base URL of the Phidias platform API
    pub phidias_base_url: String,
    /// Bearer token for the Phidias API (required to sync in production)
    pub phidias_token: Option<String>,
    /// Timeout for a single Phidias request, in seconds
    pub phidias_timeout_secs: u64,
    /// Students per outbound batch; bounds in-flight Phidias requests
    pub sync_batch_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("CONVIVENCIA_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let bind_addr = env::var("CONVIVENCIA_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid CONVIVENCIA_BIND_ADDR format");

        let log_level = env::var("CONVIVENCIA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let phidias_base_url = env::var("PHIDIAS_BASE_URL")
            .unwrap_or_else(|_| "https://phidias.example.edu".to_string());

        let phidias_token = env::var("PHIDIAS_API_TOKEN").ok();

        let phidias_timeout_secs = env::var("PHIDIAS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let sync_batch_size = env::var("SYNC_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(5);

        Self {
            db_path,
            bind_addr,
            log_level,
            phidias_base_url,
            phidias_token,
            phidias_timeout_secs,
            sync_batch_size,
        }
    }
}
