use std::env;

use anyhow::{Context, Result};

// ============================================================================
// Configuration
// ============================================================================
//
// Environment-based configuration with local defaults; a .env file is
// honored when present.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// Bootstrap servers of the message broker.
    pub broker_servers: String,
    pub http_host: String,
    pub http_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let broker_servers =
            env::var("BROKER_SERVERS").unwrap_or_else(|_| "127.0.0.1:9092".to_string());
        let http_host = env::var("HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let http_port =
            parse_port(&env::var("HTTP_PORT").unwrap_or_else(|_| "3001".to_string()))?;

        Ok(Self {
            broker_servers,
            http_host,
            http_port,
        })
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.parse::<u16>()
        .with_context(|| format!("invalid HTTP_PORT: {raw}"))
}
