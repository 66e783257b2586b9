use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: String,
    pub poll_interval: Duration,
    pub vimetop_base_url: String,
    pub telegram_api_base_url: String,
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").context("BOT_TOKEN must be set")?;

        Ok(Self {
            bot_token,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://bot_database.db".to_string()),
            poll_interval: Duration::from_secs(
                env::var("STATUS_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            vimetop_base_url: env::var("VIMETOP_BASE_URL")
                .unwrap_or_else(|_| "https://vimetop.ru".to_string()),
            telegram_api_base_url: env::var("TELEGRAM_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            fetch_timeout: Duration::from_secs(
                env::var("FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
        })
    }
}
