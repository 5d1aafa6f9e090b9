use serde::Deserialize;
use std::env;

use crate::constants::{
    DEFAULT_STARTING_BALANCE, INIT_DATA_MAX_AGE_SECS, MIN_TRANSFER_AMOUNT, RECENT_WINNERS_LIMIT,
    SESSION_TTL_SECS, TELEGRAM_API_URL, WINNERS_FEED_CAPACITY,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database (None runs on the in-memory store)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Telegram
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub notify_wins: bool,
    pub init_data_max_age_secs: i64,

    // JWT
    pub jwt_secret: String,
    pub session_ttl_secs: i64,

    // Ledger
    pub starting_balance: i64,
    pub min_transfer_amount: i64,
    pub recent_winners_limit: i64,

    // CORS
    pub cors_allowed_origins: String,
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")?,
            telegram_api_url: env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| TELEGRAM_API_URL.to_string()),
            notify_wins: env::var("NOTIFY_WINS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            init_data_max_age_secs: env::var("INIT_DATA_MAX_AGE_SECS")
                .unwrap_or_else(|_| INIT_DATA_MAX_AGE_SECS.to_string())
                .parse()?,

            jwt_secret: env::var("JWT_SECRET")?,
            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| SESSION_TTL_SECS.to_string())
                .parse()?,

            starting_balance: env::var("STARTING_BALANCE")
                .unwrap_or_else(|_| DEFAULT_STARTING_BALANCE.to_string())
                .parse()?,
            min_transfer_amount: env::var("MIN_TRANSFER_AMOUNT")
                .unwrap_or_else(|_| MIN_TRANSFER_AMOUNT.to_string())
                .parse()?,
            recent_winners_limit: env::var("RECENT_WINNERS_LIMIT")
                .unwrap_or_else(|_| RECENT_WINNERS_LIMIT.to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram_bot_token.trim().is_empty() {
            anyhow::bail!("TELEGRAM_BOT_TOKEN is empty");
        }
        if self.jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET is empty");
        }
        if self.session_ttl_secs <= 0 {
            anyhow::bail!("SESSION_TTL_SECS must be > 0");
        }
        if self.starting_balance < 0 {
            anyhow::bail!("STARTING_BALANCE must not be negative");
        }
        if self.min_transfer_amount <= 0 {
            anyhow::bail!("MIN_TRANSFER_AMOUNT must be > 0");
        }
        let max_winners = WINNERS_FEED_CAPACITY as i64;
        if self.recent_winners_limit <= 0 || self.recent_winners_limit > max_winners {
            anyhow::bail!(
                "RECENT_WINNERS_LIMIT must be between 1 and {}",
                WINNERS_FEED_CAPACITY
            );
        }

        if self.init_data_max_age_secs == 0 {
            tracing::warn!("initData age check disabled (INIT_DATA_MAX_AGE_SECS=0)");
        }
        if self.jwt_secret.contains("secret") {
            tracing::warn!("Detected dev credentials in config");
        }
        if self.database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; balances will not survive a restart");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "test".to_string(),
        database_url: None,
        database_max_connections: 1,
        telegram_bot_token: "123456:TEST-BOT-TOKEN".to_string(),
        telegram_api_url: TELEGRAM_API_URL.to_string(),
        notify_wins: false,
        init_data_max_age_secs: INIT_DATA_MAX_AGE_SECS,
        jwt_secret: "test-signing-key".to_string(),
        session_ttl_secs: SESSION_TTL_SECS,
        starting_balance: DEFAULT_STARTING_BALANCE,
        min_transfer_amount: MIN_TRANSFER_AMOUNT,
        recent_winners_limit: RECENT_WINNERS_LIMIT,
        cors_allowed_origins: "*".to_string(),
    }
}
