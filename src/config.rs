// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Competition policy knobs (entry fee, prize split, daily quota, score cap,
//! time zone offset) live here so they are deployment decisions rather than
//! hardcoded constants.

use std::env;

/// Queue name expected in the scheduler header for `/tasks/*` calls.
pub const MAINTENANCE_QUEUE_NAME: &str = "ledger-maintenance";

/// How many outbox events one delivery tick drains.
pub const OUTBOX_BATCH_SIZE: usize = 100;

/// Prize split in whole percent of the monthly pool; the house keeps the
/// remainder (including rounding residue).
#[derive(Debug, Clone, Copy)]
pub struct PrizeSplit {
    pub first_pct: u8,
    pub second_pct: u8,
    pub third_pct: u8,
}

impl PrizeSplit {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let total = self.first_pct as u16 + self.second_pct as u16 + self.third_pct as u16;
        if total > 100 {
            return Err(ConfigError::Invalid("prize split exceeds 100%"));
        }
        Ok(())
    }
}

impl Default for PrizeSplit {
    /// Current competition policy: 40/15/5, house keeps 40.
    fn default() -> Self {
        Self {
            first_pct: 40,
            second_pct: 15,
            third_pct: 5,
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Service ---
    /// Server port
    pub port: u16,
    /// Game frontend URL, for CORS
    pub frontend_url: String,
    /// Store backend: "memory" or "firestore"
    pub store_backend: String,
    /// GCP project ID (firestore backend only)
    pub gcp_project_id: String,
    /// Bound on any single store operation, milliseconds
    pub store_timeout_ms: u64,
    /// Notification sink for outbox events (bot layer); log-only when unset
    pub notify_sink_url: Option<String>,

    // --- Competition policy ---
    /// Monthly entry fee in currency minor units
    pub entry_fee_minor: i64,
    /// ISO currency code for payments and payouts
    pub currency: String,
    /// Score submissions allowed per player per day
    pub daily_attempt_quota: u32,
    /// Optional score validation cap; None means no upper bound
    pub max_score: Option<u32>,
    /// Competition time zone as minutes east of UTC
    pub tz_offset_minutes: i32,
    /// Pool percentages for ranks 1-3
    pub prize_split: PrizeSplit,

    // --- Secrets ---
    /// HS256 key for game-session tokens
    pub jwt_signing_key: Vec<u8>,
    /// Shared key the bot layer presents on /auth/session
    pub bot_api_key: String,
    /// Unguessable path segment for the gateway webhook
    pub webhook_path_uuid: String,
    /// HMAC secret for gateway webhook signatures
    pub webhook_secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let prize_split = PrizeSplit {
            first_pct: parse_env("PRIZE_FIRST_PCT", 40)?,
            second_pct: parse_env("PRIZE_SECOND_PCT", 15)?,
            third_pct: parse_env("PRIZE_THIRD_PCT", 5)?,
        };
        prize_split.validate()?;

        Ok(Self {
            port: parse_env("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            store_backend: env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            store_timeout_ms: parse_env("STORE_TIMEOUT_MS", 5_000)?,
            notify_sink_url: env::var("NOTIFY_SINK_URL").ok().filter(|v| !v.is_empty()),

            entry_fee_minor: parse_env("ENTRY_FEE_MINOR", 1_000)?,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "CHF".to_string()),
            daily_attempt_quota: parse_env("DAILY_ATTEMPT_QUOTA", 5)?,
            max_score: match env::var("MAX_SCORE") {
                Ok(v) => Some(v.parse().map_err(|_| ConfigError::Invalid("MAX_SCORE"))?),
                Err(_) => None,
            },
            tz_offset_minutes: parse_env("LEDGER_TZ_OFFSET_MINUTES", 120)?,
            prize_split,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            bot_api_key: env::var("BOT_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("BOT_API_KEY"))?,
            webhook_path_uuid: env::var("WEBHOOK_PATH_UUID")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_PATH_UUID"))?,
            webhook_secret: env::var("WEBHOOK_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_SECRET"))?,
        })
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            store_backend: "memory".to_string(),
            gcp_project_id: "test-project".to_string(),
            store_timeout_ms: 5_000,
            notify_sink_url: None,
            entry_fee_minor: 1_000,
            currency: "CHF".to_string(),
            daily_attempt_quota: 5,
            max_score: None,
            tz_offset_minutes: 120,
            prize_split: PrizeSplit::default(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            bot_api_key: "test_bot_api_key".to_string(),
            webhook_path_uuid: "test-webhook-uuid".to_string(),
            webhook_secret: "test_webhook_secret".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value: {0}")]
    Invalid(&'static str),
}
