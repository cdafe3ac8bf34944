use std::env;
use std::time::Duration;

use log::{info, warn};

use crate::error::{Error, Result};
use crate::market::registry::default_entries;
use crate::market::{AlpacaCredentials, MarketCalendar, SymbolRegistry, DEFAULT_DATA_URL};
use crate::news::DEFAULT_NEWS_URL;
use crate::scheduler::SchedulerConfig;
use crate::websocket::DEFAULT_MAX_SUBSCRIBERS;

// Server Configuration
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_API_BIND_ADDRESS: &str = "127.0.0.1:3001";
pub const DEFAULT_DEV_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

// Upstream Configuration
pub const DEFAULT_FEED: &str = "iex";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BOOT_TIMEOUT_SECS: u64 = 60;

// Schedule Configuration
pub const DEFAULT_CRYPTO_CLOSE_DELAY_SECS: u64 = 60;
pub const DEFAULT_PRICE_BROADCAST_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_NEWS_BROADCAST_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;

// Broadcast Configuration
pub const BROADCAST_CHANNEL_SIZE: usize = 100;

const MIN_TOKEN_LEN: usize = 16;

pub struct Config {
    pub bind_address: String,
    pub api_bind_address: String,
    pub token: String,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    pub max_subscribers: usize,
    pub symbols_json: Option<String>,
    pub alpaca_key_id: String,
    pub alpaca_secret_key: String,
    pub data_url: String,
    pub feed: String,
    pub news_url: String,
    pub news_api_key: Option<String>,
    pub market_holidays: String,
    pub http_timeout_secs: u64,
    pub boot_timeout_secs: u64,
    pub crypto_close_delay_secs: u64,
    pub price_interval_secs: u64,
    pub news_interval_secs: u64,
    pub stats_interval_secs: u64,
    pub log_level: String,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr + std::fmt::Display + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {}='{}', using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}***", prefix)
}

impl Config {
    pub fn from_env() -> Self {
        let production = var_or("APP_ENV", "development").eq_ignore_ascii_case("production");
        let allowed_origins = if production {
            parse_list(&var_or("PROD_ORIGINS", ""))
        } else {
            parse_list(&var_or("DEV_ORIGINS", DEFAULT_DEV_ORIGINS))
        };

        Self {
            bind_address: var_or("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            api_bind_address: var_or("API_BIND_ADDRESS", DEFAULT_API_BIND_ADDRESS),
            token: var_or("TOKEN", ""),
            production,
            allowed_origins,
            max_subscribers: parse_or("MAX_SUBSCRIBERS", DEFAULT_MAX_SUBSCRIBERS),
            symbols_json: optional_var("SYMBOLS"),
            alpaca_key_id: var_or("ALPACA_KEY_ID", ""),
            alpaca_secret_key: var_or("ALPACA_SECRET_KEY", ""),
            data_url: var_or("ALPACA_DATA_URL", DEFAULT_DATA_URL),
            feed: var_or("ALPACA_FEED", DEFAULT_FEED),
            news_url: var_or("NEWS_API_URL", DEFAULT_NEWS_URL),
            news_api_key: optional_var("NEWS_API_KEY"),
            market_holidays: var_or("MARKET_HOLIDAYS", ""),
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            boot_timeout_secs: parse_or("BOOT_TIMEOUT_SECS", DEFAULT_BOOT_TIMEOUT_SECS),
            crypto_close_delay_secs: parse_or("CRYPTO_CLOSE_DELAY_SECS", DEFAULT_CRYPTO_CLOSE_DELAY_SECS),
            price_interval_secs: parse_or("PRICE_BROADCAST_INTERVAL_SECS", DEFAULT_PRICE_BROADCAST_INTERVAL_SECS),
            news_interval_secs: parse_or("NEWS_BROADCAST_INTERVAL_SECS", DEFAULT_NEWS_BROADCAST_INTERVAL_SECS),
            stats_interval_secs: parse_or("STATS_INTERVAL_SECS", DEFAULT_STATS_INTERVAL_SECS),
            log_level: var_or("RUST_LOG", "info"),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.token.is_empty() {
            return Err("TOKEN must be set".to_string());
        }

        if self.token.len() < MIN_TOKEN_LEN {
            warn!("TOKEN is shorter than {} characters - change for production!", MIN_TOKEN_LEN);
        }

        if self.alpaca_key_id.is_empty() || self.alpaca_secret_key.is_empty() {
            return Err("ALPACA_KEY_ID and ALPACA_SECRET_KEY must be set".to_string());
        }

        if self.production && self.allowed_origins.is_empty() {
            return Err("PROD_ORIGINS must list at least one origin in production".to_string());
        }

        if self.max_subscribers == 0 {
            return Err("MAX_SUBSCRIBERS must be greater than zero".to_string());
        }

        let intervals = [
            ("PRICE_BROADCAST_INTERVAL_SECS", self.price_interval_secs),
            ("NEWS_BROADCAST_INTERVAL_SECS", self.news_interval_secs),
            ("STATS_INTERVAL_SECS", self.stats_interval_secs),
            ("HTTP_TIMEOUT_SECS", self.http_timeout_secs),
            ("BOOT_TIMEOUT_SECS", self.boot_timeout_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(format!("{} must be greater than zero", name));
        }

        self.registry().map_err(|e| e.to_string())?;

        if self.news_api_key.is_none() {
            warn!("NEWS_API_KEY not set, news will stay empty");
        }

        Ok(())
    }

    pub fn registry(&self) -> Result<SymbolRegistry> {
        match &self.symbols_json {
            Some(json) => SymbolRegistry::from_json(json)
                .map_err(|e| Error::Config(format!("SYMBOLS is not a valid symbol list: {}", e))),
            None => SymbolRegistry::new(default_entries()),
        }
    }

    pub fn calendar(&self) -> MarketCalendar {
        MarketCalendar::parse(&self.market_holidays)
    }

    pub fn credentials(&self) -> AlpacaCredentials {
        AlpacaCredentials {
            key_id: self.alpaca_key_id.clone(),
            secret_key: self.alpaca_secret_key.clone(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_secs)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            crypto_close_delay: Duration::from_secs(self.crypto_close_delay_secs),
            price_interval: Duration::from_secs(self.price_interval_secs),
            news_interval: Duration::from_secs(self.news_interval_secs),
            stats_interval: Duration::from_secs(self.stats_interval_secs),
        }
    }

    pub fn log_config(&self) {
        info!("Server Configuration:");
        info!("  Environment: {}", if self.production { "production" } else { "development" });
        info!("  Bind Address: {}", self.bind_address);
        info!("  API Bind Address: {}", self.api_bind_address);
        info!("  Allowed Origins: {:?}", self.allowed_origins);
        info!(
            "  Max Subscribers: {} (further upgrades are refused with 503)",
            self.max_subscribers
        );
        info!("  Symbols: {}", if self.symbols_json.is_some() { "SYMBOLS" } else { "built-in" });
        info!("  Data URL: {} (feed {})", self.data_url, self.feed);
        info!("  Holidays: {}", self.calendar().holiday_count());
        info!(
            "  Intervals: prices {}s, news {}s, stats {}s, crypto close delay {}s",
            self.price_interval_secs, self.news_interval_secs, self.stats_interval_secs, self.crypto_close_delay_secs
        );
        info!("  Token: {}", mask(&self.token));
        info!("  Alpaca Key: {}", mask(&self.alpaca_key_id));
        info!(
            "  News API Key: {}",
            self.news_api_key.as_deref().map(mask).unwrap_or_else(|| "(unset)".to_string())
        );
    }
}
