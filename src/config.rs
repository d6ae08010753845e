//! Service configuration
//!
//! One YAML document covers the whole service: market identity, auth scheme,
//! quote-feed endpoint, store URIs, logging, and the session timezone.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Complete service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Market the engine trades, e.g. `china_a_market`.
    pub market_name: String,
    pub auth: AuthConfig,
    pub quotes: QuotesConfig,
    pub stores: StoreConfig,
    pub log: LogConfig,
    pub scheduler: SchedulerConfig,
    /// UTC offset of the trading session clock (+8 for A-shares).
    pub session_utc_offset_hours: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            market_name: "china_a_market".to_string(),
            auth: AuthConfig::default(),
            quotes: QuotesConfig::default(),
            stores: StoreConfig::default(),
            log: LogConfig::default(),
            scheduler: SchedulerConfig::default(),
            session_utc_offset_hours: 8,
        }
    }
}

impl AppConfig {
    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        Ok(config)
    }
}

/// Bearer-token scheme: `Authorization: <prefix> <token>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_prefix: String,
    pub mode: AuthMode,
    pub jwt: JwtConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_prefix: "Token".to_string(),
            mode: AuthMode::Jwt,
            jwt: JwtConfig::default(),
        }
    }
}

/// How the bearer token carries the user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthMode {
    /// Signed JWT with `id`, `exp`, `subject=access`.
    Jwt,
    /// The token IS the user id. Development only.
    Uid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    /// Signing algorithm name, e.g. `HS256`.
    pub algorithm: String,
    pub access_token_minutes: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "secret".to_string(),
            algorithm: "HS256".to_string(),
            access_token_minutes: 60 * 24,
        }
    }
}

/// Level-1 tick feed endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotesConfig {
    /// Base URL of the hq text endpoint; `mock` selects the in-process
    /// scriptable provider.
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            base_url: "mock".to_string(),
            timeout_ms: 2_000,
        }
    }
}

/// Store endpoints, consumed by the deployment's adapter wiring.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub document_uri: String,
    pub cache_uri: String,
    pub encoding: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            document_uri: "memory://".to_string(),
            cache_uri: "memory://".to_string(),
            encoding: "utf-8".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_dir: String,
    pub log_file: String,
    /// `hourly`, `daily`, or anything else for a single file.
    pub rotation: String,
    pub log_level: String,
    pub use_json: bool,
    pub enable_tracing: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_file: "papertrade.log".to_string(),
            rotation: "daily".to_string(),
            log_level: "info".to_string(),
            use_json: false,
            enable_tracing: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between session-edge checks.
    pub tick_secs: u64,
    /// Seconds between in-session asset syncs.
    pub sync_user_assets_secs: u64,
    /// Advisory lockfile so a single process runs the timers.
    pub jobs_lock_path: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            sync_user_assets_secs: 300,
            jobs_lock_path: ".papertrade-jobs.lock".to_string(),
        }
    }
}
