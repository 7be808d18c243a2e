//! Top-level configuration for the voting service core.
//!
//! This module aggregates configuration for:
//!
//! - mining (proof-of-work difficulty, batching threshold),
//! - authentication (JWT secret and lifetime, admin seed credentials),
//! - rate-limit tiers,
//! - persistence sinks (connection strings, mirror intervals).
//!
//! The goal is a single `NodeConfig` that binaries construct from
//! defaults or environment variables. An unset connection string simply
//! disables the corresponding sink.

use std::time::Duration;

use crate::limiter::{RateLimit, RateTiers};
use crate::machine::{DEFAULT_DIFFICULTY, DEFAULT_MINING_THRESHOLD};

/// Mining parameters.
#[derive(Clone, Debug)]
pub struct MiningConfig {
    /// Required hex-zero prefix length on block hashes.
    pub difficulty: usize,
    /// Pending-ballot count that triggers an automatic flush.
    pub mining_threshold: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining_threshold: DEFAULT_MINING_THRESHOLD,
        }
    }
}

/// Authentication and admin-seed parameters.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens.
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub token_lifetime_secs: i64,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // Usable for local development only; deployments override via
            // the environment.
            jwt_secret: "insecure-dev-secret-override-me".to_string(),
            token_lifetime_secs: 24 * 3600,
            admin_username: "admin".to_string(),
            admin_email: "admin@localhost".to_string(),
            admin_password: "admin123456".to_string(),
        }
    }
}

/// Per-tier request rates, all over a shared window.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub strict_per_window: usize,
    pub moderate_per_window: usize,
    pub generous_per_window: usize,
    pub window: Duration,
    /// Cadence of the idle-key sweeper.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strict_per_window: 5,
            moderate_per_window: 30,
            generous_per_window: 100,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Builds the three shared tier limiters.
    pub fn tiers(&self) -> RateTiers {
        RateTiers::new(
            RateLimit {
                max_requests: self.strict_per_window,
                window: self.window,
            },
            RateLimit {
                max_requests: self.moderate_per_window,
                window: self.window,
            },
            RateLimit {
                max_requests: self.generous_per_window,
                window: self.window,
            },
        )
    }
}

/// Persistence sink parameters.
#[derive(Clone, Debug)]
pub struct PersistConfig {
    /// Postgres connection string; `None` disables the relational mirror.
    pub database_url: Option<String>,
    /// Redis connection string; `None` disables the cache mirror.
    pub redis_url: Option<String>,
    /// Cadence of the cache mirror.
    pub cache_interval: Duration,
    /// Cadence of the relational mirror.
    pub database_interval: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            cache_interval: Duration::from_secs(30),
            database_interval: Duration::from_secs(60),
        }
    }
}

/// Aggregate configuration for the core.
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    pub mining: MiningConfig,
    pub auth: AuthConfig,
    pub rate_limits: RateLimitConfig,
    pub persist: PersistConfig,
}

impl NodeConfig {
    /// Reads configuration from the environment, falling back to the
    /// defaults above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("MINING_DIFFICULTY") {
            cfg.mining.difficulty = v;
        }
        if let Some(v) = env_parse::<usize>("MINING_THRESHOLD") {
            cfg.mining.mining_threshold = v;
        }

        if let Ok(v) = std::env::var("JWT_SECRET") {
            if !v.is_empty() {
                cfg.auth.jwt_secret = v;
            }
        }
        if let Some(v) = env_parse::<i64>("JWT_LIFETIME_SECS") {
            cfg.auth.token_lifetime_secs = v;
        }
        if let Ok(v) = std::env::var("ADMIN_USERNAME") {
            if !v.is_empty() {
                cfg.auth.admin_username = v;
            }
        }
        if let Ok(v) = std::env::var("ADMIN_EMAIL") {
            if !v.is_empty() {
                cfg.auth.admin_email = v;
            }
        }
        if let Ok(v) = std::env::var("ADMIN_PASSWORD") {
            if !v.is_empty() {
                cfg.auth.admin_password = v;
            }
        }

        if let Some(v) = env_parse::<usize>("RATE_LIMIT_STRICT") {
            cfg.rate_limits.strict_per_window = v;
        }
        if let Some(v) = env_parse::<usize>("RATE_LIMIT_MODERATE") {
            cfg.rate_limits.moderate_per_window = v;
        }
        if let Some(v) = env_parse::<usize>("RATE_LIMIT_GENEROUS") {
            cfg.rate_limits.generous_per_window = v;
        }

        cfg.persist.database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        cfg.persist.redis_url = std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty());

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}
