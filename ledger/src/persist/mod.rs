//! Persistence: durable sinks and the background reconciler.
//!
//! Two independent sinks can be configured: a relational store mirrored
//! every 60 s and a key/value cache mirrored every 30 s. Either, both, or
//! neither may be present. Persistence failures are logged and retried on
//! the next tick; they never abort an in-memory operation. On boot the
//! relational store rehydrates the in-memory registries and the chain.

pub mod cache;
pub mod postgres;
pub mod reconciler;

use std::fmt;

use crate::chain::ChainError;

pub use cache::{CacheStore, CACHE_CHAIN_KEY, CACHE_POLLS_KEY, CACHE_VOTERS_KEY};
pub use postgres::PgStore;
pub use reconciler::{rehydrate, Reconciler, RehydrationSummary};

/// Errors from the durable sinks and the rehydration path.
#[derive(Debug)]
pub enum PersistError {
    /// Relational store failure.
    Database(sqlx::Error),
    /// Cache store failure.
    Cache(redis::RedisError),
    /// A persisted row could not be decoded into a domain type.
    Corrupt(String),
    /// The rehydrated chain failed integrity verification.
    Chain(ChainError),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Database(e) => write!(f, "database error: {e}"),
            PersistError::Cache(e) => write!(f, "cache error: {e}"),
            PersistError::Corrupt(msg) => write!(f, "corrupt persisted data: {msg}"),
            PersistError::Chain(e) => write!(f, "rehydrated chain rejected: {e}"),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<sqlx::Error> for PersistError {
    fn from(e: sqlx::Error) -> Self {
        PersistError::Database(e)
    }
}

impl From<redis::RedisError> for PersistError {
    fn from(e: redis::RedisError) -> Self {
        PersistError::Cache(e)
    }
}

impl From<ChainError> for PersistError {
    fn from(e: ChainError) -> Self {
        PersistError::Chain(e)
    }
}
