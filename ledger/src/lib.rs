//! Voting ledger library crate.
//!
//! This crate provides the core of the blockchain-backed voting service:
//!
//! - strongly-typed domain records and block payloads (`types`),
//! - the hash-chained, proof-of-work-sealed ledger engine (`chain`),
//! - RSA/PSS crypto primitives and voter-id derivation (`crypto`),
//! - admin credentials and bearer tokens (`identity`),
//! - the voting state machine behind one readers-writer lock (`machine`),
//! - sliding-window rate limiting (`limiter`),
//! - per-field input validation (`validation`),
//! - the persistence reconciler and its sinks (`persist`),
//! - and a top-level node configuration (`config`).
//!
//! The crate is transport-free: it consumes an authenticated caller
//! identity and clock values, and higher-level binaries (the API gateway)
//! compose these pieces into a running service.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod limiter;
pub mod machine;
pub mod persist;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export top-level configuration types.
pub use config::{AuthConfig, MiningConfig, NodeConfig, PersistConfig, RateLimitConfig};

// Re-export the state machine and its operation shapes.
pub use machine::{
    CastOutcome, CastVote, ChainStats, FlushOutcome, HistoryEntry, NewPoll, NewVoter, PollStatus,
    Snapshot, TallyReport, VoteError, VotingMachine,
};

// Re-export the ledger engine.
pub use chain::{Blockchain, ChainError};

// Re-export identity and token types.
pub use identity::{Admin, AdminStore, Claims, IdentityError, Role, TokenService, TOKEN_ISSUER};

// Re-export rate limiting.
pub use limiter::{spawn_sweeper, RateLimit, RateTiers, SlidingWindowLimiter};

// Re-export persistence handles.
pub use persist::{rehydrate, CacheStore, PersistError, PgStore, Reconciler, RehydrationSummary};

// Re-export domain types at the crate root for convenience.
pub use types::*;
