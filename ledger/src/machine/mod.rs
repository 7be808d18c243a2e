//! The voting state machine.
//!
//! This module owns all process-wide voting state and is its only access
//! path:
//!
//! - registries of voters and polls,
//! - per-poll participation sets,
//! - the pending-ballot buffer,
//! - and the hash-chained ledger itself.
//!
//! Mutations and reads are split across `state` and `query`; the shared
//! error taxonomy lives in `error`.

pub mod error;
pub mod query;
pub mod state;

pub use error::VoteError;
pub use query::{ChainStats, HistoryEntry, PollStatus, Snapshot, TallyReport};
pub use state::{
    CastOutcome, CastVote, FlushOutcome, NewPoll, NewVoter, VotingMachine,
    DEFAULT_DIFFICULTY, DEFAULT_MINING_THRESHOLD,
};
