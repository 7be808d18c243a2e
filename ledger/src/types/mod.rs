//! Core domain types used by the voting ledger
//!
//! This module defines the records that live on-chain and in the in-memory
//! registries: voters, polls, and ballots, plus the block structure and its
//! tagged payload. The goal is to avoid "naked" JSON values in public APIs
//! and instead use domain-specific structs with one canonical encoding.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod block;
pub mod payload;

pub use block::Block;
pub use payload::{BlockPayload, PayloadError};

/// Voter id written into ballots cast on anonymous polls.
pub const ANONYMOUS_VOTER: &str = "anonymous";

/// A registered voter.
///
/// The voter id is derived deterministically from the email address
/// (see [`crate::crypto::voter_id_for_email`]), which makes duplicate
/// registration checks idempotent. Voters are created once and never
/// removed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Voter {
    /// Stable 16-hex-char identifier derived from the email.
    pub voter_id: String,
    /// Display name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Optional department label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// PEM-encoded RSA public key (SPKI).
    pub public_key: String,
    /// Registration time, seconds since Unix epoch.
    pub registered_at: i64,
}

/// A poll definition.
///
/// A poll is "active" while `start_time <= now < end_time` and "closed"
/// afterwards; it is never removed from the registry. The eligible-voter
/// list is snapshotted at creation time: an empty input list is rewritten
/// to the set of all voters registered at that moment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    /// Poll identifier (UUID v4).
    pub poll_id: Uuid,
    pub title: String,
    pub description: String,
    /// Ordered option strings; pairwise distinct after case-folding.
    pub options: Vec<String>,
    /// Label of the creating admin.
    pub creator: String,
    /// Start of the voting window, seconds since Unix epoch.
    pub start_time: i64,
    /// End of the voting window, seconds since Unix epoch.
    pub end_time: i64,
    /// Voter ids allowed to participate.
    pub eligible_voters: Vec<String>,
    /// Whether one voter may cast more than one ballot.
    pub allow_multiple_votes: bool,
    /// Whether stored ballots are stripped of the voter identity.
    pub is_anonymous: bool,
}

impl Poll {
    /// Returns `true` while the poll accepts votes at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        self.start_time <= now && now < self.end_time
    }

    /// Returns `true` if `choice` is one of the poll's options.
    pub fn has_option(&self, choice: &str) -> bool {
        self.options.iter().any(|o| o == choice)
    }

    /// Returns `true` if `voter_id` may vote on this poll.
    pub fn is_eligible(&self, voter_id: &str) -> bool {
        self.eligible_voters.iter().any(|v| v == voter_id)
    }
}

/// A single cast ballot.
///
/// Ballots are buffered in the pending queue until they are sealed into a
/// `votes` block; thereafter they live only inside that block. On anonymous
/// polls the stored `voter_id` is the literal [`ANONYMOUS_VOTER`] and the
/// signature is dropped, since a PSS signature verifies against exactly one
/// public key and would identify the voter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    /// Ballot identifier (UUID v4).
    pub vote_id: Uuid,
    /// Poll this ballot belongs to.
    pub poll_id: Uuid,
    /// Voter id, or [`ANONYMOUS_VOTER`] on anonymous polls.
    pub voter_id: String,
    /// The chosen option string.
    pub choice: String,
    /// Cast time, seconds since Unix epoch.
    pub timestamp: i64,
    /// Base64 RSA-PSS signature over `poll_id|voter_id|choice`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Ballot {
    /// Returns `true` if this ballot was stored without a voter identity.
    pub fn is_anonymous(&self) -> bool {
        self.voter_id == ANONYMOUS_VOTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_poll() -> Poll {
        Poll {
            poll_id: Uuid::new_v4(),
            title: "Language of the year".to_string(),
            description: "Pick the language you want next year's stack in".to_string(),
            options: vec!["Go".to_string(), "Rust".to_string()],
            creator: "admin".to_string(),
            start_time: 1_700_000_000,
            end_time: 1_700_003_600,
            eligible_voters: vec!["aaaaaaaaaaaaaaaa".to_string()],
            allow_multiple_votes: false,
            is_anonymous: false,
        }
    }

    #[test]
    fn poll_activeness_window_is_half_open() {
        let poll = dummy_poll();
        assert!(!poll.is_active(poll.start_time - 1));
        assert!(poll.is_active(poll.start_time));
        assert!(poll.is_active(poll.end_time - 1));
        assert!(!poll.is_active(poll.end_time));
    }

    #[test]
    fn poll_membership_checks_are_exact() {
        let poll = dummy_poll();
        assert!(poll.has_option("Go"));
        assert!(!poll.has_option("go"));
        assert!(poll.is_eligible("aaaaaaaaaaaaaaaa"));
        assert!(!poll.is_eligible("bbbbbbbbbbbbbbbb"));
    }

    #[test]
    fn ballot_serde_omits_missing_signature() {
        let ballot = Ballot {
            vote_id: Uuid::new_v4(),
            poll_id: Uuid::new_v4(),
            voter_id: ANONYMOUS_VOTER.to_string(),
            choice: "Go".to_string(),
            timestamp: 1_700_000_000,
            signature: None,
        };
        let json = serde_json::to_value(&ballot).expect("ballot should serialize");
        assert!(json.get("signature").is_none());
        assert!(ballot.is_anonymous());
    }
}
