//! Shared test fixtures.
//!
//! RSA keygen dominates test runtime, so keypairs are generated once per
//! email and cached for the whole test process.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::crypto::{self, KeyPair};
use crate::machine::{CastOutcome, CastVote, NewPoll, NewVoter, VoteError, VotingMachine};
use crate::types::{Poll, Voter};

/// Fixed "wall clock" for deterministic windows.
pub(crate) const NOW: i64 = 1_700_000_000;

/// Difficulty 2 keeps mining fast under test.
pub(crate) const TEST_DIFFICULTY: usize = 2;

/// Returns the cached keypair for an email, generating it on first use.
pub(crate) fn keys_for(email: &str) -> KeyPair {
    static KEYS: OnceLock<Mutex<HashMap<String, KeyPair>>> = OnceLock::new();
    let cache = KEYS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
    cache
        .entry(email.to_string())
        .or_insert_with(|| crypto::generate_keypair().expect("keygen should succeed"))
        .clone()
}

/// A machine with test difficulty and the default mining threshold.
pub(crate) fn fixture() -> VotingMachine {
    VotingMachine::new(TEST_DIFFICULTY, 5, NOW - 60)
}

/// Registers a voter with a cached keypair.
pub(crate) fn register(machine: &VotingMachine, email: &str, name: &str) -> Voter {
    let keys = keys_for(email);
    machine
        .register_voter(
            NewVoter {
                name: name.to_string(),
                email: email.to_string(),
                department: None,
                voter_id: crypto::voter_id_for_email(email),
                public_key: keys.public_pem,
            },
            NOW - 30,
        )
        .expect("registration should succeed")
}

/// Creates a poll starting at [`NOW`] with a one-hour window.
pub(crate) fn start_poll(
    machine: &VotingMachine,
    options: &[&str],
    allow_multiple_votes: bool,
    is_anonymous: bool,
) -> Poll {
    machine
        .create_poll(
            NewPoll {
                title: "Language of the year".to_string(),
                description: "Pick the language for next year's stack".to_string(),
                options: options.iter().map(|s| s.to_string()).collect(),
                creator: "admin".to_string(),
                duration_hours: 1,
                eligible_voters: Vec::new(),
                allow_multiple_votes,
                is_anonymous,
            },
            NOW,
        )
        .expect("poll creation should succeed")
}

/// Casts a properly signed ballot for `voter`.
pub(crate) fn cast_signed(
    machine: &VotingMachine,
    poll: &Poll,
    voter: &Voter,
    choice: &str,
) -> Result<CastOutcome, VoteError> {
    let keys = keys_for(&voter.email);
    let message = crypto::vote_message(&poll.poll_id, &voter.voter_id, choice);
    let signature = crypto::sign(&message, &keys.private_pem).expect("signing should succeed");
    machine.cast_vote(
        CastVote {
            poll_id: poll.poll_id,
            voter_id: voter.voter_id.clone(),
            choice: choice.to_string(),
            signature: Some(signature),
        },
        NOW,
    )
}
