//! The voting state machine: registries, the cast pipeline, and batching.
//!
//! All voting state (voter registry, poll registry, per-poll
//! participation sets, the pending-ballot buffer, and the chain itself)
//! lives behind one readers-writer lock owned by [`VotingMachine`]. Every
//! mutation (register, create poll, cast, flush) takes the write lock, so
//! mining is serialised and block indices stay dense and strictly
//! increasing; reads take the read lock. The machine is the only access
//! path to this state.
//!
//! Time never comes from the machine itself: operations take `now` as a
//! parameter, which keeps the voting-window and tally logic deterministic
//! under test.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use uuid::Uuid;

use crate::chain::{Blockchain, ChainError};
use crate::crypto;
use crate::types::{Ballot, Block, BlockPayload, Poll, Voter, ANONYMOUS_VOTER};

use super::error::VoteError;

/// Default pending-ballot count that triggers an automatic flush.
pub const DEFAULT_MINING_THRESHOLD: usize = 5;

/// Default proof-of-work difficulty (hex-zero prefix length).
pub const DEFAULT_DIFFICULTY: usize = 3;

/// Input for voter registration. The voter id is pre-computed by the
/// caller (deterministically from the email) and the keypair already
/// generated; the machine only records and seals.
#[derive(Clone, Debug)]
pub struct NewVoter {
    pub name: String,
    pub email: String,
    pub department: Option<String>,
    pub voter_id: String,
    pub public_key: String,
}

/// Input for poll creation. Field-level validation happens upstream; the
/// machine snapshots eligibility and seals the definition.
#[derive(Clone, Debug)]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub creator: String,
    pub duration_hours: i64,
    /// Empty list means "all voters registered right now".
    pub eligible_voters: Vec<String>,
    pub allow_multiple_votes: bool,
    pub is_anonymous: bool,
}

/// Input for casting a ballot.
#[derive(Clone, Debug)]
pub struct CastVote {
    pub poll_id: Uuid,
    pub voter_id: String,
    pub choice: String,
    /// Base64 PSS signature over `poll_id|voter_id|choice`. Required for
    /// non-anonymous polls.
    pub signature: Option<String>,
}

/// Result of a successful cast.
#[derive(Clone, Debug, Serialize)]
pub struct CastOutcome {
    pub vote_id: Uuid,
    /// Pending-buffer length after this cast (0 if it triggered a flush).
    pub pending_votes: usize,
    /// Index of the block mined by an automatic flush, if one happened.
    pub mined_block: Option<u64>,
}

/// Result of flushing the pending buffer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlushOutcome {
    /// Ballots sealed into the new block; 0 when the buffer was empty.
    pub votes_mined: usize,
    /// Index of the mined block; `None` for the empty no-op.
    pub block_index: Option<u64>,
}

/// The lock-guarded state bundle.
pub(crate) struct VotingState {
    pub(crate) voters: HashMap<String, Voter>,
    pub(crate) polls: HashMap<Uuid, Poll>,
    /// Per-poll set of voter ids that have voted. Kept even for anonymous
    /// polls (the stored ballots are stripped instead) and never exposed
    /// in user-visible shapes.
    pub(crate) participation: HashMap<Uuid, HashSet<String>>,
    pub(crate) pending: Vec<Ballot>,
    pub(crate) chain: Blockchain,
}

/// The single owner of all voting state.
pub struct VotingMachine {
    state: RwLock<VotingState>,
    mining_threshold: usize,
}

impl VotingMachine {
    /// Creates a machine with a fresh chain (mined genesis block).
    pub fn new(difficulty: usize, mining_threshold: usize, now: i64) -> Self {
        Self {
            state: RwLock::new(VotingState {
                voters: HashMap::new(),
                polls: HashMap::new(),
                participation: HashMap::new(),
                pending: Vec::new(),
                chain: Blockchain::new(difficulty, now),
            }),
            mining_threshold,
        }
    }

    /// Pending-count threshold that triggers an automatic flush.
    pub fn mining_threshold(&self) -> usize {
        self.mining_threshold
    }

    // A poisoned lock means a panic while mutating; the state itself is
    // still structurally sound, so recover the guard instead of unwinding
    // every caller.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, VotingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, VotingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a voter and seals a `voter_registration` block.
    pub fn register_voter(&self, input: NewVoter, now: i64) -> Result<Voter, VoteError> {
        let mut st = self.write();

        if st.voters.contains_key(&input.voter_id) {
            return Err(VoteError::AlreadyRegistered(input.voter_id));
        }
        if st.voters.values().any(|v| v.email == input.email) {
            return Err(VoteError::AlreadyRegistered(input.email));
        }

        let voter = Voter {
            voter_id: input.voter_id.clone(),
            name: input.name,
            email: input.email,
            department: input.department,
            public_key: input.public_key,
            registered_at: now,
        };
        st.voters.insert(voter.voter_id.clone(), voter.clone());

        st.chain.append(
            BlockPayload::VoterRegistration {
                voter_id: voter.voter_id.clone(),
                timestamp: now,
            },
            now,
        );

        Ok(voter)
    }

    /// Creates a poll and seals a `poll_creation` block.
    ///
    /// An empty eligible-voter list is rewritten to a snapshot of every
    /// voter registered at this moment.
    pub fn create_poll(&self, input: NewPoll, now: i64) -> Result<Poll, VoteError> {
        let mut st = self.write();

        let eligible_voters = if input.eligible_voters.is_empty() {
            let mut all: Vec<String> = st.voters.keys().cloned().collect();
            all.sort();
            all
        } else {
            input.eligible_voters
        };

        let poll = Poll {
            poll_id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            options: input.options,
            creator: input.creator,
            start_time: now,
            end_time: now + input.duration_hours * 3600,
            eligible_voters,
            allow_multiple_votes: input.allow_multiple_votes,
            is_anonymous: input.is_anonymous,
        };

        st.polls.insert(poll.poll_id, poll.clone());
        st.participation.insert(poll.poll_id, HashSet::new());
        st.chain
            .append(BlockPayload::PollCreation { poll: poll.clone() }, now);

        Ok(poll)
    }

    /// Casts a ballot, running the ordered rule pipeline.
    ///
    /// Checks fail on the first violation, each with a distinct error
    /// kind: poll exists, poll active, voter registered, voter eligible,
    /// no double vote, choice valid, signature valid. On success the
    /// ballot enters the pending buffer; reaching the mining threshold
    /// flushes the buffer into a block.
    pub fn cast_vote(&self, input: CastVote, now: i64) -> Result<CastOutcome, VoteError> {
        let mut st = self.write();

        let poll = st
            .polls
            .get(&input.poll_id)
            .ok_or(VoteError::PollNotFound(input.poll_id))?;
        if !poll.is_active(now) {
            return Err(VoteError::PollInactive(input.poll_id));
        }

        let voter = st
            .voters
            .get(&input.voter_id)
            .ok_or_else(|| VoteError::VoterNotRegistered(input.voter_id.clone()))?;

        if !poll.is_eligible(&input.voter_id) {
            return Err(VoteError::VoterNotEligible(input.voter_id));
        }

        let already_voted = st
            .participation
            .get(&input.poll_id)
            .is_some_and(|set| set.contains(&input.voter_id));
        if !poll.allow_multiple_votes && already_voted {
            return Err(VoteError::DoubleVote(input.voter_id));
        }

        if !poll.has_option(&input.choice) {
            return Err(VoteError::InvalidChoice(input.choice));
        }

        // Signature discipline: mandatory for non-anonymous polls; an
        // anonymous poll accepts an unsigned ballot but still rejects a
        // bad signature when one is supplied.
        let message = crypto::vote_message(&input.poll_id, &input.voter_id, &input.choice);
        let signature_ok = match &input.signature {
            Some(sig) => crypto::verify(&message, sig, &voter.public_key),
            None => poll.is_anonymous,
        };
        if !signature_ok {
            return Err(VoteError::InvalidSignature);
        }

        let is_anonymous = poll.is_anonymous;
        let ballot = Ballot {
            vote_id: Uuid::new_v4(),
            poll_id: input.poll_id,
            // The participation set below keeps the real id, so
            // double-vote detection survives the stripping.
            voter_id: if is_anonymous {
                ANONYMOUS_VOTER.to_string()
            } else {
                input.voter_id.clone()
            },
            choice: input.choice,
            timestamp: now,
            // A PSS signature verifies against exactly one public key;
            // storing it would de-anonymise the ballot.
            signature: if is_anonymous { None } else { input.signature },
        };
        let vote_id = ballot.vote_id;

        st.participation
            .entry(input.poll_id)
            .or_default()
            .insert(input.voter_id);
        st.pending.push(ballot);

        let mut mined_block = None;
        if st.pending.len() >= self.mining_threshold {
            let flushed = flush_locked(&mut st, now);
            mined_block = flushed.block_index;
        }

        Ok(CastOutcome {
            vote_id,
            pending_votes: st.pending.len(),
            mined_block,
        })
    }

    /// Seals the pending buffer into a `votes` block.
    ///
    /// Also exposed to privileged callers for manual mining. Flushing an
    /// empty buffer is a no-op that reports zero votes.
    pub fn flush_pending(&self, now: i64) -> FlushOutcome {
        let mut st = self.write();
        flush_locked(&mut st, now)
    }

    /// Full chain integrity check.
    pub fn verify_chain(&self) -> bool {
        self.read().chain.verify()
    }

    /// Rebuilds the whole state bundle from persisted data.
    ///
    /// Blocks must arrive in index order; the chain is re-verified and a
    /// failure rejects the restore outright rather than guessing at
    /// history. Participation is the union of the persisted records and
    /// what the non-anonymous ballots in the chain imply; polls found
    /// only in chain payloads are merged into the registry. The pending
    /// buffer is intentionally not durable.
    pub fn restore(
        &self,
        voters: Vec<Voter>,
        polls: Vec<Poll>,
        participation_records: Vec<(Uuid, String)>,
        blocks: Vec<Block>,
        now: i64,
    ) -> Result<(), ChainError> {
        let mut st = self.write();
        let difficulty = st.chain.difficulty();

        let chain = if blocks.is_empty() {
            Blockchain::new(difficulty, now)
        } else {
            Blockchain::from_blocks(blocks, difficulty)?
        };

        let mut voter_map: HashMap<String, Voter> = HashMap::with_capacity(voters.len());
        for v in voters {
            voter_map.insert(v.voter_id.clone(), v);
        }

        let mut poll_map: HashMap<Uuid, Poll> = HashMap::with_capacity(polls.len());
        for p in polls {
            poll_map.insert(p.poll_id, p);
        }

        let mut participation: HashMap<Uuid, HashSet<String>> = HashMap::new();
        for (poll_id, voter_id) in participation_records {
            participation.entry(poll_id).or_default().insert(voter_id);
        }

        for block in chain.blocks() {
            match &block.data {
                BlockPayload::PollCreation { poll } => {
                    poll_map.entry(poll.poll_id).or_insert_with(|| poll.clone());
                }
                BlockPayload::Votes { votes, .. } => {
                    for ballot in votes {
                        if !ballot.is_anonymous() {
                            participation
                                .entry(ballot.poll_id)
                                .or_default()
                                .insert(ballot.voter_id.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        for poll_id in poll_map.keys() {
            participation.entry(*poll_id).or_default();
        }

        st.voters = voter_map;
        st.polls = poll_map;
        st.participation = participation;
        st.pending = Vec::new();
        st.chain = chain;
        Ok(())
    }
}

/// Seals the pending buffer under an already-held write lock.
pub(crate) fn flush_locked(st: &mut VotingState, now: i64) -> FlushOutcome {
    if st.pending.is_empty() {
        return FlushOutcome {
            votes_mined: 0,
            block_index: None,
        };
    }

    let votes = std::mem::take(&mut st.pending);
    let count = votes.len();
    let block = st.chain.append(BlockPayload::Votes { votes, count }, now);

    FlushOutcome {
        votes_mined: count,
        block_index: Some(block.index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{cast_signed, fixture, register, start_poll, NOW};

    #[test]
    fn register_voter_seals_a_block_and_rejects_duplicates() {
        let machine = fixture();
        let voter = register(&machine, "alice@x.io", "Alice");

        assert_eq!(voter.voter_id, crypto::voter_id_for_email("alice@x.io"));
        {
            let st = machine.read();
            assert_eq!(st.chain.len(), 2);
            assert!(matches!(
                st.chain.latest().data,
                BlockPayload::VoterRegistration { .. }
            ));
        }

        // Same id again.
        let err = machine
            .register_voter(
                NewVoter {
                    name: "Alice Again".to_string(),
                    email: "alice@x.io".to_string(),
                    department: None,
                    voter_id: voter.voter_id.clone(),
                    public_key: voter.public_key.clone(),
                },
                NOW,
            )
            .expect_err("duplicate id should be rejected");
        assert!(matches!(err, VoteError::AlreadyRegistered(_)));

        // Different id, same email.
        let err = machine
            .register_voter(
                NewVoter {
                    name: "Mallory".to_string(),
                    email: "alice@x.io".to_string(),
                    department: None,
                    voter_id: "ffffffffffffffff".to_string(),
                    public_key: voter.public_key,
                },
                NOW,
            )
            .expect_err("duplicate email should be rejected");
        assert!(matches!(err, VoteError::AlreadyRegistered(_)));
    }

    #[test]
    fn empty_eligible_list_snapshots_current_voters() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let bob = register(&machine, "bob@x.io", "Bob");

        let poll = start_poll(&machine, &["Go", "Rust"], false, false);
        let mut expected = vec![alice.voter_id, bob.voter_id];
        expected.sort();
        assert_eq!(poll.eligible_voters, expected);

        // A voter registered after the snapshot is not eligible.
        let carol = register(&machine, "carol@x.io", "Carol");
        let err = cast_signed(&machine, &poll, &carol, "Go").expect_err("late voter is excluded");
        assert!(matches!(err, VoteError::VoterNotEligible(_)));
    }

    #[test]
    fn cast_pipeline_rejects_in_order() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);

        // Unknown poll.
        let err = machine
            .cast_vote(
                CastVote {
                    poll_id: Uuid::new_v4(),
                    voter_id: alice.voter_id.clone(),
                    choice: "Go".to_string(),
                    signature: None,
                },
                NOW,
            )
            .expect_err("unknown poll");
        assert!(matches!(err, VoteError::PollNotFound(_)));

        // Closed poll (past the end of the window).
        let err = machine
            .cast_vote(
                CastVote {
                    poll_id: poll.poll_id,
                    voter_id: alice.voter_id.clone(),
                    choice: "Go".to_string(),
                    signature: None,
                },
                poll.end_time,
            )
            .expect_err("closed poll");
        assert!(matches!(err, VoteError::PollInactive(_)));

        // Unregistered voter.
        let err = machine
            .cast_vote(
                CastVote {
                    poll_id: poll.poll_id,
                    voter_id: "ffffffffffffffff".to_string(),
                    choice: "Go".to_string(),
                    signature: None,
                },
                NOW,
            )
            .expect_err("unknown voter");
        assert!(matches!(err, VoteError::VoterNotRegistered(_)));

        // Invalid choice.
        let err = cast_signed(&machine, &poll, &alice, "Zig").expect_err("bad choice");
        assert!(matches!(err, VoteError::InvalidChoice(_)));

        // Missing signature on a non-anonymous poll.
        let err = machine
            .cast_vote(
                CastVote {
                    poll_id: poll.poll_id,
                    voter_id: alice.voter_id.clone(),
                    choice: "Go".to_string(),
                    signature: None,
                },
                NOW,
            )
            .expect_err("unsigned ballot");
        assert!(matches!(err, VoteError::InvalidSignature));
    }

    #[test]
    fn double_vote_is_rejected_unless_poll_allows_it() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");

        let single = start_poll(&machine, &["Go", "Rust"], false, false);
        cast_signed(&machine, &single, &alice, "Go").expect("first vote should land");
        let err = cast_signed(&machine, &single, &alice, "Rust").expect_err("second vote");
        assert!(matches!(err, VoteError::DoubleVote(_)));

        let multi = start_poll(&machine, &["Go", "Rust"], true, false);
        cast_signed(&machine, &multi, &alice, "Go").expect("first vote should land");
        cast_signed(&machine, &multi, &alice, "Rust").expect("repeat vote is allowed");
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);

        // Signature over a different choice than the ballot claims.
        let keys = crate::testutil::keys_for("alice@x.io");
        let message = crypto::vote_message(&poll.poll_id, &alice.voter_id, "Rust");
        let signature = crypto::sign(&message, &keys.private_pem).expect("signing succeeds");

        let err = machine
            .cast_vote(
                CastVote {
                    poll_id: poll.poll_id,
                    voter_id: alice.voter_id.clone(),
                    choice: "Go".to_string(),
                    signature: Some(signature),
                },
                NOW,
            )
            .expect_err("mismatched signature");
        assert!(matches!(err, VoteError::InvalidSignature));
    }

    #[test]
    fn anonymous_ballots_are_stripped_but_tracked() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, true);

        cast_signed(&machine, &poll, &alice, "Go").expect("anonymous vote should land");

        {
            let st = machine.read();
            let ballot = &st.pending[0];
            assert_eq!(ballot.voter_id, ANONYMOUS_VOTER);
            assert!(ballot.signature.is_none());
            assert!(st.participation[&poll.poll_id].contains(&alice.voter_id));
        }

        // Double-vote protection still works against the stripped ballot.
        let err = cast_signed(&machine, &poll, &alice, "Rust").expect_err("replay");
        assert!(matches!(err, VoteError::DoubleVote(_)));
    }

    #[test]
    fn unsigned_ballot_is_accepted_on_anonymous_poll() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, true);

        machine
            .cast_vote(
                CastVote {
                    poll_id: poll.poll_id,
                    voter_id: alice.voter_id,
                    choice: "Go".to_string(),
                    signature: None,
                },
                NOW,
            )
            .expect("anonymous poll accepts unsigned ballots");
    }

    #[test]
    fn reaching_the_threshold_flushes_into_a_block() {
        let machine = fixture();
        let poll = {
            // Register five voters first so the eligibility snapshot
            // covers them all.
            let voters: Vec<Voter> = (0..5)
                .map(|i| register(&machine, &format!("v{i}@x.io"), &format!("Voter {i}")))
                .collect();
            let poll = start_poll(&machine, &["Go", "Rust"], false, false);
            let chain_before = { machine.read().chain.len() };

            for (i, voter) in voters.iter().enumerate() {
                let outcome = cast_signed(&machine, &poll, voter, "Go").expect("vote lands");
                if i < 4 {
                    assert_eq!(outcome.pending_votes, i + 1);
                    assert!(outcome.mined_block.is_none());
                } else {
                    // Fifth vote crosses the default threshold.
                    assert_eq!(outcome.pending_votes, 0);
                    assert_eq!(outcome.mined_block, Some(chain_before as u64));
                }
            }
            poll
        };

        let st = machine.read();
        assert!(st.pending.is_empty());
        match &st.chain.latest().data {
            BlockPayload::Votes { votes, count } => {
                assert_eq!(*count, 5);
                assert!(votes.iter().all(|b| b.poll_id == poll.poll_id));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(st.chain.verify());
    }

    #[test]
    fn manual_flush_on_empty_buffer_is_a_noop() {
        let machine = fixture();
        let before = { machine.read().chain.len() };
        let outcome = machine.flush_pending(NOW);
        assert_eq!(
            outcome,
            FlushOutcome {
                votes_mined: 0,
                block_index: None
            }
        );
        assert_eq!(machine.read().chain.len(), before);
    }

    #[test]
    fn manual_flush_seals_partial_batches() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);
        cast_signed(&machine, &poll, &alice, "Go").expect("vote lands");

        let outcome = machine.flush_pending(NOW + 1);
        assert_eq!(outcome.votes_mined, 1);
        assert!(outcome.block_index.is_some());
        assert!(machine.verify_chain());
    }
}
