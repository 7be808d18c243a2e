//! Read operations: tallying, voter history, stats, and snapshots.
//!
//! All reads take the machine's read lock, snapshot what they need, and
//! release it; nothing here mutates state. Chain walks see only the typed
//! payload enum, because generic encodings were already normalised at the
//! rehydration boundary.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::types::{Block, BlockPayload, Poll, Voter};

use super::error::VoteError;
use super::state::VotingMachine;

/// Whether a poll currently accepts votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Active,
    Closed,
}

/// Result of tallying one poll.
///
/// Counts cover both sealed blocks and the pending buffer, so a ballot is
/// visible in the tally from the moment it is accepted. Turnout is the
/// participation count over the eligible count, or `"N/A"` when the
/// eligible list is empty.
#[derive(Clone, Debug, Serialize)]
pub struct TallyReport {
    pub poll_id: Uuid,
    pub title: String,
    /// Option string → ballot count; every option appears, even at zero.
    pub results: BTreeMap<String, u64>,
    pub total_votes: u64,
    pub status: PollStatus,
    pub turnout: String,
}

/// One entry of a voter's history: a ballot and where it was sealed.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryEntry {
    pub vote_id: Uuid,
    pub poll_id: Uuid,
    /// Title from the current poll registry.
    pub poll_title: String,
    pub timestamp: i64,
    pub block_index: u64,
}

/// Aggregate service counters.
#[derive(Clone, Debug, Serialize)]
pub struct ChainStats {
    pub chain_length: u64,
    pub total_voters: u64,
    pub total_polls: u64,
    pub active_polls: u64,
    /// Sum of per-poll participation counts plus the pending buffer.
    pub total_votes: u64,
    pub pending_votes: u64,
    pub difficulty: usize,
    pub mining_threshold: usize,
    pub chain_valid: bool,
}

/// A consistent copy of the durable parts of the state, taken under the
/// read lock for the persistence reconciler. The participation rows keep
/// double-vote bookkeeping durable for anonymous polls, whose ballots
/// carry no voter id.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub blocks: Vec<Block>,
    pub voters: Vec<Voter>,
    pub polls: Vec<Poll>,
    pub participation: Vec<(Uuid, String)>,
}

impl VotingMachine {
    /// Tallies a poll across the chain and the pending buffer.
    pub fn tally(&self, poll_id: Uuid, now: i64) -> Result<TallyReport, VoteError> {
        let st = self.read();
        let poll = st.polls.get(&poll_id).ok_or(VoteError::PollNotFound(poll_id))?;

        let mut results: BTreeMap<String, u64> = poll
            .options
            .iter()
            .map(|option| (option.clone(), 0))
            .collect();
        let mut total_votes: u64 = 0;

        let count_ballot = |ballot_poll: Uuid, choice: &str,
                            results: &mut BTreeMap<String, u64>,
                            total: &mut u64| {
            if ballot_poll == poll_id {
                *results.entry(choice.to_string()).or_insert(0) += 1;
                *total += 1;
            }
        };

        for block in st.chain.blocks() {
            if let BlockPayload::Votes { votes, .. } = &block.data {
                for ballot in votes {
                    count_ballot(ballot.poll_id, &ballot.choice, &mut results, &mut total_votes);
                }
            }
        }
        for ballot in &st.pending {
            count_ballot(ballot.poll_id, &ballot.choice, &mut results, &mut total_votes);
        }

        let turnout = if poll.eligible_voters.is_empty() {
            "N/A".to_string()
        } else {
            let participated = st
                .participation
                .get(&poll_id)
                .map(|set| set.len())
                .unwrap_or(0);
            let pct = participated as f64 / poll.eligible_voters.len() as f64 * 100.0;
            format!("{pct:.1}%")
        };

        Ok(TallyReport {
            poll_id,
            title: poll.title.clone(),
            results,
            total_votes,
            status: if poll.is_active(now) {
                PollStatus::Active
            } else {
                PollStatus::Closed
            },
            turnout,
        })
    }

    /// Collects the sealed ballots cast by one voter, oldest first.
    ///
    /// Anonymous ballots carry no voter id and therefore never appear.
    pub fn voter_history(&self, voter_id: &str) -> Result<Vec<HistoryEntry>, VoteError> {
        let st = self.read();
        if !st.voters.contains_key(voter_id) {
            return Err(VoteError::VoterNotRegistered(voter_id.to_string()));
        }

        let mut entries = Vec::new();
        for block in st.chain.blocks() {
            if let BlockPayload::Votes { votes, .. } = &block.data {
                for ballot in votes {
                    if ballot.voter_id == voter_id {
                        let poll_title = st
                            .polls
                            .get(&ballot.poll_id)
                            .map(|p| p.title.clone())
                            .unwrap_or_default();
                        entries.push(HistoryEntry {
                            vote_id: ballot.vote_id,
                            poll_id: ballot.poll_id,
                            poll_title,
                            timestamp: ballot.timestamp,
                            block_index: block.index,
                        });
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Aggregate counters for the status surface.
    pub fn stats(&self, now: i64) -> ChainStats {
        let st = self.read();
        let recorded: usize = st.participation.values().map(|set| set.len()).sum();
        ChainStats {
            chain_length: st.chain.len() as u64,
            total_voters: st.voters.len() as u64,
            total_polls: st.polls.len() as u64,
            active_polls: st.polls.values().filter(|p| p.is_active(now)).count() as u64,
            total_votes: (recorded + st.pending.len()) as u64,
            pending_votes: st.pending.len() as u64,
            difficulty: st.chain.difficulty(),
            mining_threshold: self.mining_threshold(),
            chain_valid: st.chain.verify(),
        }
    }

    /// Lists polls, optionally only the currently active ones, newest
    /// first.
    pub fn polls(&self, active_only: bool, now: i64) -> Vec<Poll> {
        let st = self.read();
        let mut polls: Vec<Poll> = st
            .polls
            .values()
            .filter(|p| !active_only || p.is_active(now))
            .cloned()
            .collect();
        polls.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(a.poll_id.cmp(&b.poll_id)));
        polls
    }

    /// Looks up one poll.
    pub fn poll(&self, poll_id: Uuid) -> Option<Poll> {
        self.read().polls.get(&poll_id).cloned()
    }

    /// Looks up one voter.
    pub fn voter(&self, voter_id: &str) -> Option<Voter> {
        self.read().voters.get(voter_id).cloned()
    }

    /// The last `limit` blocks, oldest of them first.
    pub fn recent_blocks(&self, limit: usize) -> Vec<Block> {
        let st = self.read();
        let blocks = st.chain.blocks();
        let start = blocks.len().saturating_sub(limit);
        blocks[start..].to_vec()
    }

    /// Clones the full chain for export.
    pub fn export_chain(&self) -> Vec<Block> {
        self.read().chain.export()
    }

    /// Number of blocks in the chain.
    pub fn chain_length(&self) -> usize {
        self.read().chain.len()
    }

    /// Snapshots the durable state for the reconciler.
    pub fn snapshot(&self) -> Snapshot {
        let st = self.read();
        let mut participation: Vec<(Uuid, String)> = st
            .participation
            .iter()
            .flat_map(|(poll_id, set)| set.iter().map(|v| (*poll_id, v.clone())))
            .collect();
        participation.sort();

        Snapshot {
            blocks: st.chain.export(),
            voters: st.voters.values().cloned().collect(),
            polls: st.polls.values().cloned().collect(),
            participation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::state::{CastVote, VotingMachine};
    use crate::testutil::{cast_signed, fixture, register, start_poll, NOW};

    #[test]
    fn two_voters_two_options_tally_and_turnout() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let bob = register(&machine, "bob@x.io", "Bob");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);

        cast_signed(&machine, &poll, &alice, "Go").expect("vote lands");
        cast_signed(&machine, &poll, &bob, "Rust").expect("vote lands");

        let tally = machine.tally(poll.poll_id, NOW).expect("tally succeeds");
        assert_eq!(tally.results["Go"], 1);
        assert_eq!(tally.results["Rust"], 1);
        assert_eq!(tally.total_votes, 2);
        assert_eq!(tally.status, PollStatus::Active);
        assert_eq!(tally.turnout, "100.0%");
    }

    #[test]
    fn tally_counts_each_ballot_once_across_a_flush() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);
        cast_signed(&machine, &poll, &alice, "Go").expect("vote lands");

        let before = machine.tally(poll.poll_id, NOW).expect("tally succeeds");
        assert_eq!(before.results["Go"], 1);
        assert_eq!(before.total_votes, 1);

        machine.flush_pending(NOW + 1);

        let after = machine.tally(poll.poll_id, NOW).expect("tally succeeds");
        assert_eq!(after.results["Go"], 1);
        assert_eq!(after.total_votes, 1);
    }

    #[test]
    fn tally_total_equals_sum_of_results() {
        let machine = fixture();
        let voters: Vec<_> = (0..4)
            .map(|i| register(&machine, &format!("v{i}@x.io"), &format!("Voter {i}")))
            .collect();
        let poll = start_poll(&machine, &["Go", "Rust", "Zig"], false, false);

        let choices = ["Go", "Rust", "Go", "Zig"];
        for (voter, choice) in voters.iter().zip(choices) {
            cast_signed(&machine, &poll, voter, choice).expect("vote lands");
        }

        let tally = machine.tally(poll.poll_id, NOW).expect("tally succeeds");
        let sum: u64 = tally.results.values().sum();
        assert_eq!(sum, tally.total_votes);
        assert_eq!(tally.total_votes, 4);
        assert_eq!(tally.results["Go"], 2);
    }

    #[test]
    fn closed_poll_reports_closed_status() {
        let machine = fixture();
        register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);
        let tally = machine
            .tally(poll.poll_id, poll.end_time + 1)
            .expect("tally succeeds");
        assert_eq!(tally.status, PollStatus::Closed);
    }

    #[test]
    fn turnout_is_na_without_eligible_voters() {
        // No voters registered yet, so the creation snapshot is empty.
        let machine = fixture();
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);
        let tally = machine.tally(poll.poll_id, NOW).expect("tally succeeds");
        assert_eq!(tally.turnout, "N/A");
    }

    #[test]
    fn history_reports_sealed_ballots_with_block_index() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);
        cast_signed(&machine, &poll, &alice, "Go").expect("vote lands");

        // Still pending: nothing sealed yet.
        assert!(machine
            .voter_history(&alice.voter_id)
            .expect("history succeeds")
            .is_empty());

        let flushed = machine.flush_pending(NOW + 1);
        let history = machine
            .voter_history(&alice.voter_id)
            .expect("history succeeds");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].poll_id, poll.poll_id);
        assert_eq!(history[0].poll_title, poll.title);
        assert_eq!(Some(history[0].block_index), flushed.block_index);
    }

    #[test]
    fn history_excludes_anonymous_ballots_but_tally_counts_them() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, true);

        cast_signed(&machine, &poll, &alice, "Go").expect("vote lands");
        machine.flush_pending(NOW + 1);

        let history = machine
            .voter_history(&alice.voter_id)
            .expect("history succeeds");
        assert!(history.is_empty());

        let tally = machine.tally(poll.poll_id, NOW).expect("tally succeeds");
        assert_eq!(tally.results["Go"], 1);
        assert_eq!(tally.turnout, "100.0%");
    }

    #[test]
    fn history_rejects_unknown_voters() {
        let machine = fixture();
        assert!(matches!(
            machine.voter_history("ffffffffffffffff"),
            Err(VoteError::VoterNotRegistered(_))
        ));
    }

    #[test]
    fn stats_track_counts_and_validity() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let poll = start_poll(&machine, &["Go", "Rust"], false, false);
        cast_signed(&machine, &poll, &alice, "Go").expect("vote lands");

        let stats = machine.stats(NOW);
        assert_eq!(stats.chain_length, 3); // genesis + registration + poll
        assert_eq!(stats.total_voters, 1);
        assert_eq!(stats.total_polls, 1);
        assert_eq!(stats.active_polls, 1);
        assert_eq!(stats.total_votes, 2); // participation entry + pending ballot
        assert_eq!(stats.pending_votes, 1);
        assert_eq!(stats.mining_threshold, machine.mining_threshold());
        assert!(stats.chain_valid);

        let closed = machine.stats(poll.end_time + 1);
        assert_eq!(closed.active_polls, 0);
    }

    #[test]
    fn recent_blocks_returns_the_tail() {
        let machine = fixture();
        register(&machine, "alice@x.io", "Alice");
        register(&machine, "bob@x.io", "Bob");

        let tail = machine.recent_blocks(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].index, 1);
        assert_eq!(tail[1].index, 2);

        let all = machine.recent_blocks(10);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn restore_rebuilds_state_from_a_snapshot() {
        let machine = fixture();
        let alice = register(&machine, "alice@x.io", "Alice");
        let bob = register(&machine, "bob@x.io", "Bob");
        let open = start_poll(&machine, &["Go", "Rust"], false, false);
        let anon = start_poll(&machine, &["Yes", "No"], false, true);

        cast_signed(&machine, &open, &alice, "Go").expect("vote lands");
        cast_signed(&machine, &anon, &bob, "Yes").expect("vote lands");
        machine.flush_pending(NOW + 5);

        let snapshot = machine.snapshot();

        let restored = VotingMachine::new(2, 5, NOW);
        restored
            .restore(
                snapshot.voters,
                snapshot.polls,
                snapshot.participation,
                snapshot.blocks,
                NOW + 10,
            )
            .expect("restore succeeds");

        assert!(restored.verify_chain());
        assert_eq!(
            restored.export_chain().last().map(|b| b.hash.clone()),
            machine.export_chain().last().map(|b| b.hash.clone()),
        );

        // Tallies survive the roundtrip.
        let tally = restored.tally(open.poll_id, NOW).expect("tally succeeds");
        assert_eq!(tally.results["Go"], 1);

        // Double-vote protection survives for the anonymous poll via the
        // persisted participation rows.
        let err = restored
            .cast_vote(
                CastVote {
                    poll_id: anon.poll_id,
                    voter_id: bob.voter_id.clone(),
                    choice: "No".to_string(),
                    signature: None,
                },
                NOW + 20,
            )
            .expect_err("replay after restore");
        assert!(matches!(err, VoteError::DoubleVote(_)));
    }

    #[test]
    fn restore_with_no_blocks_starts_a_fresh_chain() {
        let machine = fixture();
        machine
            .restore(Vec::new(), Vec::new(), Vec::new(), Vec::new(), NOW)
            .expect("empty restore succeeds");
        assert_eq!(machine.export_chain().len(), 1);
        assert!(machine.verify_chain());
    }
}
