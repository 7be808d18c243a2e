//! The background reconciler: periodic mirror ticks and boot rehydration.
//!
//! The reconciler runs as one long-lived task driven by two independent
//! tickers (cache and relational). On every tick it snapshots the state
//! under the machine's read lock, releases the lock, and only then talks
//! to the sink; the voting lock is never held across network I/O. Any
//! sink error is logged and retried on the next tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::PersistConfig;
use crate::machine::VotingMachine;
use crate::types::BlockPayload;

use super::{CacheStore, PersistError, PgStore};

/// What was recovered from the relational store at boot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RehydrationSummary {
    pub voters: usize,
    pub polls: usize,
    pub blocks: usize,
}

/// Rebuilds in-memory state from the relational store.
///
/// Voters, polls, participation records, and the full chain are loaded
/// (blocks in index order, payloads through the permissive decoder) and
/// handed to the machine, which re-verifies the chain and fails closed
/// rather than guessing at missing history. Pending (un-mined) ballots
/// are not durable and do not survive a restart.
pub async fn rehydrate(
    machine: &VotingMachine,
    store: &PgStore,
    now: i64,
) -> Result<RehydrationSummary, PersistError> {
    let voters = store.load_voters().await?;
    let polls = store.load_polls().await?;
    let records = store.load_vote_records().await?;
    let blocks = store.load_blocks().await?;

    let summary = RehydrationSummary {
        voters: voters.len(),
        polls: polls.len(),
        blocks: blocks.len(),
    };

    machine.restore(voters, polls, records, blocks, now)?;
    Ok(summary)
}

/// High-water marks for the relational mirror.
///
/// Rows already written this process lifetime are skipped; everything
/// else is re-sent with idempotent inserts, so a crashed tick costs only
/// duplicate no-op statements.
#[derive(Default)]
struct Watermark {
    seeded: bool,
    block_index: i64,
    voters: HashSet<String>,
    polls: HashSet<Uuid>,
    votes: HashSet<Uuid>,
    records: HashSet<(Uuid, String)>,
}

/// Periodic mirror from in-memory state to the configured sinks.
pub struct Reconciler {
    machine: Arc<VotingMachine>,
    database: Option<PgStore>,
    cache: Option<CacheStore>,
    cache_interval: Duration,
    database_interval: Duration,
    watermark: Watermark,
}

impl Reconciler {
    pub fn new(
        machine: Arc<VotingMachine>,
        database: Option<PgStore>,
        cache: Option<CacheStore>,
        cfg: &PersistConfig,
    ) -> Self {
        Self {
            machine,
            database,
            cache,
            cache_interval: cfg.cache_interval,
            database_interval: cfg.database_interval,
            watermark: Watermark::default(),
        }
    }

    /// Spawns the reconciler task; it stops when `shutdown` flips to
    /// `true` and closes its sinks on the way out.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut cache_tick = tokio::time::interval(self.cache_interval);
        let mut database_tick = tokio::time::interval(self.database_interval);
        // Both tickers fire immediately; skip the initial ticks so the
        // first mirror happens one full interval after boot.
        cache_tick.tick().await;
        database_tick.tick().await;

        loop {
            tokio::select! {
                _ = cache_tick.tick(), if self.cache.is_some() => {
                    if let Err(e) = self.mirror_cache().await {
                        tracing::warn!(error = %e, "cache mirror failed; retrying next tick");
                    }
                }
                _ = database_tick.tick(), if self.database.is_some() => {
                    if let Err(e) = self.mirror_database().await {
                        tracing::warn!(error = %e, "database mirror failed; retrying next tick");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(db) = &self.database {
            db.close().await;
        }
        tracing::info!("persistence reconciler stopped");
    }

    /// Serialises the three snapshot structures and upserts the cache
    /// blobs.
    async fn mirror_cache(&mut self) -> Result<(), PersistError> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let snapshot = self.machine.snapshot();
        let chain = serde_json::to_string(&snapshot.blocks)
            .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        let polls = serde_json::to_string(&snapshot.polls)
            .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        let voters = serde_json::to_string(&snapshot.voters)
            .map_err(|e| PersistError::Corrupt(e.to_string()))?;

        cache.store_snapshot(chain, polls, voters).await?;
        tracing::debug!(blocks = snapshot.blocks.len(), "cache mirror complete");
        Ok(())
    }

    /// Pushes everything beyond the high-water marks into the relational
    /// store.
    async fn mirror_database(&mut self) -> Result<(), PersistError> {
        let Some(db) = &self.database else {
            return Ok(());
        };

        if !self.watermark.seeded {
            self.watermark.block_index = db.max_block_index().await?.unwrap_or(-1);
            self.watermark.seeded = true;
        }

        let snapshot = self.machine.snapshot();

        for block in &snapshot.blocks {
            if (block.index as i64) > self.watermark.block_index {
                db.insert_block(block).await?;
                self.watermark.block_index = block.index as i64;
            }
        }

        for voter in &snapshot.voters {
            if !self.watermark.voters.contains(&voter.voter_id) {
                db.upsert_voter(voter).await?;
                self.watermark.voters.insert(voter.voter_id.clone());
            }
        }

        for poll in &snapshot.polls {
            if !self.watermark.polls.contains(&poll.poll_id) {
                db.upsert_poll(poll).await?;
                self.watermark.polls.insert(poll.poll_id);
            }
        }

        // Ballots live inside `votes` blocks; the payloads in a snapshot
        // are already normalised to the typed form, whatever encoding
        // they were rehydrated from.
        for block in &snapshot.blocks {
            if let BlockPayload::Votes { votes, .. } = &block.data {
                for ballot in votes {
                    if !self.watermark.votes.contains(&ballot.vote_id) {
                        db.upsert_vote(ballot, block.index).await?;
                        self.watermark.votes.insert(ballot.vote_id);
                    }
                }
            }
        }

        for (poll_id, voter_id) in &snapshot.participation {
            let key = (*poll_id, voter_id.clone());
            if !self.watermark.records.contains(&key) {
                db.upsert_vote_record(*poll_id, voter_id).await?;
                self.watermark.records.insert(key);
            }
        }

        tracing::debug!(
            last_block = self.watermark.block_index,
            "database mirror complete"
        );
        Ok(())
    }
}
