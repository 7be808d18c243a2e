//! Postgres-backed relational mirror.
//!
//! Tables: `blocks`, `voters`, `polls`, `votes`, `vote_records`. All
//! inserts are idempotent on their natural key (`ON CONFLICT DO
//! NOTHING`), so a retried mirror tick never duplicates a row. Block
//! payloads and poll lists are stored as JSONB; reloading goes through
//! the permissive payload decoder, because historical rows may carry the
//! legacy generic-map encoding.

use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::types::{Ballot, Block, BlockPayload, Poll, Voter};

use super::PersistError;

/// Schema DDL, applied in order at startup. Every statement is
/// `IF NOT EXISTS` so reconnecting to an initialised database is a no-op.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (
        id BIGSERIAL PRIMARY KEY,
        block_index BIGINT UNIQUE NOT NULL,
        timestamp BIGINT NOT NULL,
        data JSONB NOT NULL,
        previous_hash VARCHAR(64) NOT NULL,
        hash VARCHAR(64) UNIQUE NOT NULL,
        nonce BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS voters (
        voter_id VARCHAR(64) PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        department TEXT,
        public_key TEXT NOT NULL,
        registered_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS polls (
        poll_id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        options JSONB NOT NULL,
        creator TEXT NOT NULL,
        start_time BIGINT NOT NULL,
        end_time BIGINT NOT NULL,
        eligible_voters JSONB NOT NULL,
        allow_multiple_votes BOOLEAN NOT NULL,
        is_anonymous BOOLEAN NOT NULL
    )",
    // No foreign key on voter_id: ballots on anonymous polls store the
    // literal "anonymous", which is not a registered voter.
    "CREATE TABLE IF NOT EXISTS votes (
        vote_id UUID PRIMARY KEY,
        poll_id UUID NOT NULL REFERENCES polls(poll_id),
        voter_id VARCHAR(64) NOT NULL,
        choice TEXT NOT NULL,
        timestamp BIGINT NOT NULL,
        signature TEXT,
        block_index BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS vote_records (
        poll_id UUID NOT NULL,
        voter_id VARCHAR(64) NOT NULL,
        PRIMARY KEY (poll_id, voter_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_votes_poll_id ON votes(poll_id)",
    "CREATE INDEX IF NOT EXISTS idx_votes_voter_id ON votes(voter_id)",
    "CREATE INDEX IF NOT EXISTS idx_blocks_block_index ON blocks(block_index)",
];

/// Handle to the relational store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and applies the schema.
    pub async fn connect(url: &str) -> Result<Self, PersistError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), PersistError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Highest persisted block index, if any blocks exist.
    pub async fn max_block_index(&self) -> Result<Option<i64>, PersistError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(block_index) FROM blocks")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    pub async fn insert_block(&self, block: &Block) -> Result<(), PersistError> {
        let data = serde_json::to_value(&block.data)
            .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        sqlx::query(
            "INSERT INTO blocks (block_index, timestamp, data, previous_hash, hash, nonce)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (block_index) DO NOTHING",
        )
        .bind(block.index as i64)
        .bind(block.timestamp)
        .bind(data)
        .bind(&block.previous_hash)
        .bind(&block.hash)
        .bind(block.nonce as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_voter(&self, voter: &Voter) -> Result<(), PersistError> {
        sqlx::query(
            "INSERT INTO voters (voter_id, name, email, department, public_key, registered_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (voter_id) DO NOTHING",
        )
        .bind(&voter.voter_id)
        .bind(&voter.name)
        .bind(&voter.email)
        .bind(&voter.department)
        .bind(&voter.public_key)
        .bind(voter.registered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_poll(&self, poll: &Poll) -> Result<(), PersistError> {
        let options = serde_json::to_value(&poll.options)
            .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        let eligible = serde_json::to_value(&poll.eligible_voters)
            .map_err(|e| PersistError::Corrupt(e.to_string()))?;
        sqlx::query(
            "INSERT INTO polls (poll_id, title, description, options, creator,
                                start_time, end_time, eligible_voters,
                                allow_multiple_votes, is_anonymous)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (poll_id) DO NOTHING",
        )
        .bind(poll.poll_id)
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(options)
        .bind(&poll.creator)
        .bind(poll.start_time)
        .bind(poll.end_time)
        .bind(eligible)
        .bind(poll.allow_multiple_votes)
        .bind(poll.is_anonymous)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_vote(&self, ballot: &Ballot, block_index: u64) -> Result<(), PersistError> {
        sqlx::query(
            "INSERT INTO votes (vote_id, poll_id, voter_id, choice, timestamp, signature, block_index)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (vote_id) DO NOTHING",
        )
        .bind(ballot.vote_id)
        .bind(ballot.poll_id)
        .bind(&ballot.voter_id)
        .bind(&ballot.choice)
        .bind(ballot.timestamp)
        .bind(&ballot.signature)
        .bind(block_index as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_vote_record(
        &self,
        poll_id: Uuid,
        voter_id: &str,
    ) -> Result<(), PersistError> {
        sqlx::query(
            "INSERT INTO vote_records (poll_id, voter_id)
             VALUES ($1, $2)
             ON CONFLICT (poll_id, voter_id) DO NOTHING",
        )
        .bind(poll_id)
        .bind(voter_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_voters(&self) -> Result<Vec<Voter>, PersistError> {
        let rows = sqlx::query(
            "SELECT voter_id, name, email, department, public_key, registered_at
             FROM voters ORDER BY registered_at",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Voter {
                    voter_id: row.try_get("voter_id")?,
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    department: row.try_get("department")?,
                    public_key: row.try_get("public_key")?,
                    registered_at: row.try_get("registered_at")?,
                })
            })
            .collect()
    }

    pub async fn load_polls(&self) -> Result<Vec<Poll>, PersistError> {
        let rows = sqlx::query(
            "SELECT poll_id, title, description, options, creator, start_time, end_time,
                    eligible_voters, allow_multiple_votes, is_anonymous
             FROM polls ORDER BY start_time",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let options: Value = row.try_get("options")?;
                let eligible: Value = row.try_get("eligible_voters")?;
                Ok(Poll {
                    poll_id: row.try_get("poll_id")?,
                    title: row.try_get("title")?,
                    description: row.try_get("description")?,
                    options: serde_json::from_value(options)
                        .map_err(|e| PersistError::Corrupt(format!("poll options: {e}")))?,
                    creator: row.try_get("creator")?,
                    start_time: row.try_get("start_time")?,
                    end_time: row.try_get("end_time")?,
                    eligible_voters: serde_json::from_value(eligible)
                        .map_err(|e| PersistError::Corrupt(format!("eligible voters: {e}")))?,
                    allow_multiple_votes: row.try_get("allow_multiple_votes")?,
                    is_anonymous: row.try_get("is_anonymous")?,
                })
            })
            .collect()
    }

    /// Loads the participation mirror.
    pub async fn load_vote_records(&self) -> Result<Vec<(Uuid, String)>, PersistError> {
        let rows = sqlx::query("SELECT poll_id, voter_id FROM vote_records")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Ok((row.try_get("poll_id")?, row.try_get("voter_id")?)))
            .collect()
    }

    /// Loads the full chain in index order through the permissive payload
    /// decoder.
    pub async fn load_blocks(&self) -> Result<Vec<Block>, PersistError> {
        let rows = sqlx::query(
            "SELECT block_index, timestamp, data, previous_hash, hash, nonce
             FROM blocks ORDER BY block_index",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let index: i64 = row.try_get("block_index")?;
                let data: Value = row.try_get("data")?;
                let payload = BlockPayload::decode(&data).map_err(|e| {
                    PersistError::Corrupt(format!("block {index} payload: {e}"))
                })?;
                let nonce: i64 = row.try_get("nonce")?;
                Ok(Block {
                    index: index as u64,
                    timestamp: row.try_get("timestamp")?,
                    data: payload,
                    previous_hash: row.try_get("previous_hash")?,
                    nonce: nonce as u64,
                    hash: row.try_get("hash")?,
                })
            })
            .collect()
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
