//! The hash-chained ledger engine.
//!
//! [`Blockchain`] owns the ordered block vector and the proof-of-work
//! difficulty. Appending mines a new block inline: starting from nonce 0,
//! the nonce is incremented until the canonical hash carries the required
//! zero-prefix. Difficulty is the only knob; mining runs to completion,
//! and at the defaults it finishes in milliseconds.
//!
//! Proof-of-work here is a tamper-evidence seal on a single node, not a
//! consensus mechanism.

use std::fmt;

use crate::types::block::{self, GENESIS_PREVIOUS_HASH};
use crate::types::{Block, BlockPayload};

/// Message recorded in the genesis payload.
const GENESIS_MESSAGE: &str = "voting ledger genesis";

/// Errors raised when rehydrating a persisted chain.
#[derive(Debug)]
pub enum ChainError {
    /// The persisted block list was empty.
    Empty,
    /// Block 0 is not a well-formed genesis block.
    BadGenesis,
    /// Block indices are not dense and 0-based.
    BadIndex { expected: u64, found: u64 },
    /// A block's `previous_hash` does not match its predecessor.
    BrokenLink { index: u64 },
    /// A stored hash does not match the recomputed canonical hash, or
    /// lacks the difficulty prefix.
    BadHash { index: u64 },
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Empty => write!(f, "persisted chain is empty"),
            ChainError::BadGenesis => write!(f, "block 0 is not a valid genesis block"),
            ChainError::BadIndex { expected, found } => {
                write!(f, "expected block index {expected}, found {found}")
            }
            ChainError::BrokenLink { index } => {
                write!(f, "block {index} does not link to its predecessor")
            }
            ChainError::BadHash { index } => {
                write!(f, "block {index} fails hash or difficulty verification")
            }
        }
    }
}

impl std::error::Error for ChainError {}

/// The append-only ledger.
#[derive(Debug)]
pub struct Blockchain {
    blocks: Vec<Block>,
    difficulty: usize,
}

impl Blockchain {
    /// Creates a fresh chain containing a mined genesis block.
    pub fn new(difficulty: usize, now: i64) -> Self {
        let payload = BlockPayload::Genesis {
            message: GENESIS_MESSAGE.to_string(),
        };
        let genesis = mine_block(0, now, payload, GENESIS_PREVIOUS_HASH, difficulty);
        Self {
            blocks: vec![genesis],
            difficulty,
        }
    }

    /// Rehydrates a chain from persisted blocks, verifying everything.
    ///
    /// Fails closed: a broken link, a hash mismatch, a missing difficulty
    /// prefix, or non-dense indices all reject the whole chain rather than
    /// guessing at history.
    pub fn from_blocks(blocks: Vec<Block>, difficulty: usize) -> Result<Self, ChainError> {
        if blocks.is_empty() {
            return Err(ChainError::Empty);
        }
        let genesis = &blocks[0];
        if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
            return Err(ChainError::BadGenesis);
        }

        for (i, b) in blocks.iter().enumerate() {
            let expected = i as u64;
            if b.index != expected {
                return Err(ChainError::BadIndex {
                    expected,
                    found: b.index,
                });
            }
            if i > 0 && b.previous_hash != blocks[i - 1].hash {
                return Err(ChainError::BrokenLink { index: b.index });
            }
            if b.recompute_hash() != b.hash || !block::meets_difficulty(&b.hash, difficulty) {
                return Err(ChainError::BadHash { index: b.index });
            }
        }

        Ok(Self { blocks, difficulty })
    }

    /// Mines and appends a new block carrying `data`.
    pub fn append(&mut self, data: BlockPayload, now: i64) -> &Block {
        let previous_hash = self
            .blocks
            .last()
            .expect("chain always contains at least the genesis block")
            .hash
            .clone();
        let index = self.blocks.len() as u64;
        let mined = mine_block(index, now, data, &previous_hash, self.difficulty);
        self.blocks.push(mined);
        self.blocks.last().expect("block was just pushed")
    }

    /// Full integrity check: link, canonical hash, and difficulty prefix
    /// for every block.
    pub fn verify(&self) -> bool {
        for (i, b) in self.blocks.iter().enumerate() {
            if i > 0 && b.previous_hash != self.blocks[i - 1].hash {
                return false;
            }
            if b.recompute_hash() != b.hash || !block::meets_difficulty(&b.hash, self.difficulty) {
                return false;
            }
        }
        true
    }

    /// All blocks, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The most recently appended block.
    pub fn latest(&self) -> &Block {
        self.blocks
            .last()
            .expect("chain always contains at least the genesis block")
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// A chain is never empty; this exists for API completeness.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Configured proof-of-work difficulty (hex-zero prefix length).
    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Clones the block vector for serialization.
    pub fn export(&self) -> Vec<Block> {
        self.blocks.clone()
    }
}

/// Mines a block: increments the nonce until the canonical hash meets the
/// difficulty prefix.
fn mine_block(
    index: u64,
    timestamp: i64,
    data: BlockPayload,
    previous_hash: &str,
    difficulty: usize,
) -> Block {
    // Convert the payload once; the pre-image only varies in the nonce.
    let data_value =
        serde_json::to_value(&data).expect("block payload should always be serializable");

    let mut nonce: u64 = 0;
    let hash = loop {
        let candidate = block::compute_hash(index, timestamp, &data_value, previous_hash, nonce);
        if block::meets_difficulty(&candidate, difficulty) {
            break candidate;
        }
        nonce += 1;
    };

    tracing::debug!(index, nonce, %hash, "mined block");

    Block {
        index,
        timestamp,
        data,
        previous_hash: previous_hash.to_string(),
        nonce,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Difficulty 2 keeps test mining fast while still exercising the
    /// prefix search.
    const TEST_DIFFICULTY: usize = 2;

    fn registration(voter_id: &str) -> BlockPayload {
        BlockPayload::VoterRegistration {
            voter_id: voter_id.to_string(),
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn genesis_block_is_well_formed() {
        let chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        let genesis = chain.latest();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
        assert!(matches!(genesis.data, BlockPayload::Genesis { .. }));
        assert!(block::meets_difficulty(&genesis.hash, TEST_DIFFICULTY));
        assert!(chain.verify());
    }

    #[test]
    fn appended_blocks_link_and_verify() {
        let mut chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        chain.append(registration("0123456789abcdef"), 1_700_000_010);
        chain.append(registration("fedcba9876543210"), 1_700_000_020);

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.blocks()[1].previous_hash, chain.blocks()[0].hash);
        assert_eq!(chain.blocks()[2].previous_hash, chain.blocks()[1].hash);
        assert_eq!(chain.latest().index, 2);
        assert!(chain.verify());
    }

    #[test]
    fn tampering_with_a_payload_breaks_verification() {
        let mut chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        chain.append(registration("0123456789abcdef"), 1_700_000_010);

        chain.blocks[1].data = registration("fedcba9876543210");
        assert!(!chain.verify());
    }

    #[test]
    fn tampering_with_a_link_breaks_verification() {
        let mut chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        chain.append(registration("0123456789abcdef"), 1_700_000_010);

        chain.blocks[1].previous_hash = "0".repeat(64);
        assert!(!chain.verify());
    }

    #[test]
    fn export_rehydrate_roundtrip_preserves_hashes() {
        let mut chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        chain.append(registration("0123456789abcdef"), 1_700_000_010);
        chain.append(registration("fedcba9876543210"), 1_700_000_020);

        let exported = chain.export();
        let hashes: Vec<String> = exported.iter().map(|b| b.hash.clone()).collect();

        let reloaded =
            Blockchain::from_blocks(exported, TEST_DIFFICULTY).expect("export should rehydrate");
        let reloaded_hashes: Vec<String> =
            reloaded.blocks().iter().map(|b| b.hash.clone()).collect();

        assert_eq!(hashes, reloaded_hashes);
        assert!(reloaded.verify());
    }

    #[test]
    fn rehydration_fails_closed_on_tampered_blocks() {
        let mut chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        chain.append(registration("0123456789abcdef"), 1_700_000_010);

        let mut exported = chain.export();
        exported[1].data = registration("fedcba9876543210");

        match Blockchain::from_blocks(exported, TEST_DIFFICULTY) {
            Err(ChainError::BadHash { index }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rehydration_rejects_empty_and_gapped_chains() {
        assert!(matches!(
            Blockchain::from_blocks(Vec::new(), TEST_DIFFICULTY),
            Err(ChainError::Empty)
        ));

        let mut chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        chain.append(registration("0123456789abcdef"), 1_700_000_010);
        let mut exported = chain.export();
        exported[1].index = 5;
        assert!(matches!(
            Blockchain::from_blocks(exported, TEST_DIFFICULTY),
            Err(ChainError::BadIndex { expected: 1, found: 5 })
        ));
    }

    #[test]
    fn serialized_chain_survives_json_roundtrip() {
        // The cache mirror stores the chain as one JSON blob; reloading it
        // through serde must preserve per-block hashes.
        let mut chain = Blockchain::new(TEST_DIFFICULTY, 1_700_000_000);
        chain.append(registration("0123456789abcdef"), 1_700_000_010);

        let json = serde_json::to_string(&chain.export()).expect("chain should serialize");
        let parsed: Vec<Block> = serde_json::from_str(&json).expect("chain should deserialize");
        let reloaded =
            Blockchain::from_blocks(parsed, TEST_DIFFICULTY).expect("reload should verify");
        assert_eq!(reloaded.latest().hash, chain.latest().hash);
    }
}
