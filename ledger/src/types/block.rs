//! Block structure and canonical hashing.
//!
//! A block's hash is the SHA-256 of a canonical JSON serialization of its
//! other fields. The payload is first reduced to a `serde_json::Value`,
//! whose object maps keep keys sorted, so the typed enum and a generic map
//! carrying the same data hash identically. The same pre-image is used by
//! mining, appending, and verification; any drift here breaks the chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::sha256_hex;

use super::BlockPayload;

/// Previous-hash sentinel carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// An immutable ledger entry.
///
/// Blocks are append-only: `index` is dense and strictly increasing, and
/// `previous_hash` links each block to its predecessor. The stored `hash`
/// satisfies the proof-of-work difficulty prefix at the time of mining.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 0-based position in the chain.
    pub index: u64,
    /// Wall-clock time of mining, seconds since Unix epoch.
    pub timestamp: i64,
    /// The sealed payload.
    pub data: BlockPayload,
    /// Hex hash of the predecessor, or [`GENESIS_PREVIOUS_HASH`].
    pub previous_hash: String,
    /// Proof-of-work counter.
    pub nonce: u64,
    /// Lowercase hex SHA-256 over the canonical serialization above.
    pub hash: String,
}

/// Canonical hash pre-image: field order is part of the format.
#[derive(Serialize)]
struct HashInput<'a> {
    index: u64,
    timestamp: i64,
    data: &'a Value,
    previous_hash: &'a str,
    nonce: u64,
}

/// Computes the canonical hash for the given block fields.
///
/// `data` must already be in `Value` form; callers that mine convert the
/// payload once and reuse it across nonce attempts.
pub fn compute_hash(index: u64, timestamp: i64, data: &Value, previous_hash: &str, nonce: u64) -> String {
    let input = HashInput {
        index,
        timestamp,
        data,
        previous_hash,
        nonce,
    };
    let encoded = serde_json::to_string(&input)
        .expect("block hash input should always be serializable");
    sha256_hex(encoded.as_bytes())
}

/// Returns `true` if `hash` carries the required difficulty prefix.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

impl Block {
    /// Recomputes this block's hash from its stored fields.
    pub fn recompute_hash(&self) -> String {
        let data = serde_json::to_value(&self.data)
            .expect("block payload should always be serializable");
        compute_hash(
            self.index,
            self.timestamp,
            &data,
            &self.previous_hash,
            self.nonce,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dummy_block() -> Block {
        let data = BlockPayload::Genesis {
            message: "genesis".to_string(),
        };
        let value = serde_json::to_value(&data).unwrap();
        let hash = compute_hash(0, 1_700_000_000, &value, GENESIS_PREVIOUS_HASH, 7);
        Block {
            index: 0,
            timestamp: 1_700_000_000,
            data,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: 7,
            hash,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let block = dummy_block();
        assert_eq!(block.recompute_hash(), block.hash);
        assert_eq!(block.recompute_hash(), block.recompute_hash());
    }

    #[test]
    fn hash_changes_with_any_field() {
        let block = dummy_block();
        let base = block.recompute_hash();

        let mut bumped_nonce = block.clone();
        bumped_nonce.nonce += 1;
        assert_ne!(bumped_nonce.recompute_hash(), base);

        let mut bumped_time = block.clone();
        bumped_time.timestamp += 1;
        assert_ne!(bumped_time.recompute_hash(), base);

        let mut relinked = block;
        relinked.previous_hash = "f".repeat(64);
        assert_ne!(relinked.recompute_hash(), base);
    }

    #[test]
    fn typed_and_generic_payloads_hash_identically() {
        // The generic map deliberately lists keys out of order; Value
        // objects sort them, so the pre-image matches the typed form.
        let typed = serde_json::to_value(BlockPayload::VoterRegistration {
            voter_id: "0123456789abcdef".to_string(),
            timestamp: 1_700_000_000,
        })
        .unwrap();
        let generic = json!({
            "voter_id": "0123456789abcdef",
            "type": "voter_registration",
            "timestamp": 1_700_000_000,
        });

        let a = compute_hash(3, 1_700_000_100, &typed, "abc", 42);
        let b = compute_hash(3, 1_700_000_100, &generic, "abc", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn difficulty_prefix_check() {
        assert!(meets_difficulty("000abc", 3));
        assert!(meets_difficulty("000abc", 0));
        assert!(!meets_difficulty("00abc0", 3));
        assert!(!meets_difficulty("00", 3));
    }
}
