use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::merkle::MerkleTree;
use crate::transaction::Transaction;

/// A single block in the blockchain holding a list of transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub index: u64,
    pub timestamp: i64, // Unix milliseconds (UTC)
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub merkle_root: String,
    /// Leading zero hex digits the hash must carry.
    pub difficulty: u32,
    pub hash: String,
}

impl Block {
    /// Create a new block (not mined yet). Call `mine()` to perform PoW.
    pub fn new(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        difficulty: u32,
    ) -> Self {
        Self::new_with_timestamp(
            index,
            transactions,
            previous_hash,
            difficulty,
            Utc::now().timestamp_millis(),
        )
    }

    pub fn new_with_timestamp(
        index: u64,
        transactions: Vec<Transaction>,
        previous_hash: String,
        difficulty: u32,
        timestamp: i64,
    ) -> Self {
        let merkle_root = merkle_root_of(&transactions);
        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            merkle_root,
            difficulty,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// SHA-256 over the header fields (everything except `hash` and the raw
    /// transactions, which enter through `merkle_root`).
    pub fn compute_hash(&self) -> String {
        header_hash(
            self.index,
            self.timestamp,
            &self.previous_hash,
            &self.merkle_root,
            self.nonce,
            self.difficulty,
        )
    }

    /// Brute-force nonces from 0 until the hash has `difficulty` leading
    /// zeros. Returns the number of attempts.
    pub fn mine(&mut self) -> u64 {
        let target = target_prefix(self.difficulty);
        self.nonce = 0;
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            self.hash = self.compute_hash();
            if self.hash.starts_with(&target) {
                return attempts;
            }
            self.nonce = self.nonce.wrapping_add(1);
        }
    }

    /// `hash` matches the header and carries the required leading zeros.
    /// (Does NOT validate chain linkage.)
    pub fn is_valid_proof(&self) -> bool {
        self.hash == self.compute_hash() && meets_difficulty(&self.hash, self.difficulty)
    }

    /// `merkle_root` still commits to the current transaction list.
    pub fn has_valid_merkle_root(&self) -> bool {
        self.merkle_root == merkle_root_of(&self.transactions)
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }
}

/// Header hash shared by the ledger and pool workers, so a worker can search
/// nonces without building a `Block`.
pub fn header_hash(
    index: u64,
    timestamp: i64,
    previous_hash: &str,
    merkle_root: &str,
    nonce: u64,
    difficulty: u32,
) -> String {
    let preimage = format!(
        "{}:{}:{}:{}:{}:{}",
        index, timestamp, previous_hash, merkle_root, nonce, difficulty
    );
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    hex::encode(hasher.finalize())
}

/// Merkle root over the canonical JSON of each transaction.
pub fn merkle_root_of(transactions: &[Transaction]) -> String {
    let leaves: Vec<String> = transactions
        .iter()
        .map(|tx| serde_json::to_string(tx).unwrap_or_default())
        .collect();
    MerkleTree::build_root(&leaves)
}

pub fn target_prefix(difficulty: u32) -> String {
    "0".repeat(difficulty as usize)
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    hash.len() >= difficulty as usize
        && hash
            .chars()
            .take(difficulty as usize)
            .all(|c| c == '0')
}
