use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which side of the running hash a proof sibling sits on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofStep {
    pub hash: String,
    pub position: Position,
}

/// Binary Merkle tree over string items.
///
/// Leaves are `SHA256(item)`, parents are `SHA256(left || right)` over the hex
/// strings. An odd level duplicates its last hash before pairing. `levels[0]`
/// holds the leaves and the last level holds the root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<String>>,
    root: String,
}

impl MerkleTree {
    pub fn new<S: AsRef<str>>(items: &[S]) -> Self {
        let leaves: Vec<String> = items.iter().map(|d| hash_str(d.as_ref())).collect();
        if leaves.is_empty() {
            return Self {
                levels: Vec::new(),
                root: hash_str("empty"),
            };
        }

        let mut levels = vec![leaves.clone()];
        let mut current = leaves;
        while current.len() > 1 {
            if current.len() % 2 == 1 {
                if let Some(last) = current.last().cloned() {
                    current.push(last);
                }
            }
            let next: Vec<String> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
            levels.push(next.clone());
            current = next;
        }

        let root = current.pop().unwrap_or_default();
        Self { levels, root }
    }

    /// Root of `items`; `hash("empty")` for no items.
    pub fn build_root<S: AsRef<str>>(items: &[S]) -> String {
        Self::new(items).root
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Sibling path from leaf `index` up to (not including) the root.
    /// `None` when `index` is out of range.
    pub fn get_proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut proof = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (sibling_idx, position) = if idx % 2 == 0 {
                (idx + 1, Position::Right)
            } else {
                (idx - 1, Position::Left)
            };
            // A missing right sibling is the duplicated last node.
            let hash = level.get(sibling_idx).unwrap_or(&level[idx]).clone();
            proof.push(ProofStep { hash, position });
            idx /= 2;
        }
        Some(proof)
    }

    /// Recombine `leaf_data` with `proof` and compare against `expected_root`.
    pub fn verify_proof(leaf_data: &str, proof: &[ProofStep], expected_root: &str) -> bool {
        let computed = proof.iter().fold(hash_str(leaf_data), |current, step| {
            match step.position {
                Position::Left => hash_pair(&step.hash, &current),
                Position::Right => hash_pair(&current, &step.hash),
            }
        });
        computed == expected_root
    }
}

pub(crate) fn hash_str(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}
