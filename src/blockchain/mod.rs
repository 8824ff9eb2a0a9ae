pub mod block;
pub mod merkle;
pub mod model;

pub use block::{Block, header_hash, meets_difficulty, merkle_root_of, target_prefix};
pub use merkle::{MerkleTree, Position, ProofStep};
pub use model::{Blockchain, next_difficulty, reward_for_height};

/// Hash every block links from at genesis.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Difficulty never drops below this.
pub const MIN_DIFFICULTY: u32 = 1;
