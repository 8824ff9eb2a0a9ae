pub mod pos;
pub mod pow;

use serde::{Deserialize, Serialize};

use crate::error::ConsensusError;

pub use pos::{ProofOfStake, PosStats, ValidatorStats};
pub use pow::ProofOfWork;

/// Evidence that a block producer earned the right to extend the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Seal {
    Work {
        nonce: u64,
        hash: String,
    },
    Stake {
        validator: String,
        block_hash: String,
        stake: f64,
        timestamp: i64,
    },
}

/// Common surface of the interchangeable consensus algorithms.
pub trait ConsensusEngine {
    /// Produce a seal over `block_data` (mine, or select and sign).
    fn seal(&mut self, block_data: &str) -> Result<Seal, ConsensusError>;

    /// Check a seal previously produced for `block_data`.
    fn verify(&self, block_data: &str, seal: &Seal) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seal_and_check(engine: &mut dyn ConsensusEngine) {
        let seal = engine.seal("header").expect("seal");
        assert!(engine.verify("header", &seal));
        assert!(!engine.verify("other header", &seal));
    }

    #[test]
    fn engines_are_swappable() {
        let mut pow = ProofOfWork::new(2);
        seal_and_check(&mut pow);

        let mut pos = ProofOfStake::new();
        pos.stake("alice", 40.0).expect("stake");
        seal_and_check(&mut pos);
    }

    #[test]
    fn seals_do_not_cross_engines() {
        let mut pow = ProofOfWork::new(1);
        let mut pos = ProofOfStake::new();
        pos.stake("alice", 40.0).expect("stake");

        let work = pow.seal("data").expect("seal");
        let stake = pos.seal("data").expect("seal");
        assert!(!pos.verify("data", &work));
        assert!(!pow.verify("data", &stake));
    }
}
