use log::debug;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use super::{ConsensusEngine, Seal};
use crate::blockchain::{meets_difficulty, target_prefix};
use crate::error::ConsensusError;

/// Hash search over `SHA256("{block_data}:{nonce}")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    pub difficulty: u32,
}

impl ProofOfWork {
    pub fn new(difficulty: u32) -> Self {
        Self { difficulty }
    }

    pub fn target(&self) -> String {
        target_prefix(self.difficulty)
    }

    fn attempt(block_data: &str, nonce: u64) -> String {
        hex::encode(Sha256::digest(format!("{block_data}:{nonce}").as_bytes()))
    }

    /// Try nonces from 0 upwards; returns the first `(nonce, hash)` that
    /// meets the difficulty.
    pub fn mine(&self, block_data: &str) -> (u64, String) {
        let mut nonce = 0u64;
        loop {
            let hash = Self::attempt(block_data, nonce);
            if meets_difficulty(&hash, self.difficulty) {
                debug!("PoW solved at nonce {nonce} (difficulty {})", self.difficulty);
                return (nonce, hash);
            }
            nonce = nonce.wrapping_add(1);
        }
    }

    pub fn verify_nonce(&self, block_data: &str, nonce: u64) -> bool {
        meets_difficulty(&Self::attempt(block_data, nonce), self.difficulty)
    }

    /// Hashes per second, measured by hashing for `window` of wall-clock time.
    pub fn estimate_hashrate(&self, block_data: &str, window: Duration) -> f64 {
        let start = Instant::now();
        let mut count = 0u64;
        while start.elapsed() < window {
            let _ = Self::attempt(block_data, count);
            count += 1;
        }
        let secs = start.elapsed().as_secs_f64();
        if secs > 0.0 { count as f64 / secs } else { 0.0 }
    }

    /// Numeric 256-bit target, big endian: `(2^256 - 1) >> difficulty`.
    pub fn difficulty_to_target(difficulty: u32) -> [u8; 32] {
        let mut target = [0xffu8; 32];
        let shift = difficulty.min(256) as usize;
        let (whole, bits) = (shift / 8, shift % 8);

        for byte in target.iter_mut().take(whole) {
            *byte = 0;
        }
        if whole < 32 && bits > 0 {
            target[whole] = 0xff >> bits;
        }
        target
    }
}

impl ConsensusEngine for ProofOfWork {
    fn seal(&mut self, block_data: &str) -> Result<Seal, ConsensusError> {
        let (nonce, hash) = self.mine(block_data);
        Ok(Seal::Work { nonce, hash })
    }

    fn verify(&self, block_data: &str, seal: &Seal) -> bool {
        match seal {
            Seal::Work { nonce, hash } => {
                *hash == Self::attempt(block_data, *nonce) && meets_difficulty(hash, self.difficulty)
            }
            Seal::Stake { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mined_nonce_verifies() {
        let pow = ProofOfWork::new(3);
        let (nonce, hash) = pow.mine("block_header_with_transactions");
        assert!(hash.starts_with("000"));
        assert!(pow.verify_nonce("block_header_with_transactions", nonce));
        assert_eq!(pow.target(), "000");
    }

    #[test]
    fn forged_seal_hash_is_rejected() {
        let mut pow = ProofOfWork::new(1);
        let Seal::Work { nonce, .. } = pow.seal("data").unwrap() else {
            panic!("expected work seal");
        };
        let forged = Seal::Work {
            nonce,
            hash: "0".repeat(64),
        };
        assert!(!pow.verify("data", &forged));
    }

    #[test]
    fn hashrate_is_positive() {
        let pow = ProofOfWork::new(1);
        assert!(pow.estimate_hashrate("data", Duration::from_millis(20)) > 0.0);
    }

    #[test]
    fn target_halves_per_difficulty_step() {
        assert_eq!(ProofOfWork::difficulty_to_target(0), [0xff; 32]);

        let t1 = ProofOfWork::difficulty_to_target(1);
        assert_eq!(t1[0], 0x7f);
        assert!(t1[1..].iter().all(|b| *b == 0xff));

        let t12 = ProofOfWork::difficulty_to_target(12);
        assert_eq!(&t12[..2], &[0x00, 0x0f]);

        assert_eq!(ProofOfWork::difficulty_to_target(256), [0u8; 32]);
    }
}
