use chrono::Utc;
use log::{info, warn};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::{ConsensusEngine, Seal};
use crate::error::ConsensusError;

pub const MIN_STAKE: f64 = 32.0;
pub const SLASH_PENALTY_PCT: f64 = 10.0;
pub const ANNUAL_YIELD_PCT: f64 = 5.0;
/// One block per minute.
const BLOCKS_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;

/// Stake-weighted validator selection with slashing.
#[derive(Debug, Clone, Default)]
pub struct ProofOfStake {
    validators: BTreeMap<String, f64>,
    slashed: BTreeMap<String, f64>,
    blocks_produced: BTreeMap<String, u64>,
    total_staked: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidatorStats {
    pub address: String,
    pub stake: f64,
    pub pct: f64,
    pub blocks: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PosStats {
    pub total_staked: f64,
    pub validator_count: usize,
    pub validators: Vec<ValidatorStats>,
}

fn short(address: &str) -> &str {
    &address[..address.len().min(16)]
}

impl ProofOfStake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_staked(&self) -> f64 {
        self.total_staked
    }

    pub fn stake_of(&self, address: &str) -> Option<f64> {
        self.validators.get(address).copied()
    }

    pub fn slashed_total(&self, address: &str) -> f64 {
        self.slashed.get(address).copied().unwrap_or_default()
    }

    pub fn blocks_produced(&self, address: &str) -> u64 {
        self.blocks_produced.get(address).copied().unwrap_or_default()
    }

    /// Lock `amount` for `address`, adding to any existing stake.
    pub fn stake(&mut self, address: &str, amount: f64) -> Result<f64, ConsensusError> {
        if !(amount >= MIN_STAKE) {
            warn!("Stake too low: {amount:.2} < {MIN_STAKE:.2} minimum");
            return Err(ConsensusError::StakeTooLow {
                amount,
                minimum: MIN_STAKE,
            });
        }

        let stake = self.validators.entry(address.to_string()).or_default();
        *stake += amount;
        let stake = *stake;
        self.total_staked += amount;
        self.blocks_produced.entry(address.to_string()).or_default();

        info!(
            "Validator {} staked {:.2} (total stake: {:.2})",
            short(address),
            amount,
            stake
        );
        Ok(stake)
    }

    /// Withdraw the full stake. Returns 0 for non-validators.
    pub fn unstake(&mut self, address: &str) -> f64 {
        match self.validators.remove(address) {
            Some(amount) => {
                self.total_staked -= amount;
                info!("Validator {} unstaked {:.2}", short(address), amount);
                amount
            }
            None => 0.0,
        }
    }

    pub fn select_validator(&self) -> Option<String> {
        self.select_validator_with(&mut rand::thread_rng())
    }

    /// Weighted draw: each validator wins with probability stake / total.
    pub fn select_validator_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let total: f64 = self.validators.values().sum();
        if self.validators.is_empty() || total <= 0.0 {
            return None;
        }

        let mut pick = rng.gen_range(0.0..total);
        for (address, stake) in &self.validators {
            if pick < *stake {
                return Some(address.clone());
            }
            pick -= stake;
        }
        self.validators.keys().next_back().cloned()
    }

    /// Seal `block_data` as `validator` and count the block towards its rewards.
    pub fn produce_block(&mut self, validator: &str, block_data: &str) -> Result<Seal, ConsensusError> {
        let stake = self
            .stake_of(validator)
            .ok_or_else(|| ConsensusError::UnknownValidator(validator.to_string()))?;

        let timestamp = Utc::now().timestamp_millis();
        *self.blocks_produced.entry(validator.to_string()).or_default() += 1;

        Ok(Seal::Stake {
            validator: validator.to_string(),
            block_hash: stake_hash(block_data, validator, timestamp),
            stake,
            timestamp,
        })
    }

    /// Burn `SLASH_PENALTY_PCT` of the validator's stake; evict it if what is
    /// left falls under `MIN_STAKE`. Returns the penalty.
    pub fn slash(&mut self, address: &str, reason: &str) -> f64 {
        let Some(stake) = self.validators.get_mut(address) else {
            return 0.0;
        };

        let penalty = *stake * (SLASH_PENALTY_PCT / 100.0);
        *stake -= penalty;
        let remaining = *stake;
        self.total_staked -= penalty;
        *self.slashed.entry(address.to_string()).or_default() += penalty;

        warn!(
            "SLASHED {} for {}: lost {:.2} ({:.1}% of stake)",
            short(address),
            reason,
            penalty,
            SLASH_PENALTY_PCT
        );

        if remaining < MIN_STAKE {
            self.validators.remove(address);
            self.total_staked -= remaining;
            warn!(
                "Validator {} removed, stake below minimum after slashing",
                short(address)
            );
        }
        penalty
    }

    /// Epoch rewards at `ANNUAL_YIELD_PCT` per year, only for validators that
    /// produced at least one block.
    pub fn calculate_rewards(&self, blocks_this_epoch: u64) -> BTreeMap<String, f64> {
        if self.validators.is_empty() || blocks_this_epoch == 0 {
            return BTreeMap::new();
        }

        let rate = ANNUAL_YIELD_PCT / 100.0 / BLOCKS_PER_YEAR;
        self.validators
            .iter()
            .filter(|(address, _)| self.blocks_produced(address) > 0)
            .map(|(address, stake)| {
                let reward = stake * rate * blocks_this_epoch as f64;
                (address.clone(), round8(reward))
            })
            .collect()
    }

    pub fn stats(&self) -> PosStats {
        let mut validators: Vec<ValidatorStats> = self
            .validators
            .iter()
            .map(|(address, stake)| ValidatorStats {
                address: address.clone(),
                stake: *stake,
                pct: if self.total_staked > 0.0 {
                    (stake / self.total_staked * 1000.0).round() / 10.0
                } else {
                    0.0
                },
                blocks: self.blocks_produced(address),
            })
            .collect();
        validators.sort_by(|a, b| b.stake.total_cmp(&a.stake));

        PosStats {
            total_staked: self.total_staked,
            validator_count: self.validators.len(),
            validators,
        }
    }
}

impl ConsensusEngine for ProofOfStake {
    fn seal(&mut self, block_data: &str) -> Result<Seal, ConsensusError> {
        let validator = self.select_validator().ok_or(ConsensusError::NoValidators)?;
        self.produce_block(&validator, block_data)
    }

    fn verify(&self, block_data: &str, seal: &Seal) -> bool {
        match seal {
            Seal::Stake {
                validator,
                block_hash,
                timestamp,
                ..
            } => {
                self.validators.contains_key(validator)
                    && *block_hash == stake_hash(block_data, validator, *timestamp)
            }
            Seal::Work { .. } => false,
        }
    }
}

fn stake_hash(block_data: &str, validator: &str, timestamp: i64) -> String {
    hex::encode(Sha256::digest(
        format!("{block_data}:{validator}:{timestamp}").as_bytes(),
    ))
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}
