//! Pool payout accounting.
//!
//! Shares are recorded as they are accepted; when the pool finds a block the
//! reward, less the pool fee, is split according to the configured scheme.

use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::RewardConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutScheme {
    /// Pay per share: fixed credit per share, settled at block time.
    Pps,
    /// Pay per last N shares, across rounds.
    Pplns,
    /// Split by shares since the previous block.
    Proportional,
}

impl PayoutScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutScheme::Pps => "pps",
            PayoutScheme::Pplns => "pplns",
            PayoutScheme::Proportional => "proportional",
        }
    }
}

impl fmt::Display for PayoutScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pps" => Ok(PayoutScheme::Pps),
            "pplns" => Ok(PayoutScheme::Pplns),
            "proportional" | "prop" => Ok(PayoutScheme::Proportional),
            other => Err(format!("unknown payout scheme: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub miner_address: String,
    pub worker_name: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutRecord {
    pub block_reward: f64,
    pub pool_fee: f64,
    pub distributed: f64,
    pub scheme: PayoutScheme,
    pub payouts: BTreeMap<String, f64>,
    pub timestamp: i64,
    pub finder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RewardStats {
    pub scheme: PayoutScheme,
    pub pool_fee_pct: f64,
    pub total_shares_recorded: usize,
    pub round_shares: usize,
    pub total_distributed: f64,
    pub payouts_count: usize,
    pub unique_miners: usize,
    /// Top ten miners by lifetime share count.
    pub share_counts: Vec<(String, u64)>,
}

#[derive(Debug, Clone)]
pub struct RewardDistributor {
    scheme: PayoutScheme,
    config: RewardConfig,
    all_shares: Vec<Share>,
    round_shares: Vec<Share>,
    share_counts: BTreeMap<String, u64>,
    pps_balances: BTreeMap<String, f64>,
    payout_history: Vec<PayoutRecord>,
    total_distributed: f64,
}

impl RewardDistributor {
    pub fn new(scheme: PayoutScheme) -> Self {
        Self::with_config(scheme, RewardConfig::default())
    }

    pub fn with_config(scheme: PayoutScheme, config: RewardConfig) -> Self {
        Self {
            scheme,
            config,
            all_shares: Vec::new(),
            round_shares: Vec::new(),
            share_counts: BTreeMap::new(),
            pps_balances: BTreeMap::new(),
            payout_history: Vec::new(),
            total_distributed: 0.0,
        }
    }

    pub fn scheme(&self) -> PayoutScheme {
        self.scheme
    }

    pub fn payout_history(&self) -> &[PayoutRecord] {
        &self.payout_history
    }

    pub fn total_distributed(&self) -> f64 {
        self.total_distributed
    }

    pub fn pps_balance(&self, miner: &str) -> f64 {
        self.pps_balances.get(miner).copied().unwrap_or_default()
    }

    /// Track block reward changes (halvings) for PPS crediting.
    pub fn set_assumed_reward(&mut self, reward: f64) {
        self.config.assumed_reward = reward;
    }

    fn fee_multiplier(&self) -> f64 {
        1.0 - self.config.pool_fee_pct / 100.0
    }

    /// Value credited per share under PPS.
    pub fn pps_share_value(&self) -> f64 {
        if self.config.expected_shares_per_block == 0 {
            return 0.0;
        }
        self.config.assumed_reward * self.fee_multiplier()
            / self.config.expected_shares_per_block as f64
    }

    pub fn record_share(&mut self, miner_address: &str, worker_name: &str) {
        let share = Share {
            miner_address: miner_address.to_string(),
            worker_name: worker_name.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.all_shares.push(share.clone());
        self.round_shares.push(share);
        *self.share_counts.entry(miner_address.to_string()).or_default() += 1;

        if self.scheme == PayoutScheme::Pps {
            let value = self.pps_share_value();
            *self.pps_balances.entry(miner_address.to_string()).or_default() += value;
        }
    }

    /// Split `block_reward` minus the pool fee among contributors and start a
    /// new round. Returns address -> amount.
    pub fn distribute(&mut self, block_reward: f64, finder: &str) -> BTreeMap<String, f64> {
        let pool_fee = block_reward * (self.config.pool_fee_pct / 100.0);
        let distributable = block_reward - pool_fee;

        let payouts = match self.scheme {
            PayoutScheme::Pps => std::mem::take(&mut self.pps_balances),
            PayoutScheme::Pplns => {
                let start = self.all_shares.len().saturating_sub(self.config.pplns_window);
                split_by_share_count(&self.all_shares[start..], distributable)
            }
            PayoutScheme::Proportional => split_by_share_count(&self.round_shares, distributable),
        };

        self.payout_history.push(PayoutRecord {
            block_reward,
            pool_fee,
            distributed: distributable,
            scheme: self.scheme,
            payouts: payouts.clone(),
            timestamp: Utc::now().timestamp_millis(),
            finder: finder.to_string(),
        });
        self.total_distributed += distributable;
        self.round_shares.clear();

        info!(
            "Reward distributed: {:.2} coins to {} miners (fee: {:.2}, scheme: {})",
            distributable,
            payouts.len(),
            pool_fee,
            self.scheme
        );
        payouts
    }

    pub fn stats(&self) -> RewardStats {
        let mut top: Vec<(String, u64)> = self
            .share_counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        top.sort_by(|a, b| b.1.cmp(&a.1));
        top.truncate(10);

        RewardStats {
            scheme: self.scheme,
            pool_fee_pct: self.config.pool_fee_pct,
            total_shares_recorded: self.all_shares.len(),
            round_shares: self.round_shares.len(),
            total_distributed: (self.total_distributed * 1e4).round() / 1e4,
            payouts_count: self.payout_history.len(),
            unique_miners: self.share_counts.len(),
            share_counts: top,
        }
    }
}

/// Pro-rata split of `amount` by each miner's share count, rounded to 8 places.
fn split_by_share_count(shares: &[Share], amount: f64) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for s in shares {
        *counts.entry(s.miner_address.as_str()).or_default() += 1;
    }
    let total: u64 = counts.values().sum();
    if total == 0 {
        return BTreeMap::new();
    }

    counts
        .into_iter()
        .map(|(address, count)| {
            let payout = amount * count as f64 / total as f64;
            (address.to_string(), (payout * 1e8).round() / 1e8)
        })
        .collect()
}
