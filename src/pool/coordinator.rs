use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::reward::{PayoutScheme, RewardDistributor, RewardStats};
use crate::blockchain::{Block, Blockchain, header_hash, meets_difficulty, target_prefix};
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::transaction::Transaction;
use crate::wallet::{Signer, Wallet};

/// Shares are this many hex digits easier than the network target.
const POOL_DIFFICULTY_OFFSET: u32 = 2;

pub fn pool_difficulty(network_difficulty: u32) -> u32 {
    network_difficulty.saturating_sub(POOL_DIFFICULTY_OFFSET).max(1)
}

fn format_hashrate(h: f64) -> String {
    format!("{h:.1} H/s")
}

/// Candidate header plus everything a worker needs to reproduce its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub block_index: u64,
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
    pub network_difficulty: u32,
    pub pool_difficulty: u32,
    pub nonce_range_start: u64,
    pub timestamp: i64,
    pub merkle_root: String,
}

impl WorkUnit {
    /// Header hash of the candidate block at `nonce`.
    pub fn hash_at(&self, nonce: u64) -> String {
        header_hash(
            self.block_index,
            self.timestamp,
            &self.previous_hash,
            &self.merkle_root,
            nonce,
            self.network_difficulty,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub work: WorkUnit,
    pub nonce_start: u64,
    /// Exclusive.
    pub nonce_end: u64,
    pub target_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareSubmission {
    pub miner_address: String,
    pub worker_name: String,
    pub block_index: u64,
    pub nonce: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Accepted {
        shares_accepted: u64,
        hashrate: String,
    },
    Rejected {
        reason: String,
    },
    BlockFound {
        block_index: u64,
        block_hash: String,
        reward: f64,
        payouts: BTreeMap<String, f64>,
    },
}

#[derive(Debug, Clone)]
pub struct MinerInfo {
    pub address: String,
    pub worker_name: String,
    pub shares_submitted: u64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub blocks_found: u64,
    pub last_share_time: Option<DateTime<Utc>>,
    pub total_earned: f64,
    pub connected_at: DateTime<Utc>,
    pub hashrate_estimate: f64,
}

impl MinerInfo {
    fn new(address: &str, worker_name: &str) -> Self {
        Self {
            address: address.to_string(),
            worker_name: worker_name.to_string(),
            shares_submitted: 0,
            shares_accepted: 0,
            shares_rejected: 0,
            blocks_found: 0,
            last_share_time: None,
            total_earned: 0.0,
            connected_at: Utc::now(),
            hashrate_estimate: 0.0,
        }
    }

    fn summary(&self) -> MinerSummary {
        let connected = (Utc::now() - self.connected_at).num_milliseconds() as f64 / 1000.0;
        MinerSummary {
            address: self.address.clone(),
            worker_name: self.worker_name.clone(),
            shares_submitted: self.shares_submitted,
            shares_accepted: self.shares_accepted,
            shares_rejected: self.shares_rejected,
            blocks_found: self.blocks_found,
            total_earned: self.total_earned,
            hashrate_estimate: format_hashrate(self.hashrate_estimate),
            connected_seconds: (connected * 10.0).round() / 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerSummary {
    pub address: String,
    pub worker_name: String,
    pub shares_submitted: u64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub blocks_found: u64,
    pub total_earned: f64,
    pub hashrate_estimate: String,
    pub connected_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: String,
    pub miner: MinerSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct MinerStats {
    pub address: String,
    pub balance: f64,
    pub workers: Vec<MinerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub name: String,
    pub uptime_seconds: f64,
    pub blocks_found: u64,
    pub total_shares: u64,
    pub payout_scheme: PayoutScheme,
    pub pool_difficulty: u32,
    pub network_difficulty: u32,
    pub total_hashrate: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainStatus {
    pub height: u64,
    pub block_reward: f64,
    pub valid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MinerList {
    pub connected: usize,
    pub list: Vec<MinerSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub pool: PoolSummary,
    pub blockchain: ChainStatus,
    pub miners: MinerList,
    pub rewards: RewardStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockBrief {
    pub index: u64,
    pub hash: String,
    pub transactions: usize,
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    pub height: u64,
    pub difficulty: u32,
    pub block_reward: f64,
    pub chain_valid: bool,
    pub recent_blocks: Vec<BlockBrief>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub service: &'static str,
    pub status: &'static str,
    pub uptime_seconds: f64,
    pub miners_connected: usize,
    pub blocks_found: u64,
    pub total_shares: u64,
    pub blockchain_height: u64,
    pub difficulty: u32,
    pub pool_difficulty: u32,
    pub payout_scheme: PayoutScheme,
}

/// Everything the pool mutates, behind one lock.
#[derive(Debug)]
struct PoolState {
    blockchain: Blockchain,
    miners: BTreeMap<(String, String), MinerInfo>,
    nonce_counter: u64,
    /// Shared candidate for the current height; every work unit hashes it.
    template: Option<Block>,
    distributor: RewardDistributor,
    blocks_found: u64,
    total_shares: u64,
    /// (block_index, nonce) already credited.
    seen_shares: HashSet<(u64, u64)>,
}

impl PoolState {
    fn pool_difficulty(&self) -> u32 {
        pool_difficulty(self.blockchain.difficulty())
    }

    fn template_for(&mut self, pool_address: &str) -> &Block {
        let height = self.blockchain.height();
        let tip = &self.blockchain.last_block().hash;
        if self
            .template
            .as_ref()
            .is_none_or(|t| t.index != height || &t.previous_hash != tip)
        {
            self.template = None;
            self.seen_shares.clear();
        }

        let blockchain = &self.blockchain;
        self.template.get_or_insert_with(|| {
            let block = blockchain.block_template(pool_address);
            debug!(
                "New pool template for block #{} ({} txs, difficulty {})",
                block.index,
                block.transactions.len(),
                block.difficulty
            );
            block
        })
    }

    fn uptime(started_at: DateTime<Utc>) -> f64 {
        ((Utc::now() - started_at).num_milliseconds() as f64 / 100.0).round() / 10.0
    }
}

/// Mining pool coordinator. All mutation goes through one mutex so that a
/// block is found and settled exactly once; `height` mirrors the chain tip
/// for lock-free staleness checks by workers.
#[derive(Debug)]
pub struct PoolCoordinator {
    state: Mutex<PoolState>,
    height: AtomicU64,
    pool_wallet: Wallet,
    name: String,
    nonce_range_size: u64,
    started_at: DateTime<Utc>,
}

impl PoolCoordinator {
    pub fn new(config: PoolConfig) -> Self {
        let blockchain = Blockchain::with_config(config.chain.clone());
        let mut distributor =
            RewardDistributor::with_config(config.payout_scheme, config.rewards.clone());
        distributor.set_assumed_reward(blockchain.block_reward());
        let height = blockchain.height();

        let pool_wallet = Wallet::generate();
        info!(
            "Pool '{}' started: address={}, scheme={}, pool difficulty={}, network difficulty={}",
            config.name,
            pool_wallet.address(),
            config.payout_scheme,
            pool_difficulty(blockchain.difficulty()),
            blockchain.difficulty()
        );

        Self {
            state: Mutex::new(PoolState {
                blockchain,
                miners: BTreeMap::new(),
                nonce_counter: 0,
                template: None,
                distributor,
                blocks_found: 0,
                total_shares: 0,
                seen_shares: HashSet::new(),
            }),
            height: AtomicU64::new(height),
            pool_wallet,
            name: config.name,
            nonce_range_size: config.nonce_range_size.max(1),
            started_at: Utc::now(),
        }
    }

    pub fn pool_address(&self) -> String {
        self.pool_wallet.address()
    }

    pub fn pool_wallet(&self) -> &Wallet {
        &self.pool_wallet
    }

    /// Height the pool is currently mining for.
    pub fn current_height(&self) -> u64 {
        self.height.load(Ordering::Acquire)
    }

    /// Run `f` against the pool's ledger under the state lock. A template
    /// that no longer extends the tip is dropped.
    pub fn with_blockchain<R>(&self, f: impl FnOnce(&mut Blockchain) -> R) -> R {
        let mut state = self.state.lock().expect("mutex poisoned");
        let out = f(&mut state.blockchain);

        let tip = state.blockchain.last_block().hash.clone();
        if state.template.as_ref().is_some_and(|t| t.previous_hash != tip) {
            debug!("Chain moved under the pool; dropping template");
            state.template = None;
            state.seen_shares.clear();
        }
        self.height.store(state.blockchain.height(), Ordering::Release);
        out
    }

    pub fn register(&self, address: &str, worker_name: &str) -> RegisterResponse {
        let mut state = self.state.lock().expect("mutex poisoned");
        let key = (address.to_string(), worker_name.to_string());

        if let Some(existing) = state.miners.get(&key) {
            return RegisterResponse {
                status: "already_registered".to_string(),
                miner: existing.summary(),
            };
        }

        let miner = MinerInfo::new(address, worker_name);
        let summary = miner.summary();
        state.miners.insert(key, miner);
        info!(
            "Miner registered: {} ({})",
            &address[..address.len().min(16)],
            worker_name
        );

        RegisterResponse {
            status: "registered".to_string(),
            miner: summary,
        }
    }

    /// Hand out the next disjoint nonce range over the current template.
    pub fn get_work(&self, address: &str, worker_name: &str) -> Result<WorkAssignment, PoolError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        if !state
            .miners
            .contains_key(&(address.to_string(), worker_name.to_string()))
        {
            return Err(PoolError::NotRegistered);
        }

        let pool_diff = state.pool_difficulty();
        let nonce_start = state.nonce_counter;
        state.nonce_counter = state.nonce_counter.saturating_add(self.nonce_range_size);

        let pool_address = self.pool_wallet.address();
        let template = state.template_for(&pool_address);
        let work = WorkUnit {
            block_index: template.index,
            previous_hash: template.previous_hash.clone(),
            transactions: template.transactions.clone(),
            network_difficulty: template.difficulty,
            pool_difficulty: pool_diff,
            nonce_range_start: nonce_start,
            timestamp: template.timestamp,
            merkle_root: template.merkle_root.clone(),
        };

        Ok(WorkAssignment {
            work,
            nonce_start,
            nonce_end: nonce_start.saturating_add(self.nonce_range_size),
            target_prefix: target_prefix(pool_diff),
        })
    }

    /// Validate a share and credit it; settle the block if the share also
    /// meets the network target.
    pub fn submit_share(&self, share: &ShareSubmission) -> Result<SubmitOutcome, PoolError> {
        let mut guard = self.state.lock().expect("mutex poisoned");
        let state = &mut *guard;
        let key = (share.miner_address.clone(), share.worker_name.clone());
        if !state.miners.contains_key(&key) {
            return Err(PoolError::NotRegistered);
        }

        if state.seen_shares.contains(&(share.block_index, share.nonce)) {
            debug!("Duplicate share {}:{} ignored", share.block_index, share.nonce);
            return Ok(SubmitOutcome::Rejected {
                reason: "Duplicate share".to_string(),
            });
        }

        state.total_shares += 1;
        let pool_diff = state.pool_difficulty();
        let height = state.blockchain.height();
        let tip = state.blockchain.last_block().hash.clone();
        let verdict = match state.template.as_ref() {
            Some(t) if t.index == share.block_index && t.index == height && t.previous_hash == tip => {
                let expected = header_hash(
                    t.index,
                    t.timestamp,
                    &t.previous_hash,
                    &t.merkle_root,
                    share.nonce,
                    t.difficulty,
                );
                if expected != share.hash {
                    Err("Hash does not match block header".to_string())
                } else if !meets_difficulty(&share.hash, pool_diff) {
                    Err(format!(
                        "Hash doesn't meet pool difficulty (need {}...)",
                        target_prefix(pool_diff)
                    ))
                } else {
                    Ok(meets_difficulty(&share.hash, t.difficulty))
                }
            }
            _ => Err(format!(
                "Stale share for block #{} (pool is on #{})",
                share.block_index, height
            )),
        };

        // A block-solving share is credited only once the ledger takes the block.
        let verdict = match verdict {
            Ok(true) => match state.template.take() {
                Some(mut block) => {
                    block.nonce = share.nonce;
                    block.hash = share.hash.clone();
                    match state.blockchain.accept_block(block.clone()) {
                        Ok(()) => Ok(Some(block)),
                        Err(e) => {
                            warn!("Pool block #{} rejected by ledger: {}", block.index, e);
                            state.seen_shares.clear();
                            Err(format!("Block rejected by ledger: {e}"))
                        }
                    }
                }
                None => Err(format!("Stale share for block #{}", share.block_index)),
            },
            Ok(false) => Ok(None),
            Err(reason) => Err(reason),
        };

        let Some(miner) = state.miners.get_mut(&key) else {
            return Err(PoolError::NotRegistered);
        };
        miner.shares_submitted += 1;

        let found = match verdict {
            Ok(found) => found,
            Err(reason) => {
                miner.shares_rejected += 1;
                warn!(
                    "Share rejected from {} ({}): {}",
                    &share.miner_address[..share.miner_address.len().min(16)],
                    share.worker_name,
                    reason
                );
                return Ok(SubmitOutcome::Rejected { reason });
            }
        };

        let now = Utc::now();
        miner.shares_accepted += 1;
        miner.last_share_time = Some(now);
        let elapsed = (now - miner.connected_at).num_milliseconds() as f64 / 1000.0;
        if elapsed > 0.0 {
            miner.hashrate_estimate =
                miner.shares_accepted as f64 * 16f64.powi(pool_diff as i32) / elapsed;
        }
        let accepted = SubmitOutcome::Accepted {
            shares_accepted: miner.shares_accepted,
            hashrate: format_hashrate(miner.hashrate_estimate),
        };

        state.seen_shares.insert((share.block_index, share.nonce));
        state
            .distributor
            .record_share(&share.miner_address, &share.worker_name);

        let Some(block) = found else {
            return Ok(accepted);
        };

        let reward = block
            .coinbase()
            .map(Transaction::total_output_value)
            .unwrap_or_default();
        let payouts = state.distributor.distribute(reward, &share.miner_address);

        state.blocks_found += 1;
        if let Some(finder) = state.miners.get_mut(&key) {
            finder.blocks_found += 1;
        }
        for miner in state.miners.values_mut() {
            if let Some(amount) = payouts.get(&miner.address) {
                miner.total_earned += amount;
            }
        }
        state.seen_shares.clear();
        let next_reward = state.blockchain.block_reward();
        state.distributor.set_assumed_reward(next_reward);
        self.height
            .store(state.blockchain.height(), Ordering::Release);

        info!(
            "BLOCK FOUND by {}! Block #{}, reward {:.4} distributed to {} miners",
            &share.miner_address[..share.miner_address.len().min(16)],
            block.index,
            reward,
            payouts.len()
        );

        Ok(SubmitOutcome::BlockFound {
            block_index: block.index,
            block_hash: block.hash,
            reward,
            payouts,
        })
    }

    pub fn miner_stats(&self, address: &str) -> Result<MinerStats, PoolError> {
        let state = self.state.lock().expect("mutex poisoned");
        let workers: Vec<MinerSummary> = state
            .miners
            .values()
            .filter(|m| m.address == address)
            .map(MinerInfo::summary)
            .collect();
        if workers.is_empty() {
            return Err(PoolError::MinerNotFound);
        }

        Ok(MinerStats {
            address: address.to_string(),
            balance: state.blockchain.get_balance(address),
            workers,
        })
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock().expect("mutex poisoned");
        let total_hashrate: f64 = state.miners.values().map(|m| m.hashrate_estimate).sum();

        PoolStats {
            pool: PoolSummary {
                name: self.name.clone(),
                uptime_seconds: PoolState::uptime(self.started_at),
                blocks_found: state.blocks_found,
                total_shares: state.total_shares,
                payout_scheme: state.distributor.scheme(),
                pool_difficulty: state.pool_difficulty(),
                network_difficulty: state.blockchain.difficulty(),
                total_hashrate: format_hashrate(total_hashrate),
            },
            blockchain: ChainStatus {
                height: state.blockchain.height(),
                block_reward: state.blockchain.block_reward(),
                valid: state.blockchain.validate_chain(),
            },
            miners: MinerList {
                connected: state.miners.len(),
                list: state.miners.values().map(MinerInfo::summary).collect(),
            },
            rewards: state.distributor.stats(),
        }
    }

    pub fn blockchain_summary(&self) -> ChainSummary {
        let state = self.state.lock().expect("mutex poisoned");
        let chain = &state.blockchain.chain;
        let recent_blocks = chain[chain.len().saturating_sub(5)..]
            .iter()
            .map(|b| BlockBrief {
                index: b.index,
                hash: format!("{}...", &b.hash[..32.min(b.hash.len())]),
                transactions: b.transactions.len(),
                nonce: b.nonce,
            })
            .collect();

        ChainSummary {
            height: state.blockchain.height(),
            difficulty: state.blockchain.difficulty(),
            block_reward: state.blockchain.block_reward(),
            chain_valid: state.blockchain.validate_chain(),
            recent_blocks,
        }
    }

    pub fn health(&self) -> HealthReport {
        let state = self.state.lock().expect("mutex poisoned");
        HealthReport {
            service: "mining-pool",
            status: "healthy",
            uptime_seconds: PoolState::uptime(self.started_at),
            miners_connected: state.miners.len(),
            blocks_found: state.blocks_found,
            total_shares: state.total_shares,
            blockchain_height: state.blockchain.height(),
            difficulty: state.blockchain.difficulty(),
            pool_difficulty: state.pool_difficulty(),
            payout_scheme: state.distributor.scheme(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;

    fn coordinator(scheme: PayoutScheme) -> PoolCoordinator {
        PoolCoordinator::new(PoolConfig {
            payout_scheme: scheme,
            nonce_range_size: 1_000,
            chain: ChainConfig::with_difficulty(3),
            ..PoolConfig::default()
        })
    }

    fn submission(work: &WorkAssignment, miner: &str, nonce: u64) -> ShareSubmission {
        ShareSubmission {
            miner_address: miner.to_string(),
            worker_name: "rig".to_string(),
            block_index: work.work.block_index,
            nonce,
            hash: work.work.hash_at(nonce),
        }
    }

    /// First nonce from `start` whose hash meets `pool` but not `network`.
    fn find_share(work: &WorkUnit, start: u64) -> u64 {
        (start..)
            .find(|n| {
                let h = work.hash_at(*n);
                meets_difficulty(&h, work.pool_difficulty)
                    && !meets_difficulty(&h, work.network_difficulty)
            })
            .unwrap()
    }

    fn find_block(work: &WorkUnit) -> u64 {
        (0..)
            .find(|n| meets_difficulty(&work.hash_at(*n), work.network_difficulty))
            .unwrap()
    }

    #[test]
    fn pool_difficulty_is_two_below_network_floored_at_one() {
        assert_eq!(pool_difficulty(4), 2);
        assert_eq!(pool_difficulty(3), 1);
        assert_eq!(pool_difficulty(1), 1);
    }

    #[test]
    fn registration_is_idempotent() {
        let pool = coordinator(PayoutScheme::Pplns);
        assert_eq!(pool.register("alice", "rig").status, "registered");
        assert_eq!(pool.register("alice", "rig").status, "already_registered");
        assert_eq!(pool.register("alice", "rig2").status, "registered");
        assert_eq!(pool.stats().miners.connected, 2);
    }

    #[test]
    fn unregistered_miners_get_no_work() {
        let pool = coordinator(PayoutScheme::Pplns);
        assert_eq!(pool.get_work("ghost", "rig"), Err(PoolError::NotRegistered));
    }

    #[test]
    fn work_ranges_are_disjoint_over_one_template() {
        let pool = coordinator(PayoutScheme::Pplns);
        pool.register("alice", "rig");
        pool.register("bob", "rig");

        let a = pool.get_work("alice", "rig").unwrap();
        let b = pool.get_work("bob", "rig").unwrap();
        assert_eq!(a.nonce_end, a.nonce_start + 1_000);
        assert_eq!(b.nonce_start, a.nonce_end);
        assert_eq!(a.work.merkle_root, b.work.merkle_root);
        assert_eq!(a.work.timestamp, b.work.timestamp);
        assert_eq!(a.work.block_index, 1);
        assert_eq!(a.work.pool_difficulty, 1);
        assert_eq!(a.target_prefix, "0");
    }

    #[test]
    fn shares_are_checked_against_the_header() {
        let pool = coordinator(PayoutScheme::Pplns);
        pool.register("alice", "rig");
        let work = pool.get_work("alice", "rig").unwrap();
        let nonce = find_share(&work.work, 0);

        let mut forged = submission(&work, "alice", nonce);
        forged.hash = format!("000{}", &forged.hash[3..]);
        assert!(matches!(
            pool.submit_share(&forged).unwrap(),
            SubmitOutcome::Rejected { .. }
        ));

        let easy_miss = (0..)
            .find(|n| !meets_difficulty(&work.work.hash_at(*n), 1))
            .unwrap();
        match pool.submit_share(&submission(&work, "alice", easy_miss)).unwrap() {
            SubmitOutcome::Rejected { reason } => assert!(reason.contains("pool difficulty")),
            other => panic!("unexpected {other:?}"),
        }

        let ok = pool.submit_share(&submission(&work, "alice", nonce)).unwrap();
        assert!(matches!(ok, SubmitOutcome::Accepted { shares_accepted: 1, .. }));

        let stats = pool.miner_stats("alice").unwrap();
        assert_eq!(stats.workers[0].shares_submitted, 3);
        assert_eq!(stats.workers[0].shares_rejected, 2);
    }

    #[test]
    fn duplicate_share_changes_nothing() {
        let pool = coordinator(PayoutScheme::Pplns);
        pool.register("alice", "rig");
        let work = pool.get_work("alice", "rig").unwrap();
        let share = submission(&work, "alice", find_share(&work.work, 0));

        pool.submit_share(&share).unwrap();
        let before = pool.stats();
        let again = pool.submit_share(&share).unwrap();
        assert_eq!(
            again,
            SubmitOutcome::Rejected {
                reason: "Duplicate share".into()
            }
        );
        let after = pool.stats();
        assert_eq!(before.pool.total_shares, after.pool.total_shares);
        assert_eq!(before.rewards.total_shares_recorded, after.rewards.total_shares_recorded);
    }

    #[test]
    fn network_share_finds_block_and_pays_contributors() {
        let pool = coordinator(PayoutScheme::Pplns);
        pool.register("alice", "rig");
        pool.register("bob", "rig");
        let work = pool.get_work("alice", "rig").unwrap();

        let mut n = 0;
        for _ in 0..3 {
            n = find_share(&work.work, n);
            pool.submit_share(&submission(&work, "alice", n)).unwrap();
            n += 1;
        }
        let bob_nonce = find_share(&work.work, n);
        pool.submit_share(&submission(&work, "bob", bob_nonce)).unwrap();

        let block_nonce = find_block(&work.work);
        let outcome = pool.submit_share(&submission(&work, "bob", block_nonce)).unwrap();
        let SubmitOutcome::BlockFound {
            block_index,
            reward,
            payouts,
            ..
        } = outcome
        else {
            panic!("expected block_found, got {outcome:?}");
        };

        assert_eq!(block_index, 1);
        assert_eq!(reward, 50.0);
        assert!((payouts.values().sum::<f64>() - 49.0).abs() < 1e-6);
        assert!((payouts["alice"] - 29.4).abs() < 1e-9);
        assert!((payouts["bob"] - 19.6).abs() < 1e-9);

        assert_eq!(pool.current_height(), 2);
        let summary = pool.blockchain_summary();
        assert_eq!(summary.height, 2);
        assert!(summary.chain_valid);
        assert_eq!(pool.with_blockchain(|bc| bc.get_balance(&pool.pool_address())), 50.0);

        let stats = pool.stats();
        assert_eq!(stats.pool.blocks_found, 1);
        let bob = pool.miner_stats("bob").unwrap();
        assert_eq!(bob.workers[0].blocks_found, 1);
        assert!((bob.workers[0].total_earned - 19.6).abs() < 1e-9);
    }

    #[test]
    fn shares_for_a_settled_block_are_stale() {
        let pool = coordinator(PayoutScheme::Proportional);
        pool.register("alice", "rig");
        let work = pool.get_work("alice", "rig").unwrap();
        let block_nonce = find_block(&work.work);
        assert!(matches!(
            pool.submit_share(&submission(&work, "alice", block_nonce)).unwrap(),
            SubmitOutcome::BlockFound { .. }
        ));

        let late = find_share(&work.work, 0);
        match pool.submit_share(&submission(&work, "alice", late)).unwrap() {
            SubmitOutcome::Rejected { reason } => assert!(reason.starts_with("Stale")),
            other => panic!("unexpected {other:?}"),
        }

        let next = pool.get_work("alice", "rig").unwrap();
        assert_eq!(next.work.block_index, 2);
    }

    #[test]
    fn chain_moving_outside_the_pool_makes_old_work_stale() {
        let pool = coordinator(PayoutScheme::Pps);
        pool.register("alice", "rig");
        let work = pool.get_work("alice", "rig").unwrap();
        assert_eq!(work.work.block_index, 1);

        pool.with_blockchain(|bc| bc.mine_block("solo"));
        assert_eq!(pool.current_height(), 2);

        let share = submission(&work, "alice", find_share(&work.work, 0));
        match pool.submit_share(&share).unwrap() {
            SubmitOutcome::Rejected { reason } => assert!(reason.starts_with("Stale")),
            other => panic!("unexpected {other:?}"),
        }
        let stats = pool.stats();
        assert_eq!(stats.rewards.total_shares_recorded, 0);
        assert_eq!(stats.miners.list[0].shares_accepted, 0);

        let next = pool.get_work("alice", "rig").unwrap();
        assert_eq!(next.work.block_index, 2);
        let fresh = submission(&next, "alice", find_share(&next.work, 0));
        assert!(matches!(
            pool.submit_share(&fresh).unwrap(),
            SubmitOutcome::Accepted { .. }
        ));
    }

    #[test]
    fn block_refused_by_ledger_is_not_credited() {
        let pool = coordinator(PayoutScheme::Pplns);
        pool.register("alice", "rig");
        let work = pool.get_work("alice", "rig").unwrap();
        {
            let mut state = pool.state.lock().unwrap();
            let template = state.template.as_mut().unwrap();
            template.transactions[0].outputs[0].amount = 5_000.0;
        }

        let share = submission(&work, "alice", find_block(&work.work));
        match pool.submit_share(&share).unwrap() {
            SubmitOutcome::Rejected { reason } => {
                assert!(reason.starts_with("Block rejected by ledger"))
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(pool.current_height(), 1);
        let stats = pool.stats();
        assert_eq!(stats.pool.blocks_found, 0);
        assert_eq!(stats.rewards.total_shares_recorded, 0);
        let alice = pool.miner_stats("alice").unwrap();
        assert_eq!(alice.workers[0].shares_rejected, 1);
        assert_eq!(alice.workers[0].shares_accepted, 0);
    }

    #[test]
    fn unknown_miner_lookup_fails() {
        let pool = coordinator(PayoutScheme::Pps);
        assert_eq!(pool.miner_stats("nobody").unwrap_err(), PoolError::MinerNotFound);
        let health = pool.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.blockchain_height, 1);
        assert_eq!(health.payout_scheme, PayoutScheme::Pps);
    }
}
