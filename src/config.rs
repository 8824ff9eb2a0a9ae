use std::env;

use crate::pool::PayoutScheme;

/// Ledger parameters. Defaults are the network constants; tests lower the
/// difficulty so blocks mine quickly.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainConfig {
    /// Leading zero hex digits required for a block hash.
    pub initial_difficulty: u32,
    /// Target seconds per block.
    pub block_time_target: f64,
    /// Adjust difficulty every N blocks.
    pub difficulty_adjust_interval: usize,
    pub initial_reward: f64,
    /// Halve the reward every N blocks.
    pub halving_interval: u64,
    /// Max mempool transactions per block (coinbase not counted).
    pub max_block_size: usize,
    /// Change below this is left to the miner as fee.
    pub dust_threshold: f64,
    pub genesis_timestamp_ms: i64,
    pub genesis_address: String,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: 4,
            block_time_target: 10.0,
            difficulty_adjust_interval: 10,
            initial_reward: 50.0,
            halving_interval: 100,
            max_block_size: 100,
            dust_threshold: 0.0001,
            genesis_timestamp_ms: 1_700_000_000_000,
            genesis_address: String::from("genesis_address"),
        }
    }
}

impl ChainConfig {
    /// Same constants, different starting difficulty.
    pub fn with_difficulty(difficulty: u32) -> Self {
        Self {
            initial_difficulty: difficulty,
            ..Self::default()
        }
    }
}

/// Pool payout parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardConfig {
    pub pool_fee_pct: f64,
    pub pplns_window: usize,
    pub expected_shares_per_block: u64,
    /// Block reward assumed when crediting PPS shares.
    pub assumed_reward: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            pool_fee_pct: 2.0,
            pplns_window: 2000,
            expected_shares_per_block: 1000,
            assumed_reward: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub name: String,
    pub payout_scheme: PayoutScheme,
    /// Nonces handed out per work unit.
    pub nonce_range_size: u64,
    pub chain: ChainConfig,
    pub rewards: RewardConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: String::from("Pool Chain Mining Pool"),
            payout_scheme: PayoutScheme::Pplns,
            nonce_range_size: 100_000,
            chain: ChainConfig::default(),
            rewards: RewardConfig::default(),
        }
    }
}

/// Process configuration for the pool server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub local_workers: usize,
    pub pool: PoolConfig,
}

impl ServerConfig {
    /// Load `.env` (if any) and read the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8050);
        let local_workers: usize = env::var("POOL_LOCAL_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let mut pool = PoolConfig::default();
        if let Some(scheme) = env::var("POOL_PAYOUT_SCHEME")
            .ok()
            .and_then(|v| v.parse::<PayoutScheme>().ok())
        {
            pool.payout_scheme = scheme;
        }
        if let Some(size) = env::var("POOL_NONCE_RANGE")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            pool.nonce_range_size = size;
        }
        if let Some(diff) = env::var("CHAIN_INITIAL_DIFFICULTY")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v >= 1)
        {
            pool.chain.initial_difficulty = diff;
        }

        Self {
            host,
            port,
            local_workers,
            pool,
        }
    }
}
