//! Educational UTXO blockchain with pluggable consensus, gossip networking
//! and a mining pool.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod consensus;
pub mod error;
pub mod network;
pub mod pool;
pub mod transaction;
pub mod wallet;
