use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::coordinator::{
    PoolCoordinator, RegisterResponse, ShareSubmission, SubmitOutcome, WorkAssignment,
};
use crate::blockchain::meets_difficulty;
use crate::error::PoolError;

/// Nonces hashed between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerStats {
    pub address: String,
    pub worker: String,
    pub hashes_computed: u64,
    pub shares_found: u64,
    pub shares_accepted: u64,
    pub blocks_found: u64,
    pub work_units: u64,
    pub hashrate: f64,
}

/// In-process miner: pulls work from a coordinator, searches its nonce range
/// and submits every share it finds.
#[derive(Debug)]
pub struct MinerWorker {
    coordinator: Arc<PoolCoordinator>,
    address: String,
    worker_name: String,
    cancel: Arc<AtomicBool>,
    hashes_computed: u64,
    shares_found: u64,
    shares_accepted: u64,
    blocks_found: u64,
    work_units: u64,
    started: Instant,
}

impl MinerWorker {
    pub fn new(
        coordinator: Arc<PoolCoordinator>,
        address: impl Into<String>,
        worker_name: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            address: address.into(),
            worker_name: worker_name.into(),
            cancel: Arc::new(AtomicBool::new(false)),
            hashes_computed: 0,
            shares_found: 0,
            shares_accepted: 0,
            blocks_found: 0,
            work_units: 0,
            started: Instant::now(),
        }
    }

    /// Flag that stops the worker at its next check.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn register(&self) -> RegisterResponse {
        let resp = self.coordinator.register(&self.address, &self.worker_name);
        info!("{} registered with pool: {}", self.worker_name, resp.status);
        resp
    }

    fn should_stop(&self, block_index: u64) -> bool {
        self.cancel.load(Ordering::Relaxed) || self.coordinator.current_height() != block_index
    }

    /// Search `[nonce_start, nonce_end)` and submit shares as they are found.
    /// Stops early on cancellation, when the pool moves to a new height, or
    /// after this worker finds the block.
    pub fn mine_work_unit(&mut self, assignment: &WorkAssignment) -> Result<Vec<SubmitOutcome>, PoolError> {
        let work = &assignment.work;
        self.work_units += 1;
        let mut outcomes = Vec::new();

        for nonce in assignment.nonce_start..assignment.nonce_end {
            if (nonce - assignment.nonce_start) % CANCEL_CHECK_INTERVAL == 0
                && self.should_stop(work.block_index)
            {
                debug!("{}: abandoning work for block #{}", self.worker_name, work.block_index);
                break;
            }

            self.hashes_computed += 1;
            let hash = work.hash_at(nonce);
            if !meets_difficulty(&hash, work.pool_difficulty) {
                continue;
            }

            self.shares_found += 1;
            let outcome = self.coordinator.submit_share(&ShareSubmission {
                miner_address: self.address.clone(),
                worker_name: self.worker_name.clone(),
                block_index: work.block_index,
                nonce,
                hash,
            })?;

            let done = match &outcome {
                SubmitOutcome::Accepted { .. } => {
                    self.shares_accepted += 1;
                    false
                }
                SubmitOutcome::BlockFound {
                    block_index,
                    reward,
                    ..
                } => {
                    self.shares_accepted += 1;
                    self.blocks_found += 1;
                    info!(
                        "{}: BLOCK FOUND! Block #{}, reward: {:.4}",
                        self.worker_name, block_index, reward
                    );
                    true
                }
                SubmitOutcome::Rejected { reason } => reason.starts_with("Stale"),
            };
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Register, then fetch and mine up to `rounds` work units. Returns the
    /// number of blocks this worker found.
    pub fn mine_loop(&mut self, rounds: usize) -> Result<u64, PoolError> {
        self.register();
        let found_before = self.blocks_found;

        for round in 0..rounds {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            let work = self.coordinator.get_work(&self.address, &self.worker_name)?;
            let outcomes = self.mine_work_unit(&work)?;

            debug!(
                "{} round {}/{}: {} shares, {:.1} H/s, {} total hashes",
                self.worker_name,
                round + 1,
                rounds,
                outcomes.len(),
                self.hashrate(),
                self.hashes_computed
            );
        }
        Ok(self.blocks_found - found_before)
    }

    /// Run `mine_loop` on its own OS thread.
    pub fn spawn(mut self, rounds: usize) -> JoinHandle<Result<WorkerStats, PoolError>> {
        thread::spawn(move || {
            self.mine_loop(rounds)?;
            Ok(self.stats())
        })
    }

    fn hashrate(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 { self.hashes_computed as f64 / secs } else { 0.0 }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            address: self.address.clone(),
            worker: self.worker_name.clone(),
            hashes_computed: self.hashes_computed,
            shares_found: self.shares_found,
            shares_accepted: self.shares_accepted,
            blocks_found: self.blocks_found,
            work_units: self.work_units,
            hashrate: self.hashrate(),
        }
    }
}
