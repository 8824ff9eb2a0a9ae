use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::{Block, GENESIS_PREVIOUS_HASH, MIN_DIFFICULTY};
use crate::config::ChainConfig;
use crate::error::{ChainError, ValidationError};
use crate::transaction::{OutPoint, Transaction, TxInput, TxOutput, UtxoSet};
use crate::wallet::{Secp256k1Verifier, SignatureVerifier, Signer};

/// In-memory ledger: the chain, the mempool and the UTXO set it settles into.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    mempool: Vec<Transaction>,
    utxo_set: UtxoSet,
    difficulty: u32,
    block_reward: f64,
    /// Seconds per block, most recent last; feeds difficulty adjustment.
    block_times: Vec<f64>,
    config: ChainConfig,
    verifier: Arc<dyn SignatureVerifier>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        Self::with_verifier(config, Arc::new(Secp256k1Verifier))
    }

    /// Initialize a ledger holding only the genesis block, whose coinbase is
    /// immediately spendable.
    pub fn with_verifier(config: ChainConfig, verifier: Arc<dyn SignatureVerifier>) -> Self {
        let genesis = Self::genesis_block(&config);
        let mut utxo_set = UtxoSet::new();
        for tx in &genesis.transactions {
            utxo_set.apply(tx);
        }
        info!("Genesis block created: {}", &genesis.hash[..16]);

        Self {
            chain: vec![genesis],
            mempool: Vec::new(),
            utxo_set,
            difficulty: config.initial_difficulty.max(MIN_DIFFICULTY),
            block_reward: reward_for_height(1, &config),
            block_times: Vec::new(),
            config,
            verifier,
        }
    }

    /// Block #0. Fully determined by `config`, so independently built nodes
    /// agree on it byte for byte.
    pub fn genesis_block(config: &ChainConfig) -> Block {
        let coinbase = Transaction::create_coinbase(
            &config.genesis_address,
            config.initial_reward,
            0,
            Some(config.genesis_timestamp_ms),
        );
        let mut genesis = Block::new_with_timestamp(
            0,
            vec![coinbase],
            GENESIS_PREVIOUS_HASH.to_string(),
            config.initial_difficulty.max(MIN_DIFFICULTY),
            config.genesis_timestamp_ms,
        );
        genesis.mine();
        genesis
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    /// Number of blocks, which is also the index of the next block.
    pub fn height(&self) -> u64 {
        self.chain.len() as u64
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn block_reward(&self) -> f64 {
        self.block_reward
    }

    pub fn mempool(&self) -> &[Transaction] {
        &self.mempool
    }

    pub fn utxo_set(&self) -> &UtxoSet {
        &self.utxo_set
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn block_times(&self) -> &[f64] {
        &self.block_times
    }

    /* -------------------- Transactions -------------------- */

    /// Validate `tx` against `utxo`, treating `pending` outpoints as already
    /// spent. Returns the fee.
    fn check_transaction(
        &self,
        tx: &Transaction,
        utxo: &UtxoSet,
        pending: &HashSet<OutPoint>,
    ) -> Result<f64, ValidationError> {
        if tx.is_coinbase() {
            return Err(ValidationError::CoinbaseNotAllowed);
        }
        check_tx_hash(tx)?;
        if tx.inputs.is_empty() {
            return Err(ValidationError::NoInputs);
        }
        if tx.outputs.is_empty() {
            return Err(ValidationError::NoOutputs);
        }
        if tx
            .outputs
            .iter()
            .any(|o| !o.amount.is_finite() || o.amount <= 0.0)
        {
            return Err(ValidationError::NonPositiveOutput);
        }

        let mut seen = HashSet::new();
        let mut input_total = 0.0;
        for input in &tx.inputs {
            let op = input.outpoint();
            let prev = utxo.get(&op).ok_or_else(|| ValidationError::UnknownInput {
                tx_hash: op.tx_hash.clone(),
                output_index: op.output_index,
            })?;
            if !seen.insert(op.clone()) {
                return Err(ValidationError::DuplicateInput {
                    tx_hash: op.tx_hash,
                    output_index: op.output_index,
                });
            }
            if pending.contains(&op) {
                return Err(ValidationError::DoubleSpend {
                    tx_hash: op.tx_hash,
                    output_index: op.output_index,
                });
            }
            input_total += prev.amount;
        }

        let output_total = tx.total_output_value();
        if output_total > input_total {
            return Err(ValidationError::OutputExceedsInput {
                input: input_total,
                output: output_total,
            });
        }

        let sighash = tx.sighash();
        for (i, input) in tx.inputs.iter().enumerate() {
            let owner = utxo.get(&input.outpoint()).map(|o| o.address.as_str());
            let signer = self.verifier.address_of(&input.public_key);
            if signer.as_deref() != owner {
                return Err(ValidationError::OwnerMismatch);
            }
            if !self
                .verifier
                .verify(&input.public_key, &sighash, &input.signature)
            {
                return Err(ValidationError::BadSignature(i));
            }
        }

        Ok(input_total - output_total)
    }

    fn mempool_spent(&self) -> HashSet<OutPoint> {
        self.mempool
            .iter()
            .flat_map(|tx| tx.inputs.iter().map(TxInput::outpoint))
            .collect()
    }

    /// Validate and queue `tx`. Returns the fee it pays.
    pub fn try_add_transaction(&mut self, tx: Transaction) -> Result<f64, ValidationError> {
        let pending = self.mempool_spent();
        let fee = self.check_transaction(&tx, &self.utxo_set, &pending)?;
        debug!(
            "Mempool: {} -> {} (tx {})",
            self.mempool.len(),
            self.mempool.len() + 1,
            &tx.tx_hash[..16.min(tx.tx_hash.len())]
        );
        self.mempool.push(tx);
        Ok(fee)
    }

    /// Add a transaction to the mempool. Rejections are logged, never raised.
    pub fn add_transaction(&mut self, tx: Transaction) -> bool {
        let tx_hash = tx.tx_hash.clone();
        match self.try_add_transaction(tx) {
            Ok(fee) => {
                info!(
                    "Transaction added to mempool: {} (fee={:.4})",
                    &tx_hash[..16.min(tx_hash.len())],
                    fee
                );
                true
            }
            Err(e) => {
                warn!(
                    "Transaction {} rejected: {}",
                    &tx_hash[..16.min(tx_hash.len())],
                    e
                );
                false
            }
        }
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.utxo_set.balance_of(address)
    }

    /// Unspent outputs of `address` as (tx_hash, output_index, amount).
    pub fn get_utxos_for_address(&self, address: &str) -> Vec<(String, u32, f64)> {
        self.utxo_set
            .outputs_for(address)
            .into_iter()
            .map(|(op, amount)| (op.tx_hash, op.output_index, amount))
            .collect()
    }

    /// Build, sign and submit a payment of `amount` plus `fee`, picking the
    /// sender's smallest outputs first. `None` if the balance is short or the
    /// ledger refuses the result.
    pub fn create_transaction(
        &mut self,
        sender: &dyn Signer,
        recipient: &str,
        amount: f64,
        fee: f64,
    ) -> Option<Transaction> {
        if !(amount > 0.0) || fee < 0.0 {
            warn!("Refusing payment of {amount} with fee {fee}");
            return None;
        }
        let sender_address = sender.address();
        let pending = self.mempool_spent();

        let mut utxos: Vec<(String, u32, f64)> = self
            .get_utxos_for_address(&sender_address)
            .into_iter()
            .filter(|(h, i, _)| !pending.contains(&OutPoint::new(h.clone(), *i)))
            .collect();
        if utxos.is_empty() {
            warn!("No UTXOs available for {}", &sender_address[..16.min(sender_address.len())]);
            return None;
        }
        utxos.sort_by(|a, b| a.2.total_cmp(&b.2));

        let needed = amount + fee;
        let mut inputs = Vec::new();
        let mut running_total = 0.0;
        for (tx_hash, idx, value) in utxos {
            inputs.push(TxInput::new(tx_hash, idx));
            running_total += value;
            if running_total >= needed {
                break;
            }
        }
        if running_total < needed {
            warn!("Insufficient balance: have {running_total:.4}, need {needed:.4}");
            return None;
        }

        let mut outputs = vec![TxOutput::new(recipient, amount)];
        let change = running_total - amount - fee;
        if change > self.config.dust_threshold {
            outputs.push(TxOutput::new(sender_address, change));
        }

        let mut tx = Transaction::new(inputs, outputs);
        tx.sign_inputs(sender);

        if self.add_transaction(tx.clone()) {
            Some(tx)
        } else {
            None
        }
    }

    /* -------------------- Mining -------------------- */

    /// Unmined candidate for the next height: the oldest mempool entries
    /// behind a coinbase paying reward plus their fees.
    pub fn block_template(&self, miner_address: &str) -> Block {
        let take = self.mempool.len().min(self.config.max_block_size);
        let selected: Vec<Transaction> = self.mempool[..take].to_vec();
        let total_fees: f64 = selected.iter().map(|tx| tx.fee(&self.utxo_set)).sum();

        let coinbase = Transaction::create_coinbase(
            miner_address,
            self.block_reward + total_fees,
            self.height(),
            None,
        );
        let mut txs = Vec::with_capacity(1 + selected.len());
        txs.push(coinbase);
        txs.extend(selected);

        Block::new(
            self.height(),
            txs,
            self.last_block().hash.clone(),
            self.difficulty,
        )
    }

    /// Mine the next block, append it and settle it into the UTXO set.
    ///
    /// # Panics
    /// If the freshly mined block fails its own validation. That can only
    /// happen through a bug in this module.
    pub fn mine_block(&mut self, miner_address: &str) -> Block {
        let start = Instant::now();
        let mut block = self.block_template(miner_address);
        let attempts = block.mine();
        let mine_time = start.elapsed().as_secs_f64();

        if let Err(e) = self.validate_block(&block) {
            panic!("mined block #{} failed self-validation: {e}", block.index);
        }

        let reward = block
            .coinbase()
            .map(|cb| cb.total_output_value())
            .unwrap_or_default();
        info!(
            "Block #{} mined in {:.2}s ({} attempts, {} txs, reward={:.2})",
            block.index,
            mine_time,
            attempts,
            block.transactions.len(),
            reward
        );

        self.settle(block.clone(), Some(mine_time));
        block
    }

    /// Settle a block that was mined from `block_template` off this thread.
    /// `mine_time` is the search time in seconds, sampled for retargeting.
    pub fn settle_mined(&mut self, block: Block, mine_time: f64) -> Result<(), ValidationError> {
        self.validate_block(&block)?;
        self.check_block_transactions(&block, &self.utxo_set)?;
        info!(
            "Block #{} mined in {:.2}s ({} txs)",
            block.index,
            mine_time,
            block.transactions.len()
        );
        self.settle(block, Some(mine_time));
        Ok(())
    }

    /// Accept a block produced elsewhere (a peer or a pool worker) on top of
    /// the current tip.
    pub fn accept_block(&mut self, block: Block) -> Result<(), ValidationError> {
        self.validate_block(&block)?;
        self.check_block_transactions(&block, &self.utxo_set)?;

        let parent = self.last_block();
        let sample = (parent.index > 0)
            .then(|| (block.timestamp - parent.timestamp).max(0) as f64 / 1000.0);

        info!(
            "Block #{} accepted ({} txs, hash={})",
            block.index,
            block.transactions.len(),
            &block.hash[..16.min(block.hash.len())]
        );
        self.settle(block, sample);
        Ok(())
    }

    /// Header checks against the current tip: sequence, linkage, Merkle
    /// commitment and proof of work.
    pub fn validate_block(&self, block: &Block) -> Result<(), ValidationError> {
        if block.index != self.height() {
            return Err(ValidationError::WrongIndex {
                expected: self.height(),
                actual: block.index,
            });
        }
        if block.previous_hash != self.last_block().hash {
            return Err(ValidationError::BrokenLink(block.index));
        }
        check_block_integrity(block)
    }

    /// Coinbase shape and value, plus every transfer against `utxo`.
    fn check_block_transactions(&self, block: &Block, utxo: &UtxoSet) -> Result<(), ValidationError> {
        let coinbase = block
            .coinbase()
            .ok_or(ValidationError::BadCoinbase(block.index))?;
        if coinbase.outputs.len() != 1 || coinbase.coinbase_height != Some(block.index) {
            return Err(ValidationError::BadCoinbase(block.index));
        }

        let mut spent = HashSet::new();
        let mut fees = 0.0;
        for tx in &block.transactions[1..] {
            fees += self.check_transaction(tx, utxo, &spent)?;
            spent.extend(tx.inputs.iter().map(TxInput::outpoint));
        }

        let allowed = reward_for_height(block.index, &self.config) + fees;
        if coinbase.total_output_value() > allowed + 1e-9 {
            return Err(ValidationError::BadCoinbase(block.index));
        }
        Ok(())
    }

    /// Append `block` and apply its effects: spend inputs, add outputs, drop
    /// mined or now-conflicting mempool entries, then retarget and halve.
    fn settle(&mut self, block: Block, block_time: Option<f64>) {
        for tx in &block.transactions {
            self.utxo_set.apply(tx);
        }
        let included: HashSet<&str> = block
            .transactions
            .iter()
            .map(|t| t.tx_hash.as_str())
            .collect();
        let before = self.mempool.len();
        self.mempool.retain(|t| !included.contains(t.tx_hash.as_str()));
        debug!(
            "UTXO applied for block #{} (utxo_size={}), mempool {} -> {}",
            block.index,
            self.utxo_set.len(),
            before,
            self.mempool.len()
        );

        self.chain.push(block);
        if let Some(t) = block_time {
            self.block_times.push(t);
        }
        self.prune_mempool();
        self.adjust_difficulty();
        self.check_halving();
    }

    /// Drop mempool entries whose inputs are gone or claimed by an earlier entry.
    fn prune_mempool(&mut self) {
        let before = self.mempool.len();
        let mut claimed = HashSet::new();
        let utxo = &self.utxo_set;
        self.mempool.retain(|tx| {
            let ops: Vec<OutPoint> = tx.inputs.iter().map(TxInput::outpoint).collect();
            let ok = ops.iter().all(|op| utxo.contains(op) && !claimed.contains(op));
            if ok {
                claimed.extend(ops);
            }
            ok
        });
        if self.mempool.len() != before {
            debug!(
                "Pruned {} stale mempool transactions",
                before - self.mempool.len()
            );
        }
    }

    fn adjust_difficulty(&mut self) {
        let interval = self.config.difficulty_adjust_interval;
        if interval == 0 || self.chain.len() % interval != 0 {
            return;
        }
        if self.block_times.len() < interval {
            return;
        }

        let recent = &self.block_times[self.block_times.len() - interval..];
        let avg_time = recent.iter().sum::<f64>() / recent.len() as f64;
        let old = self.difficulty;
        self.difficulty = next_difficulty(old, avg_time, self.config.block_time_target);

        if self.difficulty != old {
            info!(
                "Difficulty adjusted: {} -> {} (avg block time: {:.2}s)",
                old, self.difficulty, avg_time
            );
        }
    }

    fn check_halving(&mut self) {
        let new_reward = reward_for_height(self.height(), &self.config);
        if new_reward != self.block_reward {
            info!(
                "HALVING at block {}! Reward: {:.2} -> {:.2}",
                self.height(),
                self.block_reward,
                new_reward
            );
            self.block_reward = new_reward;
        }
    }

    /* -------------------- Chain validation -------------------- */

    /// Verify every block's hash, linkage and proof of work. Any mismatch
    /// anywhere invalidates the whole chain.
    pub fn validate_chain(&self) -> bool {
        match check_chain(&self.chain) {
            Ok(()) => true,
            Err(e) => {
                error!("Chain validation failed: {e}");
                false
            }
        }
    }

    /// Adopt `candidate` if it is strictly longer, shares our genesis and is
    /// valid end to end, including every transaction. The UTXO set is rebuilt
    /// by replaying it. On any error the local chain is untouched.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), ChainError> {
        if candidate.len() <= self.chain.len() {
            return Err(ChainError::NotLonger {
                local: self.chain.len(),
                candidate: candidate.len(),
            });
        }
        if candidate[0] != self.chain[0] {
            return Err(ChainError::GenesisMismatch);
        }
        check_chain(&candidate)?;

        let mut utxo = UtxoSet::new();
        for tx in &candidate[0].transactions {
            utxo.apply(tx);
        }
        for (i, block) in candidate.iter().enumerate().skip(1) {
            self.check_block_transactions(block, &utxo)
                .map_err(|source| ChainError::InvalidBlock { index: i, source })?;
            for tx in &block.transactions {
                utxo.apply(tx);
            }
        }

        let old_height = self.chain.len();
        self.block_times = candidate
            .windows(2)
            .skip(1)
            .map(|w| (w[1].timestamp - w[0].timestamp).max(0) as f64 / 1000.0)
            .collect();
        self.chain = candidate;
        self.utxo_set = utxo;
        self.difficulty = self.last_block().difficulty.max(MIN_DIFFICULTY);
        self.block_reward = reward_for_height(self.height(), &self.config);
        self.prune_mempool();
        self.adjust_difficulty();

        info!(
            "Adopted longer chain (height: {} -> {})",
            old_height,
            self.chain.len()
        );
        Ok(())
    }
}

/// Self-contained block checks that need no chain context.
fn check_block_integrity(block: &Block) -> Result<(), ValidationError> {
    if block.difficulty < MIN_DIFFICULTY {
        return Err(ValidationError::DifficultyTooLow {
            index: block.index,
            difficulty: block.difficulty,
        });
    }
    if !block.has_valid_merkle_root() {
        return Err(ValidationError::BadMerkleRoot(block.index));
    }
    for tx in &block.transactions {
        check_tx_hash(tx)?;
    }
    if !block.is_valid_proof() {
        return Err(ValidationError::BadProofOfWork(block.index));
    }
    Ok(())
}

/// `tx_hash` keys the UTXO set, so it must be the hash of the contents.
fn check_tx_hash(tx: &Transaction) -> Result<(), ValidationError> {
    if tx.tx_hash != tx.compute_hash() {
        return Err(ValidationError::BadTxHash(tx.tx_hash.clone()));
    }
    Ok(())
}

/// Link and PoW check over a whole sequence of blocks, genesis included.
pub(crate) fn check_chain(blocks: &[Block]) -> Result<(), ChainError> {
    for (i, current) in blocks.iter().enumerate() {
        let invalid = |source| ChainError::InvalidBlock { index: i, source };

        if current.index != i as u64 {
            return Err(invalid(ValidationError::WrongIndex {
                expected: i as u64,
                actual: current.index,
            }));
        }
        if i > 0 && current.previous_hash != blocks[i - 1].hash {
            return Err(invalid(ValidationError::BrokenLink(current.index)));
        }
        check_block_integrity(current).map_err(invalid)?;
    }
    Ok(())
}

/// One retarget step: harder if blocks came in under half the target, easier
/// if they took over twice the target, never below `MIN_DIFFICULTY`.
pub fn next_difficulty(current: u32, avg_block_time: f64, target: f64) -> u32 {
    if avg_block_time < target * 0.5 {
        current + 1
    } else if avg_block_time > target * 2.0 && current > MIN_DIFFICULTY {
        current - 1
    } else {
        current.max(MIN_DIFFICULTY)
    }
}

/// `initial_reward / 2^(height / halving_interval)`.
pub fn reward_for_height(height: u64, config: &ChainConfig) -> f64 {
    if config.halving_interval == 0 {
        return config.initial_reward;
    }
    let halvings = height / config.halving_interval;
    if halvings >= 64 {
        return 0.0;
    }
    config.initial_reward / (1u64 << halvings) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::merkle_root_of;
    use crate::wallet::Wallet;

    fn fast_config() -> ChainConfig {
        ChainConfig::with_difficulty(1)
    }

    #[test]
    fn genesis_is_deterministic_and_funded() {
        let a = Blockchain::with_config(fast_config());
        let b = Blockchain::with_config(fast_config());

        assert_eq!(a.chain[0], b.chain[0]);
        assert_eq!(a.chain[0].previous_hash, "0".repeat(64));
        assert_eq!(a.get_balance("genesis_address"), 50.0);
        assert!(a.validate_chain());
    }

    #[test]
    fn mined_blocks_carry_valid_proof() {
        let mut bc = Blockchain::with_config(ChainConfig::with_difficulty(2));
        for _ in 0..3 {
            let block = bc.mine_block("miner");
            assert_eq!(block.hash, block.compute_hash());
            assert!(block.hash.starts_with(&"0".repeat(block.difficulty as usize)));
        }
        assert_eq!(bc.height(), 4);
        assert!(bc.validate_chain());
    }

    #[test]
    fn mining_without_spending_conserves_rewards() {
        let mut bc = Blockchain::with_config(fast_config());
        for _ in 0..5 {
            bc.mine_block("miner");
        }
        assert_eq!(bc.get_balance("miner"), 5.0 * 50.0);
    }

    #[test]
    fn coinbase_cannot_be_submitted() {
        let mut bc = Blockchain::with_config(fast_config());
        let cb = Transaction::create_coinbase("thief", 1_000.0, 1, None);
        assert!(!bc.add_transaction(cb.clone()));
        assert_eq!(
            bc.try_add_transaction(cb),
            Err(ValidationError::CoinbaseNotAllowed)
        );
        assert!(bc.mempool().is_empty());
    }

    #[test]
    fn unknown_input_is_rejected() {
        let mut bc = Blockchain::with_config(fast_config());
        let wallet = Wallet::generate();
        let mut tx = Transaction::new(
            vec![TxInput::new("missing", 0)],
            vec![TxOutput::new("bob", 1.0)],
        );
        tx.sign_inputs(&wallet);
        assert!(matches!(
            bc.try_add_transaction(tx),
            Err(ValidationError::UnknownInput { .. })
        ));
    }

    #[test]
    fn mempool_double_spend_is_rejected() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        bc.mine_block(&miner.address());
        let (h, i, _) = bc.get_utxos_for_address(&miner.address())[0].clone();

        let mut first = Transaction::new(
            vec![TxInput::new(h.clone(), i)],
            vec![TxOutput::new("alice", 10.0)],
        );
        first.sign_inputs(&miner);
        assert!(bc.add_transaction(first));

        let mut second = Transaction::new(
            vec![TxInput::new(h, i)],
            vec![TxOutput::new("bob", 10.0)],
        );
        second.sign_inputs(&miner);
        assert!(matches!(
            bc.try_add_transaction(second),
            Err(ValidationError::DoubleSpend { .. })
        ));
        assert_eq!(bc.mempool().len(), 1);
    }

    #[test]
    fn outputs_above_inputs_are_rejected() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        bc.mine_block(&miner.address());
        let (h, i, _) = bc.get_utxos_for_address(&miner.address())[0].clone();

        let mut tx = Transaction::new(
            vec![TxInput::new(h, i)],
            vec![TxOutput::new("alice", 50.01)],
        );
        tx.sign_inputs(&miner);
        assert!(matches!(
            bc.try_add_transaction(tx),
            Err(ValidationError::OutputExceedsInput { .. })
        ));
    }

    #[test]
    fn spending_someone_elses_output_is_rejected() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        let thief = Wallet::generate();
        bc.mine_block(&miner.address());
        let (h, i, _) = bc.get_utxos_for_address(&miner.address())[0].clone();

        let mut tx = Transaction::new(
            vec![TxInput::new(h, i)],
            vec![TxOutput::new(thief.address(), 50.0)],
        );
        tx.sign_inputs(&thief);
        assert_eq!(
            bc.try_add_transaction(tx),
            Err(ValidationError::OwnerMismatch)
        );
    }

    #[test]
    fn forged_signature_is_rejected() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        bc.mine_block(&miner.address());
        let (h, i, _) = bc.get_utxos_for_address(&miner.address())[0].clone();

        let mut tx = Transaction::new(
            vec![TxInput::new(h, i)],
            vec![TxOutput::new("alice", 5.0)],
        );
        tx.sign_inputs(&miner);
        tx.outputs[0].amount = 49.0;
        tx.refresh_hash();
        assert_eq!(
            bc.try_add_transaction(tx),
            Err(ValidationError::BadSignature(0))
        );
    }

    #[test]
    fn borrowed_tx_hash_cannot_overwrite_anothers_output() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        let victim = Wallet::generate();
        bc.mine_block(&miner.address());
        bc.mine_block(&victim.address());
        let (h, i, _) = bc.get_utxos_for_address(&miner.address())[0].clone();
        let (victim_hash, _, _) = bc.get_utxos_for_address(&victim.address())[0].clone();

        let mut tx = Transaction::new(
            vec![TxInput::new(h, i)],
            vec![TxOutput::new(miner.address(), 50.0)],
        );
        tx.sign_inputs(&miner);
        tx.tx_hash = victim_hash.clone();

        assert_eq!(
            bc.try_add_transaction(tx.clone()),
            Err(ValidationError::BadTxHash(victim_hash))
        );
        assert!(!bc.add_transaction(tx));
        bc.mine_block("someone");
        assert_eq!(bc.get_balance(&victim.address()), 50.0);
        assert_eq!(bc.get_balance(&miner.address()), 50.0);
    }

    #[test]
    fn short_tx_hash_is_rejected_without_panicking() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        bc.mine_block(&miner.address());
        let (h, i, _) = bc.get_utxos_for_address(&miner.address())[0].clone();

        let mut tx = Transaction::new(vec![TxInput::new(h, i)], vec![TxOutput::new("bob", 1.0)]);
        tx.sign_inputs(&miner);
        tx.tx_hash = "ab".into();
        assert!(!bc.add_transaction(tx));
        assert!(bc.mempool().is_empty());
    }

    #[test]
    fn block_with_mislabelled_transaction_is_rejected() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        bc.mine_block(&miner.address());
        let (h, i, _) = bc.get_utxos_for_address(&miner.address())[0].clone();

        let mut tx = Transaction::new(vec![TxInput::new(h, i)], vec![TxOutput::new("bob", 5.0)]);
        tx.sign_inputs(&miner);
        tx.tx_hash = bc.chain[0].transactions[0].tx_hash.clone();

        let mut block = bc.block_template("peer");
        block.transactions.push(tx);
        block.merkle_root = merkle_root_of(&block.transactions);
        block.mine();

        assert!(matches!(
            bc.accept_block(block.clone()),
            Err(ValidationError::BadTxHash(_))
        ));
        assert_eq!(bc.height(), 2);

        let mut forged = bc.clone();
        forged.chain.push(block);
        assert!(!forged.validate_chain());
    }

    #[test]
    fn create_transaction_fails_on_insufficient_balance() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        bc.mine_block(&miner.address());
        assert!(bc.create_transaction(&miner, "alice", 60.0, 0.1).is_none());
        assert!(bc.create_transaction(&Wallet::generate(), "alice", 1.0, 0.1).is_none());
        assert!(bc.mempool().is_empty());
    }

    #[test]
    fn transfer_and_fee_settle_on_mining() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        let alice = Wallet::generate();
        for _ in 0..2 {
            bc.mine_block(&miner.address());
        }

        let tx = bc
            .create_transaction(&miner, &alice.address(), 25.0, 0.5)
            .expect("funded");
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);

        let block = bc.mine_block(&miner.address());
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0].outputs[0].amount, 50.5);
        assert!(bc.mempool().is_empty());

        assert_eq!(bc.get_balance(&alice.address()), 25.0);
        assert_eq!(bc.get_balance(&miner.address()), 100.0 - 50.0 + 24.5 + 50.5);
    }

    #[test]
    fn dust_change_is_left_as_fee() {
        let mut bc = Blockchain::with_config(fast_config());
        let miner = Wallet::generate();
        bc.mine_block(&miner.address());

        let tx = bc
            .create_transaction(&miner, "alice", 49.99995, 0.0)
            .expect("funded");
        assert_eq!(tx.outputs.len(), 1);
    }

    #[test]
    fn tampering_any_block_breaks_the_chain() {
        let mut bc = Blockchain::with_config(ChainConfig::with_difficulty(2));
        for _ in 0..3 {
            bc.mine_block("miner");
        }
        assert!(bc.validate_chain());

        for target in 0..bc.len() - 1 {
            let mut tampered = bc.clone();
            let block = &mut tampered.chain[target];
            block.transactions[0].outputs[0].amount += 1.0;
            block.hash = block.compute_hash();
            assert!(!tampered.validate_chain(), "tamper at #{target} undetected");

            let block = &mut tampered.chain[target];
            block.merkle_root = merkle_root_of(&block.transactions);
            block.hash = block.compute_hash();
            assert!(!tampered.validate_chain(), "re-rooted tamper at #{target} undetected");
        }
    }

    #[test]
    fn halving_follows_schedule() {
        let config = ChainConfig {
            halving_interval: 3,
            ..fast_config()
        };
        let mut bc = Blockchain::with_config(config.clone());
        assert_eq!(bc.block_reward(), 50.0);

        while bc.height() < 3 {
            bc.mine_block("miner");
        }
        assert_eq!(bc.block_reward(), 25.0);
        while bc.height() < 6 {
            bc.mine_block("miner");
        }
        assert_eq!(bc.block_reward(), 12.5);

        for k in 0..5u64 {
            assert_eq!(
                reward_for_height(k * 100, &ChainConfig::default()),
                50.0 / 2f64.powi(k as i32)
            );
        }
    }

    #[test]
    fn retarget_steps_by_one_and_floors_at_one() {
        assert_eq!(next_difficulty(4, 1.0, 10.0), 5);
        assert_eq!(next_difficulty(4, 25.0, 10.0), 3);
        assert_eq!(next_difficulty(4, 10.0, 10.0), 4);
        assert_eq!(next_difficulty(1, 100.0, 10.0), 1);
    }

    #[test]
    fn fast_blocks_raise_difficulty_at_interval() {
        let config = ChainConfig {
            difficulty_adjust_interval: 2,
            block_time_target: 1_000.0,
            ..fast_config()
        };
        let mut bc = Blockchain::with_config(config);
        bc.mine_block("miner");
        bc.mine_block("miner");
        assert_eq!(bc.difficulty(), 1);
        bc.mine_block("miner");
        assert_eq!(bc.height(), 4);
        assert_eq!(bc.difficulty(), 2);
    }

    #[test]
    fn peer_block_is_accepted_and_settled() {
        let mut a = Blockchain::with_config(fast_config());
        let mut b = Blockchain::with_config(fast_config());
        let block = a.mine_block("miner");

        b.accept_block(block.clone()).expect("valid block");
        assert_eq!(b.last_block().hash, block.hash);
        assert_eq!(b.get_balance("miner"), 50.0);

        assert_eq!(
            b.accept_block(block),
            Err(ValidationError::WrongIndex {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn template_mined_elsewhere_settles_with_its_search_time() {
        let mut bc = Blockchain::with_config(fast_config());
        let mut block = bc.block_template("miner");
        block.mine();
        let mut late = bc.block_template("other");
        late.mine();

        bc.settle_mined(block, 0.25).unwrap();
        assert_eq!(bc.height(), 2);
        assert_eq!(bc.block_times(), &[0.25]);
        assert_eq!(bc.get_balance("miner"), 50.0);

        assert!(matches!(
            bc.settle_mined(late, 0.1),
            Err(ValidationError::WrongIndex { .. })
        ));
    }

    #[test]
    fn inflated_coinbase_is_rejected() {
        let mut bc = Blockchain::with_config(fast_config());
        let mut block = bc.block_template("greedy");
        block.transactions[0].outputs[0].amount = 500.0;
        block.transactions[0].refresh_hash();
        block.merkle_root = merkle_root_of(&block.transactions);
        block.mine();

        assert_eq!(bc.accept_block(block), Err(ValidationError::BadCoinbase(1)));
        assert_eq!(bc.height(), 1);
    }

    #[test]
    fn longer_valid_chain_replaces_local() {
        let mut local = Blockchain::with_config(fast_config());
        let mut remote = Blockchain::with_config(fast_config());
        local.mine_block("local");
        for _ in 0..3 {
            remote.mine_block("remote");
        }

        local.replace_chain(remote.chain.clone()).expect("adopt");
        assert_eq!(local.chain, remote.chain);
        assert_eq!(local.get_balance("remote"), 150.0);
        assert_eq!(local.get_balance("local"), 0.0);
    }

    #[test]
    fn shorter_or_broken_chain_is_refused() {
        let mut local = Blockchain::with_config(fast_config());
        local.mine_block("local");
        local.mine_block("local");
        let before = local.chain.clone();

        let mut remote = Blockchain::with_config(fast_config());
        remote.mine_block("remote");
        assert!(matches!(
            local.replace_chain(remote.chain.clone()),
            Err(ChainError::NotLonger { .. })
        ));

        for _ in 0..3 {
            remote.mine_block("remote");
        }
        let mut broken = remote.chain.clone();
        broken[2].previous_hash = "f".repeat(64);
        assert!(local.replace_chain(broken).is_err());
        assert_eq!(local.chain, before);
    }
}
