use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::model::{Transaction, TxOutput};

/// Identifies a specific transaction output by its tx hash and index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub tx_hash: String,
    pub output_index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: impl Into<String>, output_index: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
        }
    }
}

/// Spendable outputs keyed by (tx_hash, output_index), in outpoint order.
///
/// Holds exactly the outputs created and not yet consumed by the canonical
/// chain; only block settlement mutates it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UtxoSet {
    map: BTreeMap<OutPoint, TxOutput>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, outpoint: OutPoint, output: TxOutput) {
        self.map.insert(outpoint, output);
    }

    /// Spend (remove) a single outpoint. Returns the removed output if it existed.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Option<TxOutput> {
        self.map.remove(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&TxOutput> {
        self.map.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.map.contains_key(outpoint)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Add every output of `tx` as a new spendable entry.
    pub fn add_tx_outputs(&mut self, tx: &Transaction) {
        for (i, out) in tx.outputs.iter().enumerate() {
            self.insert(OutPoint::new(tx.tx_hash.clone(), i as u32), out.clone());
        }
    }

    /// Settle one transaction: consume its inputs, then publish its outputs.
    pub fn apply(&mut self, tx: &Transaction) {
        for input in &tx.inputs {
            self.spend(&input.outpoint());
        }
        self.add_tx_outputs(tx);
    }

    /// Outputs owned by `address`, in outpoint order.
    pub fn outputs_for(&self, address: &str) -> Vec<(OutPoint, f64)> {
        self.map
            .iter()
            .filter(|(_, out)| out.address == address)
            .map(|(op, out)| (op.clone(), out.amount))
            .collect()
    }

    pub fn balance_of(&self, address: &str) -> f64 {
        self.map
            .values()
            .filter(|out| out.address == address)
            .map(|out| out.amount)
            .sum()
    }
}
