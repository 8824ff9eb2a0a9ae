use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::utxo::{OutPoint, UtxoSet};
use crate::wallet::Signer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxInput {
    /// Hash of the transaction holding the output being spent.
    pub tx_hash: String,
    pub output_index: u32,
    /// Hex-encoded DER ECDSA signature over the transaction sighash.
    #[serde(default)]
    pub signature: String,
    /// Signer's compressed public key (hex).
    #[serde(default)]
    pub public_key: String,
}

impl TxInput {
    /// Unsigned input referencing `tx_hash:output_index`.
    pub fn new(tx_hash: impl Into<String>, output_index: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            output_index,
            signature: String::new(),
            public_key: String::new(),
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_hash.clone(), self.output_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxOutput {
    pub address: String,
    pub amount: f64,
}

impl TxOutput {
    pub fn new(address: impl Into<String>, amount: f64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Transfer,
    Coinbase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// Content hash; covers signatures, so it is refreshed after signing.
    pub tx_hash: String,
    pub tx_type: TxType,
    /// Creation time, Unix milliseconds (UTC).
    pub timestamp: i64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Height of the block a coinbase pays for; keeps coinbase hashes unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase_height: Option<u64>,
}

impl Transaction {
    /// Build an unsigned transfer stamped with the current time.
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self::with_timestamp(inputs, outputs, Utc::now().timestamp_millis())
    }

    pub fn with_timestamp(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, timestamp: i64) -> Self {
        let mut tx = Self {
            tx_hash: String::new(),
            tx_type: TxType::Transfer,
            timestamp,
            inputs,
            outputs,
            coinbase_height: None,
        };
        tx.tx_hash = tx.compute_hash();
        tx
    }

    /// Mining reward: no inputs, a single output. The only way new value
    /// enters the system.
    pub fn create_coinbase(
        miner_address: &str,
        reward: f64,
        block_index: u64,
        timestamp: Option<i64>,
    ) -> Self {
        let mut tx = Self {
            tx_hash: String::new(),
            tx_type: TxType::Coinbase,
            timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
            inputs: Vec::new(),
            outputs: vec![TxOutput::new(miner_address, reward)],
            coinbase_height: Some(block_index),
        };
        tx.tx_hash = tx.compute_hash();
        tx
    }

    pub fn compute_hash(&self) -> String {
        let payload = serde_json::json!({
            "inputs": self.inputs,
            "outputs": self.outputs,
            "timestamp": self.timestamp,
            "tx_type": self.tx_type,
            "coinbase_height": self.coinbase_height,
        });
        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute `tx_hash` after inputs were signed.
    pub fn refresh_hash(&mut self) {
        self.tx_hash = self.compute_hash();
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx_type == TxType::Coinbase
    }

    /// Sum of the referenced UTXOs that exist in `utxo_set`. Missing
    /// references count as 0; callers must reject such transactions.
    pub fn total_input_value(&self, utxo_set: &UtxoSet) -> f64 {
        self.inputs
            .iter()
            .filter_map(|inp| utxo_set.get(&inp.outpoint()))
            .map(|out| out.amount)
            .sum()
    }

    pub fn total_output_value(&self) -> f64 {
        self.outputs.iter().map(|o| o.amount).sum()
    }

    pub fn fee(&self, utxo_set: &UtxoSet) -> f64 {
        if self.is_coinbase() {
            return 0.0;
        }
        self.total_input_value(utxo_set) - self.total_output_value()
    }

    /// Canonical signing payload (JSON) that excludes signatures and pubkeys.
    pub fn signing_payload(&self) -> Vec<u8> {
        let lite_inputs: Vec<_> = self
            .inputs
            .iter()
            .map(|i| serde_json::json!({ "tx_hash": i.tx_hash, "output_index": i.output_index }))
            .collect();
        let payload = serde_json::json!({
            "inputs": lite_inputs,
            "outputs": self.outputs,
            "timestamp": self.timestamp,
            "tx_type": self.tx_type,
        });
        payload.to_string().into_bytes()
    }

    /// SHA-256 of the signing payload.
    pub fn sighash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_payload());
        hasher.finalize().into()
    }

    /// Sign every input with `signer` and refresh the hash.
    pub fn sign_inputs(&mut self, signer: &dyn Signer) {
        let sighash = self.sighash();
        let signature = signer.sign(&sighash);
        let public_key = signer.public_key();
        for input in &mut self.inputs {
            input.signature = signature.clone();
            input.public_key = public_key.clone();
        }
        self.refresh_hash();
    }
}
