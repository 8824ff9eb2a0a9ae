use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::blockchain::Block;
use crate::transaction::Transaction;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Gossip body, tagged on the wire by `msg_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg_type", content = "payload", rename_all = "snake_case")]
pub enum Payload {
    NewBlock(Block),
    NewTx(Transaction),
    RequestChain { requester: String },
    ChainResponse { chain: Vec<Block>, height: u64 },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::NewBlock(_) => "new_block",
            Payload::NewTx(_) => "new_tx",
            Payload::RequestChain { .. } => "request_chain",
            Payload::ChainResponse { .. } => "chain_response",
        }
    }
}

/// One gossip message. `msg_id` hashes the content together with the
/// creation time and a process-wide sequence number, so two broadcasts of
/// the same payload are distinct messages. Relays keep the id unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub payload: Payload,
    /// Node that created the message (not the last relay).
    pub sender: String,
    pub msg_id: String,
    /// Unix milliseconds.
    pub timestamp: i64,
}

impl Message {
    pub fn new(payload: Payload, sender: impl Into<String>) -> Self {
        let sender = sender.into();
        let now = Utc::now();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&payload).unwrap_or_default();

        let preimage = format!(
            "{}:{}:{}:{}:{}",
            payload.kind(),
            sender,
            body,
            now.timestamp_micros(),
            seq
        );
        let digest = hex::encode(Sha256::digest(preimage.as_bytes()));

        Self {
            payload,
            sender,
            msg_id: digest[..16].to_string(),
            timestamp: now.timestamp_millis(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}
