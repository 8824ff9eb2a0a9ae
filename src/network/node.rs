use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use super::message::{Message, Payload};
use super::transport::Transport;
use crate::blockchain::{Block, Blockchain};
use crate::config::ChainConfig;
use crate::error::ValidationError;
use crate::transaction::Transaction;
use crate::wallet::{Signer, Wallet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounters {
    pub blocks_received: u64,
    pub txs_received: u64,
    pub forks_resolved: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub name: String,
    pub address: String,
    pub chain_height: u64,
    pub peers: usize,
    pub balance: f64,
    #[serde(flatten)]
    pub counters: NodeCounters,
    pub chain_valid: bool,
}

/// A peer in the gossip network. Owns its ledger and wallet outright; the
/// only thing it shares is the transport it sends through.
pub struct Node {
    name: String,
    blockchain: Blockchain,
    wallet: Wallet,
    peers: BTreeSet<String>,
    seen: HashSet<String>,
    transport: Arc<dyn Transport>,
    counters: NodeCounters,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("height", &self.blockchain.height())
            .field("peers", &self.peers)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(name: impl Into<String>, config: ChainConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            blockchain: Blockchain::with_config(config),
            wallet: Wallet::generate(),
            peers: BTreeSet::new(),
            seen: HashSet::new(),
            transport,
            counters: NodeCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> String {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn blockchain_mut(&mut self) -> &mut Blockchain {
        &mut self.blockchain
    }

    pub fn peers(&self) -> &BTreeSet<String> {
        &self.peers
    }

    pub fn counters(&self) -> &NodeCounters {
        &self.counters
    }

    pub fn connect_peer(&mut self, peer: &str) {
        if peer != self.name && self.peers.insert(peer.to_string()) {
            debug!("{} connected to {}", self.name, peer);
        }
    }

    pub fn disconnect_peer(&mut self, peer: &str) {
        if self.peers.remove(peer) {
            debug!("{} disconnected from {}", self.name, peer);
        }
    }

    fn send(&self, recipient: &str, msg: Message) {
        if let Err(e) = self.transport.deliver(recipient, msg) {
            warn!("{}: delivery to {} failed: {}", self.name, recipient, e);
        }
    }

    /// Wrap `payload` in a fresh message and send it to every peer.
    pub fn broadcast(&mut self, payload: Payload) -> Message {
        let msg = Message::new(payload, self.name.clone());
        self.seen.insert(msg.msg_id.clone());
        self.counters.messages_sent += 1;

        for peer in &self.peers {
            self.send(peer, msg.clone());
        }
        msg
    }

    /// Process one incoming message, then relay it to every peer except its
    /// originator. Already-seen ids are dropped, which makes redelivery a no-op.
    pub fn receive(&mut self, msg: Message) {
        if !self.seen.insert(msg.msg_id.clone()) {
            return;
        }
        self.counters.messages_received += 1;

        match &msg.payload {
            Payload::NewBlock(block) => self.handle_new_block(block.clone(), &msg.sender),
            Payload::NewTx(tx) => self.handle_new_tx(tx.clone()),
            Payload::RequestChain { requester } => self.handle_chain_request(requester),
            Payload::ChainResponse { chain, .. } => {
                self.handle_chain_response(chain.clone(), &msg.sender)
            }
        }

        for peer in self.peers.iter().filter(|p| **p != msg.sender) {
            self.send(peer, msg.clone());
        }
    }

    fn handle_new_block(&mut self, block: Block, sender: &str) {
        self.counters.blocks_received += 1;
        let index = block.index;

        if block.previous_hash == self.blockchain.last_block().hash {
            match self.blockchain.accept_block(block) {
                Ok(()) => {
                    info!("{} accepted block #{} from {}", self.name, index, sender);
                    return;
                }
                Err(e) => warn!("{} rejected block #{} from {}: {}", self.name, index, sender, e),
            }
        }

        if index > self.blockchain.height() {
            info!(
                "{}: peer {} has longer chain ({} vs {}), requesting sync",
                self.name,
                sender,
                index,
                self.blockchain.height()
            );
            self.broadcast(Payload::RequestChain {
                requester: self.name.clone(),
            });
        }
    }

    fn handle_new_tx(&mut self, tx: Transaction) {
        self.counters.txs_received += 1;
        self.blockchain.add_transaction(tx);
    }

    fn handle_chain_request(&mut self, requester: &str) {
        if requester == self.name {
            return;
        }
        let msg = Message::new(
            Payload::ChainResponse {
                chain: self.blockchain.chain.clone(),
                height: self.blockchain.height(),
            },
            self.name.clone(),
        );
        self.seen.insert(msg.msg_id.clone());
        self.counters.messages_sent += 1;
        self.send(requester, msg);
    }

    /// Longest valid chain wins; anything else leaves the local chain as is.
    fn handle_chain_response(&mut self, chain: Vec<Block>, sender: &str) {
        let old_height = self.blockchain.height();
        if chain.len() as u64 <= old_height {
            debug!(
                "{}: ignoring chain from {} ({} <= {})",
                self.name,
                sender,
                chain.len(),
                old_height
            );
            return;
        }

        match self.blockchain.replace_chain(chain) {
            Ok(()) => {
                self.counters.forks_resolved += 1;
                info!(
                    "{} adopted longer chain from {} (height: {} -> {})",
                    self.name,
                    sender,
                    old_height,
                    self.blockchain.height()
                );
            }
            Err(e) => warn!("{}: received invalid chain from {}: {}", self.name, sender, e),
        }
    }

    /// Mine on the local tip and announce the block.
    pub fn mine_block(&mut self) -> Block {
        let address = self.wallet.address();
        let block = self.blockchain.mine_block(&address);
        self.broadcast(Payload::NewBlock(block.clone()));
        block
    }

    /// Unmined candidate paying this node, for mining off the node's thread.
    pub fn block_template(&self) -> Block {
        self.blockchain.block_template(&self.wallet.address())
    }

    /// Settle a block mined from `block_template` and announce it.
    pub fn commit_mined(&mut self, block: Block, mine_time: f64) -> Result<Block, ValidationError> {
        self.blockchain.settle_mined(block.clone(), mine_time)?;
        self.broadcast(Payload::NewBlock(block.clone()));
        Ok(block)
    }

    /// Queue a transaction locally and gossip it if the ledger accepts it.
    pub fn submit_transaction(&mut self, tx: Transaction) -> bool {
        if !self.blockchain.add_transaction(tx.clone()) {
            return false;
        }
        self.broadcast(Payload::NewTx(tx));
        true
    }

    /// Pay `recipient` from this node's wallet and gossip the transaction.
    pub fn pay(&mut self, recipient: &str, amount: f64, fee: f64) -> Option<Transaction> {
        let tx = self
            .blockchain
            .create_transaction(&self.wallet, recipient, amount, fee)?;
        self.broadcast(Payload::NewTx(tx.clone()));
        Some(tx)
    }

    pub fn stats(&self) -> NodeStats {
        let address = self.wallet.address();
        NodeStats {
            name: self.name.clone(),
            chain_height: self.blockchain.height(),
            peers: self.peers.len(),
            balance: self.blockchain.get_balance(&address),
            address,
            counters: self.counters.clone(),
            chain_valid: self.blockchain.validate_chain(),
        }
    }
}
