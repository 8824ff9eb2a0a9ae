use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::message::Message;
use super::node::{Node, NodeStats};
use crate::blockchain::Block;
use crate::config::ChainConfig;
use crate::error::NetworkError;
use crate::transaction::Transaction;

/// How a node hands a message to a named peer. Delivery is fire-and-forget;
/// ordering is not guaranteed.
pub trait Transport: fmt::Debug + Send + Sync {
    fn deliver(&self, recipient: &str, msg: Message) -> Result<(), NetworkError>;
}

/* -------------------- Synchronous simulation -------------------- */

/// FIFO of pending deliveries, drained by `LocalNetwork::pump`.
#[derive(Debug, Default)]
pub struct QueueTransport {
    queue: Mutex<VecDeque<(String, Message)>>,
}

impl QueueTransport {
    fn pop(&self) -> Option<(String, Message)> {
        self.queue.lock().expect("mutex poisoned").pop_front()
    }
}

impl Transport for QueueTransport {
    fn deliver(&self, recipient: &str, msg: Message) -> Result<(), NetworkError> {
        self.queue
            .lock()
            .expect("mutex poisoned")
            .push_back((recipient.to_string(), msg));
        Ok(())
    }
}

/// Single-threaded network: every node lives in one map and messages move
/// only when `pump` is called. Deterministic, so tests drive it directly.
#[derive(Debug)]
pub struct LocalNetwork {
    nodes: BTreeMap<String, Node>,
    transport: Arc<QueueTransport>,
    config: ChainConfig,
}

impl LocalNetwork {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            nodes: BTreeMap::new(),
            transport: Arc::new(QueueTransport::default()),
            config,
        }
    }

    /// Add a node connected to every existing node (full mesh).
    pub fn add_node(&mut self, name: &str) -> &mut Node {
        let mut node = Node::new(name, self.config.clone(), self.transport.clone());
        for (existing, peer) in self.nodes.iter_mut() {
            node.connect_peer(existing);
            peer.connect_peer(name);
        }
        info!("Node '{}' joined network (peers: {})", name, node.peers().len());
        self.nodes.entry(name.to_string()).or_insert(node)
    }

    pub fn remove_node(&mut self, name: &str) -> Option<Node> {
        let node = self.nodes.remove(name)?;
        for peer in node.peers() {
            if let Some(p) = self.nodes.get_mut(peer) {
                p.disconnect_peer(name);
            }
        }
        info!("Node '{}' left network", name);
        Some(node)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Deliver queued messages until none are left. Returns how many were
    /// handed to a node.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Some((recipient, msg)) = self.transport.pop() {
            match self.nodes.get_mut(&recipient) {
                Some(node) => {
                    node.receive(msg);
                    delivered += 1;
                }
                None => debug!("dropping {} for departed node {}", msg.kind(), recipient),
            }
        }
        delivered
    }

    pub fn stats(&self) -> Vec<NodeStats> {
        self.nodes.values().map(Node::stats).collect()
    }
}

/* -------------------- Channel actors -------------------- */

/// Everything a node task can be asked to do.
#[derive(Debug)]
pub enum NodeEvent {
    Gossip(Message),
    Connect(String),
    Disconnect(String),
    MineBlock(oneshot::Sender<Block>),
    SubmitTransaction(Transaction, oneshot::Sender<bool>),
    Pay {
        recipient: String,
        amount: f64,
        fee: f64,
        reply: oneshot::Sender<Option<Transaction>>,
    },
    Snapshot(oneshot::Sender<NodeSnapshot>),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub stats: NodeStats,
    pub chain: Vec<Block>,
}

type Registry = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<NodeEvent>>>>;

/// Delivers gossip into the recipient's task inbox.
#[derive(Debug, Clone, Default)]
pub struct ChannelTransport {
    registry: Registry,
}

impl Transport for ChannelTransport {
    fn deliver(&self, recipient: &str, msg: Message) -> Result<(), NetworkError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        let inbox = registry
            .get(recipient)
            .ok_or_else(|| NetworkError::UnknownPeer(recipient.to_string()))?;
        inbox
            .send(NodeEvent::Gossip(msg))
            .map_err(|_| NetworkError::PeerClosed(recipient.to_string()))
    }
}

/// Driver-side handle on a running node task.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    name: String,
    inbox: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn closed(&self) -> NetworkError {
        NetworkError::PeerClosed(self.name.clone())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> NodeEvent,
    ) -> Result<T, NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.inbox.send(make(tx)).map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    pub async fn mine_block(&self) -> Result<Block, NetworkError> {
        self.request(NodeEvent::MineBlock).await
    }

    pub async fn submit_transaction(&self, tx: Transaction) -> Result<bool, NetworkError> {
        self.request(|reply| NodeEvent::SubmitTransaction(tx, reply))
            .await
    }

    pub async fn pay(
        &self,
        recipient: &str,
        amount: f64,
        fee: f64,
    ) -> Result<Option<Transaction>, NetworkError> {
        let recipient = recipient.to_string();
        self.request(|reply| NodeEvent::Pay {
            recipient,
            amount,
            fee,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<NodeSnapshot, NetworkError> {
        self.request(NodeEvent::Snapshot).await
    }
}

/// Network of node tasks talking over unbounded tokio channels. Each node
/// runs as its own actor; nothing but the inbox registry is shared.
#[derive(Debug)]
pub struct ChannelNetwork {
    transport: ChannelTransport,
    config: ChainConfig,
    handles: BTreeMap<String, NodeHandle>,
    tasks: HashMap<String, JoinHandle<Node>>,
}

impl ChannelNetwork {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            transport: ChannelTransport::default(),
            config,
            handles: BTreeMap::new(),
            tasks: HashMap::new(),
        }
    }

    /// Spawn a node task and connect it to every node already running.
    pub fn add_node(&mut self, name: &str) -> NodeHandle {
        let (inbox, rx) = mpsc::unbounded_channel();
        let mut node = Node::new(name, self.config.clone(), Arc::new(self.transport.clone()));

        for (existing, handle) in &self.handles {
            node.connect_peer(existing);
            if handle.inbox.send(NodeEvent::Connect(name.to_string())).is_err() {
                warn!("node {} stopped before {} joined", existing, name);
            }
        }
        info!("Node '{}' joined network (peers: {})", name, node.peers().len());

        self.transport
            .registry
            .write()
            .expect("registry lock poisoned")
            .insert(name.to_string(), inbox.clone());

        let handle = NodeHandle {
            name: name.to_string(),
            inbox,
        };
        self.handles.insert(name.to_string(), handle.clone());
        self.tasks.insert(name.to_string(), tokio::spawn(run_node(node, rx)));
        handle
    }

    pub fn handle(&self, name: &str) -> Option<NodeHandle> {
        self.handles.get(name).cloned()
    }

    pub fn handles(&self) -> impl Iterator<Item = &NodeHandle> {
        self.handles.values()
    }

    /// Stop a node, disconnect it from everyone, and hand back its final state.
    pub async fn remove_node(&mut self, name: &str) -> Option<Node> {
        let handle = self.handles.remove(name)?;
        self.transport
            .registry
            .write()
            .expect("registry lock poisoned")
            .remove(name);

        for other in self.handles.values() {
            let _ = other.inbox.send(NodeEvent::Disconnect(name.to_string()));
        }
        let _ = handle.inbox.send(NodeEvent::Shutdown);

        let task = self.tasks.remove(name)?;
        match task.await {
            Ok(node) => {
                info!("Node '{}' left network", name);
                Some(node)
            }
            Err(e) => {
                warn!("node task {} ended abnormally: {}", name, e);
                None
            }
        }
    }

    pub async fn shutdown(mut self) -> Vec<Node> {
        let names: Vec<String> = self.handles.keys().cloned().collect();
        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            if let Some(node) = self.remove_node(&name).await {
                nodes.push(node);
            }
        }
        nodes
    }
}

async fn run_node(mut node: Node, mut rx: mpsc::UnboundedReceiver<NodeEvent>) -> Node {
    while let Some(event) = rx.recv().await {
        match event {
            NodeEvent::Gossip(msg) => node.receive(msg),
            NodeEvent::Connect(peer) => node.connect_peer(&peer),
            NodeEvent::Disconnect(peer) => node.disconnect_peer(&peer),
            NodeEvent::MineBlock(reply) => match mine_off_runtime(&mut node).await {
                Some(block) => {
                    let _ = reply.send(block);
                }
                None => drop(reply),
            },
            NodeEvent::SubmitTransaction(tx, reply) => {
                let _ = reply.send(node.submit_transaction(tx));
            }
            NodeEvent::Pay {
                recipient,
                amount,
                fee,
                reply,
            } => {
                let _ = reply.send(node.pay(&recipient, amount, fee));
            }
            NodeEvent::Snapshot(reply) => {
                let _ = reply.send(NodeSnapshot {
                    stats: node.stats(),
                    chain: node.blockchain().chain.clone(),
                });
            }
            NodeEvent::Shutdown => break,
        }
    }
    debug!("node task {} stopped", node.name());
    node
}

/// Run the nonce search on the blocking pool so other node tasks keep
/// handling gossip, then settle the result in the actor.
async fn mine_off_runtime(node: &mut Node) -> Option<Block> {
    let mut template = node.block_template();
    let search = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        template.mine();
        (template, start.elapsed().as_secs_f64())
    });

    let (block, mine_time) = match search.await {
        Ok(found) => found,
        Err(e) => {
            warn!("{}: mining task failed: {}", node.name(), e);
            return None;
        }
    };
    match node.commit_mined(block, mine_time) {
        Ok(block) => Some(block),
        Err(e) => {
            warn!("{}: mined block rejected: {}", node.name(), e);
            None
        }
    }
}
