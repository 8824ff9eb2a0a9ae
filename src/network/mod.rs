pub mod message;
pub mod node;
pub mod transport;

pub use message::{Message, Payload};
pub use node::{Node, NodeCounters, NodeStats};
pub use transport::{
    ChannelNetwork, ChannelTransport, LocalNetwork, NodeEvent, NodeHandle, NodeSnapshot,
    QueueTransport, Transport,
};
