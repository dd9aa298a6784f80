//! Distributed Hash Table client (BEP-5)
//!
//! This module implements the client half of the Kademlia-based DHT used by
//! BitTorrent for trackerless peer discovery: it asks remote nodes for peers
//! but never answers their queries.
//!
//! - [`distance`] - XOR metric
//! - [`NodeRegistry`] - every node we know, with per-node query tracking
//! - [`select_candidates`] - which nodes to ask next
//! - [`DhtEngine`] - the single task that owns all of the above

pub mod distance;

mod config;
mod engine;
mod error;
mod message;
mod node;
mod query;
mod registry;
mod selector;
mod stats;
mod transport;

pub use config::DhtConfig;
pub use distance::{hash_distance, Distance};
pub use engine::{DhtEngine, DhtHandle, PeerBatch, PeerResults};
pub use error::DhtError;
pub use message::{
    encode_compact_peer, parse_compact_peer, DhtMessage, DhtQuery, DhtResponse, MessageBody,
    MessageKind,
};
pub use node::{parse_compact_nodes, InfoHash, NodeContact, NodeId};
pub use query::{Query, QueryKind, TransactionId};
pub use registry::{NodeRegistry, RemoteNode};
pub use selector::{rank_key, select_candidates, sort_by_distance, RankKey, SelectionLimits};
pub use stats::{DhtStats, StatsSnapshot};
pub use transport::{listen, send, send_detached, spawn_receive_loop, InboundPacket};

#[cfg(test)]
mod tests;
