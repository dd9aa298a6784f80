use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use tracing::trace;

use super::node::{InfoHash, NodeContact, NodeId};
use super::query::{Query, QueryKind, TransactionId};

/// What we know about one remote DHT node, including every query we sent it.
#[derive(Debug)]
pub struct RemoteNode {
    pub id: Option<NodeId>,
    pub addr: SocketAddr,
    pub reachable: bool,
    pub last_contact: Option<Instant>,
    next_transaction_id: u16,
    pending_queries: HashMap<TransactionId, Query>,
    past_queries: HashMap<TransactionId, Query>,
}

impl RemoteNode {
    pub fn new(id: Option<NodeId>, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            reachable: false,
            last_contact: None,
            next_transaction_id: rand::random(),
            pending_queries: HashMap::new(),
            past_queries: HashMap::new(),
        }
    }

    /// Mints a transaction id and records the query as pending.
    pub fn record_new_query(&mut self, kind: QueryKind, info_hash: Option<InfoHash>) -> TransactionId {
        let transaction_id = loop {
            let candidate = Bytes::copy_from_slice(&self.next_transaction_id.to_be_bytes());
            self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
            if !self.pending_queries.contains_key(&candidate) {
                break candidate;
            }
        };

        self.pending_queries.insert(
            transaction_id.clone(),
            Query {
                transaction_id: transaction_id.clone(),
                kind,
                info_hash,
            },
        );
        transaction_id
    }

    /// Moves a pending query to history and marks the node as alive.
    ///
    /// Returns `None` for an unknown transaction id; the node is left untouched.
    pub fn resolve_query(&mut self, transaction_id: &[u8]) -> Option<Query> {
        let query = self.pending_queries.remove(transaction_id)?;
        self.reachable = true;
        self.last_contact = Some(Instant::now());
        self.past_queries
            .insert(query.transaction_id.clone(), query.clone());
        Some(query)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_queries.len()
    }

    pub fn pending_queries(&self) -> impl Iterator<Item = &Query> {
        self.pending_queries.values()
    }

    pub fn has_pending_get_peers(&self, info_hash: &InfoHash) -> bool {
        self.pending_queries
            .values()
            .any(|q| q.is_get_peers_for(info_hash))
    }

    pub fn has_past_get_peers(&self, info_hash: &InfoHash) -> bool {
        self.past_queries
            .values()
            .any(|q| q.is_get_peers_for(info_hash))
    }
}

/// Every remote node we have heard of, keyed by address.
///
/// Records are never removed.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: HashMap<SocketAddr, RemoteNode>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `address`, creating it if needed.
    ///
    /// Yields `None` when `address` is not a valid `ip:port`.
    pub fn get_or_create(&mut self, address: &str) -> Option<&mut RemoteNode> {
        let addr: SocketAddr = address.parse().ok()?;
        Some(self.get_or_insert(addr))
    }

    pub fn get_or_insert(&mut self, addr: SocketAddr) -> &mut RemoteNode {
        self.nodes.entry(addr).or_insert_with(|| {
            trace!("New remote node {}", addr);
            RemoteNode::new(None, addr)
        })
    }

    /// Inserts a contact unless its address is already known.
    pub fn insert_contact(&mut self, contact: NodeContact) -> bool {
        if self.nodes.contains_key(&contact.addr) {
            return false;
        }
        self.nodes
            .insert(contact.addr, RemoteNode::new(Some(contact.id), contact.addr));
        true
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&RemoteNode> {
        self.nodes.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut RemoteNode> {
        self.nodes.get_mut(addr)
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.nodes.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn reachable_count(&self) -> usize {
        self.nodes.values().filter(|n| n.reachable).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteNode> {
        self.nodes.values()
    }
}
