use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the engine and readable from any handle.
#[derive(Debug, Default)]
pub struct DhtStats {
    nodes_created: AtomicU64,
    duplicate_nodes: AtomicU64,
    peers_found: AtomicU64,
    get_peers_sent: AtomicU64,
    pings_sent: AtomicU64,
    responses_matched: AtomicU64,
    stale_responses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub nodes_created: u64,
    pub duplicate_nodes: u64,
    pub peers_found: u64,
    pub get_peers_sent: u64,
    pub pings_sent: u64,
    pub responses_matched: u64,
    pub stale_responses: u64,
}

impl DhtStats {
    pub(crate) fn node_created(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn duplicate_node(&self) {
        self.duplicate_nodes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn peers_found(&self, count: usize) {
        self.peers_found.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn get_peers_sent(&self) {
        self.get_peers_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ping_sent(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn response_matched(&self) {
        self.responses_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            nodes_created: self.nodes_created.load(Ordering::Relaxed),
            duplicate_nodes: self.duplicate_nodes.load(Ordering::Relaxed),
            peers_found: self.peers_found.load(Ordering::Relaxed),
            get_peers_sent: self.get_peers_sent.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
        }
    }
}
