//! Candidate selection for `get_peers` rounds.
//!
//! The registry is not a Kademlia routing table: every node we ever heard of
//! is a candidate, even if it is far from the target. Selection filters out
//! nodes that look dead or were asked recently, then takes the closest ones.

use std::cmp::Ordering;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::distance::Distance;
use super::error::DhtError;
use super::node::{InfoHash, NodeId};
use super::registry::{NodeRegistry, RemoteNode};

/// Bounds applied while picking nodes.
#[derive(Debug, Clone, Copy)]
pub struct SelectionLimits {
    pub fan_out: usize,
    pub max_pending_queries: usize,
    pub repeat_query_cooldown: Duration,
}

/// Sort key for a node relative to a target.
///
/// Nodes whose id is still unknown sort first, then by XOR distance. A node
/// whose id equals the target sorts as distance zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RankKey {
    Unknown,
    Known(Distance),
}

pub fn rank_key(target: &InfoHash, id: Option<&NodeId>) -> RankKey {
    match id {
        None => RankKey::Unknown,
        Some(id) => match target.distance(id) {
            Ok(dist) => RankKey::Known(dist),
            Err(_) => RankKey::Known(Distance::ZERO),
        },
    }
}

/// Orders `nodes` by ascending distance to `target`. Stable.
pub fn sort_by_distance(target: &InfoHash, nodes: &mut [&RemoteNode]) {
    nodes.sort_by(|a, b| compare(target, a, b));
}

fn compare(target: &InfoHash, a: &RemoteNode, b: &RemoteNode) -> Ordering {
    rank_key(target, a.id.as_ref()).cmp(&rank_key(target, b.id.as_ref()))
}

fn is_eligible(node: &RemoteNode, info_hash: &InfoHash, limits: &SelectionLimits, now: Instant) -> bool {
    // Most likely unreachable. Queries stay pending until answered, so this
    // is the only thing that stops us from flooding a dead node.
    if node.pending_count() > limits.max_pending_queries {
        debug!(
            "Skipping {}: {} queries pending",
            node.addr,
            node.pending_count()
        );
        for q in node.pending_queries() {
            trace!("  pending {} {:?}", q.kind, q.info_hash);
        }
        return false;
    }

    if node.has_pending_get_peers(info_hash) {
        return false;
    }

    if node.has_past_get_peers(info_hash) {
        let ago = node
            .last_contact
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or(Duration::MAX);
        if ago < limits.repeat_query_cooldown {
            return false;
        }
        // Mostly yields duplicates, but the node may have learned new peers.
        debug!(
            "Re-sending get_peers for {} to {} (last contact {:?} ago)",
            info_hash, node.addr, ago
        );
    }

    true
}

/// Picks up to `limits.fan_out` nodes to ask about `info_hash`.
pub fn select_candidates(
    registry: &NodeRegistry,
    info_hash: &InfoHash,
    limits: &SelectionLimits,
    now: Instant,
) -> Result<Vec<SocketAddr>, DhtError> {
    if registry.is_empty() {
        return Err(DhtError::NoKnownNodes);
    }

    let mut targets: Vec<&RemoteNode> = registry
        .iter()
        .filter(|node| is_eligible(node, info_hash, limits, now))
        .collect();

    debug!(
        "Candidate nodes for {}: {} of {} known",
        info_hash,
        targets.len(),
        registry.len()
    );

    sort_by_distance(info_hash, &mut targets);

    Ok(targets
        .into_iter()
        .take(limits.fan_out)
        .map(|node| node.addr)
        .collect())
}
