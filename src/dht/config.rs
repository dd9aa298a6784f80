use std::time::Duration;

use super::node::NodeId;
use crate::constants::{
    COMMAND_CHANNEL_CAPACITY, DEFAULT_BOOTSTRAP_ROUTER, DEFAULT_PORT, DHT_FAN_OUT,
    MAX_EXPANSIONS_PER_REQUEST, MAX_NODE_PENDING_QUERIES, MIN_INFO_HASH_PEERS,
    REPEAT_QUERY_COOLDOWN, RESULT_CHANNEL_CAPACITY,
};

/// Settings for a [`DhtEngine`](super::DhtEngine).
///
/// # Examples
///
/// ```
/// use trackerless::dht::{DhtConfig, NodeId};
///
/// let config = DhtConfig::new(NodeId([7u8; 20]), 0)
///     .with_fan_out(3)
///     .with_bootstrap_router(None);
/// assert_eq!(config.fan_out, 3);
/// assert!(config.bootstrap_router.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct DhtConfig {
    pub node_id: NodeId,
    /// UDP port to bind. `0` picks an ephemeral port.
    pub port: u16,
    /// `host:port` pinged before serving. `None` skips bootstrap.
    pub bootstrap_router: Option<String>,
    pub fan_out: usize,
    pub min_info_hash_peers: usize,
    pub max_node_pending_queries: usize,
    pub repeat_query_cooldown: Duration,
    pub max_expansions: usize,
    pub result_capacity: usize,
    pub command_capacity: usize,
}

impl DhtConfig {
    pub fn new(node_id: NodeId, port: u16) -> Self {
        Self {
            node_id,
            port,
            bootstrap_router: Some(DEFAULT_BOOTSTRAP_ROUTER.to_string()),
            fan_out: DHT_FAN_OUT,
            min_info_hash_peers: MIN_INFO_HASH_PEERS,
            max_node_pending_queries: MAX_NODE_PENDING_QUERIES,
            repeat_query_cooldown: REPEAT_QUERY_COOLDOWN,
            max_expansions: MAX_EXPANSIONS_PER_REQUEST,
            result_capacity: RESULT_CHANNEL_CAPACITY,
            command_capacity: COMMAND_CHANNEL_CAPACITY,
        }
    }

    pub fn with_bootstrap_router(mut self, router: Option<String>) -> Self {
        self.bootstrap_router = router;
        self
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_min_info_hash_peers(mut self, min: usize) -> Self {
        self.min_info_hash_peers = min;
        self
    }

    pub fn with_max_node_pending_queries(mut self, max: usize) -> Self {
        self.max_node_pending_queries = max;
        self
    }

    pub fn with_repeat_query_cooldown(mut self, cooldown: Duration) -> Self {
        self.repeat_query_cooldown = cooldown;
        self
    }

    pub fn with_max_expansions(mut self, max: usize) -> Self {
        self.max_expansions = max;
        self
    }

    pub fn with_result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity.max(1);
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self::new(NodeId::generate(), DEFAULT_PORT)
    }
}
