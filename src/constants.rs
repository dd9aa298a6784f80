//! Protocol constants and tuning parameters.
//!
//! Defaults for every knob in [`DhtConfig`](crate::dht::DhtConfig). Values
//! are tuned for a client that only asks the network for peers and never
//! answers queries itself.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// User agent string reported by the command line client
pub const USER_AGENT: &str = "trackerless/0.1.0";

// ============================================================================
// Ports and addresses
// ============================================================================

/// Default DHT listen port (BEP-5 examples use the BitTorrent port)
pub const DEFAULT_PORT: u16 = 6881;

/// Well-known rendezvous node pinged once on startup
pub const DEFAULT_BOOTSTRAP_ROUTER: &str = "router.bittorrent.com:6881";

/// Largest UDP datagram we accept
pub const MAX_DATAGRAM_SIZE: usize = 65535;

// ============================================================================
// Peer discovery
// ============================================================================

/// Nodes contacted per discovery round (fan-out)
pub const DHT_FAN_OUT: usize = 5;

/// Below this many known peers for an info hash, every newly learned node
/// triggers another discovery round. Above it we wait for the client to ask.
pub const MIN_INFO_HASH_PEERS: usize = 100;

/// A node with more outstanding queries than this is considered stale and
/// skipped during candidate selection
pub const MAX_NODE_PENDING_QUERIES: usize = 5;

/// Minimum time before the same node is asked about the same info hash again
pub const REPEAT_QUERY_COOLDOWN: Duration = Duration::from_secs(30 * 60);

/// Automatic discovery rounds allowed per info hash between two client
/// requests for it
pub const MAX_EXPANSIONS_PER_REQUEST: usize = 64;

// ============================================================================
// Channels
// ============================================================================

/// Capacity of the result channel. Publishing blocks once it is full.
pub const RESULT_CHANNEL_CAPACITY: usize = 1;

/// Capacity of the hint and discovery request channels
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the channel between the socket reader and the engine
pub const PACKET_CHANNEL_CAPACITY: usize = 256;
