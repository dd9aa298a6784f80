//! trackerless - BitTorrent peer discovery without trackers
//!
//! A client-only implementation of the BitTorrent DHT ([BEP-5]). Give it an
//! info hash and it streams back peers that other DHT nodes know about,
//! each peer delivered once.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`dht`] - BEP-5 DHT client engine
//! - [`constants`] - Tuning defaults
//!
//! [BEP-5]: http://bittorrent.org/beps/bep_0005.html

pub mod bencode;
pub mod constants;
pub mod dht;

pub use bencode::{decode, encode, BencodeError, Value};
pub use dht::{
    DhtConfig, DhtEngine, DhtError, DhtHandle, DhtMessage, InfoHash, NodeId, NodeRegistry,
    PeerBatch, PeerResults,
};
