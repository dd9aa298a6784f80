use super::node::InfoHash;
use bytes::Bytes;
use std::fmt;

pub type TransactionId = Bytes;

/// KRPC method of an outbound query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Ping,
    GetPeers,
    FindNode,
    AnnouncePeer,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Ping => "ping",
            QueryKind::GetPeers => "get_peers",
            QueryKind::FindNode => "find_node",
            QueryKind::AnnouncePeer => "announce_peer",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ping" => Some(QueryKind::Ping),
            "get_peers" => Some(QueryKind::GetPeers),
            "find_node" => Some(QueryKind::FindNode),
            "announce_peer" => Some(QueryKind::AnnouncePeer),
            _ => None,
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RPC we sent to a remote node. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub transaction_id: TransactionId,
    pub kind: QueryKind,
    pub info_hash: Option<InfoHash>,
}

impl Query {
    pub fn is_get_peers_for(&self, info_hash: &InfoHash) -> bool {
        self.kind == QueryKind::GetPeers && self.info_hash.as_ref() == Some(info_hash)
    }
}
