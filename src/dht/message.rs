//! KRPC messages (BEP-5) over bencode.
//!
//! Only what a client needs: `ping` and `get_peers` queries go out, replies
//! come back. Inbound queries are decoded just far enough to be logged.

use super::error::DhtError;
use super::node::{InfoHash, NodeId};
use super::query::{QueryKind, TransactionId};
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// The `y` key of a KRPC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Query,
    Response,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtQuery {
    Ping,
    GetPeers { info_hash: InfoHash },
    /// A method we never send and do not answer.
    Other(String),
}

impl DhtQuery {
    pub fn method(&self) -> &str {
        match self {
            DhtQuery::Ping => QueryKind::Ping.as_str(),
            DhtQuery::GetPeers { .. } => QueryKind::GetPeers.as_str(),
            DhtQuery::Other(name) => name,
        }
    }
}

/// Body of an `r` message.
///
/// KRPC replies do not say which query they answer, so every field is
/// optional and the caller interprets them according to the query it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtResponse {
    pub id: NodeId,
    pub token: Option<Bytes>,
    pub values: Option<Vec<SocketAddr>>,
    /// Raw compact node list, see [`parse_compact_nodes`](super::node::parse_compact_nodes).
    pub nodes: Option<Bytes>,
}

impl DhtResponse {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            token: None,
            values: None,
            nodes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Query(DhtQuery),
    Response(DhtResponse),
    Error { code: i64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtMessage {
    pub transaction_id: TransactionId,
    pub sender_id: Option<NodeId>,
    pub body: MessageBody,
}

impl DhtMessage {
    pub fn ping(transaction_id: TransactionId, our_id: &NodeId) -> Self {
        Self {
            transaction_id,
            sender_id: Some(*our_id),
            body: MessageBody::Query(DhtQuery::Ping),
        }
    }

    pub fn get_peers(transaction_id: TransactionId, our_id: &NodeId, info_hash: InfoHash) -> Self {
        Self {
            transaction_id,
            sender_id: Some(*our_id),
            body: MessageBody::Query(DhtQuery::GetPeers { info_hash }),
        }
    }

    pub fn response(transaction_id: TransactionId, response: DhtResponse) -> Self {
        Self {
            transaction_id,
            sender_id: Some(response.id),
            body: MessageBody::Response(response),
        }
    }

    pub fn error(transaction_id: TransactionId, code: i64, message: &str) -> Self {
        Self {
            transaction_id,
            sender_id: None,
            body: MessageBody::Error {
                code,
                message: message.to_string(),
            },
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Query(_) => MessageKind::Query,
            MessageBody::Response(_) => MessageKind::Response,
            MessageBody::Error { .. } => MessageKind::Error,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, DhtError> {
        let value = decode(data)?;

        let dict = value
            .as_dict()
            .ok_or_else(|| DhtError::InvalidMessage("expected dict".into()))?;

        let transaction_id = dict
            .get(b"t".as_slice())
            .and_then(|v| v.as_bytes())
            .cloned()
            .ok_or_else(|| DhtError::InvalidMessage("missing transaction id".into()))?;

        let msg_type = dict
            .get(b"y".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| DhtError::InvalidMessage("missing message type".into()))?;

        match msg_type {
            "q" => Self::parse_query(transaction_id, dict),
            "r" => Self::parse_response(transaction_id, dict),
            "e" => Self::parse_error(transaction_id, dict),
            _ => Err(DhtError::InvalidMessage(format!(
                "unknown message type: {}",
                msg_type
            ))),
        }
    }

    fn parse_query(
        transaction_id: TransactionId,
        dict: &BTreeMap<Bytes, Value>,
    ) -> Result<Self, DhtError> {
        let query_name = dict
            .get(b"q".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| DhtError::InvalidMessage("missing query name".into()))?;

        let args = dict
            .get(b"a".as_slice())
            .and_then(|v| v.as_dict())
            .ok_or_else(|| DhtError::InvalidMessage("missing query args".into()))?;

        let sender_id = args
            .get(b"id".as_slice())
            .and_then(|v| v.as_bytes())
            .and_then(|b| NodeId::from_bytes(b).ok());

        let query = match QueryKind::from_name(query_name) {
            Some(QueryKind::Ping) => DhtQuery::Ping,
            Some(QueryKind::GetPeers) => {
                let info_hash = args
                    .get(b"info_hash".as_slice())
                    .and_then(|v| v.as_bytes())
                    .and_then(|b| NodeId::from_bytes(b).ok())
                    .ok_or_else(|| DhtError::InvalidMessage("missing info_hash".into()))?;
                DhtQuery::GetPeers { info_hash }
            }
            _ => DhtQuery::Other(query_name.to_string()),
        };

        Ok(Self {
            transaction_id,
            sender_id,
            body: MessageBody::Query(query),
        })
    }

    fn parse_response(
        transaction_id: TransactionId,
        dict: &BTreeMap<Bytes, Value>,
    ) -> Result<Self, DhtError> {
        let resp = dict
            .get(b"r".as_slice())
            .and_then(|v| v.as_dict())
            .ok_or_else(|| DhtError::InvalidMessage("missing response dict".into()))?;

        let id = resp
            .get(b"id".as_slice())
            .and_then(|v| v.as_bytes())
            .and_then(|b| NodeId::from_bytes(b).ok())
            .ok_or_else(|| DhtError::InvalidMessage("missing id in response".into()))?;

        let nodes = resp
            .get(b"nodes".as_slice())
            .and_then(|v| v.as_bytes())
            .cloned();

        let values = resp
            .get(b"values".as_slice())
            .and_then(|v| v.as_list())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_bytes())
                    .filter_map(|b| parse_compact_peer(b))
                    .collect()
            });

        let token = resp
            .get(b"token".as_slice())
            .and_then(|v| v.as_bytes())
            .cloned();

        Ok(Self {
            transaction_id,
            sender_id: Some(id),
            body: MessageBody::Response(DhtResponse {
                id,
                token,
                values,
                nodes,
            }),
        })
    }

    fn parse_error(
        transaction_id: TransactionId,
        dict: &BTreeMap<Bytes, Value>,
    ) -> Result<Self, DhtError> {
        let error = dict
            .get(b"e".as_slice())
            .and_then(|v| v.as_list())
            .ok_or_else(|| DhtError::InvalidMessage("missing error list".into()))?;

        let code = error.first().and_then(|v| v.as_integer()).unwrap_or(0);

        let message = error
            .get(1)
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
            .to_string();

        Ok(Self {
            transaction_id,
            sender_id: None,
            body: MessageBody::Error { code, message },
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dict = BTreeMap::new();

        dict.insert(
            Bytes::from_static(b"t"),
            Value::Bytes(self.transaction_id.clone()),
        );

        match &self.body {
            MessageBody::Query(query) => {
                dict.insert(Bytes::from_static(b"y"), Value::string("q"));
                dict.insert(Bytes::from_static(b"q"), Value::string(query.method()));

                let mut args = BTreeMap::new();

                if let Some(id) = &self.sender_id {
                    args.insert(Bytes::from_static(b"id"), id_value(id));
                }

                if let DhtQuery::GetPeers { info_hash } = query {
                    args.insert(Bytes::from_static(b"info_hash"), id_value(info_hash));
                }

                dict.insert(Bytes::from_static(b"a"), Value::Dict(args));
            }
            MessageBody::Response(response) => {
                dict.insert(Bytes::from_static(b"y"), Value::string("r"));

                let mut resp = BTreeMap::new();
                resp.insert(Bytes::from_static(b"id"), id_value(&response.id));

                if let Some(token) = &response.token {
                    resp.insert(Bytes::from_static(b"token"), Value::Bytes(token.clone()));
                }

                if let Some(values) = &response.values {
                    let values = values
                        .iter()
                        .map(|addr| Value::Bytes(Bytes::from(encode_compact_peer(addr))))
                        .collect();
                    resp.insert(Bytes::from_static(b"values"), Value::List(values));
                }

                if let Some(nodes) = &response.nodes {
                    resp.insert(Bytes::from_static(b"nodes"), Value::Bytes(nodes.clone()));
                }

                dict.insert(Bytes::from_static(b"r"), Value::Dict(resp));
            }
            MessageBody::Error { code, message } => {
                dict.insert(Bytes::from_static(b"y"), Value::string("e"));
                dict.insert(
                    Bytes::from_static(b"e"),
                    Value::List(vec![Value::Integer(*code), Value::string(message)]),
                );
            }
        }

        encode(&Value::Dict(dict))
    }
}

fn id_value(id: &NodeId) -> Value {
    Value::Bytes(Bytes::copy_from_slice(id.as_bytes()))
}

/// Decodes a compact peer: 4-byte IPv4 or 16-byte IPv6 address, then a
/// big-endian port.
pub fn parse_compact_peer(data: &[u8]) -> Option<SocketAddr> {
    match data.len() {
        6 => {
            let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
            let port = u16::from_be_bytes([data[4], data[5]]);
            Some(SocketAddr::new(IpAddr::V4(ip), port))
        }
        18 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&data[..16]);
            let port = u16::from_be_bytes([data[16], data[17]]);
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

pub fn encode_compact_peer(addr: &SocketAddr) -> Vec<u8> {
    let mut data = Vec::with_capacity(18);
    match addr.ip() {
        IpAddr::V4(ip) => data.extend_from_slice(&ip.octets()),
        IpAddr::V6(ip) => data.extend_from_slice(&ip.octets()),
    }
    data.extend_from_slice(&addr.port().to_be_bytes());
    data
}
