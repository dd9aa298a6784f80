use thiserror::Error;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid identifier length(s): {0} {1}")]
    InvalidIdentifier(usize, usize),

    #[error("zero distance between identical ids")]
    DegenerateComparison,

    #[error("no remote nodes are known yet")]
    NoKnownNodes,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("malformed compact node list of {0} bytes")]
    MalformedNodeList(usize),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("dht engine stopped")]
    EngineStopped,
}
