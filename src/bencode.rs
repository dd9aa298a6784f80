//! Bencode encoding and decoding ([BEP-3]).
//!
//! Every KRPC message exchanged with DHT nodes is a bencoded dictionary, for
//! example a `ping` query:
//!
//! ```text
//! d1:ad2:id20:abcdefghij0123456789e1:q4:ping1:t2:aa1:y1:qe
//! ```
//!
//! # Examples
//!
//! ```
//! use trackerless::bencode::{decode, encode, Value};
//!
//! let value = decode(b"d1:t2:aa1:y1:re").unwrap();
//! assert_eq!(value.get(b"y").and_then(|v| v.as_str()), Some("r"));
//! assert_eq!(encode(&value), b"d1:t2:aa1:y1:re");
//! ```
//!
//! Decoding rejects leading zeros in integers, truncated input, trailing
//! bytes after the top-level value and nesting deeper than 64 levels.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::BencodeError;
pub use value::Value;
