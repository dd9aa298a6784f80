//! Kademlia XOR metric.

use std::fmt;

use super::error::DhtError;

pub const ID_LEN: usize = 20;

/// XOR of two 160-bit identifiers.
///
/// Compares as an unsigned big-endian integer, which for a fixed-width array
/// is the same as lexicographic byte order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance(pub [u8; ID_LEN]);

impl Distance {
    pub const ZERO: Distance = Distance([0u8; ID_LEN]);

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Distance({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Computes the distance between two raw identifiers.
///
/// Both inputs must be exactly 20 bytes. Identical inputs are rejected with
/// [`DhtError::DegenerateComparison`]: a zero distance is not a usable
/// ordering result.
pub fn hash_distance(a: &[u8], b: &[u8]) -> Result<Distance, DhtError> {
    if a.len() != ID_LEN || b.len() != ID_LEN {
        return Err(DhtError::InvalidIdentifier(a.len(), b.len()));
    }
    if a == b {
        return Err(DhtError::DegenerateComparison);
    }

    let mut dist = [0u8; ID_LEN];
    for (i, d) in dist.iter_mut().enumerate() {
        *d = a[i] ^ b[i];
    }
    Ok(Distance(dist))
}
