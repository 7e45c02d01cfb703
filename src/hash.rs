//! The setup hash all parties exchange to make sure they run the same computation.

use std::fmt;

use subtle::ConstantTimeEq;

use crate::data_types::{Circuit, PartySetting};

/// A hash of the circuit together with the settings of all parties.
///
/// Two parties only compute together if their setup hashes are equal, which catches mismatched
/// circuits as well as a different assignment of inputs and outputs to parties.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetupHash([u8; SetupHash::LEN]);

impl SetupHash {
    /// The length of the hash in bytes.
    pub const LEN: usize = 32;

    /// Hashes the canonical binary serialization of `(circuit, settings)`.
    pub fn new(circuit: &Circuit, settings: &[PartySetting]) -> Result<Self, bincode::Error> {
        let bytes = bincode::serialize(&(circuit, settings))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(&bytes);
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// The raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; SetupHash::LEN] {
        &self.0
    }

    /// Compares the hash to the bytes received from another party in constant time.
    pub fn matches(&self, other: &[u8]) -> bool {
        other.len() == Self::LEN && bool::from(self.0[..].ct_eq(other))
    }
}

impl fmt::Debug for SetupHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SetupHash(")?;
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        write!(f, ")")
    }
}
