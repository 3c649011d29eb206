//! Public randomness beacon derived from recorded block hashes.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::CeremonyError;

/// Width in bytes of every beacon source hash.
pub const BLOCK_HASH_LEN: usize = 32;

/// Ethereum block hashes mixed into the beacon, in order.
///
/// Blocks 16_000_000 through 16_400_000 at a 50_000 block stride. Changing this
/// list changes the finalized proving keys; it is versioned data, not input.
pub const BEACON_BLOCK_HASHES: [&str; 9] = [
    "3dc4ef568ae2635db1419c5fec55c4a9322c05302ae527cd40bff380c1d465dd", // 16000000
    "a0d3047ae848d2dab629995b98c68cfed076e6a1d1abd2c9487215f6d955d461", // 16050000
    "5724e7710e27754b3e6042b3cab7ceee6f24a1ecaddd79daca8cb3ad5492d456", // 16100000
    "c7ac3b2f9796dc25a55ccf0cac1c28424c7caadf5b5668179893bec164259d98", // 16150000
    "075dfe48c8c85c495ecebc5509d0dd0c1ce416341dd619fc63d61f4ed6cfe2f6", // 16200000
    "e2dcf02fb09fdd316c35539b24cd3ef3e4624ca8dde92fd19dcc35035ecbcdb8", // 16250000
    "4dc9f7ad4a2c21699c6b31a2deea8b48731197e86855e2d7675e1866efafc665", // 16300000
    "795828f93914ef187df13eb6bf3d06f25269e623dbaed16813616ba663c35eb6", // 16350000
    "c5e38d714ec3569c34fcf4cfd5808fce67cce0c6dcb1d9c4a0e3e9e3e66cac1c", // 16400000
];

/// Keccak-256 digest of the concatenated beacon source hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Beacon([u8; 32]);

impl Beacon {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, the form handed to the setup finalizer.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, CeremonyError> {
        Ok(Self(decode_block_hash(value)?))
    }
}

impl fmt::Display for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Beacon({})", self.to_hex())
    }
}

impl From<Beacon> for String {
    fn from(beacon: Beacon) -> Self {
        beacon.to_hex()
    }
}

impl TryFrom<String> for Beacon {
    type Error = CeremonyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Beacon::from_hex(&value)
    }
}

/// Reduce an ordered list of block hashes into a single beacon value.
///
/// The preimage is the raw byte concatenation in list order, so the result is
/// order-sensitive. Every entry must be exactly 32 bytes of hex.
pub fn derive_beacon<S: AsRef<str>>(block_hashes: &[S]) -> Result<Beacon, CeremonyError> {
    if block_hashes.is_empty() {
        return Err(CeremonyError::InvalidInput(
            "beacon source list is empty".into(),
        ));
    }

    let mut hasher = Keccak256::new();
    for hash in block_hashes {
        hasher.update(decode_block_hash(hash.as_ref())?);
    }
    Ok(Beacon(hasher.finalize().into()))
}

/// Beacon for the fixed, versioned source list.
pub fn ceremony_beacon() -> Result<Beacon, CeremonyError> {
    derive_beacon(&BEACON_BLOCK_HASHES)
}

fn decode_block_hash(value: &str) -> Result<[u8; BLOCK_HASH_LEN], CeremonyError> {
    let bytes = hex::decode(value)
        .map_err(|err| CeremonyError::InvalidInput(format!("'{value}' is not valid hex: {err}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        CeremonyError::InvalidInput(format!(
            "'{value}' decodes to {} bytes, expected {BLOCK_HASH_LEN}",
            bytes.len()
        ))
    })
}
