// Seed generation and commitment.
// The seed is the only secret in a draw; its SHA-256 hash is the public commitment.

use crate::error::EntropyError;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Raw entropy per seed (256 bits).
pub const SEED_BYTES: usize = 32;

/// Hex-encoded secret seed. Wiped on drop and redacted in `Debug`.
pub struct Seed(Zeroizing<String>);

impl Seed {
    /// Wrap an already disclosed seed, e.g. for replay.
    pub fn from_disclosed(hex_seed: &str) -> Self {
        Seed(Zeroizing::new(hex_seed.trim().to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn commitment(&self) -> String {
        seed_hash(&self.0)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

impl Zeroize for Seed {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Hex SHA-256 of the seed's string encoding.
pub fn seed_hash(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Draw a fresh seed from the OS CSPRNG and return it with its commitment.
pub fn generate_seed() -> Result<(Seed, String), EntropyError> {
    let mut raw = Zeroizing::new([0u8; SEED_BYTES]);
    OsRng
        .try_fill_bytes(&mut raw[..])
        .map_err(|e| EntropyError(e.to_string()))?;
    let seed = Seed(Zeroizing::new(hex::encode(&raw[..])));
    let hash = seed.commitment();
    Ok((seed, hash))
}

/// Lowercase 64-char hex, as produced by `seed_hash`.
pub fn is_well_formed_hash(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
