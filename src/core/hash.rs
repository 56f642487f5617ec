//! State Fingerprinting
//!
//! Short digests over world state, used to detect divergence between peers.
//! Two settled worlds whose discs round to identical integer positions must
//! fingerprint identically; velocity is deliberately excluded.

use std::fmt;

use sha2::{Digest, Sha256};

/// Domain separator for world fingerprints.
const FINGERPRINT_DOMAIN: &[u8] = b"DISC_DUEL_STATE_V1";

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_LEN: usize = 8;

/// Short digest over sorted, rounded disc positions.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Hex encoding, as carried on the wire.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Domain-separated hasher for world state.
///
/// Wraps SHA-256 with helpers for the integer types that go into a
/// fingerprint. Order of updates matters.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with a domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for world fingerprints.
    pub fn for_world() -> Self {
        Self::new(FINGERPRINT_DOMAIN)
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i32 value (little-endian).
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize into a short fingerprint.
    pub fn finalize(self) -> Fingerprint {
        let digest = self.hasher.finalize();
        let mut out = [0u8; FINGERPRINT_LEN];
        out.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        Fingerprint(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hasher_determinism() {
        let make = || {
            let mut h = StateHasher::for_world();
            h.update_u32(3);
            h.update_i32(-120);
            h.update_i32(455);
            h.finalize()
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn test_update_order_matters() {
        let a = {
            let mut h = StateHasher::new(b"test");
            h.update_i32(1);
            h.update_i32(2);
            h.finalize()
        };
        let b = {
            let mut h = StateHasher::new(b"test");
            h.update_i32(2);
            h.update_i32(1);
            h.finalize()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_domain_separation() {
        let a = {
            let mut h = StateHasher::new(b"DOMAIN_A");
            h.update_u32(7);
            h.finalize()
        };
        let b = {
            let mut h = StateHasher::new(b"DOMAIN_B");
            h.update_u32(7);
            h.finalize()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_roundtrip_shape() {
        let mut h = StateHasher::for_world();
        h.update_u32(1);
        let fp = h.finalize();
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
