// secure_chat/shared_crypto/src/config.rs

//! Protocol constants and key-generation ranges.

use serde::{Deserialize, Serialize};

/// Port used by both applications when none is given.
pub const DEFAULT_PORT: u16 = 1234;

/// Client → server: the signed public key was received.
pub const ACK_PUBLIC_KEY_RECEIVED: u32 = 226;

/// Server → client: the nonce was received.
pub const ACK_NONCE_RECEIVED: u32 = 220;

/// A message made of exactly this text ends the client's session.
pub const END_OF_SESSION: &str = ".";

/// Longest record accepted from the peer, line terminator excluded.
pub const MAX_RECORD_LEN: usize = 256;

/// Inclusive `[lo, hi]` range.
pub type Range = (u64, u64);

/// Ranges the key generator and the client nonce are drawn from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyGenConfig {
    /// Candidate primes for `p` and `q`.
    pub prime_range: Range,

    /// Seed range for the public exponent search.
    pub exponent_range: Range,

    /// Client nonce range. Must stay below every server modulus.
    pub nonce_range: Range,

    /// Prime pairs drawn before giving up on `n_CA > n_Server`.
    pub max_ca_attempts: u32,
}

impl Default for KeyGenConfig {
    fn default() -> Self {
        Self {
            prime_range: (5_000, 15_000),
            exponent_range: (5_000, 10_000),
            nonce_range: (1_000, 5_000),
            max_ca_attempts: 5_000,
        }
    }
}

impl KeyGenConfig {
    /// Same ranges with a different prime range.
    pub fn with_prime_range(mut self, lo: u64, hi: u64) -> Self {
        self.prime_range = (lo, hi);
        self
    }

    /// Same ranges with a different exponent seed range.
    pub fn with_exponent_range(mut self, lo: u64, hi: u64) -> Self {
        self.exponent_range = (lo, hi);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_nonce_below_smallest_modulus() {
        let config = KeyGenConfig::default();
        let smallest = config.prime_range.0 * config.prime_range.0;
        assert!(config.nonce_range.1 < smallest);
    }

    #[test]
    fn test_builders_keep_other_ranges() {
        let config = KeyGenConfig::default().with_prime_range(50, 70);
        assert_eq!(config.prime_range, (50, 70));
        assert_eq!(config.exponent_range, KeyGenConfig::default().exponent_range);
    }
}
