// secure_chat/shared_crypto/src/rsa.rs

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{KeyGenConfig, Range};
use crate::error::{CryptoError, CryptoResult};
use crate::number_theory::{generate_prime, is_coprime, mod_inverse, mod_pow, primes_in_range};

/// An RSA key pair over small integers.
///
/// `d` is only present on the side that owns the key. A pair received from a
/// peer carries `e` and `n` alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub e: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<u64>,
    pub n: u64,
}

impl KeyPair {
    /// Public half only.
    pub fn public(e: u64, n: u64) -> Self {
        Self { e, d: None, n }
    }

    /// Derives the full pair from two distinct primes and a chosen exponent.
    pub fn from_primes(p: u64, q: u64, e: u64) -> CryptoResult<Self> {
        if p == q {
            return Err(CryptoError::InvalidKeys(format!("p and q are both {}", p)));
        }
        let n = p.checked_mul(q).ok_or(CryptoError::Overflow { p, q })?;
        let z = totient(p, q);
        let d = mod_inverse(e, z)?;
        Ok(Self { e, d: Some(d), n })
    }

    /// Copy without the private exponent.
    pub fn public_key(&self) -> KeyPair {
        KeyPair::public(self.e, self.n)
    }

    pub fn private_exponent(&self) -> CryptoResult<u64> {
        self.d.ok_or(CryptoError::MissingPrivateExponent)
    }

    /// `m^e mod n`.
    pub fn encrypt_raw(&self, message: u64) -> u64 {
        mod_pow(message, self.e, self.n)
    }

    /// `c^d mod n`.
    pub fn decrypt_raw(&self, ciphertext: u64) -> CryptoResult<u64> {
        Ok(mod_pow(ciphertext, self.private_exponent()?, self.n))
    }
}

fn totient(p: u64, q: u64) -> u64 {
    (p - 1) * (q - 1)
}

/// Server key pair with a fresh modulus.
pub fn generate_server_keys<R: Rng>(rng: &mut R, config: &KeyGenConfig) -> CryptoResult<KeyPair> {
    let (p, q) = draw_distinct_primes(rng, config.prime_range)?;
    derive_key_pair(rng, config, p, q)
}

/// CA key pair whose modulus is strictly above `n_server_bound`.
///
/// The CA signs values derived from the server modulus, and a signed value
/// only survives the round trip when it is below the signing modulus.
pub fn generate_ca_keys<R: Rng>(
    rng: &mut R,
    config: &KeyGenConfig,
    n_server_bound: u64,
) -> CryptoResult<KeyPair> {
    for attempt in 1..=config.max_ca_attempts {
        let (p, q) = draw_distinct_primes(rng, config.prime_range)?;
        let n = p.checked_mul(q).ok_or(CryptoError::Overflow { p, q })?;
        if n > n_server_bound {
            tracing::debug!(attempt, n, n_server_bound, "CA modulus accepted");
            return derive_key_pair(rng, config, p, q);
        }
    }
    Err(CryptoError::CaModulusNotAbove {
        bound: n_server_bound,
        attempts: config.max_ca_attempts,
    })
}

fn draw_distinct_primes<R: Rng>(rng: &mut R, range: Range) -> CryptoResult<(u64, u64)> {
    let (lo, hi) = range;
    if lo <= hi && primes_in_range(lo, hi).take(2).count() < 2 {
        return Err(CryptoError::NoPrimeInRange { lo, hi });
    }
    let p = generate_prime(rng, lo, hi)?;
    let mut q = generate_prime(rng, lo, hi)?;
    while p == q {
        q = generate_prime(rng, lo, hi)?;
    }
    Ok((p, q))
}

fn derive_key_pair<R: Rng>(
    rng: &mut R,
    config: &KeyGenConfig,
    p: u64,
    q: u64,
) -> CryptoResult<KeyPair> {
    let n = p.checked_mul(q).ok_or(CryptoError::Overflow { p, q })?;
    let z = totient(p, q);
    let e = find_public_exponent(rng, config.exponent_range, p, q, z)?;
    let d = mod_inverse(e, z)?;
    Ok(KeyPair { e, d: Some(d), n })
}

/// Walks upward from a random seed to the first exponent coprime with `z`,
/// never picking `p` or `q` themselves.
fn find_public_exponent<R: Rng>(
    rng: &mut R,
    range: Range,
    p: u64,
    q: u64,
    z: u64,
) -> CryptoResult<u64> {
    let (lo, hi) = range;
    if lo > hi {
        return Err(CryptoError::InvalidRange { lo, hi });
    }
    let seed = rng.gen_range(lo..=hi);
    (seed.max(2)..z)
        .filter(|&e| e != p && e != q)
        .find(|&e| is_coprime(z, e))
        .ok_or(CryptoError::ExponentSearchExhausted { seed, z })
}

/// The server public key signed with the CA private exponent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub e: u64,
    pub n: u64,
}

impl Certificate {
    /// Recovers the signed key with the CA public exponent.
    pub fn open(&self, ca: &KeyPair) -> KeyPair {
        KeyPair::public(ca.encrypt_raw(self.e), ca.encrypt_raw(self.n))
    }
}

/// Process-wide keys of the server: the CA pair and the server's own pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerKeys {
    pub ca: KeyPair,
    pub server: KeyPair,
}

impl ServerKeys {
    /// Server keys first, then a CA whose modulus is above the server's.
    pub fn generate<R: Rng>(rng: &mut R, config: &KeyGenConfig) -> CryptoResult<Self> {
        let server = generate_server_keys(rng, config)?;
        let ca = generate_ca_keys(rng, config, server.n)?;
        Ok(Self { ca, server })
    }

    /// `PUBLIC_KEY` payload: `e_S` and `n_S` raised to `d_CA`.
    pub fn certificate(&self) -> CryptoResult<Certificate> {
        Ok(Certificate {
            e: self.ca.decrypt_raw(self.server.e)?,
            n: self.ca.decrypt_raw(self.server.n)?,
        })
    }

    /// Checks the invariants a stored pair of keys must still satisfy.
    pub fn validate(&self) -> CryptoResult<()> {
        if self.ca.n <= self.server.n {
            return Err(CryptoError::InvalidKeys(format!(
                "CA modulus {} is not above server modulus {}",
                self.ca.n, self.server.n
            )));
        }
        for (name, pair) in [("CA", &self.ca), ("server", &self.server)] {
            if pair.n < 4 {
                return Err(CryptoError::InvalidKeys(format!("{} modulus {} too small", name, pair.n)));
            }
            for sample in [2, 3, 65, pair.n - 1].into_iter().filter(|&s| s < pair.n) {
                if pair.decrypt_raw(pair.encrypt_raw(sample))? != sample {
                    return Err(CryptoError::InvalidKeys(format!(
                        "{} exponents do not invert each other",
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CryptoError::InvalidKeys(e.to_string()))
    }

    /// Parses and validates a stored key file.
    pub fn from_json(json: &str) -> CryptoResult<Self> {
        let keys: ServerKeys =
            serde_json::from_str(json).map_err(|e| CryptoError::InvalidKeys(e.to_string()))?;
        keys.validate()?;
        Ok(keys)
    }
}
