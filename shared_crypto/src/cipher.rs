// secure_chat/shared_crypto/src/cipher.rs

//! Character cipher chained through the session nonce.
//!
//! Each byte is XORed with the current nonce and then raised to the key
//! exponent. The nonce then moves forward to the ciphertext of that byte, so
//! both ends have to process the exact same sequence of records to stay in
//! step.

use crate::error::{CryptoError, CryptoResult};
use crate::rsa::KeyPair;

/// Chaining state shared in spirit by both peers.
///
/// Two update rules apply, one per direction:
/// - encrypting side: the nonce becomes the ciphertext it just emitted;
/// - decrypting side: the nonce becomes the ciphertext it just received,
///   never the decrypted intermediate value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(u64);

impl Nonce {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Encrypts one byte under the peer public key and advances the nonce to the
/// emitted ciphertext.
pub fn encrypt_char(plain: u8, nonce: &mut Nonce, public_key: &KeyPair) -> u64 {
    let masked = u64::from(plain) ^ nonce.0;
    let cipher = public_key.encrypt_raw(masked);
    nonce.0 = cipher;
    cipher
}

/// Decrypts one record under the own private key and advances the nonce to
/// the received ciphertext.
///
/// A result outside the byte range means the two chains no longer agree; the
/// nonce is still advanced so the caller sees the state it would have had.
pub fn decrypt_char(cipher: u64, nonce: &mut Nonce, private_key: &KeyPair) -> CryptoResult<u8> {
    let masked = private_key.decrypt_raw(cipher)?;
    let plain = masked ^ nonce.0;
    nonce.0 = cipher;
    u8::try_from(plain).map_err(|_| CryptoError::ChainDesync(plain))
}
