// secure_chat/shared_crypto/src/error.rs

//! Error types for key arithmetic and the record protocol.

use thiserror::Error;

use crate::handshake::HandshakeState;
use crate::models::Record;

/// Arithmetic and key-generation failures.
///
/// These are invariant violations: callers report them and stop, nothing in
/// the crate retries after one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A range whose lower bound is above its upper bound.
    #[error("invalid range [{lo}, {hi}]")]
    InvalidRange { lo: u64, hi: u64 },

    /// The prime range holds fewer primes than the generator needs.
    #[error("range [{lo}, {hi}] does not contain enough primes")]
    NoPrimeInRange { lo: u64, hi: u64 },

    /// `e` has no inverse modulo `z`.
    #[error("{e} is not invertible modulo {z}")]
    NotInvertible { e: u64, z: u64 },

    /// No exponent in the search space is coprime with the totient.
    #[error("no public exponent coprime with {z} found from seed {seed}")]
    ExponentSearchExhausted { seed: u64, z: u64 },

    /// The CA modulus never exceeded the server modulus.
    #[error("CA modulus did not exceed {bound} after {attempts} attempts")]
    CaModulusNotAbove { bound: u64, attempts: u32 },

    /// A product of primes does not fit the key integer width.
    #[error("modulus overflow for primes {p} and {q}")]
    Overflow { p: u64, q: u64 },

    /// Decryption was asked of a key pair that only holds the public half.
    #[error("key pair has no private exponent")]
    MissingPrivateExponent,

    /// The decrypted value is not a byte, so both nonce chains have drifted apart.
    #[error("decrypted value {0} is outside the byte range, nonce chain out of sync")]
    ChainDesync(u64),

    /// Stored key material that breaks a key invariant.
    #[error("invalid key material: {0}")]
    InvalidKeys(String),
}

/// Failures of a single session: transport, framing and state machine.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A keyword record with the wrong number of arguments.
    #[error("malformed {keyword} record: expected {expected} integer(s), got {got}")]
    MalformedRecord {
        keyword: &'static str,
        expected: usize,
        got: usize,
    },

    /// A token that should be a non-negative integer.
    #[error("invalid integer {0:?} in record")]
    InvalidInteger(String),

    /// A line that matches no known record.
    #[error("unknown record {0:?}")]
    UnknownRecord(String),

    /// A well-formed record that the current state does not accept.
    #[error("unexpected {} record while in state {state:?}", .record.kind())]
    UnexpectedRecord {
        state: HandshakeState,
        record: Record,
    },

    /// The peer acknowledged with the wrong code.
    #[error("expected ACK {expected}, got ACK {got}")]
    AckMismatch { expected: u32, got: u32 },

    /// The server key recovered from the certificate is unusable.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A line longer than the receive buffer.
    #[error("record exceeds {0} bytes")]
    RecordTooLong(usize),

    /// A record that is not ASCII text.
    #[error("record is not valid ASCII")]
    NotAscii,

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key arithmetic error.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result alias for arithmetic and key operations.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
