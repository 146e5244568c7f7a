// secure_chat/shared_crypto/src/number_theory.rs

//! Small-integer number theory behind the key pairs.
//!
//! Every value here is a `u64`. Products are computed in `u128`, which holds
//! the square of any modulus the key generator can produce.

use num_integer::{Integer, Roots};
use num_traits::ToPrimitive;
use rand::Rng;

use crate::error::{CryptoError, CryptoResult};

/// Trial division up to `floor(sqrt(x))`.
pub fn is_prime(x: u64) -> bool {
    if x <= 1 {
        return false;
    }
    if x <= 3 {
        return true;
    }
    let limit = x.sqrt();
    (2..=limit).all(|i| x % i != 0)
}

/// Primes in `[lo, hi]`, ascending.
pub fn primes_in_range(lo: u64, hi: u64) -> impl Iterator<Item = u64> {
    (lo..=hi).filter(|&x| is_prime(x))
}

/// Draws uniformly from `[lo, hi]` until a prime comes up.
///
/// A range without primes is rejected before drawing, otherwise the loop
/// would never end.
pub fn generate_prime<R: Rng>(rng: &mut R, lo: u64, hi: u64) -> CryptoResult<u64> {
    if lo > hi {
        return Err(CryptoError::InvalidRange { lo, hi });
    }
    if primes_in_range(lo, hi).next().is_none() {
        return Err(CryptoError::NoPrimeInRange { lo, hi });
    }
    loop {
        let candidate = rng.gen_range(lo..=hi);
        if is_prime(candidate) {
            return Ok(candidate);
        }
    }
}

/// `base^exponent mod modulus` by repeated squaring.
///
/// Returns 1 for a zero exponent, whatever the modulus.
///
/// # Panics
///
/// Panics if `modulus` is zero.
pub fn mod_pow(base: u64, exponent: u64, modulus: u64) -> u64 {
    let m = u128::from(modulus);
    let mut x = u128::from(base) % m;
    let mut e = exponent;
    let mut y: u128 = 1;
    while e > 0 {
        if e.is_even() {
            x = (x * x) % m;
            e /= 2;
        } else {
            y = (x * y) % m;
            e -= 1;
        }
    }
    // y is either the initial 1 or a residue below `modulus`
    y as u64
}

/// Euclid's algorithm on `(z, candidate)`.
///
/// Divides until the remainder reaches zero; the two are coprime when the
/// last divisor is 1.
pub fn is_coprime(z: u64, candidate: u64) -> bool {
    if candidate == 0 {
        return z == 1;
    }
    let mut dividend = z;
    let mut divisor = candidate;
    loop {
        let remainder = dividend % divisor;
        if remainder == 0 {
            break;
        }
        dividend = divisor;
        divisor = remainder;
    }
    divisor == 1
}

/// `d` such that `e * d ≡ 1 (mod z)`, by the extended Euclidean algorithm.
pub fn mod_inverse(e: u64, z: u64) -> CryptoResult<u64> {
    if z == 0 || !is_coprime(z, e) {
        return Err(CryptoError::NotInvertible { e, z });
    }

    let modulus = i128::from(z);
    let (mut w_prev, mut w) = (modulus, i128::from(e) % modulus);
    let (mut d_prev, mut d) = (0i128, 1i128);
    while w != 0 {
        let k = w_prev / w;
        (w_prev, w) = (w, w_prev - k * w);
        (d_prev, d) = (d, d_prev - k * d);
    }

    let mut inverse = d_prev % modulus;
    if inverse < 0 {
        inverse += modulus;
    }
    inverse.to_u64().ok_or(CryptoError::NotInvertible { e, z })
}
