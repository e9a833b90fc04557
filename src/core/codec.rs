//! Wide-integer codec for the ledger's `u256` calldata format.
//!
//! A `u256` travels as two field elements, low half first:
//! `value = high * 2^128 + low`. All conversions are checked; nothing is ever
//! truncated silently.

use primitive_types::U256;
use starknet::core::types::Felt;

use crate::utils::error::{KeeperError, Result};

/// Splits `value` into `(low, high)` 128-bit halves.
#[must_use]
pub fn split(value: U256) -> (u128, u128) {
    let low = value.low_u128();
    let high = (value >> 128).low_u128();
    (low, high)
}

/// Inverse of [`split`].
#[must_use]
pub fn join(low: u128, high: u128) -> U256 {
    (U256::from(high) << 128) | U256::from(low)
}

/// Encodes `value` as `[low, high]` calldata.
#[must_use]
pub fn to_calldata(value: U256) -> [Felt; 2] {
    let (low, high) = split(value);
    [Felt::from(low), Felt::from(high)]
}

/// Reads a field element that must hold a `u128`.
///
/// # Errors
///
/// Returns `KeeperError::EncodingError` if the element is `>= 2^128`.
pub fn felt_to_u128(felt: &Felt) -> Result<u128> {
    let bytes = felt.to_bytes_be();
    let (upper, lower) = bytes.split_at(16);
    if upper.iter().any(|b| *b != 0) {
        return Err(KeeperError::EncodingError(format!(
            "{felt:#x} does not fit in 128 bits"
        )));
    }
    let mut buf = [0u8; 16];
    buf.copy_from_slice(lower);
    Ok(u128::from_be_bytes(buf))
}

/// Reads a field element that must hold a `u64`.
///
/// # Errors
///
/// Returns `KeeperError::EncodingError` if the element is `>= 2^64`.
pub fn felt_to_u64(felt: &Felt) -> Result<u64> {
    let wide = felt_to_u128(felt)?;
    u64::try_from(wide)
        .map_err(|_| KeeperError::EncodingError(format!("{felt:#x} does not fit in 64 bits")))
}

/// Joins two field elements holding the `(low, high)` halves.
///
/// # Errors
///
/// Returns `KeeperError::EncodingError` if either half is `>= 2^128`.
pub fn from_felts(low: &Felt, high: &Felt) -> Result<U256> {
    Ok(join(felt_to_u128(low)?, felt_to_u128(high)?))
}

/// Parses an identifier given in decimal or `0x`-prefixed hex.
///
/// # Errors
///
/// Returns `KeeperError::EncodingError` for negative input, malformed digits,
/// or values `>= 2^256`.
pub fn parse_id(input: &str) -> Result<U256> {
    let trimmed = input.trim();
    if trimmed.starts_with('-') {
        return Err(KeeperError::EncodingError(format!(
            "negative identifier '{trimmed}'"
        )));
    }
    if trimmed.is_empty() {
        return Err(KeeperError::EncodingError("empty identifier".to_string()));
    }

    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| format!("{e:?}")),
        None => U256::from_dec_str(trimmed).map_err(|e| format!("{e:?}")),
    };

    parsed.map_err(|e| {
        KeeperError::EncodingError(format!("identifier '{trimmed}' is not a u256: {e}"))
    })
}
