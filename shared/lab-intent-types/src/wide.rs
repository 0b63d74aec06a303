//! Canonical wide-integer normalization.
//!
//! Every numeric value that ends up hashed, signed or submitted is carried as a
//! `U256`. Inputs are accepted as JSON unsigned integers, decimal strings or
//! `0x`-prefixed hex strings; anything else (negatives, fractions, JSON numbers
//! too large to be exact) is rejected rather than coerced.

use core::fmt;

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serializer};

/// A numeric field as it arrived on the wire, before normalization.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Int(u64),
    Text(String),
    Float(f64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WideError {
    Empty,
    Negative,
    Fractional,
    /// JSON number beyond the range a double represents exactly.
    Imprecise,
    Malformed(String),
    Overflow { bits: usize },
}

impl fmt::Display for WideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WideError::Empty => f.write_str("value is empty"),
            WideError::Negative => f.write_str("value must not be negative"),
            WideError::Fractional => f.write_str("value must be an integer"),
            WideError::Imprecise => {
                f.write_str("value is too large for a JSON number; send it as a decimal string")
            }
            WideError::Malformed(reason) => write!(f, "value is not a valid integer: {reason}"),
            WideError::Overflow { bits } => write!(f, "value does not fit in uint{bits}"),
        }
    }
}

impl std::error::Error for WideError {}

impl RawNumber {
    pub fn to_u256(&self) -> Result<U256, WideError> {
        match self {
            RawNumber::Int(v) => Ok(U256::from(*v)),
            RawNumber::Text(s) => parse_str(s),
            RawNumber::Float(f) if *f < 0.0 => Err(WideError::Negative),
            RawNumber::Float(f) if f.fract() == 0.0 => Err(WideError::Imprecise),
            RawNumber::Float(_) => Err(WideError::Fractional),
        }
    }
}

impl From<u64> for RawNumber {
    fn from(value: u64) -> Self {
        RawNumber::Int(value)
    }
}

/// Parse a decimal or `0x` hex string into a `U256`.
pub fn parse_str(s: &str) -> Result<U256, WideError> {
    if s.is_empty() {
        return Err(WideError::Empty);
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() {
            return Err(WideError::Empty);
        }
        return U256::from_str_radix(hex, 16).map_err(|e| WideError::Malformed(e.to_string()));
    }
    if s.starts_with('-') {
        return Err(WideError::Negative);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        if s.contains('.') {
            return Err(WideError::Fractional);
        }
        return Err(WideError::Malformed(format!("`{s}`")));
    }
    U256::from_str_radix(s, 10).map_err(|e| WideError::Malformed(e.to_string()))
}

/// Reject values wider than `bits` (eg. `uint96` prices).
pub fn fit(value: U256, bits: usize) -> Result<U256, WideError> {
    if value.bit_len() > bits {
        return Err(WideError::Overflow { bits });
    }
    Ok(value)
}

/// Narrow to a native integer, failing on overflow.
pub fn to_u64(value: U256) -> Result<u64, WideError> {
    fit(value, 64).map(|v| v.as_limbs()[0])
}

/// Serde adapter: `U256` as a decimal string on output, canonical parse on input.
pub mod decimal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        RawNumber::deserialize(deserializer)?
            .to_u256()
            .map_err(de::Error::custom)
    }
}
