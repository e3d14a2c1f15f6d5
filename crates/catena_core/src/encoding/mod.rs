//! # Type Coercion
//!
//! Converts caller-level values into the encodings a contract parameter
//! expects.
//!
//! ## `bytesN` policy
//!
//! Numbers are stringified first. Strings that are not `0x`-prefixed are
//! taken as their UTF-8 bytes; `0x` strings are hex-decoded. Anything longer
//! than `N` bytes is truncated to exactly `N` bytes and a warning is logged.
//! Shorter values are right-padded with zeros, the way the EVM lays out
//! `bytesN` in a word.

use alloy_primitives::{hex, Address, B256, U256};

use crate::contracts::{ParamDescriptor, ParamType};
use crate::error::{CatenaError, CatenaResult};

/// A caller-supplied argument before coercion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArgValue {
    /// Explicitly absent.
    Null,
    /// Signed integer.
    Number(i64),
    /// Text, including `0x` hex strings.
    Text(String),
    /// Unsigned 256-bit integer.
    Uint(U256),
    /// Raw 32-byte word.
    Word(B256),
    /// Chain address.
    Address(Address),
    /// Boolean.
    Bool(bool),
    /// Homogeneous list.
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Whether the value counts as missing.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Uint(_) => "uint",
            Self::Word(_) => "bytes32",
            Self::Address(_) => "address",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for ArgValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value))
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        Self::Uint(U256::from(value))
    }
}

impl From<U256> for ArgValue {
    fn from(value: U256) -> Self {
        Self::Uint(value)
    }
}

impl From<B256> for ArgValue {
    fn from(value: B256) -> Self {
        Self::Word(value)
    }
}

impl From<Address> for ArgValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<Address>> for ArgValue {
    fn from(value: Vec<Address>) -> Self {
        Self::List(value.into_iter().map(Self::Address).collect())
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A value coerced to its contract type, ready for ABI encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbiValue {
    /// `bytesN`, left-aligned in a word.
    FixedBytes(B256),
    /// `uintN`.
    Uint(U256),
    /// `address`.
    Address(Address),
    /// `address[]`.
    AddressArray(Vec<Address>),
    /// `bool`.
    Bool(bool),
    /// `string`.
    String(String),
}

/// Coerces `value` into the type declared by `param`.
///
/// # Errors
///
/// Fails with `InvalidArgumentType` when the value cannot represent the
/// declared type.
pub fn coerce(param: &ParamDescriptor, value: &ArgValue) -> CatenaResult<AbiValue> {
    let expected = param.ty.to_string();
    let mismatch = |reason: String| CatenaError::invalid_argument(param.name, &expected, reason);

    match param.ty {
        ParamType::FixedBytes(width) => {
            let text = match value {
                ArgValue::Number(n) => n.to_string(),
                ArgValue::Uint(n) => n.to_string(),
                ArgValue::Text(s) => s.clone(),
                ArgValue::Word(w) => format!("0x{}", hex::encode(w)),
                other => {
                    return Err(mismatch(format!(
                        "expected valid number or string, got {}",
                        other.kind()
                    )))
                }
            };
            encode_fixed_bytes(param.name, &text, width).map(AbiValue::FixedBytes)
        }
        ParamType::Uint(bits) => {
            let parsed = match value {
                ArgValue::Number(n) if *n >= 0 => U256::from(n.unsigned_abs()),
                ArgValue::Number(n) => return Err(mismatch(format!("negative value {n}"))),
                ArgValue::Uint(n) => *n,
                ArgValue::Text(s) => s
                    .trim()
                    .parse::<U256>()
                    .map_err(|e| mismatch(format!("{s:?} is not an unsigned integer: {e}")))?,
                other => return Err(mismatch(format!("expected integer, got {}", other.kind()))),
            };
            if parsed.bit_len() > bits {
                return Err(mismatch(format!("{parsed} does not fit in {bits} bits")));
            }
            Ok(AbiValue::Uint(parsed))
        }
        ParamType::Address => parse_address(value)
            .map(AbiValue::Address)
            .map_err(mismatch),
        ParamType::AddressArray => match value {
            ArgValue::List(items) => items
                .iter()
                .map(parse_address)
                .collect::<Result<Vec<_>, _>>()
                .map(AbiValue::AddressArray)
                .map_err(mismatch),
            other => Err(mismatch(format!("expected list, got {}", other.kind()))),
        },
        ParamType::Bool => match value {
            ArgValue::Bool(b) => Ok(AbiValue::Bool(*b)),
            other => Err(mismatch(format!("expected bool, got {}", other.kind()))),
        },
        ParamType::String => match value {
            ArgValue::Text(s) => Ok(AbiValue::String(s.clone())),
            ArgValue::Number(_) | ArgValue::Uint(_) => Err(mismatch(
                "numeric input for a string field needs an explicit bytes conversion".to_string(),
            )),
            other => Err(mismatch(format!("expected string, got {}", other.kind()))),
        },
    }
}

fn parse_address(value: &ArgValue) -> Result<Address, String> {
    match value {
        ArgValue::Address(a) => Ok(*a),
        ArgValue::Text(s) => s
            .trim()
            .parse::<Address>()
            .map_err(|e| format!("{s:?} is not an address: {e}")),
        other => Err(format!("expected address, got {}", other.kind())),
    }
}

/// Encodes text or `0x` hex into a `bytes{width}` word.
///
/// # Errors
///
/// Fails with `InvalidArgumentType` on a width outside `1..=32` or on
/// malformed hex.
pub fn encode_fixed_bytes(param: &str, text: &str, width: usize) -> CatenaResult<B256> {
    if width == 0 || width > 32 {
        return Err(CatenaError::invalid_argument(
            param,
            format!("bytes{width}"),
            "byte width must be between 1 and 32",
        ));
    }

    let bytes = match text.strip_prefix("0x") {
        Some(digits) => hex::decode(digits).map_err(|e| {
            CatenaError::invalid_argument(param, format!("bytes{width}"), format!("bad hex: {e}"))
        })?,
        None => text.as_bytes().to_vec(),
    };

    let used = if bytes.len() > width {
        tracing::warn!(param, value = text, width, "Truncating value to {width} bytes");
        width
    } else {
        bytes.len()
    };

    let mut word = B256::ZERO;
    word[..used].copy_from_slice(&bytes[..used]);
    Ok(word)
}

/// Decodes a `bytes32` word back into text, dropping NUL padding.
#[must_use]
pub fn decode_fixed_text(word: &B256) -> String {
    let bytes: Vec<u8> = word.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}
