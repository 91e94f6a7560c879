//! Ledger-native values
//!
//! `LedgerValue` is the closed set of value kinds a contract call can take
//! or return. It is decoded once at the RPC boundary; nothing downstream
//! sniffs JSON shapes. `CallArg` is the typed form callers build arguments in.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Decimal places of token amounts passed as `TokenAmount`
pub const TOKEN_DECIMALS: u32 = 7;

/// Maximum length of a contract symbol
pub const MAX_SYMBOL_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerValue {
    Bool(bool),
    Void,
    U32(u32),
    I32(i32),
    U64(#[serde(with = "decimal")] u64),
    I64(#[serde(with = "decimal")] i64),
    U128(#[serde(with = "decimal")] u128),
    I128(#[serde(with = "decimal")] i128),
    String(String),
    Symbol(String),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Address(String),
    Vec(Vec<LedgerValue>),
    Map(Vec<MapEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: LedgerValue,
    pub val: LedgerValue,
}

impl LedgerValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            LedgerValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&str> {
        match self {
            LedgerValue::Address(address) => Some(address),
            _ => None,
        }
    }

    /// Text content of a `string` or `symbol`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LedgerValue::String(s) | LedgerValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            LedgerValue::I128(v) => Some(v),
            LedgerValue::I64(v) => Some(v as i128),
            LedgerValue::I32(v) => Some(v as i128),
            LedgerValue::U32(v) => Some(v as i128),
            LedgerValue::U64(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Look up a key in a `map` value
    pub fn get(&self, key: &LedgerValue) -> Option<&LedgerValue> {
        match self {
            LedgerValue::Map(entries) => entries.iter().find(|e| &e.key == key).map(|e| &e.val),
            _ => None,
        }
    }
}

/// Typed call argument as supplied by callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CallArg {
    /// Decimal token amount, scaled by `TOKEN_DECIMALS` into an i128
    TokenAmount(String),
    Address(String),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    BytesList(Vec<String>),
    U32(u32),
    U64(u64),
    Symbol(String),
    String(String),
    None,
    /// Comma separated `u64,u64,symbol`
    SymbolTuple(String),
    Raw(LedgerValue),
}

impl CallArg {
    pub fn into_value(self) -> Result<LedgerValue> {
        Ok(match self {
            CallArg::TokenAmount(amount) => {
                LedgerValue::I128(parse_token_amount(&amount, TOKEN_DECIMALS)?)
            }
            CallArg::Address(address) => LedgerValue::Address(address.trim().to_string()),
            CallArg::Bytes(bytes) => LedgerValue::Bytes(bytes),
            CallArg::BytesList(items) => LedgerValue::Vec(
                items
                    .iter()
                    .map(|item| hex_bytes::decode(item).map(LedgerValue::Bytes))
                    .collect::<Result<_>>()?,
            ),
            CallArg::U32(v) => LedgerValue::U32(v),
            CallArg::U64(v) => LedgerValue::U64(v),
            CallArg::Symbol(symbol) => LedgerValue::Symbol(validate_symbol(symbol)?),
            CallArg::String(s) => LedgerValue::String(s),
            CallArg::None => LedgerValue::Void,
            CallArg::SymbolTuple(raw) => parse_symbol_tuple(&raw)?,
            CallArg::Raw(value) => value,
        })
    }
}

/// Encode a list of typed arguments
pub fn encode_args(args: Vec<CallArg>) -> Result<Vec<LedgerValue>> {
    args.into_iter().map(CallArg::into_value).collect()
}

/// Scale a decimal string like `"12.5"` to base units
pub fn parse_token_amount(amount: &str, decimals: u32) -> Result<i128> {
    let invalid = || Error::InvalidArgument(format!("invalid token amount '{}'", amount));
    let trimmed = amount.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(Error::InvalidArgument(format!(
            "token amount '{}' has more than {} decimal places",
            amount, decimals
        )));
    }

    let scale = 10i128.pow(decimals);
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<i128>().map_err(|_| invalid())?
    };
    let fraction_units = if fraction.is_empty() {
        0
    } else {
        fraction.parse::<i128>().map_err(|_| invalid())? * 10i128.pow(decimals - fraction.len() as u32)
    };

    let value = whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or_else(invalid)?;
    Ok(if negative { -value } else { value })
}

fn validate_symbol(symbol: String) -> Result<String> {
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(symbol)
    } else {
        Err(Error::InvalidArgument(format!("invalid symbol '{}'", symbol)))
    }
}

fn parse_symbol_tuple(raw: &str) -> Result<LedgerValue> {
    let items: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect();
    let [first, second, symbol] = items.as_slice() else {
        return Err(Error::InvalidArgument(format!(
            "expected 'u64,u64,symbol', got '{}'",
            raw
        )));
    };
    let parse = |s: &str| {
        s.parse::<u64>()
            .map_err(|e| Error::InvalidArgument(format!("'{}': {}", s, e)))
    };
    Ok(LedgerValue::Vec(vec![
        LedgerValue::U64(parse(first)?),
        LedgerValue::U64(parse(second)?),
        LedgerValue::Symbol(validate_symbol(symbol.to_string())?),
    ]))
}

/// Integers carried as decimal strings
mod decimal {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Byte strings carried as hex
pub(crate) mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        decode(&raw).map_err(de::Error::custom)
    }

    pub fn decode(raw: &str) -> crate::Result<Vec<u8>> {
        let trimmed = raw.trim();
        hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
            .map_err(|e| crate::Error::Format(format!("invalid hex: {}", e)))
    }
}
