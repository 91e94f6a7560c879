//! Ledger key and contract id text encoding
//!
//! A strkey is `base32(version ‖ payload ‖ crc16_xmodem_le)` without padding.

use crate::{Error, Result};

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Kinds of strkey this crate reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKeyKind {
    /// ed25519 account public key, renders as `G...`
    Account,
    /// Contract id, renders as `C...`
    Contract,
    /// ed25519 secret seed, renders as `S...`
    Seed,
}

impl StrKeyKind {
    fn version_byte(self) -> u8 {
        match self {
            StrKeyKind::Account => 6 << 3,
            StrKeyKind::Contract => 2 << 3,
            StrKeyKind::Seed => 18 << 3,
        }
    }

    fn prefix(self) -> char {
        match self {
            StrKeyKind::Account => 'G',
            StrKeyKind::Contract => 'C',
            StrKeyKind::Seed => 'S',
        }
    }
}

/// Length of a 32-byte payload strkey
pub const STRKEY_LEN: usize = 56;

pub fn encode(kind: StrKeyKind, payload: &[u8; 32]) -> String {
    let mut raw = Vec::with_capacity(35);
    raw.push(kind.version_byte());
    raw.extend_from_slice(payload);
    raw.extend_from_slice(&crc16_xmodem(&raw).to_le_bytes());
    base32_encode(&raw)
}

pub fn decode(kind: StrKeyKind, text: &str) -> Result<[u8; 32]> {
    let invalid = |why: &str| Error::Format(format!("invalid {:?} key '{}': {}", kind, text, why));

    if text.len() != STRKEY_LEN || !text.starts_with(kind.prefix()) {
        return Err(invalid("wrong length or prefix"));
    }
    let raw = base32_decode(text).ok_or_else(|| invalid("not base32"))?;
    if raw.len() != 35 || raw[0] != kind.version_byte() {
        return Err(invalid("wrong version byte"));
    }
    let (body, checksum) = raw.split_at(33);
    if crc16_xmodem(body).to_le_bytes() != checksum {
        return Err(invalid("checksum mismatch"));
    }

    let mut payload = [0u8; 32];
    payload.copy_from_slice(&body[1..]);
    Ok(payload)
}

fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for &byte in data {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn base32_decode(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in text.bytes() {
        let value = ALPHABET.iter().position(|&a| a == c)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
        }
    }
    // Leftover bits must be zero padding
    if buffer & ((1 << bits) - 1) != 0 {
        return None;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_matches_xmodem_check_value() {
        assert_eq!(crc16_xmodem(b"123456789"), 0x31c3);
    }

    #[test]
    fn zero_account_key_renders_canonically() {
        assert_eq!(
            encode(StrKeyKind::Account, &[0u8; 32]),
            "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF"
        );
    }

    #[test]
    fn contract_ids_decode_back_to_payload() {
        let payload = [0xabu8; 32];
        let id = encode(StrKeyKind::Contract, &payload);
        assert!(id.starts_with('C'));
        assert_eq!(id.len(), STRKEY_LEN);
        assert_eq!(decode(StrKeyKind::Contract, &id).unwrap(), payload);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let id = encode(StrKeyKind::Contract, &[1u8; 32]);
        let mut chars: Vec<char> = id.chars().collect();
        chars[10] = if chars[10] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(decode(StrKeyKind::Contract, &tampered).is_err());
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let account = encode(StrKeyKind::Account, &[2u8; 32]);
        assert!(decode(StrKeyKind::Contract, &account).is_err());
    }
}
