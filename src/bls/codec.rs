//! Fixed-width encoding of G2 curve points
//!
//! A point is four 48-byte big-endian field elements laid out as
//! `x.c1 ‖ x.c0 ‖ y.c1 ‖ y.c0`, 192 bytes in total. Encoding never
//! shortens an element, zero included.

use crate::{Error, Result};
use std::fmt;

/// Width of one serialized field element
pub const FIELD_ELEMENT_BYTES: usize = 48;

/// Width of one serialized curve point (partial or aggregate signature)
pub const POINT_BYTES: usize = 4 * FIELD_ELEMENT_BYTES;

/// BLS12-381 base field prime, big-endian
pub const FIELD_MODULUS: [u8; FIELD_ELEMENT_BYTES] = [
    0x1a, 0x01, 0x11, 0xea, 0x39, 0x7f, 0xe6, 0x9a, 0x4b, 0x1b, 0xa7, 0xb6, 0x43, 0x4b, 0xac, 0xd7,
    0x64, 0x77, 0x4b, 0x84, 0xf3, 0x85, 0x12, 0xbf, 0x67, 0x30, 0xd2, 0xa0, 0xf6, 0xb0, 0xf6, 0x24,
    0x1e, 0xab, 0xff, 0xfe, 0xb1, 0x53, 0xff, 0xff, 0xb9, 0xfe, 0xff, 0xff, 0xff, 0xff, 0xaa, 0xab,
];

/// Unsigned integer below the base field prime, held big-endian
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldElement([u8; FIELD_ELEMENT_BYTES]);

impl FieldElement {
    pub const ZERO: FieldElement = FieldElement([0u8; FIELD_ELEMENT_BYTES]);

    /// Build from a big-endian magnitude of any length, left-padding with zeros.
    ///
    /// Fails with `Range` when the significant bytes do not fit in 48 bytes
    /// or the value is not below the field prime.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self> {
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let significant = &bytes[first..];
        if significant.len() > FIELD_ELEMENT_BYTES {
            return Err(Error::Range(format!(
                "field element needs {} bytes, limit is {}",
                significant.len(),
                FIELD_ELEMENT_BYTES
            )));
        }
        let mut out = [0u8; FIELD_ELEMENT_BYTES];
        out[FIELD_ELEMENT_BYTES - significant.len()..].copy_from_slice(significant);
        Self::from_bytes(out)
    }

    /// Accept a full-width big-endian value below the field prime
    pub fn from_bytes(bytes: [u8; FIELD_ELEMENT_BYTES]) -> Result<Self> {
        // Equal-width big-endian arrays order like the integers they hold
        if bytes >= FIELD_MODULUS {
            return Err(Error::Range(format!(
                "field element 0x{} is not below the field prime",
                hex::encode(bytes)
            )));
        }
        Ok(Self(bytes))
    }

    pub fn from_u128(value: u128) -> Self {
        let mut out = [0u8; FIELD_ELEMENT_BYTES];
        out[FIELD_ELEMENT_BYTES - 16..].copy_from_slice(&value.to_be_bytes());
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; FIELD_ELEMENT_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement(0x{})", hex::encode(self.0))
    }
}

/// Quadratic extension element `c0 + c1·u`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fp2 {
    pub c0: FieldElement,
    pub c1: FieldElement,
}

/// Affine point on the signature group's curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurvePoint {
    pub x: Fp2,
    pub y: Fp2,
}

/// Encode a big-endian integer as exactly 48 bytes
pub fn encode_field_element(be_bytes: &[u8]) -> Result<[u8; FIELD_ELEMENT_BYTES]> {
    FieldElement::from_be_slice(be_bytes).map(|fe| fe.0)
}

/// Serialize a point to its 192-byte wire form
pub fn encode_point(point: &CurvePoint) -> [u8; POINT_BYTES] {
    let mut out = [0u8; POINT_BYTES];
    let parts = [point.x.c1, point.x.c0, point.y.c1, point.y.c0];
    for (chunk, element) in out.chunks_exact_mut(FIELD_ELEMENT_BYTES).zip(parts.iter()) {
        chunk.copy_from_slice(element.as_bytes());
    }
    out
}

/// Parse a 192-byte wire point
pub fn decode_point(buf: &[u8]) -> Result<CurvePoint> {
    if buf.len() != POINT_BYTES {
        return Err(Error::Format(format!(
            "invalid point length: expected {} bytes, got {}",
            POINT_BYTES,
            buf.len()
        )));
    }

    let element = |i: usize| {
        let mut bytes = [0u8; FIELD_ELEMENT_BYTES];
        bytes.copy_from_slice(&buf[i * FIELD_ELEMENT_BYTES..(i + 1) * FIELD_ELEMENT_BYTES]);
        FieldElement::from_bytes(bytes)
    };

    Ok(CurvePoint {
        x: Fp2 {
            c0: element(1)?,
            c1: element(0)?,
        },
        y: Fp2 {
            c0: element(3)?,
            c1: element(2)?,
        },
    })
}

/// Parse a hex-encoded wire point, with or without `0x`
pub fn decode_point_hex(input: &str) -> Result<CurvePoint> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes =
        hex::decode(trimmed).map_err(|e| Error::Format(format!("invalid point hex: {}", e)))?;
    decode_point(&bytes)
}
