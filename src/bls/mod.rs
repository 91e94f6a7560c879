//! BLS point codec and signature aggregation

pub mod aggregate;
pub mod codec;

pub use aggregate::{AggregateSignature, PartialSigner, SignatureAggregator, SigningRound};
pub use codec::{
    decode_point, decode_point_hex, encode_field_element, encode_point, CurvePoint, FieldElement,
    Fp2, FIELD_ELEMENT_BYTES, POINT_BYTES,
};
