//! Decoding of disclosure-circuit public signals.

pub mod layout;
pub mod signals;
pub mod unpack;

pub use layout::{ByteLayout, ByteRange, SignalIndices};
pub use signals::PublicSignals;
pub use unpack::{
    pack_revealed_bytes, revealed_data_bytes, unpack, unpack_forbidden_countries_list,
    unpack_with_id, DisclosureRecord,
};

/// Errors raised while reading public signals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisclosureError {
    #[error("Invalid attestation id: {0}")]
    InvalidAttestationId(u64),

    #[error("Public signal {index} is missing (vector has {len} entries)")]
    MissingSignal { index: usize, len: usize },

    #[error("Public signal {index} is not an integer: {value:?}")]
    InvalidSignal { index: usize, value: String },

    #[error("Public signals encode an invalid date: {0}")]
    InvalidDate(String),
}
