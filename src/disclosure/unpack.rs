//! Recovers plaintext identity fields from packed public signals.
//!
//! The circuit packs up to 31 ASCII bytes into each field element, least
//! significant byte first. Unpacking reverses that per signal, concatenates
//! the buffers in signal order, and slices fields out using the document's
//! [`ByteLayout`](super::layout::ByteLayout).

use num_bigint::BigUint;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::layout::{ByteRange, FORBIDDEN_COUNTRIES_SIGNALS};
use super::{DisclosureError, PublicSignals};
use crate::AttestationType;

/// Bytes per forbidden-country signal.
const FORBIDDEN_COUNTRIES_BYTES: usize = 31;

/// Number of watch-list flags in every record.
pub const OFAC_FLAGS: usize = 3;

/// Plaintext fields disclosed by one proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisclosureRecord {
    pub nullifier: String,
    /// Four packed signals; see [`unpack_forbidden_countries_list`].
    pub forbidden_countries_list_packed: Vec<String>,
    pub issuing_state: String,
    pub name: String,
    pub id_number: String,
    pub nationality: String,
    pub date_of_birth: String,
    pub gender: String,
    pub expiry_date: String,
    pub minimum_age: String,
    /// `true` where the holder passed the corresponding watch-list check.
    pub ofac: Vec<bool>,
}

impl DisclosureRecord {
    /// Decode the packed forbidden-country list into ISO3 codes.
    pub fn forbidden_countries_list(&self) -> Vec<String> {
        let packed: Vec<BigUint> = self
            .forbidden_countries_list_packed
            .iter()
            .filter_map(|s| BigUint::parse_bytes(s.as_bytes(), 10))
            .collect();
        unpack_forbidden_countries_list(&packed)
    }
}

/// Unpack the revealed-data region into its byte buffer.
pub fn revealed_data_bytes(
    attestation: AttestationType,
    signals: &PublicSignals,
) -> Result<Vec<u8>, DisclosureError> {
    let layout = attestation.layout();
    let start = attestation.indices().revealed_data_packed;
    let packed = signals.range(start, layout.chunk_count())?;

    let mut bytes = Vec::with_capacity(layout.total_bytes());
    for (value, count) in packed.iter().zip(layout.bytes_count) {
        bytes.extend(le_bytes(value, *count));
    }
    Ok(bytes)
}

/// Unpack every disclosed field for `attestation`.
///
/// The vector must hold the whole revealed-data region and the nullifier and
/// forbidden-country signals. A short vector is reported as
/// [`DisclosureError::MissingSignal`], never truncated.
pub fn unpack(
    attestation: AttestationType,
    signals: &PublicSignals,
) -> Result<DisclosureRecord, DisclosureError> {
    let layout = attestation.layout();
    let indices = attestation.indices();
    let bytes = revealed_data_bytes(attestation, signals)?;

    let nullifier = signals.decimal(indices.nullifier)?;
    let forbidden_countries_list_packed = signals
        .range(indices.forbidden_countries_packed, FORBIDDEN_COUNTRIES_SIGNALS)?
        .iter()
        .map(BigUint::to_string)
        .collect();

    let nationality = match layout.nationality {
        Some(range) => text(&bytes, range)?,
        None => "IND".to_string(),
    };
    let expiry_date = match layout.expiry_date {
        Some(range) => text(&bytes, range)?,
        None => "UNAVAILABLE".to_string(),
    };

    let (date_of_birth, minimum_age) = match attestation {
        AttestationType::Aadhaar => {
            let dob: String = field(&bytes, layout.date_of_birth)?
                .iter()
                .map(u8::to_string)
                .collect();
            let age = field(&bytes, layout.older_than)?[0];
            (dob, format!("{age:02}"))
        }
        AttestationType::Passport | AttestationType::BiometricIdCard => (
            text(&bytes, layout.date_of_birth)?,
            text(&bytes, layout.older_than)?,
        ),
    };

    Ok(DisclosureRecord {
        nullifier,
        forbidden_countries_list_packed,
        issuing_state: text(&bytes, layout.issuing_state)?,
        name: clean_name(&text(&bytes, layout.name)?),
        id_number: text(&bytes, layout.id_number)?,
        nationality,
        date_of_birth,
        gender: text(&bytes, layout.gender)?,
        expiry_date,
        minimum_age,
        ofac: ofac_flags(field(&bytes, layout.ofac)?),
    })
}

/// Like [`unpack`], for a raw attestation id. Unknown ids fail before any
/// signal is read.
pub fn unpack_with_id(
    attestation_id: u64,
    signals: &PublicSignals,
) -> Result<DisclosureRecord, DisclosureError> {
    let attestation = AttestationType::try_from(attestation_id)?;
    unpack(attestation, signals)
}

/// Decode packed forbidden-country signals into three-letter codes.
pub fn unpack_forbidden_countries_list(packed: &[BigUint]) -> Vec<String> {
    let chars: Vec<u8> = packed
        .iter()
        .flat_map(|value| le_bytes(value, FORBIDDEN_COUNTRIES_BYTES))
        .filter(|b| *b != 0)
        .collect();
    chars
        .chunks_exact(3)
        .map(|code| String::from_utf8_lossy(code).into_owned())
        .collect()
}

/// Pack a byte buffer into signals, `bytes_count[i]` bytes per signal.
///
/// Inverse of the per-signal unpacking; bytes beyond the buffer are zero.
pub fn pack_revealed_bytes(bytes: &[u8], bytes_count: &[usize]) -> Vec<BigUint> {
    let mut offset = 0;
    bytes_count
        .iter()
        .map(|count| {
            let end = (offset + count).min(bytes.len());
            let chunk = bytes.get(offset.min(end)..end).unwrap_or_default();
            offset += count;
            BigUint::from_bytes_le(chunk)
        })
        .collect()
}

fn le_bytes(value: &BigUint, count: usize) -> Vec<u8> {
    let mut bytes = value.to_bytes_le();
    bytes.resize(count, 0);
    bytes
}

fn field(bytes: &[u8], range: ByteRange) -> Result<&[u8], DisclosureError> {
    range.slice(bytes).ok_or(DisclosureError::MissingSignal {
        index: range.end / 31,
        len: bytes.len().div_ceil(31),
    })
}

/// Decode a byte range, dropping NULs and surrounding whitespace.
fn text(bytes: &[u8], range: ByteRange) -> Result<String, DisclosureError> {
    let raw = String::from_utf8_lossy(field(bytes, range)?).replace('\0', "");
    Ok(raw.trim().to_string())
}

fn filler_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([A-Z])<+([A-Z])").expect("filler pattern is valid"))
}

/// Collapse MRZ `<` filler between letters into spaces and drop the rest.
pub fn clean_name(raw: &str) -> String {
    filler_pattern()
        .replace_all(raw, "$1 $2")
        .replace('<', "")
        .trim()
        .to_string()
}

/// Stored bytes are 1 when the check did not pass, so each flag is inverted.
/// Layouts with two flag bytes get a leading `false`.
fn ofac_flags(raw: &[u8]) -> Vec<bool> {
    let mut flags: Vec<bool> = raw.iter().map(|b| *b == 0).collect();
    if flags.len() < OFAC_FLAGS {
        flags.insert(0, false);
    }
    flags
}
