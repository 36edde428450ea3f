//! Byte layouts of the revealed-data region and public-signal indices.
//!
//! These tables mirror the disclosure circuits. A circuit that reorders its
//! public signals or moves a field needs a matching change here.

use crate::AttestationType;

/// Inclusive byte range inside the unpacked revealed-data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered.
    pub const fn width(&self) -> usize {
        self.end - self.start + 1
    }

    /// Slice `bytes`, or `None` if the range runs past the end.
    pub fn slice<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        bytes.get(self.start..=self.end)
    }
}

/// Where each disclosed field lives, and how many bytes each packed
/// signal contributes.
#[derive(Debug, Clone, Copy)]
pub struct ByteLayout {
    pub issuing_state: ByteRange,
    pub name: ByteRange,
    pub id_number: ByteRange,
    /// Absent when the document type has a fixed nationality.
    pub nationality: Option<ByteRange>,
    pub date_of_birth: ByteRange,
    pub gender: ByteRange,
    /// Absent when the document type carries no expiry.
    pub expiry_date: Option<ByteRange>,
    pub older_than: ByteRange,
    pub ofac: ByteRange,
    /// Bytes taken from each consecutive revealed-data signal.
    pub bytes_count: &'static [usize],
}

impl ByteLayout {
    /// Number of public signals holding revealed data.
    pub const fn chunk_count(&self) -> usize {
        self.bytes_count.len()
    }

    /// Total length of the unpacked buffer.
    pub fn total_bytes(&self) -> usize {
        self.bytes_count.iter().sum()
    }
}

pub const PASSPORT_LAYOUT: ByteLayout = ByteLayout {
    issuing_state: ByteRange::new(2, 4),
    name: ByteRange::new(5, 43),
    id_number: ByteRange::new(44, 52),
    nationality: Some(ByteRange::new(54, 56)),
    date_of_birth: ByteRange::new(57, 62),
    gender: ByteRange::new(64, 64),
    expiry_date: Some(ByteRange::new(65, 70)),
    older_than: ByteRange::new(88, 89),
    ofac: ByteRange::new(90, 92),
    bytes_count: &[31, 31, 31],
};

pub const ID_CARD_LAYOUT: ByteLayout = ByteLayout {
    issuing_state: ByteRange::new(2, 4),
    name: ByteRange::new(60, 89),
    id_number: ByteRange::new(5, 13),
    nationality: Some(ByteRange::new(45, 47)),
    date_of_birth: ByteRange::new(30, 35),
    gender: ByteRange::new(37, 37),
    expiry_date: Some(ByteRange::new(38, 43)),
    older_than: ByteRange::new(90, 91),
    ofac: ByteRange::new(92, 93),
    bytes_count: &[31, 31, 31, 1],
};

pub const AADHAAR_LAYOUT: ByteLayout = ByteLayout {
    issuing_state: ByteRange::new(81, 111),
    name: ByteRange::new(9, 70),
    id_number: ByteRange::new(71, 74),
    nationality: None,
    date_of_birth: ByteRange::new(1, 8),
    gender: ByteRange::new(0, 0),
    expiry_date: None,
    older_than: ByteRange::new(118, 118),
    ofac: ByteRange::new(116, 117),
    bytes_count: &[31, 31, 31, 26],
};

/// Positions of named values inside the public-signal vector.
#[derive(Debug, Clone, Copy)]
pub struct SignalIndices {
    pub revealed_data_packed: usize,
    /// First of four packed forbidden-country signals.
    pub forbidden_countries_packed: usize,
    pub nullifier: usize,
    pub attestation_id: usize,
    pub merkle_root: usize,
    pub current_date: usize,
    pub name_dob_smt_root: usize,
    pub name_yob_smt_root: usize,
    pub passport_no_smt_root: Option<usize>,
    pub scope: usize,
    pub user_identifier: usize,
    /// Length of the complete public-signal vector.
    pub signal_count: usize,
}

/// Number of packed forbidden-country signals.
pub const FORBIDDEN_COUNTRIES_SIGNALS: usize = 4;

pub const PASSPORT_INDICES: SignalIndices = SignalIndices {
    revealed_data_packed: 0,
    forbidden_countries_packed: 3,
    nullifier: 7,
    attestation_id: 8,
    merkle_root: 9,
    current_date: 10,
    name_dob_smt_root: 17,
    name_yob_smt_root: 18,
    passport_no_smt_root: Some(16),
    scope: 19,
    user_identifier: 20,
    signal_count: 21,
};

pub const ID_CARD_INDICES: SignalIndices = SignalIndices {
    revealed_data_packed: 0,
    forbidden_countries_packed: 4,
    nullifier: 8,
    attestation_id: 9,
    merkle_root: 10,
    current_date: 11,
    name_dob_smt_root: 17,
    name_yob_smt_root: 18,
    passport_no_smt_root: None,
    scope: 19,
    user_identifier: 20,
    signal_count: 21,
};

pub const AADHAAR_INDICES: SignalIndices = SignalIndices {
    revealed_data_packed: 2,
    forbidden_countries_packed: 6,
    nullifier: 0,
    attestation_id: 10,
    merkle_root: 16,
    current_date: 11,
    name_dob_smt_root: 14,
    name_yob_smt_root: 15,
    passport_no_smt_root: None,
    scope: 17,
    user_identifier: 18,
    signal_count: 19,
};

impl AttestationType {
    pub const fn layout(&self) -> &'static ByteLayout {
        match self {
            AttestationType::Passport => &PASSPORT_LAYOUT,
            AttestationType::BiometricIdCard => &ID_CARD_LAYOUT,
            AttestationType::Aadhaar => &AADHAAR_LAYOUT,
        }
    }

    pub const fn indices(&self) -> &'static SignalIndices {
        match self {
            AttestationType::Passport => &PASSPORT_INDICES,
            AttestationType::BiometricIdCard => &ID_CARD_INDICES,
            AttestationType::Aadhaar => &AADHAAR_INDICES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AttestationType; 3] = [
        AttestationType::Passport,
        AttestationType::BiometricIdCard,
        AttestationType::Aadhaar,
    ];

    #[test]
    fn test_fields_fit_in_buffer() {
        for attestation in ALL {
            let layout = attestation.layout();
            let total = layout.total_bytes();
            let mut ranges = vec![
                layout.issuing_state,
                layout.name,
                layout.id_number,
                layout.date_of_birth,
                layout.gender,
                layout.older_than,
                layout.ofac,
            ];
            ranges.extend(layout.nationality);
            ranges.extend(layout.expiry_date);
            for range in ranges {
                assert!(range.start <= range.end, "{attestation:?} {range:?}");
                assert!(range.end < total, "{attestation:?} {range:?}");
            }
        }
    }

    #[test]
    fn test_chunk_counts() {
        assert_eq!(PASSPORT_LAYOUT.chunk_count(), 3);
        assert_eq!(ID_CARD_LAYOUT.chunk_count(), 4);
        assert_eq!(AADHAAR_LAYOUT.chunk_count(), 4);
        assert_eq!(PASSPORT_LAYOUT.total_bytes(), 93);
        assert_eq!(AADHAAR_LAYOUT.total_bytes(), 119);
    }

    #[test]
    fn test_indices_within_signal_count() {
        for attestation in ALL {
            let idx = attestation.indices();
            let layout = attestation.layout();
            assert!(idx.revealed_data_packed + layout.chunk_count() <= idx.signal_count);
            assert!(idx.forbidden_countries_packed + FORBIDDEN_COUNTRIES_SIGNALS <= idx.signal_count);
            for i in [idx.nullifier, idx.attestation_id, idx.scope, idx.user_identifier] {
                assert!(i < idx.signal_count);
            }
        }
    }

    #[test]
    fn test_byte_range_slice() {
        let bytes = [0u8, 1, 2, 3];
        assert_eq!(ByteRange::new(1, 2).slice(&bytes), Some(&bytes[1..3]));
        assert_eq!(ByteRange::new(3, 4).slice(&bytes), None);
        assert_eq!(ByteRange::new(0, 0).width(), 1);
    }
}
