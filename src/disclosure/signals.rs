//! The public-signal vector produced alongside a disclosure proof.

use ark_bn254::Fr;
use chrono::NaiveDate;
use num_bigint::BigUint;
use num_traits::ToPrimitive;

use super::DisclosureError;
use crate::merkle::hash::biguint_to_field;
use crate::AttestationType;

/// Ordered, read-only public signals of one proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicSignals(Vec<BigUint>);

impl PublicSignals {
    pub fn new(values: Vec<BigUint>) -> Self {
        Self(values)
    }

    /// Parse signals as snarkjs emits them: decimal strings, or hex with a
    /// `0x` prefix.
    pub fn parse<S: AsRef<str>>(signals: &[S]) -> Result<Self, DisclosureError> {
        signals
            .iter()
            .enumerate()
            .map(|(index, s)| {
                parse_signal(s.as_ref()).ok_or_else(|| DisclosureError::InvalidSignal {
                    index,
                    value: s.as_ref().to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[BigUint] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Result<&BigUint, DisclosureError> {
        self.0.get(index).ok_or(DisclosureError::MissingSignal {
            index,
            len: self.0.len(),
        })
    }

    /// `count` consecutive signals starting at `start`.
    pub fn range(&self, start: usize, count: usize) -> Result<&[BigUint], DisclosureError> {
        self.0
            .get(start..start + count)
            .ok_or(DisclosureError::MissingSignal {
                index: start + count - 1,
                len: self.0.len(),
            })
    }

    pub fn decimal(&self, index: usize) -> Result<String, DisclosureError> {
        self.get(index).map(BigUint::to_string)
    }

    pub fn field(&self, index: usize) -> Result<Fr, DisclosureError> {
        let value = self.get(index)?;
        biguint_to_field(value).map_err(|_| DisclosureError::InvalidSignal {
            index,
            value: value.to_string(),
        })
    }

    fn small(&self, index: usize) -> Result<u32, DisclosureError> {
        let value = self.get(index)?;
        value.to_u32().ok_or_else(|| DisclosureError::InvalidSignal {
            index,
            value: value.to_string(),
        })
    }

    /// The proof's current date.
    ///
    /// Passport and ID card circuits expose six single-digit signals
    /// `Y Y M M D D` in the 2000s; Aadhaar exposes year, month and day as
    /// three signals.
    pub fn current_date(&self, attestation: AttestationType) -> Result<NaiveDate, DisclosureError> {
        let start = attestation.indices().current_date;
        let (year, month, day) = match attestation {
            AttestationType::Aadhaar => {
                let year = self.small(start)?;
                let year = if year < 100 { 2000 + year } else { year };
                (year, self.small(start + 1)?, self.small(start + 2)?)
            }
            AttestationType::Passport | AttestationType::BiometricIdCard => {
                let digits = (0..6)
                    .map(|i| self.small(start + i))
                    .collect::<Result<Vec<_>, _>>()?;
                if digits.iter().any(|d| *d > 9) {
                    return Err(DisclosureError::InvalidDate(format!("{digits:?}")));
                }
                (
                    2000 + digits[0] * 10 + digits[1],
                    digits[2] * 10 + digits[3],
                    digits[4] * 10 + digits[5],
                )
            }
        };
        NaiveDate::from_ymd_opt(year as i32, month, day)
            .ok_or_else(|| DisclosureError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }
}

impl From<Vec<BigUint>> for PublicSignals {
    fn from(values: Vec<BigUint>) -> Self {
        Self(values)
    }
}

fn parse_signal(s: &str) -> Option<BigUint> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return BigUint::parse_bytes(hex.as_bytes(), 16);
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        let signals = PublicSignals::parse(&["255", "0xff", "0XFF", "0"]).unwrap();
        assert_eq!(signals.len(), 4);
        for i in 0..3 {
            assert_eq!(signals.get(i).unwrap(), &BigUint::from(255u32));
        }
        assert_eq!(signals.decimal(3).unwrap(), "0");
    }

    #[test]
    fn test_unprefixed_hex_is_not_decimal() {
        for raw in ["1e3", "ff"] {
            assert!(matches!(
                PublicSignals::parse(&[raw]),
                Err(DisclosureError::InvalidSignal { index: 0, .. })
            ));
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = PublicSignals::parse(&["1", "12z"]).unwrap_err();
        assert_eq!(
            err,
            DisclosureError::InvalidSignal {
                index: 1,
                value: "12z".into()
            }
        );
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let signals = PublicSignals::parse(&["1", "2"]).unwrap();
        assert_eq!(
            signals.get(5),
            Err(DisclosureError::MissingSignal { index: 5, len: 2 })
        );
        assert!(signals.range(1, 2).is_err());
        assert_eq!(signals.range(0, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_current_date_digits() {
        let mut raw = vec!["0"; 21];
        for (i, d) in ["2", "5", "0", "8", "1", "2"].iter().enumerate() {
            raw[10 + i] = *d;
        }
        let signals = PublicSignals::parse(&raw).unwrap();
        assert_eq!(
            signals.current_date(AttestationType::Passport).unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 12).unwrap()
        );
    }

    #[test]
    fn test_current_date_aadhaar() {
        let mut raw = vec!["0"; 19];
        raw[11] = "2025";
        raw[12] = "3";
        raw[13] = "31";
        let signals = PublicSignals::parse(&raw).unwrap();
        assert_eq!(
            signals.current_date(AttestationType::Aadhaar).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );

        raw[12] = "13";
        let signals = PublicSignals::parse(&raw).unwrap();
        assert!(matches!(
            signals.current_date(AttestationType::Aadhaar),
            Err(DisclosureError::InvalidDate(_))
        ));
    }
}
