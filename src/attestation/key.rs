//! Elliptic-curve verifier keys and ECDSA over their paired hash.

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384};
use std::fmt;
use std::str::FromStr;

use super::CoseError;

/// Curves accepted for attestation signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    /// NIST P-256, signatures over SHA-256.
    P256,
    /// NIST P-384, signatures over SHA-384.
    P384,
}

impl Curve {
    /// Coordinate and scalar size in bytes.
    pub const fn field_size(&self) -> usize {
        match self {
            Curve::P256 => 32,
            Curve::P384 => 48,
        }
    }

    /// Digest of `message` under the curve's paired hash.
    pub fn digest(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Curve::P256 => Sha256::digest(message).to_vec(),
            Curve::P384 => Sha384::digest(message).to_vec(),
        }
    }
}

impl FromStr for Curve {
    type Err = CoseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "p384" | "p-384" | "secp384r1" => Ok(Curve::P384),
            "p256" | "p-256" | "secp256r1" | "prime256v1" => Ok(Curve::P256),
            _ => Err(CoseError::UnsupportedCurve(name.to_string())),
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::P256 => f.write_str("P-256"),
            Curve::P384 => f.write_str("P-384"),
        }
    }
}

/// Public key as handed over by the attestation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierKey {
    /// Affine x coordinate, hex.
    pub x: String,
    /// Affine y coordinate, hex.
    pub y: String,
    /// Curve name, e.g. `P-384`.
    pub curve: String,
}

impl VerifierKey {
    pub fn new(curve: Curve, x: &[u8], y: &[u8]) -> Self {
        Self {
            x: hex::encode(x),
            y: hex::encode(y),
            curve: curve.to_string(),
        }
    }

    /// Build from an uncompressed SEC1 point (`04 || x || y`).
    pub fn from_sec1(point: &[u8]) -> Result<Self, CoseError> {
        let curve = match point.len() {
            65 => Curve::P256,
            97 => Curve::P384,
            n => return Err(CoseError::InvalidKey(format!("unexpected point length {n}"))),
        };
        if point[0] != 0x04 {
            return Err(CoseError::InvalidKey("point is not uncompressed".into()));
        }
        let size = curve.field_size();
        Ok(Self::new(curve, &point[1..1 + size], &point[1 + size..]))
    }

    pub fn curve(&self) -> Result<Curve, CoseError> {
        self.curve.parse()
    }

    /// Uncompressed SEC1 encoding, coordinates left-padded to the field size.
    pub fn to_sec1(&self) -> Result<Vec<u8>, CoseError> {
        let size = self.curve()?.field_size();
        let mut point = Vec::with_capacity(1 + 2 * size);
        point.push(0x04);
        point.extend(coordinate(&self.x, size)?);
        point.extend(coordinate(&self.y, size)?);
        Ok(point)
    }

    pub(crate) fn ec_key(&self) -> Result<EcKey, CoseError> {
        let point = self.to_sec1()?;
        let invalid = |e: p256::ecdsa::Error| CoseError::InvalidKey(e.to_string());
        match self.curve()? {
            Curve::P256 => p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map(EcKey::P256)
                .map_err(invalid),
            Curve::P384 => p384::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                .map(EcKey::P384)
                .map_err(invalid),
        }
    }
}

fn coordinate(hex_str: &str, size: usize) -> Result<Vec<u8>, CoseError> {
    let hex_str = hex_str.trim_start_matches("0x");
    let padded;
    let even = if hex_str.len() % 2 == 1 {
        padded = format!("0{hex_str}");
        padded.as_str()
    } else {
        hex_str
    };
    let bytes = hex::decode(even).map_err(|e| CoseError::InvalidKey(e.to_string()))?;
    left_pad(&bytes, size)
        .ok_or_else(|| CoseError::InvalidKey(format!("coordinate longer than {size} bytes")))
}

/// Left-pad `bytes` with zeros to `size`, dropping redundant leading zeros.
pub(crate) fn left_pad(bytes: &[u8], size: usize) -> Option<Vec<u8>> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let trimmed = &bytes[first..];
    if trimmed.len() > size {
        return None;
    }
    let mut out = vec![0u8; size - trimmed.len()];
    out.extend_from_slice(trimmed);
    Some(out)
}

/// A parsed verifying key on one of the supported curves.
#[derive(Debug, Clone)]
pub(crate) enum EcKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

impl EcKey {
    pub(crate) fn curve(&self) -> Curve {
        match self {
            EcKey::P256(_) => Curve::P256,
            EcKey::P384(_) => Curve::P384,
        }
    }

    /// Verify a raw `r || s` signature over `message`.
    pub(crate) fn verify_raw(&self, message: &[u8], r: &[u8], s: &[u8]) -> Result<(), CoseError> {
        let size = self.curve().field_size();
        let mut rs = left_pad(r, size).ok_or(CoseError::InvalidSignatureLength(r.len() * 2))?;
        rs.extend(left_pad(s, size).ok_or(CoseError::InvalidSignatureLength(s.len() * 2))?);

        let digest = self.curve().digest(message);
        let verified = match self {
            EcKey::P256(key) => p256::ecdsa::Signature::from_slice(&rs)
                .and_then(|sig| key.verify_prehash(&digest, &sig)),
            EcKey::P384(key) => p384::ecdsa::Signature::from_slice(&rs)
                .and_then(|sig| key.verify_prehash(&digest, &sig)),
        };
        verified.map_err(|_| CoseError::SignatureVerificationFailed)
    }

    /// Verify an ASN.1 DER signature, as found in X.509 certificates.
    pub(crate) fn verify_der(&self, message: &[u8], der: &[u8]) -> Result<(), CoseError> {
        let digest = self.curve().digest(message);
        let verified = match self {
            EcKey::P256(key) => p256::ecdsa::Signature::from_der(der)
                .and_then(|sig| key.verify_prehash(&digest, &sig)),
            EcKey::P384(key) => p384::ecdsa::Signature::from_der(der)
                .and_then(|sig| key.verify_prehash(&digest, &sig)),
        };
        verified.map_err(|_| CoseError::SignatureVerificationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_names() {
        for name in ["p384", "P-384", "secp384r1"] {
            assert_eq!(name.parse::<Curve>().unwrap(), Curve::P384);
        }
        for name in ["P-256", "prime256v1"] {
            assert_eq!(name.parse::<Curve>().unwrap(), Curve::P256);
        }
        assert!(matches!(
            "ed25519".parse::<Curve>(),
            Err(CoseError::UnsupportedCurve(_))
        ));
    }

    #[test]
    fn test_left_pad() {
        assert_eq!(left_pad(&[1, 2], 4), Some(vec![0, 0, 1, 2]));
        assert_eq!(left_pad(&[0, 0, 0, 1, 2], 4), Some(vec![0, 0, 1, 2]));
        assert_eq!(left_pad(&[1, 2, 3], 2), None);
    }

    #[test]
    fn test_sec1_round_trip() {
        let mut point = vec![0x04];
        point.extend([0u8; 47]);
        point.push(1);
        point.extend([2u8; 48]);
        let key = VerifierKey::from_sec1(&point).unwrap();
        assert_eq!(key.curve, "P-384");
        assert_eq!(key.x.len(), 96);
        assert_eq!(key.to_sec1().unwrap(), point);
    }

    #[test]
    fn test_short_hex_coordinates_are_padded() {
        let key = VerifierKey {
            x: "0x1".into(),
            y: "02".into(),
            curve: "P-256".into(),
        };
        let sec1 = key.to_sec1().unwrap();
        assert_eq!(sec1.len(), 65);
        assert_eq!(sec1[32], 1);
        assert_eq!(sec1[64], 2);
    }

    #[test]
    fn test_point_off_curve_rejected() {
        let key = VerifierKey {
            x: "01".into(),
            y: "02".into(),
            curve: "P-384".into(),
        };
        assert!(matches!(key.ec_key(), Err(CoseError::InvalidKey(_))));
    }
}
