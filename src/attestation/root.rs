//! AWS Nitro Enclaves root of trust.

use sha2::{Digest, Sha256};
use tracing::debug;
use x509_parser::certificate::X509Certificate;

use super::key::{Curve, EcKey, VerifierKey};
use super::CoseError;

/// AWS Nitro Enclaves root certificate (G1), valid 2019-10-28 to 2049-10-28.
pub const NITRO_ROOT_PEM: &str = "-----BEGIN CERTIFICATE-----
MIICETCCAZagAwIBAgIRAPkxdWgbkK/hHUbMtOTn+FYwCgYIKoZIzj0EAwMwSTEL
MAkGA1UEBhMCVVMxDzANBgNVBAoMBkFtYXpvbjEMMAoGA1UECwwDQVdTMRswGQYD
VQQDDBJhd3Mubml0cm8tZW5jbGF2ZXMwHhcNMTkxMDI4MTMyODA1WhcNNDkxMDI4
MTQyODA1WjBJMQswCQYDVQQGEwJVUzEPMA0GA1UECgwGQW1hem9uMQwwCgYDVQQL
DANBV1MxGzAZBgNVBAMMEmF3cy5uaXRyby1lbmNsYXZlczB2MBAGByqGSM49AgEG
BSuBBAAiA2IABPwCVOumCMHzaHDimtqQvkY4MpJzbolL//Zy2YlES1BR5TSksfbb
48C8WBoyt7F2Bw7eEtaaP+ohG2bnUs990d0JX28TcPQXCEPZ3BABIeTPYwEoCWZE
h8l5YoQwTcU/9KNCMEAwDwYDVR0TAQH/BAUwAwEB/zAdBgNVHQ4EFgQUkCW1DdkF
R+eWw5b6cp3PmanfS5YwDgYDVR0PAQH/BAQDAgGGMAoGCCqGSM49BAMDA2kAMGYC
MQCjfy+Rocm9Xue4YnwWmNJVA44fA0P5W2OpYow9OYCVRaEevL8uO1XYru5xtMPW
rfMCMQCi85sWBbJwKKXdS6BptQFuZbT73o/gBh1qUxl/nNr12UO8Yfwr6wPLb+6N
IwLz3/Y=
-----END CERTIFICATE-----
";

/// SHA-256 fingerprint of the DER-encoded Nitro root.
pub const NITRO_ROOT_SHA256: &str =
    "641a0321a3e244efe456463195d606317ed7cdcc3c1756e09893f3c68f79bb5b";

const ECDSA_WITH_SHA256: &str = "1.2.840.10045.4.3.2";
const ECDSA_WITH_SHA384: &str = "1.2.840.10045.4.3.3";

/// A parsed trust anchor.
#[derive(Debug, Clone)]
pub struct NitroRoot {
    der: Vec<u8>,
    key: VerifierKey,
    subject: String,
}

impl NitroRoot {
    /// The built-in AWS Nitro root.
    pub fn load() -> Result<Self, CoseError> {
        Self::from_pem(NITRO_ROOT_PEM)
    }

    /// Parse a PEM certificate as a trust anchor.
    pub fn from_pem(pem: &str) -> Result<Self, CoseError> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
            .map_err(|e| CoseError::InvalidCertificate(e.to_string()))?;
        if pem.label != "CERTIFICATE" {
            return Err(CoseError::InvalidCertificate(format!(
                "unexpected PEM label {}",
                pem.label
            )));
        }
        Self::from_der(&pem.contents)
    }

    pub fn from_der(der: &[u8]) -> Result<Self, CoseError> {
        let cert = parse_certificate(der)?;
        let key = certificate_key_of(&cert)?;
        Ok(Self {
            der: der.to_vec(),
            key,
            subject: cert.subject().to_string(),
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Lowercase hex SHA-256 of the DER encoding.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }

    pub fn verifier_key(&self) -> &VerifierKey {
        &self.key
    }

    /// Distinguished name, e.g. `C=US, O=Amazon, OU=AWS, CN=aws.nitro-enclaves`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn verify_self_signed(&self) -> Result<(), CoseError> {
        verify_certificate_signature(&self.der, &self.key)
    }

    /// Check that `cert_der` carries a signature made by this root.
    pub fn verify_issued(&self, cert_der: &[u8]) -> Result<(), CoseError> {
        verify_certificate_signature(cert_der, &self.key)
    }
}

fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, CoseError> {
    let (rest, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| CoseError::InvalidCertificate(format!("invalid cert DER: {e}")))?;
    if !rest.is_empty() {
        return Err(CoseError::InvalidCertificate(
            "trailing bytes after certificate".into(),
        ));
    }
    Ok(cert)
}

fn certificate_key_of(cert: &X509Certificate<'_>) -> Result<VerifierKey, CoseError> {
    VerifierKey::from_sec1(&cert.public_key().subject_public_key.data)
}

/// Subject public key of a DER certificate.
pub fn certificate_key(der: &[u8]) -> Result<VerifierKey, CoseError> {
    certificate_key_of(&parse_certificate(der)?)
}

/// Verify the ECDSA signature on `cert_der` with the issuer's key.
pub fn verify_certificate_signature(
    cert_der: &[u8],
    issuer: &VerifierKey,
) -> Result<(), CoseError> {
    let cert = parse_certificate(cert_der)?;
    let issuer_key: EcKey = issuer.ec_key()?;

    let oid = cert.signature_algorithm.algorithm.to_string();
    let expected = match issuer_key.curve() {
        Curve::P256 => ECDSA_WITH_SHA256,
        Curve::P384 => ECDSA_WITH_SHA384,
    };
    if oid != expected {
        return Err(CoseError::InvalidCertificate(format!(
            "signature algorithm {oid} does not match issuer curve {}",
            issuer_key.curve()
        )));
    }

    debug!(subject = %cert.subject(), "verifying certificate signature");
    issuer_key.verify_der(cert.tbs_certificate.as_ref(), &cert.signature_value.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_der() -> Vec<u8> {
        hex::decode(include_str!("../../tests/fixtures/enclave_leaf.hex").trim()).unwrap()
    }

    #[test]
    fn test_root_fingerprint() {
        let root = NitroRoot::load().unwrap();
        assert_eq!(root.fingerprint(), NITRO_ROOT_SHA256);
    }

    #[test]
    fn test_root_is_self_signed_p384() {
        let root = NitroRoot::load().unwrap();
        assert_eq!(root.verifier_key().curve().unwrap(), Curve::P384);
        assert!(root.subject().contains("aws.nitro-enclaves"));
        root.verify_self_signed().unwrap();
    }

    #[test]
    fn test_root_public_point() {
        let root = NitroRoot::load().unwrap();
        let sec1 = root.verifier_key().to_sec1().unwrap();
        assert_eq!(hex::encode(&sec1[..9]), "04fc0254eba608c1f3");
    }

    #[test]
    fn test_root_did_not_issue_foreign_leaf() {
        let root = NitroRoot::load().unwrap();
        assert_eq!(
            root.verify_issued(&leaf_der()),
            Err(CoseError::SignatureVerificationFailed)
        );
    }

    #[test]
    fn test_leaf_self_signature() {
        let der = leaf_der();
        let key = certificate_key(&der).unwrap();
        verify_certificate_signature(&der, &key).unwrap();
    }

    #[test]
    fn test_garbage_certificate() {
        assert!(matches!(
            NitroRoot::from_pem("not a certificate"),
            Err(CoseError::InvalidCertificate(_))
        ));
        assert!(matches!(
            certificate_key(&[0x30, 0x00]),
            Err(CoseError::InvalidCertificate(_))
        ));
    }
}
