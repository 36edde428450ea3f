//! Hardware attestation documents.
//!
//! Enclave attestations arrive as COSE_Sign1 envelopes signed with ECDSA.
//! [`cose`] checks the envelope signature against a caller-supplied key,
//! [`document`] reads the AWS Nitro payload, and [`root`] carries the
//! Nitro trust anchor those leaf keys chain up to.

pub mod cose;
pub mod document;
pub mod key;
pub mod root;

pub use cose::{verify, CoseSign1};
pub use document::{verify_embedded, verify_with_root, NitroAttestation};
pub use key::{Curve, VerifierKey};
pub use root::{NitroRoot, NITRO_ROOT_PEM};

/// Errors raised while verifying attestation documents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoseError {
    #[error("Malformed COSE_Sign1 structure: {0}")]
    MalformedCoseStructure(String),

    #[error("Invalid signature length: {0} bytes")]
    InvalidSignatureLength(usize),

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Malformed attestation payload: {0}")]
    MalformedPayload(String),
}
