//! Self Disclosure Core - verify what an identity proof reveals
//!
//! Building blocks for a backend that accepts zero-knowledge identity proofs:
//! - Unpack disclosed passport, ID card and Aadhaar fields from public signals
//! - Derive the scope hash that binds a proof to one application endpoint
//! - Verify COSE_Sign1 attestation documents from AWS Nitro enclaves
//! - Build the sparse Merkle trees behind watch-list non-membership proofs
//!
//! # Architecture
//!
//! 1. A proof arrives with its public signals and an attestation type
//! 2. [`disclosure`] recovers the plaintext fields the holder chose to reveal
//! 3. [`verifier`] checks scope, user context, dates and policy against config
//! 4. [`attestation`] verifies any enclave document bundled with the proof
//! 5. Watch-list roots built by [`watchlist`] are compared to the proof's roots

pub mod attestation;
pub mod config;
pub mod disclosure;
pub mod identifier;
pub mod merkle;
pub mod scope;
pub mod verifier;
pub mod watchlist;

// WASM bindings (only compiled when wasm feature is enabled)
#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export main types
pub use attestation::{CoseError, VerifierKey};
pub use disclosure::{unpack, DisclosureError, DisclosureRecord, PublicSignals};
pub use merkle::{PoseidonHasher, SparseMerkleTree};
pub use scope::{hash_endpoint_with_scope, EncodingError, ScopeHash, ScopeHasher};
pub use verifier::{DisclosureVerifier, VerificationReport, VerifierError};
pub use watchlist::{BuildReport, KeyScheme, WatchlistBuilder};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Document families understood by the disclosure circuits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum AttestationType {
    /// ICAO 9303 e-passport
    Passport = 1,
    /// EU biometric identity card
    BiometricIdCard = 2,
    /// Indian Aadhaar QR credential
    Aadhaar = 3,
}

impl AttestationType {
    pub const ALL: [AttestationType; 3] = [
        AttestationType::Passport,
        AttestationType::BiometricIdCard,
        AttestationType::Aadhaar,
    ];

    pub const fn id(&self) -> u64 {
        *self as u64
    }
}

impl TryFrom<u64> for AttestationType {
    type Error = DisclosureError;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(AttestationType::Passport),
            2 => Ok(AttestationType::BiometricIdCard),
            3 => Ok(AttestationType::Aadhaar),
            other => Err(DisclosureError::InvalidAttestationId(other)),
        }
    }
}

impl From<AttestationType> for u64 {
    fn from(attestation: AttestationType) -> Self {
        attestation.id()
    }
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}
