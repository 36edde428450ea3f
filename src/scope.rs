//! String encoding into field elements and scope-bound endpoint hashing.
//!
//! Short ASCII strings are packed big-endian into a single integer of at
//! most 31 bytes. Endpoints longer than one element are split into 31-byte
//! chunks and folded with a variadic Poseidon before being mixed with the
//! application scope.

use ark_bn254::Fr;
use num_bigint::BigUint;
use num_traits::Zero;
use std::fmt;

use crate::merkle::hash::{biguint_to_field, field_to_decimal, HashError, PoseidonHasher};

/// Bytes per packed field element.
pub const CHUNK_BYTES: usize = 31;

/// Maximum number of endpoint chunks the disclosure circuit accepts.
pub const MAX_ENDPOINT_CHUNKS: usize = 16;

/// Errors raised while encoding strings into field elements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("Input contains a non-ASCII character: {0:?}")]
    NonAsciiInput(String),

    #[error("Encoded value exceeds 31 bytes ({bits} bits)")]
    ValueTooLarge { bits: u64 },

    #[error("Endpoint needs {chunks} chunks, at most {max} are allowed")]
    EndpointTooLong { chunks: usize, max: usize },

    #[error("Endpoint is empty after formatting")]
    EmptyEndpoint,

    #[error("Hash error: {0}")]
    Hash(#[from] HashError),
}

/// Encode an ASCII string as a big-endian integer of at most 31 bytes.
pub fn string_to_bigint(s: &str) -> Result<BigUint, EncodingError> {
    if !s.is_ascii() {
        return Err(EncodingError::NonAsciiInput(s.to_string()));
    }
    let value = BigUint::from_bytes_be(s.as_bytes());
    let bits = value.bits();
    if bits > (CHUNK_BYTES * 8) as u64 {
        return Err(EncodingError::ValueTooLarge { bits });
    }
    Ok(value)
}

/// Inverse of [`string_to_bigint`]. Zero decodes to the empty string.
pub fn bigint_to_string(value: &BigUint) -> String {
    if value.is_zero() {
        return String::new();
    }
    value.to_bytes_be().into_iter().map(char::from).collect()
}

/// Strip an `http://` or `https://` scheme and everything from the first `/`.
///
/// Inputs without a scheme, such as contract addresses, come back unchanged
/// unless they contain a `/`.
pub fn format_endpoint(endpoint: &str) -> String {
    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint);
    rest.split('/').next().unwrap_or_default().to_string()
}

/// A scope-bound endpoint commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeHash(pub Fr);

impl ScopeHash {
    pub fn as_field(&self) -> &Fr {
        &self.0
    }

    /// Decimal representation, as embedded in public signals.
    pub fn to_decimal(&self) -> String {
        field_to_decimal(&self.0)
    }
}

impl fmt::Display for ScopeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

/// Derives scope hashes. Cheap to clone; Poseidon parameters are shared.
#[derive(Debug, Clone, Default)]
pub struct ScopeHasher {
    hasher: PoseidonHasher,
}

impl ScopeHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hasher(hasher: PoseidonHasher) -> Self {
        Self { hasher }
    }

    /// Encode `s` and lift it into the field.
    pub fn encode(&self, s: &str) -> Result<Fr, EncodingError> {
        Ok(biguint_to_field(&string_to_bigint(s)?)?)
    }

    /// Fold an already formatted endpoint into a single field element.
    pub fn hash_endpoint(&self, formatted: &str) -> Result<Fr, EncodingError> {
        if formatted.is_empty() {
            return Err(EncodingError::EmptyEndpoint);
        }
        if !formatted.is_ascii() {
            return Err(EncodingError::NonAsciiInput(formatted.to_string()));
        }

        let chunks = formatted.len().div_ceil(CHUNK_BYTES);
        if chunks > MAX_ENDPOINT_CHUNKS {
            return Err(EncodingError::EndpointTooLong {
                chunks,
                max: MAX_ENDPOINT_CHUNKS,
            });
        }

        let encoded = formatted
            .as_bytes()
            .chunks(CHUNK_BYTES)
            .map(|chunk| biguint_to_field(&BigUint::from_bytes_be(chunk)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.hasher.hash(&encoded)?)
    }

    /// Bind an endpoint to an application scope.
    pub fn hash_endpoint_with_scope(
        &self,
        endpoint: &str,
        scope: &str,
    ) -> Result<ScopeHash, EncodingError> {
        let endpoint_hash = self.hash_endpoint(&format_endpoint(endpoint))?;
        let scope_value = self.encode(scope)?;
        Ok(ScopeHash(self.hasher.hash_two(&endpoint_hash, &scope_value)))
    }
}

/// Convenience wrapper around [`ScopeHasher::hash_endpoint_with_scope`].
pub fn hash_endpoint_with_scope(endpoint: &str, scope: &str) -> Result<ScopeHash, EncodingError> {
    ScopeHasher::new().hash_endpoint_with_scope(endpoint, scope)
}
