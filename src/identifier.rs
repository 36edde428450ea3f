//! User context binding.
//!
//! The proof commits to `RIPEMD-160(SHA-256(user_context_data))`, where the
//! context data is `config_id (32 bytes) || user_identifier (32 bytes) ||
//! user_defined_data`. The verifier recomputes the hash from the hex the
//! caller received alongside the proof.

use num_bigint::BigUint;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Hex characters taken by the config id and user identifier together.
pub const USER_CONTEXT_HEADER_HEX: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Invalid hex string in user context data: {0}")]
    InvalidHex(String),

    #[error("User context data too short: {0} hex characters, need at least 128")]
    TooShort(usize),

    #[error("Unknown user identifier type: {0}")]
    UnknownIdType(String),
}

/// How the 32-byte user identifier is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserIdType {
    /// `0x` followed by at least 40 hex digits, like an EVM address.
    #[default]
    Hex,
    /// `8-4-4-4-12` hex groups.
    Uuid,
}

impl UserIdType {
    pub fn cast(&self, value: &BigUint) -> String {
        match self {
            UserIdType::Hex => cast_to_address(value),
            UserIdType::Uuid => cast_to_uuid(value),
        }
    }
}

impl FromStr for UserIdType {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(UserIdType::Hex),
            "uuid" => Ok(UserIdType::Uuid),
            _ => Err(IdentifierError::UnknownIdType(s.to_string())),
        }
    }
}

impl fmt::Display for UserIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserIdType::Hex => f.write_str("hex"),
            UserIdType::Uuid => f.write_str("uuid"),
        }
    }
}

/// `RIPEMD-160(SHA-256(data))` as an integer.
pub fn user_context_hash(data: &[u8]) -> BigUint {
    let sha = Sha256::digest(data);
    BigUint::from_bytes_be(&Ripemd160::digest(sha))
}

/// Same as [`user_context_hash`], taking hex input (optional `0x`).
pub fn user_context_hash_hex(hex_data: &str) -> Result<BigUint, IdentifierError> {
    let bytes = hex::decode(hex_data.trim_start_matches("0x"))
        .map_err(|e| IdentifierError::InvalidHex(e.to_string()))?;
    Ok(user_context_hash(&bytes))
}

/// `0x` + hex, zero-padded to 40 digits.
pub fn cast_to_address(value: &BigUint) -> String {
    format!("0x{:0>40}", value.to_str_radix(16))
}

/// Hex zero-padded to 32 digits, grouped `8-4-4-4-12`.
pub fn cast_to_uuid(value: &BigUint) -> String {
    let hex = format!("{:0>32}", value.to_str_radix(16));
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// The pieces of a user context data hex string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContextData {
    /// First 32 bytes, hex.
    pub config_id: String,
    /// Second 32 bytes, rendered per [`UserIdType`].
    pub user_identifier: String,
    /// Remaining hex, untouched.
    pub user_defined_data: String,
}

impl UserContextData {
    pub fn parse(hex_data: &str, id_type: UserIdType) -> Result<Self, IdentifierError> {
        let hex_data = hex_data.trim_start_matches("0x");
        if !hex_data.is_ascii() {
            return Err(IdentifierError::InvalidHex("non-ASCII input".into()));
        }
        if hex_data.len() < USER_CONTEXT_HEADER_HEX {
            return Err(IdentifierError::TooShort(hex_data.len()));
        }

        let identifier_hex = &hex_data[64..USER_CONTEXT_HEADER_HEX];
        let identifier = BigUint::parse_bytes(identifier_hex.as_bytes(), 16)
            .ok_or_else(|| IdentifierError::InvalidHex(identifier_hex.to_string()))?;

        Ok(Self {
            config_id: hex_data[..64].to_string(),
            user_identifier: id_type.cast(&identifier),
            user_defined_data: hex_data[USER_CONTEXT_HEADER_HEX..].to_string(),
        })
    }
}
