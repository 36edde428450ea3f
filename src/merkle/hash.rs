//! Poseidon hash over the BN254 scalar field, compatible with circomlib.
//!
//! Arities 1 through 16 are supported. Parameters for each arity are
//! generated on first use and shared between clones of the same hasher.

use ark_bn254::Fr;
use ark_ff::{BigInteger, Field, PrimeField};
use num_bigint::BigUint;
use std::sync::{Arc, OnceLock};

use super::params::{PoseidonParams, PARTIAL_ROUNDS};

/// Maximum number of inputs accepted by a single Poseidon call.
pub const MAX_INPUTS: usize = 16;

/// Errors raised by hashing and field conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("Poseidon requires at least one input")]
    EmptyInput,

    #[error("Poseidon accepts at most 16 inputs, got {0}")]
    TooManyInputs(usize),

    #[error("Value is not a canonical field element: {0}")]
    NotInField(String),
}

/// Poseidon hasher configured for BN254 scalar field.
#[derive(Clone)]
pub struct PoseidonHasher {
    /// One lazily generated parameter set per arity.
    cache: Arc<Vec<OnceLock<PoseidonParams>>>,
}

impl PoseidonHasher {
    /// Create a new Poseidon hasher. No parameters are generated until used.
    pub fn new() -> Self {
        let cache = (0..MAX_INPUTS).map(|_| OnceLock::new()).collect();
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Hash between 1 and 16 field elements into one.
    pub fn hash(&self, inputs: &[Fr]) -> Result<Fr, HashError> {
        match inputs.len() {
            0 => Err(HashError::EmptyInput),
            n if n > MAX_INPUTS => Err(HashError::TooManyInputs(n)),
            n => Ok(permute(self.params(n), inputs)),
        }
    }

    /// Hash two field elements into one.
    pub fn hash_two(&self, left: &Fr, right: &Fr) -> Fr {
        permute(self.params(2), &[*left, *right])
    }

    /// Hash multiple field elements into one.
    pub fn hash_many(&self, elements: &[Fr]) -> Result<Fr, HashError> {
        self.hash(elements)
    }

    /// Hash small integers, e.g. ASCII codes of a fixed-width string.
    pub fn hash_u64s(&self, values: &[u64]) -> Result<Fr, HashError> {
        let elements: Vec<Fr> = values.iter().map(|v| Fr::from(*v)).collect();
        self.hash(&elements)
    }

    /// Parameters for `arity`, which must lie in `1..=MAX_INPUTS`.
    fn params(&self, arity: usize) -> &PoseidonParams {
        self.cache[arity - 1]
            .get_or_init(|| PoseidonParams::build(arity + 1, PARTIAL_ROUNDS[arity - 1]))
    }
}

impl Default for PoseidonHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PoseidonHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready: Vec<usize> = self
            .cache
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(i, _)| i + 1)
            .collect();
        f.debug_struct("PoseidonHasher")
            .field("ready_arities", &ready)
            .finish()
    }
}

fn permute(params: &PoseidonParams, inputs: &[Fr]) -> Fr {
    let width = params.width;
    let mut state = Vec::with_capacity(width);
    state.push(Fr::from(0u64));
    state.extend_from_slice(inputs);

    for round in 0..params.rounds() {
        let constants = &params.ark[round * width..(round + 1) * width];
        for (x, c) in state.iter_mut().zip(constants) {
            *x += c;
        }

        if params.is_full_round(round) {
            state.iter_mut().for_each(sbox);
        } else {
            sbox(&mut state[0]);
        }

        state = params
            .mds
            .iter()
            .map(|row| row.iter().zip(&state).map(|(m, x)| *m * x).sum())
            .collect();
    }

    state[0]
}

fn sbox(x: &mut Fr) {
    let x2 = x.square();
    *x *= x2.square();
}

/// Convert bytes to a field element.
pub fn bytes_to_field(bytes: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Convert a hex string to a field element.
pub fn hex_to_field(hex_str: &str) -> Result<Fr, hex::FromHexError> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))?;
    Ok(Fr::from_be_bytes_mod_order(&bytes))
}

/// The BN254 scalar field order.
pub fn field_modulus() -> BigUint {
    BigUint::from_bytes_le(&Fr::MODULUS.to_bytes_le())
}

/// Convert an integer to a field element, rejecting values outside the field.
pub fn biguint_to_field(value: &BigUint) -> Result<Fr, HashError> {
    if value >= &field_modulus() {
        return Err(HashError::NotInField(value.to_string()));
    }
    Ok(Fr::from_le_bytes_mod_order(&value.to_bytes_le()))
}

/// Canonical integer representation of a field element.
pub fn field_to_biguint(value: &Fr) -> BigUint {
    BigUint::from_bytes_le(&value.into_bigint().to_bytes_le())
}

/// Parse a decimal string into a field element.
pub fn field_from_decimal(s: &str) -> Result<Fr, HashError> {
    let value = BigUint::parse_bytes(s.trim().as_bytes(), 10)
        .ok_or_else(|| HashError::NotInField(s.to_string()))?;
    biguint_to_field(&value)
}

/// Render a field element as a decimal string ("0" for zero).
pub fn field_to_decimal(value: &Fr) -> String {
    field_to_biguint(value).to_string()
}
