//! Poseidon parameters for the BN254 scalar field.
//!
//! Round constants and the MDS matrix come from the Grain LFSR in
//! `ark-crypto-primitives` (field = prime, S-box = x^5, n = 254 bits). With
//! circomlib's round counts the output matches the tables circuits use.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::find_poseidon_ark_and_mds;

/// Number of full rounds, split evenly before and after the partial rounds.
pub const FULL_ROUNDS: usize = 8;

/// S-box exponent.
pub const ALPHA: u64 = 5;

/// Smallest supported state width (one input plus capacity).
pub const MIN_WIDTH: usize = 2;

/// Largest supported state width (sixteen inputs plus capacity).
pub const MAX_WIDTH: usize = 17;

/// Partial rounds indexed by `width - 2`, which is also `arity - 1`.
pub(crate) const PARTIAL_ROUNDS: [usize; 16] = [
    56, 57, 56, 60, 60, 63, 64, 63, 60, 66, 60, 65, 70, 60, 64, 68,
];

/// Bit length of the field modulus.
const FIELD_BITS: u64 = 254;

/// Number of partial rounds for a given state width.
pub fn partial_rounds(width: usize) -> Option<usize> {
    if !(MIN_WIDTH..=MAX_WIDTH).contains(&width) {
        return None;
    }
    Some(PARTIAL_ROUNDS[width - MIN_WIDTH])
}

/// Round constants and MDS matrix for one state width.
#[derive(Clone, Debug)]
pub struct PoseidonParams {
    pub width: usize,
    pub full_rounds: usize,
    pub partial_rounds: usize,
    /// Flattened round constants, `width` entries per round.
    pub ark: Vec<Fr>,
    /// Applied as `state'[i] = sum_j mds[i][j] * state[j]`.
    pub mds: Vec<Vec<Fr>>,
}

impl PoseidonParams {
    /// Generate parameters for `width`, or `None` if the width is unsupported.
    pub fn generate(width: usize) -> Option<Self> {
        partial_rounds(width).map(|rounds| Self::build(width, rounds))
    }

    pub(crate) fn build(width: usize, partial_rounds: usize) -> Self {
        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            FIELD_BITS,
            width - 1,
            FULL_ROUNDS as u64,
            partial_rounds as u64,
            0,
        );
        Self {
            width,
            full_rounds: FULL_ROUNDS,
            partial_rounds,
            ark: ark.into_iter().flatten().collect(),
            mds,
        }
    }

    /// Total number of rounds.
    pub fn rounds(&self) -> usize {
        self.full_rounds + self.partial_rounds
    }

    /// Whether round `r` applies the S-box to the whole state.
    pub fn is_full_round(&self, r: usize) -> bool {
        let half = self.full_rounds / 2;
        r < half || r >= half + self.partial_rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::MontFp;

    #[test]
    fn test_unsupported_widths() {
        assert!(PoseidonParams::generate(1).is_none());
        assert!(PoseidonParams::generate(18).is_none());
        assert_eq!(partial_rounds(3), Some(57));
        assert_eq!(partial_rounds(17), Some(68));
    }

    #[test]
    fn test_shape() {
        let params = PoseidonParams::generate(3).unwrap();
        assert_eq!(params.rounds(), 65);
        assert_eq!(params.ark.len(), 65 * 3);
        assert_eq!(params.mds.len(), 3);
        assert!(params.mds.iter().all(|row| row.len() == 3));
        assert!(params.is_full_round(0));
        assert!(!params.is_full_round(4));
        assert!(params.is_full_round(61));
    }

    #[test]
    fn test_first_round_constant_matches_circomlib() {
        let params = PoseidonParams::generate(3).unwrap();
        let expected: Fr = MontFp!(
            "6745197990210204598374042828761989596302876299545964402857411729872131034734"
        );
        assert_eq!(params.ark[0], expected);
    }

    #[test]
    fn test_mds_matches_circomlib() {
        let params = PoseidonParams::generate(3).unwrap();
        let expected: Fr = MontFp!(
            "7511745149465107256748700652201246547602992235352608707588321460060273774987"
        );
        assert_eq!(params.mds[0][0], expected);
    }

    #[test]
    fn test_widest_shape() {
        let params = PoseidonParams::generate(MAX_WIDTH).unwrap();
        assert_eq!(params.ark.len(), (8 + 68) * 17);
        assert_eq!(params.mds.len(), 17);
        assert!(params.mds.iter().all(|row| row.len() == 17));
    }
}
