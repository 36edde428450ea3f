pub mod hash;
pub mod params;
pub mod tree;

pub use hash::{HashError, PoseidonHasher};
pub use tree::{SmtProof, SparseMerkleTree, TreeError};
