//! Sparse Merkle tree with Poseidon hashing, compatible with iden3 / zk-kit.
//!
//! Keys address leaves by their bits, least significant first. A subtree
//! holding a single leaf is stored as that leaf, so the depth grows only
//! where keys share a prefix. Empty subtrees hash to zero.
//!
//! - leaf hash: `Poseidon(key, value, 1)`
//! - middle hash: `Poseidon(left, right)`

use ark_bn254::Fr;
use ark_ff::{BigInteger, One, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::hash::{field_from_decimal, field_to_decimal, HashError, PoseidonHasher};

/// A stored node, addressed by its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Middle([Fr; 2]),
    Leaf { key: Fr, value: Fr },
}

/// Proof of membership or non-membership of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtProof {
    pub key: Fr,
    /// Value stored under `key`, when present.
    pub value: Option<Fr>,
    /// Leaf found on the path of an absent key, if any.
    pub matching_entry: Option<(Fr, Fr)>,
    /// Sibling hashes from the root downwards.
    pub siblings: Vec<Fr>,
    pub root: Fr,
    pub membership: bool,
}

/// JSON export: decimal strings, leaves as `[key, value, "1"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeExport {
    pub root: String,
    pub nodes: Vec<(String, Vec<String>)>,
}

/// Serializable tree data for binary snapshots.
#[derive(Serialize, Deserialize)]
struct TreeSnapshot {
    root: [u8; 32],
    nodes: Vec<Vec<[u8; 32]>>,
}

/// Errors that can occur with sparse Merkle tree operations.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Node {0} is missing from the tree")]
    MissingNode(String),

    #[error("Node {0} does not match its contents")]
    InvalidNode(String),

    #[error("Tree path deeper than {0} levels")]
    TooDeep(usize),

    #[error(transparent)]
    Hash(#[from] HashError),
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Result of walking the tree along a key's path.
struct Lookup {
    value: Option<Fr>,
    matching_entry: Option<(Fr, Fr)>,
    siblings: Vec<Fr>,
}

/// Sparse Merkle tree over the BN254 scalar field.
#[derive(Clone, Debug)]
pub struct SparseMerkleTree {
    root: Fr,
    nodes: HashMap<Fr, Node>,
    leaves: usize,
    hasher: PoseidonHasher,
}

impl Default for SparseMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseMerkleTree {
    /// Create an empty tree (root zero).
    pub fn new() -> Self {
        Self::with_hasher(PoseidonHasher::new())
    }

    /// Create an empty tree sharing an existing hasher's parameters.
    pub fn with_hasher(hasher: PoseidonHasher) -> Self {
        Self {
            root: Fr::zero(),
            nodes: HashMap::new(),
            leaves: 0,
            hasher,
        }
    }

    pub fn root(&self) -> Fr {
        self.root
    }

    /// Number of leaves inserted.
    pub fn len(&self) -> usize {
        self.leaves
    }

    pub fn is_empty(&self) -> bool {
        self.leaves == 0
    }

    pub fn hasher(&self) -> &PoseidonHasher {
        &self.hasher
    }

    /// Insert `key -> value`.
    ///
    /// Returns `false` and leaves the tree untouched if `key` is already set.
    pub fn add(&mut self, key: Fr, value: Fr) -> TreeResult<bool> {
        let path = key_path(&key);
        let Lookup {
            value: existing,
            matching_entry,
            mut siblings,
        } = self.lookup(&key, &path)?;

        if existing.is_some() {
            return Ok(false);
        }

        if let Some((other_key, other_value)) = matching_entry {
            let other_path = key_path(&other_key);
            while other_path[siblings.len()] == path[siblings.len()] {
                siblings.push(Fr::zero());
            }
            siblings.push(self.leaf_hash(&other_key, &other_value)?);
        }

        let leaf = self.leaf_hash(&key, &value)?;
        self.nodes.insert(leaf, Node::Leaf { key, value });
        self.root = self.fold_path(&siblings, &path, leaf);
        self.leaves += 1;
        Ok(true)
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &Fr) -> TreeResult<Option<Fr>> {
        Ok(self.lookup(key, &key_path(key))?.value)
    }

    pub fn contains(&self, key: &Fr) -> TreeResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Membership proof if `key` is set, non-membership proof otherwise.
    pub fn create_proof(&self, key: &Fr) -> TreeResult<SmtProof> {
        let lookup = self.lookup(key, &key_path(key))?;
        Ok(SmtProof {
            key: *key,
            membership: lookup.value.is_some(),
            value: lookup.value,
            matching_entry: lookup.matching_entry,
            siblings: lookup.siblings,
            root: self.root,
        })
    }

    /// Check a proof against the root it carries.
    pub fn verify_proof(&self, proof: &SmtProof) -> bool {
        verify_proof(&self.hasher, proof)
    }

    /// Walk from the root towards `key`, collecting siblings.
    fn lookup(&self, key: &Fr, path: &[bool]) -> TreeResult<Lookup> {
        let mut siblings = Vec::new();
        let mut node = self.root;

        while !node.is_zero() {
            match self.node(&node)? {
                Node::Leaf {
                    key: leaf_key,
                    value,
                } => {
                    let (value, matching_entry) = if leaf_key == *key {
                        (Some(value), None)
                    } else {
                        (None, Some((leaf_key, value)))
                    };
                    return Ok(Lookup {
                        value,
                        matching_entry,
                        siblings,
                    });
                }
                Node::Middle(children) => {
                    let Some(bit) = path.get(siblings.len()) else {
                        return Err(TreeError::TooDeep(path.len()));
                    };
                    let direction = usize::from(*bit);
                    siblings.push(children[1 - direction]);
                    node = children[direction];
                }
            }
        }

        Ok(Lookup {
            value: None,
            matching_entry: None,
            siblings,
        })
    }

    fn node(&self, hash: &Fr) -> TreeResult<Node> {
        self.nodes
            .get(hash)
            .copied()
            .ok_or_else(|| TreeError::MissingNode(field_to_decimal(hash)))
    }

    fn leaf_hash(&self, key: &Fr, value: &Fr) -> TreeResult<Fr> {
        Ok(leaf_hash(&self.hasher, key, value)?)
    }

    /// Hash `node` up through `siblings`, storing each new middle node.
    fn fold_path(&mut self, siblings: &[Fr], path: &[bool], node: Fr) -> Fr {
        let mut node = node;
        for (depth, sibling) in siblings.iter().enumerate().rev() {
            let children = if path[depth] {
                [*sibling, node]
            } else {
                [node, *sibling]
            };
            node = self.hasher.hash_two(&children[0], &children[1]);
            self.nodes.insert(node, Node::Middle(children));
        }
        node
    }

    /// Nodes reachable from the root, parents before children.
    fn reachable(&self) -> TreeResult<Vec<(Fr, Node)>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(hash) = stack.pop() {
            if hash.is_zero() {
                continue;
            }
            let node = self.node(&hash)?;
            if let Node::Middle(children) = node {
                stack.push(children[1]);
                stack.push(children[0]);
            }
            out.push((hash, node));
        }
        Ok(out)
    }

    /// Export every reachable node as decimal strings.
    pub fn export(&self) -> TreeResult<TreeExport> {
        let nodes = self
            .reachable()?
            .into_iter()
            .map(|(hash, node)| {
                let contents = match node {
                    Node::Middle(children) => children.iter().map(field_to_decimal).collect(),
                    Node::Leaf { key, value } => vec![
                        field_to_decimal(&key),
                        field_to_decimal(&value),
                        "1".to_string(),
                    ],
                };
                (field_to_decimal(&hash), contents)
            })
            .collect();
        Ok(TreeExport {
            root: field_to_decimal(&self.root),
            nodes,
        })
    }

    pub fn export_json(&self) -> TreeResult<String> {
        serde_json::to_string(&self.export()?)
            .map_err(|e| TreeError::SerializationError(e.to_string()))
    }

    /// Rebuild a tree from an export, re-hashing every node.
    pub fn import(export: &TreeExport) -> TreeResult<Self> {
        let decimal = |s: &String| field_from_decimal(s).map_err(TreeError::from);
        let mut nodes = Vec::with_capacity(export.nodes.len());
        for (hash, contents) in &export.nodes {
            let hash = decimal(hash)?;
            let node = match contents.as_slice() {
                [left, right] => Node::Middle([decimal(left)?, decimal(right)?]),
                [key, value, one] if one == "1" => Node::Leaf {
                    key: decimal(key)?,
                    value: decimal(value)?,
                },
                _ => return Err(TreeError::InvalidNode(field_to_decimal(&hash))),
            };
            nodes.push((hash, node));
        }
        Self::from_nodes(decimal(&export.root)?, nodes, PoseidonHasher::new())
    }

    pub fn import_json(json: &str) -> TreeResult<Self> {
        let export: TreeExport = serde_json::from_str(json)
            .map_err(|e| TreeError::DeserializationError(e.to_string()))?;
        Self::import(&export)
    }

    fn from_nodes(root: Fr, nodes: Vec<(Fr, Node)>, hasher: PoseidonHasher) -> TreeResult<Self> {
        let mut tree = Self::with_hasher(hasher);
        for (hash, node) in nodes {
            let computed = match &node {
                Node::Middle([left, right]) => tree.hasher.hash_two(left, right),
                Node::Leaf { key, value } => tree.leaf_hash(key, value)?,
            };
            if computed != hash {
                return Err(TreeError::InvalidNode(field_to_decimal(&hash)));
            }
            tree.nodes.insert(hash, node);
        }
        tree.root = root;
        tree.leaves = tree
            .reachable()?
            .iter()
            .filter(|(_, node)| matches!(node, Node::Leaf { .. }))
            .count();
        Ok(tree)
    }

    /// Serialize reachable nodes for storage.
    pub fn to_bytes(&self) -> TreeResult<Vec<u8>> {
        let nodes = self
            .reachable()?
            .into_iter()
            .map(|(_, node)| match node {
                Node::Middle(children) => children
                    .iter()
                    .map(field_bytes)
                    .collect::<TreeResult<Vec<[u8; 32]>>>(),
                Node::Leaf { key, value } => [key, value, Fr::one()]
                    .iter()
                    .map(field_bytes)
                    .collect::<TreeResult<Vec<[u8; 32]>>>(),
            })
            .collect::<TreeResult<Vec<_>>>()?;
        let snapshot = TreeSnapshot {
            root: field_bytes(&self.root)?,
            nodes,
        };
        bincode::serialize(&snapshot).map_err(|e| TreeError::SerializationError(e.to_string()))
    }

    /// Deserialize tree from bytes.
    pub fn from_bytes(bytes: &[u8]) -> TreeResult<Self> {
        let snapshot: TreeSnapshot = bincode::deserialize(bytes)
            .map_err(|e| TreeError::DeserializationError(e.to_string()))?;
        let hasher = PoseidonHasher::new();

        let mut nodes = Vec::with_capacity(snapshot.nodes.len());
        for contents in &snapshot.nodes {
            let fields = contents
                .iter()
                .map(bytes_field)
                .collect::<TreeResult<Vec<Fr>>>()?;
            let (hash, node) = match fields.as_slice() {
                [left, right] => (hasher.hash_two(left, right), Node::Middle([*left, *right])),
                [key, value, one] if one.is_one() => (
                    leaf_hash(&hasher, key, value)?,
                    Node::Leaf {
                        key: *key,
                        value: *value,
                    },
                ),
                _ => {
                    return Err(TreeError::DeserializationError(
                        "node with unexpected arity".into(),
                    ))
                }
            };
            nodes.push((hash, node));
        }
        Self::from_nodes(bytes_field(&snapshot.root)?, nodes, hasher)
    }

    /// Save tree to a file.
    pub fn save_to_file(&self, path: &std::path::Path) -> TreeResult<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load tree from a file.
    pub fn load_from_file(path: &std::path::Path) -> TreeResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// Key bits, least significant first.
fn key_path(key: &Fr) -> Vec<bool> {
    key.into_bigint().to_bits_le()
}

fn shares_prefix(a: &Fr, b: &Fr, depth: usize) -> bool {
    let (a, b) = (key_path(a), key_path(b));
    depth <= a.len() && a[..depth] == b[..depth]
}

fn leaf_hash(hasher: &PoseidonHasher, key: &Fr, value: &Fr) -> Result<Fr, HashError> {
    hasher.hash(&[*key, *value, Fr::one()])
}

fn field_bytes(value: &Fr) -> TreeResult<[u8; 32]> {
    let mut bytes = [0u8; 32];
    value
        .serialize_compressed(&mut bytes[..])
        .map_err(|e| TreeError::SerializationError(e.to_string()))?;
    Ok(bytes)
}

fn bytes_field(bytes: &[u8; 32]) -> TreeResult<Fr> {
    Fr::deserialize_compressed(&bytes[..])
        .map_err(|e| TreeError::DeserializationError(e.to_string()))
}

/// Recompute the root a proof commits to and compare.
pub fn verify_proof(hasher: &PoseidonHasher, proof: &SmtProof) -> bool {
    let (path_key, node) = match (proof.value, proof.matching_entry) {
        (Some(value), None) => (proof.key, leaf_hash(hasher, &proof.key, &value)),
        (None, Some((key, value))) => {
            // The other leaf must sit where the queried key's path ends.
            let depth = proof.siblings.len();
            if key == proof.key || !shares_prefix(&key, &proof.key, depth) {
                return false;
            }
            (key, leaf_hash(hasher, &key, &value))
        }
        (None, None) => (proof.key, Ok(Fr::zero())),
        (Some(_), Some(_)) => return false,
    };
    let Ok(mut node) = node else {
        return false;
    };
    if proof.membership != proof.value.is_some() {
        return false;
    }

    let path = key_path(&path_key);
    if proof.siblings.len() > path.len() {
        return false;
    }
    for (depth, sibling) in proof.siblings.iter().enumerate().rev() {
        node = if path[depth] {
            hasher.hash_two(sibling, &node)
        } else {
            hasher.hash_two(&node, sibling)
        };
    }
    node == proof.root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fr(n: u64) -> Fr {
        Fr::from(n)
    }

    fn tree_with(keys: &[u64]) -> SparseMerkleTree {
        let mut tree = SparseMerkleTree::new();
        for key in keys {
            assert!(tree.add(fr(*key), fr(1)).unwrap());
        }
        tree
    }

    #[test]
    fn test_empty_tree() {
        let tree = SparseMerkleTree::new();
        assert_eq!(tree.root(), Fr::zero());
        assert!(tree.is_empty());
        assert_eq!(tree.get(&fr(5)).unwrap(), None);
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tree = tree_with(&[5]);
        let expected = tree.hasher().hash(&[fr(5), fr(1), Fr::one()]).unwrap();
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_two_leaves_split_on_first_differing_bit() {
        // 1 = 0b01, 3 = 0b11: bit 0 equal, bit 1 differs.
        let tree = tree_with(&[1, 3]);
        let h = tree.hasher();
        let leaf1 = h.hash(&[fr(1), fr(1), Fr::one()]).unwrap();
        let leaf3 = h.hash(&[fr(3), fr(1), Fr::one()]).unwrap();
        let inner = h.hash_two(&leaf1, &leaf3);
        let expected = h.hash_two(&Fr::zero(), &inner);
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a = tree_with(&[7, 1, 12, 300, 42]);
        let b = tree_with(&[300, 12, 42, 7, 1]);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_duplicate_add_is_ignored() {
        let mut tree = tree_with(&[9, 10]);
        let root = tree.root();
        assert!(!tree.add(fr(9), fr(1)).unwrap());
        assert_eq!(tree.root(), root);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_get_and_contains() {
        let mut tree = SparseMerkleTree::new();
        tree.add(fr(4), fr(77)).unwrap();
        tree.add(fr(8), fr(1)).unwrap();
        assert_eq!(tree.get(&fr(4)).unwrap(), Some(fr(77)));
        assert!(tree.contains(&fr(8)).unwrap());
        assert!(!tree.contains(&fr(16)).unwrap());
    }

    #[test]
    fn test_membership_proofs() {
        let keys = [3, 5, 6, 1024, 99999];
        let tree = tree_with(&keys);
        for key in keys {
            let proof = tree.create_proof(&fr(key)).unwrap();
            assert!(proof.membership);
            assert!(tree.verify_proof(&proof));
        }
    }

    #[test]
    fn test_non_membership_proofs() {
        let tree = tree_with(&[3, 5, 6, 1024]);
        for key in [0, 2, 7, 11, 2048] {
            let proof = tree.create_proof(&fr(key)).unwrap();
            assert!(!proof.membership);
            assert!(tree.verify_proof(&proof), "key {key}");
        }

        let empty = SparseMerkleTree::new();
        assert!(empty.verify_proof(&empty.create_proof(&fr(1)).unwrap()));
    }

    #[test]
    fn test_tampered_proof_fails() {
        let tree = tree_with(&[3, 5, 6]);
        let mut proof = tree.create_proof(&fr(5)).unwrap();
        proof.value = Some(fr(2));
        assert!(!tree.verify_proof(&proof));

        let mut proof = tree.create_proof(&fr(5)).unwrap();
        proof.membership = false;
        assert!(!tree.verify_proof(&proof));

        let mut proof = tree.create_proof(&fr(7)).unwrap();
        proof.root = fr(1);
        assert!(!tree.verify_proof(&proof));
    }

    #[test]
    fn test_non_membership_rejects_leaf_off_path() {
        // 1 = 0b01 and 2 = 0b10 split at bit 0; the leaf of 2 is not on 1's path.
        let tree = tree_with(&[1, 2]);
        let honest = tree.create_proof(&fr(2)).unwrap();
        let forged = SmtProof {
            key: fr(1),
            value: None,
            matching_entry: Some((fr(2), fr(1))),
            siblings: honest.siblings,
            root: tree.root(),
            membership: false,
        };
        assert!(!tree.verify_proof(&forged));
        assert!(tree.verify_proof(&tree.create_proof(&fr(1)).unwrap()));
    }

    #[test]
    fn test_lookup_rejects_overly_deep_import() {
        let hasher = PoseidonHasher::new();
        let leaf = leaf_hash(&hasher, &fr(0), &fr(1)).unwrap();
        let mut nodes = vec![(
            field_to_decimal(&leaf),
            vec!["0".to_string(), "1".to_string(), "1".to_string()],
        )];
        let mut node = leaf;
        for _ in 0..300 {
            let parent = hasher.hash_two(&node, &Fr::zero());
            nodes.push((
                field_to_decimal(&parent),
                vec![field_to_decimal(&node), "0".to_string()],
            ));
            node = parent;
        }
        nodes.reverse();
        let export = TreeExport {
            root: field_to_decimal(&node),
            nodes,
        };

        let tree = SparseMerkleTree::import(&export).unwrap();
        assert!(matches!(tree.get(&fr(0)), Err(TreeError::TooDeep(256))));
        assert!(matches!(tree.create_proof(&fr(0)), Err(TreeError::TooDeep(_))));
    }

    #[test]
    fn test_json_export_import() {
        let tree = tree_with(&[3, 5, 6, 1024]);
        let json = tree.export_json().unwrap();
        let restored = SparseMerkleTree::import_json(&json).unwrap();

        assert_eq!(restored.root(), tree.root());
        assert_eq!(restored.len(), 4);
        assert!(restored.contains(&fr(1024)).unwrap());
    }

    #[test]
    fn test_import_rejects_forged_node() {
        let tree = tree_with(&[3, 5]);
        let mut export = tree.export().unwrap();
        let last = export.nodes.len() - 1;
        export.nodes[last].1[1] = "2".to_string();
        assert!(matches!(
            SparseMerkleTree::import(&export),
            Err(TreeError::InvalidNode(_))
        ));
    }

    #[test]
    fn test_serialization() {
        let tree = tree_with(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let bytes = tree.to_bytes().unwrap();
        let restored = SparseMerkleTree::from_bytes(&bytes).unwrap();

        assert_eq!(restored.root(), tree.root());
        assert_eq!(restored.len(), tree.len());
        let proof = restored.create_proof(&fr(6)).unwrap();
        assert!(restored.verify_proof(&proof));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.bin");
        let tree = tree_with(&[10, 20, 30]);
        tree.save_to_file(&path).unwrap();

        let loaded = SparseMerkleTree::load_from_file(&path).unwrap();
        assert_eq!(loaded.root(), tree.root());
    }

    #[test]
    fn test_empty_export_round_trip() {
        let tree = SparseMerkleTree::new();
        let restored = SparseMerkleTree::import_json(&tree.export_json().unwrap()).unwrap();
        assert_eq!(restored.root(), Fr::zero());
        assert!(restored.is_empty());
    }
}
