//! Merkle Tree Module
//!
//! Builds binary Merkle trees over an ordered set of leaves, generates inclusion
//! proofs, and verifies them. The layout matches the destination light client:
//!
//! - every leaf preimage is hashed individually before it enters the tree
//! - the leaf level is padded with zero hashes up to the next power of two
//! - a parent is `hash(left || right)` with no sorting of the pair
//!
//! Leaf order is authoritative. Proofs produced from a tree whose leaves were
//! reordered will not verify against the root stored on the destination chain.

use ethereum_types::H256;

use crate::crypto::keccak256;
use crate::error::{RelayError, Result};

// ============================================================================
// HASH CAPABILITY
// ============================================================================

/// Hash function used for leaves and branch nodes.
pub trait Hasher {
    /// Hashes `data` into a 32-byte digest.
    fn hash(&self, data: &[u8]) -> H256;
}

/// Keccak-256, the destination chain's native hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256Hasher;

impl Hasher for Keccak256Hasher {
    fn hash(&self, data: &[u8]) -> H256 {
        keccak256(data)
    }
}

// ============================================================================
// TREE AND PROOF STRUCTURES
// ============================================================================

/// Inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Position of the proved leaf in the original leaf sequence
    pub index: usize,
    /// Sibling hashes from the leaf level up to (not including) the root
    pub hashes: Vec<H256>,
}

/// Binary Merkle tree stored as a heap-ordered node array.
///
/// `nodes[1]` is the root, `nodes[2i]` and `nodes[2i + 1]` are the children of
/// `nodes[i]`, and the leaf level starts at `nodes[width]`.
#[derive(Debug, Clone)]
pub struct MerkleTree<H = Keccak256Hasher> {
    hasher: H,
    leaves: Vec<Vec<u8>>,
    nodes: Vec<H256>,
    width: usize,
}

impl MerkleTree<Keccak256Hasher> {
    /// Builds a Keccak-256 tree over `leaves`.
    pub fn build(leaves: Vec<Vec<u8>>) -> Result<Self> {
        Self::build_with(leaves, Keccak256Hasher)
    }
}

impl<H: Hasher> MerkleTree<H> {
    /// Builds a tree over `leaves` using `hasher`.
    ///
    /// Fails with [`RelayError::EmptyInput`] when `leaves` is empty.
    pub fn build_with(leaves: Vec<Vec<u8>>, hasher: H) -> Result<Self> {
        if leaves.is_empty() {
            return Err(RelayError::EmptyInput);
        }

        let width = leaves.len().next_power_of_two();
        let mut nodes = vec![H256::zero(); 2 * width];

        for (i, leaf) in leaves.iter().enumerate() {
            nodes[width + i] = hasher.hash(leaf);
        }

        for i in (1..width).rev() {
            nodes[i] = hash_pair(&hasher, &nodes[2 * i], &nodes[2 * i + 1]);
        }

        Ok(Self {
            hasher,
            leaves,
            nodes,
            width,
        })
    }

    /// Root of the tree.
    pub fn root(&self) -> H256 {
        self.nodes[1]
    }

    /// Number of (unpadded) leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Always false: empty trees cannot be built.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Generates the inclusion proof for `leaf`.
    ///
    /// If the same bytes occur more than once, the first occurrence is proved.
    /// The proof is verified against this tree's root before it is returned; a
    /// proof that fails that check is reported as
    /// [`RelayError::ProofSelfVerificationFailed`] and never handed out.
    pub fn prove(&self, leaf: &[u8]) -> Result<MerkleProof> {
        let index = self
            .leaves
            .iter()
            .position(|candidate| candidate.as_slice() == leaf)
            .ok_or(RelayError::LeafNotFound)?;

        let mut hashes = Vec::new();
        let mut node = self.width + index;
        while node > 1 {
            hashes.push(self.nodes[node ^ 1]);
            node /= 2;
        }

        let proof = MerkleProof { index, hashes };
        if !verify_proof_with(&self.hasher, leaf, &proof, &self.root()) {
            return Err(RelayError::ProofSelfVerificationFailed);
        }

        Ok(proof)
    }
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Verifies a Keccak-256 proof for `leaf` against `root`.
pub fn verify_proof(leaf: &[u8], proof: &MerkleProof, root: &H256) -> bool {
    verify_proof_with(&Keccak256Hasher, leaf, proof, root)
}

/// Verifies a proof for `leaf` against `root` using `hasher`.
pub fn verify_proof_with<H: Hasher>(
    hasher: &H,
    leaf: &[u8],
    proof: &MerkleProof,
    root: &H256,
) -> bool {
    let mut acc = hasher.hash(leaf);
    let mut position = proof.index;

    for sibling in &proof.hashes {
        acc = if position % 2 == 0 {
            hash_pair(hasher, &acc, sibling)
        } else {
            hash_pair(hasher, sibling, &acc)
        };
        position /= 2;
    }

    position == 0 && acc == *root
}

fn hash_pair<H: Hasher>(hasher: &H, left: &H256, right: &H256) -> H256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    hasher.hash(&buf)
}
