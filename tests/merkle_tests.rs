//! Unit tests for the validator Merkle tree
//!
//! These tests verify tree construction, proof generation, and proof
//! verification without requiring external services.

use bridge_relayer::crypto::keccak256;
use bridge_relayer::merkle::{verify_proof, verify_proof_with, Hasher, MerkleProof, MerkleTree};
use bridge_relayer::RelayError;
use ethereum_types::H256;
use sha3::{Digest, Sha3_256};

fn leaves(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("validator-{}", i).into_bytes()).collect()
}

/// Test that every leaf of trees of many sizes proves and verifies
/// Why: Proofs for any leaf of any non-empty tree must verify against the root
#[test]
fn test_every_leaf_verifies_for_many_sizes() {
    for count in 1..=17 {
        let leaves = leaves(count);
        let tree = MerkleTree::build(leaves.clone()).unwrap();
        let root = tree.root();

        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.prove(leaf).unwrap();
            assert_eq!(proof.index, i);
            assert!(verify_proof(leaf, &proof, &root), "leaf {} of {} must verify", i, count);
        }
    }
}

/// Test that an empty leaf sequence is rejected
/// Why: A tree over nothing has no meaningful root
#[test]
fn test_build_empty_input() {
    assert!(matches!(MerkleTree::build(vec![]), Err(RelayError::EmptyInput)));
}

/// Test that proving an absent leaf fails
/// Why: Proofs are only ever produced for members of the set
#[test]
fn test_prove_absent_leaf() {
    let tree = MerkleTree::build(leaves(5)).unwrap();
    assert!(matches!(tree.prove(b"validator-99"), Err(RelayError::LeafNotFound)));
}

/// Test that duplicate leaves prove the first occurrence
/// Why: Duplicates are permitted and resolve to the lowest index
#[test]
fn test_duplicate_leaf_proves_first_occurrence() {
    let tree = MerkleTree::build(vec![b"x".to_vec(), b"y".to_vec(), b"x".to_vec()]).unwrap();
    let proof = tree.prove(b"x").unwrap();
    assert_eq!(proof.index, 0);
}

/// Test that a proof does not verify for a different leaf, root, or index
/// Why: Verification must bind the leaf, its position, and the root together
#[test]
fn test_tampered_proofs_fail() {
    let leaves = leaves(6);
    let tree = MerkleTree::build(leaves.clone()).unwrap();
    let root = tree.root();
    let proof = tree.prove(&leaves[3]).unwrap();

    assert!(!verify_proof(&leaves[2], &proof, &root));
    assert!(!verify_proof(&leaves[3], &proof, &H256::repeat_byte(1)));

    let moved = MerkleProof {
        index: 2,
        hashes: proof.hashes.clone(),
    };
    assert!(!verify_proof(&leaves[3], &moved, &root));

    let out_of_range = MerkleProof {
        index: 3 + (1 << proof.hashes.len()),
        hashes: proof.hashes.clone(),
    };
    assert!(!verify_proof(&leaves[3], &out_of_range, &root));
}

/// Test that two leaves hash to H(H(a) || H(b))
/// Why: Pins the node layout the light client recomputes on chain
#[test]
fn test_two_leaf_root_layout() {
    let tree = MerkleTree::build(vec![b"a".to_vec(), b"b".to_vec()]).unwrap();

    let mut buf = Vec::new();
    buf.extend_from_slice(keccak256(b"a").as_bytes());
    buf.extend_from_slice(keccak256(b"b").as_bytes());
    assert_eq!(tree.root(), keccak256(&buf));
}

struct Sha3Hasher;

impl Hasher for Sha3Hasher {
    fn hash(&self, data: &[u8]) -> H256 {
        H256::from_slice(&Sha3_256::digest(data))
    }
}

/// Test that the hash function is pluggable
/// Why: Proofs from a tree built with another hasher verify with that hasher only
#[test]
fn test_custom_hasher() {
    let leaves = leaves(4);
    let tree = MerkleTree::build_with(leaves.clone(), Sha3Hasher).unwrap();
    let proof = tree.prove(&leaves[1]).unwrap();

    assert!(verify_proof_with(&Sha3Hasher, &leaves[1], &proof, &tree.root()));
    assert!(!verify_proof(&leaves[1], &proof, &tree.root()));
}
