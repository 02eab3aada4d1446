//! Justification data model
//!
//! Source-chain finality artifacts (commitments and their signatures), the
//! validator set they are checked against, and the two message shapes submitted
//! to the destination light client.

use codec::{Decode, Encode};
use ethereum_types::{Address, H256};
use serde::Serialize;
use std::collections::HashSet;

use super::bitfield::Bitfield;
use crate::crypto::EthSignature;
use crate::error::{RelayError, Result};

/// Source-chain ECDSA signature: r (32) || s (32) || recovery id (1).
pub type BeefySignature = [u8; 65];

// ============================================================================
// SOURCE CHAIN ARTIFACTS
// ============================================================================

/// Finality artifact validators sign on the source chain.
///
/// SCALE layout: `payload (32) ++ block_number (u32 LE) ++ validator_set_id (u64 LE)`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Commitment {
    /// Opaque payload (e.g. MMR root of the relay chain)
    pub payload: [u8; 32],
    /// Finalized block the commitment is for
    pub block_number: u32,
    /// Validator set that signed the commitment
    pub validator_set_id: u64,
}

/// A commitment plus one optional signature per validator position.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct SignedCommitment {
    pub commitment: Commitment,
    /// Indexed by validator position; `None` when that validator did not sign
    pub signatures: Vec<Option<BeefySignature>>,
}

impl SignedCommitment {
    /// Lowest validator position that carries a signature.
    pub fn first_signer(&self) -> Option<usize> {
        self.signatures.iter().position(Option::is_some)
    }
}

/// Ordered validator addresses.
///
/// Position in the sequence is the canonical index for bitfields, Merkle leaves,
/// and signature slots. Addresses are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSet {
    addresses: Vec<Address>,
}

impl ValidatorSet {
    /// Creates a validator set, rejecting duplicate addresses.
    pub fn new(addresses: Vec<Address>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(addresses.len());
        for address in &addresses {
            if !seen.insert(*address) {
                return Err(RelayError::DuplicateValidator(*address));
            }
        }
        Ok(Self { addresses })
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Address at `position`.
    pub fn get(&self, position: usize) -> Result<Address> {
        self.addresses
            .get(position)
            .copied()
            .ok_or(RelayError::ValidatorIndexOutOfRange {
                index: position,
                len: self.addresses.len(),
            })
    }

    /// Raw leaf preimages for the validator Merkle tree, in set order.
    pub fn leaves(&self) -> Vec<Vec<u8>> {
        self.addresses
            .iter()
            .map(|address| address.as_bytes().to_vec())
            .collect()
    }
}

// ============================================================================
// DESTINATION CHAIN MESSAGES
// ============================================================================

/// Commitment in the destination light client's integer widths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationCommitment {
    pub payload: H256,
    pub block_number: u64,
    pub validator_set_id: u32,
}

impl TryFrom<&Commitment> for DestinationCommitment {
    type Error = RelayError;

    fn try_from(commitment: &Commitment) -> Result<Self> {
        let validator_set_id = u32::try_from(commitment.validator_set_id).map_err(|_| {
            RelayError::NumericOverflow {
                field: "validator_set_id",
                value: u128::from(commitment.validator_set_id),
            }
        })?;

        Ok(Self {
            payload: H256::from(commitment.payload),
            block_number: u64::from(commitment.block_number),
            validator_set_id,
        })
    }
}

/// First-phase submission: a single validator's claim over the commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialMessage {
    pub commitment_hash: H256,
    pub validator_claims_bitfield: Bitfield,
    pub validator_signature: EthSignature,
    pub validator_position: u64,
    pub validator_address: Address,
    pub validator_address_merkle_proof: Vec<H256>,
}

/// Second-phase submission: signatures for every validator the light client
/// selected, with parallel positions, addresses, and proofs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMessage {
    /// Validation id assigned by the light client to the initial submission
    pub id: u64,
    pub commitment: DestinationCommitment,
    pub signatures: Vec<EthSignature>,
    pub validator_positions: Vec<u64>,
    pub validator_addresses: Vec<Address>,
    pub validator_address_merkle_proofs: Vec<Vec<H256>>,
}

impl CompleteMessage {
    /// Number of selected validators.
    pub fn len(&self) -> usize {
        self.validator_positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validator_positions.is_empty()
    }
}
