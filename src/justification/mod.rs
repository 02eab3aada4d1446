//! BEEFY Justification Module
//!
//! Turns a validator-signed commitment into the two messages the destination
//! light client verifies:
//!
//! 1. [`InitialMessage`] - one validator's signature, address, and Merkle proof
//!    of that address in the validator set, plus the claims bitfield
//! 2. [`CompleteMessage`] - signatures and proofs for every validator the light
//!    client selected for the validation id returned by phase 1
//!
//! Building messages is pure computation: no I/O, no shared state. A
//! [`BeefyJustification`] is built per observed commitment and dropped once
//! both messages have been submitted.

mod bitfield;
mod types;

pub use bitfield::Bitfield;
pub use types::{
    BeefySignature, Commitment, CompleteMessage, DestinationCommitment, InitialMessage,
    SignedCommitment, ValidatorSet,
};

use codec::Encode;
use ethereum_types::H256;

use crate::crypto::{keccak256, translate_signature, EthSignature};
use crate::error::{RelayError, Result};
use crate::merkle::MerkleTree;

/// A validator set bound to a commitment it signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeefyJustification {
    validators: ValidatorSet,
    signed_commitment: SignedCommitment,
}

impl BeefyJustification {
    /// Pairs `validators` with `signed_commitment`.
    ///
    /// The commitment must carry exactly one signature slot per validator.
    pub fn new(validators: ValidatorSet, signed_commitment: SignedCommitment) -> Result<Self> {
        if signed_commitment.signatures.len() != validators.len() {
            return Err(RelayError::SignatureCountMismatch {
                signatures: signed_commitment.signatures.len(),
                validators: validators.len(),
            });
        }

        Ok(Self {
            validators,
            signed_commitment,
        })
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn signed_commitment(&self) -> &SignedCommitment {
        &self.signed_commitment
    }

    /// Source block number of the commitment.
    pub fn block_number(&self) -> u32 {
        self.signed_commitment.commitment.block_number
    }

    /// keccak256 of the SCALE-encoded commitment.
    pub fn commitment_hash(&self) -> H256 {
        keccak256(&self.signed_commitment.commitment.encode())
    }

    /// Builds the phase-1 message for the validator at `validator_index`.
    ///
    /// `initial_bitfield` is copied into the message as-is.
    pub fn build_initial_message(
        &self,
        validator_index: usize,
        initial_bitfield: &Bitfield,
    ) -> Result<InitialMessage> {
        let commitment_hash = self.commitment_hash();
        let address = self.validators.get(validator_index)?;
        let signature = self.translated_signature(validator_index)?;

        let tree = MerkleTree::build(self.validators.leaves())?;
        let proof = tree.prove(address.as_bytes())?;

        Ok(InitialMessage {
            commitment_hash,
            validator_claims_bitfield: initial_bitfield.clone(),
            validator_signature: signature,
            validator_position: validator_index as u64,
            validator_address: address,
            validator_address_merkle_proof: proof.hashes,
        })
    }

    /// Builds the phase-2 message for validation `id`, including every position
    /// set in `bitfield` in ascending order.
    ///
    /// An all-zero bitfield yields empty sequences. Any failure discards the
    /// whole message.
    pub fn build_complete_message(&self, id: u64, bitfield: &Bitfield) -> Result<CompleteMessage> {
        let positions = bitfield.positions();

        let mut signatures = Vec::with_capacity(positions.len());
        let mut validator_positions = Vec::with_capacity(positions.len());
        let mut validator_addresses = Vec::with_capacity(positions.len());
        let mut proofs = Vec::with_capacity(positions.len());

        if !positions.is_empty() {
            let tree = MerkleTree::build(self.validators.leaves())?;

            for position in positions {
                let address = self.validators.get(position)?;
                let signature = self.translated_signature(position)?;
                let proof = tree.prove(address.as_bytes())?;

                signatures.push(signature);
                validator_positions.push(position as u64);
                validator_addresses.push(address);
                proofs.push(proof.hashes);
            }
        }

        let commitment = DestinationCommitment::try_from(&self.signed_commitment.commitment)?;

        Ok(CompleteMessage {
            id,
            commitment,
            signatures,
            validator_positions,
            validator_addresses,
            validator_address_merkle_proofs: proofs,
        })
    }

    fn translated_signature(&self, position: usize) -> Result<EthSignature> {
        let signature = self
            .signed_commitment
            .signatures
            .get(position)
            .ok_or(RelayError::ValidatorIndexOutOfRange {
                index: position,
                len: self.validators.len(),
            })?
            .as_ref()
            .ok_or(RelayError::MissingSignature { position })?;

        translate_signature(signature)
    }
}
