//! Cryptographic Operations Module
//!
//! Hashing, secp256k1 address derivation, and the signature translation between
//! the source chain's ECDSA convention and the destination chain's.
//!
//! ## Recovery ids
//!
//! BEEFY validators sign with recovery ids `0`/`1`; Ethereum's `ecrecover`
//! expects `27`/`28`. [`translate_signature`] applies the offset exactly once and
//! rejects anything that is not a raw source signature, so an already
//! translated signature can never be shifted a second time.

use ethereum_types::{Address, H256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::{Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::{RelayError, Result};

/// Length of an ECDSA signature with recovery byte: r (32) || s (32) || v (1).
pub const SIGNATURE_LEN: usize = 65;

/// Offset added to the source recovery id to obtain Ethereum's `v`.
pub const ETHEREUM_RECOVERY_OFFSET: u8 = 27;

// ============================================================================
// HASHING
// ============================================================================

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

// ============================================================================
// SIGNATURE TRANSLATION
// ============================================================================

/// ECDSA signature in the destination chain's encoding (`v` in {27, 28}).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthSignature([u8; SIGNATURE_LEN]);

impl EthSignature {
    /// Raw 65 signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// The `v` byte.
    pub fn v(&self) -> u8 {
        self.0[SIGNATURE_LEN - 1]
    }
}

impl fmt::Debug for EthSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthSignature(0x{})", hex::encode(self.0))
    }
}

impl Serialize for EthSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

/// Converts a source-chain signature into the destination chain's encoding.
///
/// Copies `r` and `s` unchanged and maps the recovery byte `0 -> 27`, `1 -> 28`.
///
/// # Errors
///
/// * [`RelayError::InvalidSignatureLength`] - input is not 65 bytes
/// * [`RelayError::InvalidRecoveryId`] - recovery byte is not 0 or 1 (this includes
///   signatures that were already translated)
pub fn translate_signature(source: &[u8]) -> Result<EthSignature> {
    if source.len() != SIGNATURE_LEN {
        return Err(RelayError::InvalidSignatureLength(source.len()));
    }

    let recovery_id = source[SIGNATURE_LEN - 1];
    if recovery_id > 1 {
        return Err(RelayError::InvalidRecoveryId(recovery_id));
    }

    let mut out = [0u8; SIGNATURE_LEN];
    out[..64].copy_from_slice(&source[..64]);
    out[64] = recovery_id + ETHEREUM_RECOVERY_OFFSET;
    Ok(EthSignature(out))
}

/// Recovers the Ethereum address that produced `signature` over `prehash`.
pub fn recover_eth_address(prehash: &H256, signature: &EthSignature) -> Result<Address> {
    let bytes = signature.as_bytes();
    let v = bytes[64]
        .checked_sub(ETHEREUM_RECOVERY_OFFSET)
        .ok_or(RelayError::InvalidRecoveryId(bytes[64]))?;
    let recovery_id = RecoveryId::from_byte(v).ok_or(RelayError::InvalidRecoveryId(bytes[64]))?;

    let sig = EcdsaSignature::from_slice(&bytes[..64])
        .map_err(|e| RelayError::Decode(format!("Invalid ECDSA signature: {}", e)))?;

    let key = VerifyingKey::recover_from_prehash(prehash.as_bytes(), &sig, recovery_id)
        .map_err(|e| RelayError::Decode(format!("Signature recovery failed: {}", e)))?;

    Ok(eth_address_from_verifying_key(&key))
}

// ============================================================================
// ADDRESS DERIVATION
// ============================================================================

/// Ethereum address of a secp256k1 public key: keccak256(x || y)[12..32].
pub fn eth_address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Uncompressed point is 0x04 || x || y
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash.as_bytes()[12..])
}

/// Ethereum address of a SEC1 compressed (33-byte) public key.
///
/// BEEFY authority keys are stored compressed on the relay chain.
pub fn eth_address_from_compressed_key(compressed: &[u8]) -> Result<Address> {
    let key = VerifyingKey::from_sec1_bytes(compressed)
        .map_err(|e| RelayError::Decode(format!("Invalid secp256k1 public key: {}", e)))?;
    Ok(eth_address_from_verifying_key(&key))
}

// ============================================================================
// OPERATOR KEY
// ============================================================================

/// The relayer's own secp256k1 key, used to identify the submitting account.
pub struct RelayerKey {
    signing_key: SigningKey,
}

impl RelayerKey {
    /// Parses a hex encoded 32-byte private key (with or without 0x prefix).
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let key_hex = private_key.trim().strip_prefix("0x").unwrap_or(private_key.trim());
        let bytes = hex::decode(key_hex)
            .map_err(|e| RelayError::Config(format!("Private key is not valid hex: {}", e)))?;

        if bytes.len() != 32 {
            return Err(RelayError::Config(format!(
                "Invalid private key length: expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| RelayError::Config(format!("Invalid secp256k1 private key: {}", e)))?;

        Ok(Self { signing_key })
    }

    /// Ethereum address of this key.
    pub fn address(&self) -> Address {
        eth_address_from_verifying_key(self.signing_key.verifying_key())
    }
}

impl fmt::Debug for RelayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material
        write!(f, "RelayerKey({:?})", self.address())
    }
}
