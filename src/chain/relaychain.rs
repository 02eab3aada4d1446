//! Relay Chain Adapter
//!
//! Source of the beefy-relayer. Finalized relay chain blocks that carry a BEEFY
//! justification yield one [`BeefyJustification`], paired with the authority set
//! stored at that block.

use async_trait::async_trait;
use codec::Decode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{decode_hex, parse_hex_u64, ChainConnection, JsonRpcClient, RelayPayload, SourceChain};
use crate::config::RelaychainConfig;
use crate::crypto::eth_address_from_compressed_key;
use crate::error::{RelayError, Result};
use crate::justification::{BeefyJustification, SignedCommitment, ValidatorSet};

/// Consensus engine id of BEEFY justifications.
pub const BEEFY_ENGINE_ID: [u8; 4] = *b"BEEF";

/// Only version of the versioned finality proof this relayer understands.
const FINALITY_PROOF_V1: u8 = 1;

const COMPRESSED_KEY_LEN: usize = 33;

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Deserialize)]
struct Header {
    number: String,
}

#[derive(Debug, Deserialize)]
struct SignedBlock {
    #[serde(default)]
    justifications: Option<Vec<([u8; 4], String)>>,
}

// ============================================================================
// ADAPTER
// ============================================================================

/// JSON-RPC adapter for a relay chain node.
pub struct RelaychainChain {
    rpc: JsonRpcClient,
    authorities_storage_key: String,
}

impl RelaychainChain {
    pub fn new(config: &RelaychainConfig) -> Result<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(&config.endpoint)?,
            authorities_storage_key: config.beefy_authorities_storage_key.clone(),
        })
    }

    async fn validator_set_at(&self, block_hash: &str) -> Result<ValidatorSet> {
        let stored: Option<String> = self
            .rpc
            .call_optional(
                "state_getStorage",
                vec![json!(self.authorities_storage_key), json!(block_hash)],
            )
            .await?;

        let stored = stored.ok_or_else(|| {
            RelayError::Decode(format!("No BEEFY authorities stored at block {}", block_hash))
        })?;

        let keys = Vec::<[u8; COMPRESSED_KEY_LEN]>::decode(&mut decode_hex(&stored)?.as_slice())
            .map_err(|e| RelayError::Decode(format!("Invalid BEEFY authority list: {}", e)))?;

        let addresses = keys
            .iter()
            .map(|key| eth_address_from_compressed_key(key))
            .collect::<Result<Vec<_>>>()?;

        ValidatorSet::new(addresses)
    }
}

/// Decodes a versioned BEEFY finality proof.
pub fn decode_finality_proof(bytes: &[u8]) -> Result<SignedCommitment> {
    let (version, mut rest) = bytes
        .split_first()
        .ok_or_else(|| RelayError::Decode("Empty BEEFY justification".to_string()))?;

    if *version != FINALITY_PROOF_V1 {
        return Err(RelayError::Decode(format!(
            "Unsupported BEEFY finality proof version {}",
            version
        )));
    }

    SignedCommitment::decode(&mut rest)
        .map_err(|e| RelayError::Decode(format!("Invalid signed commitment: {}", e)))
}

#[async_trait]
impl ChainConnection for RelaychainChain {
    fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }

    async fn connect(&self) -> Result<()> {
        self.rpc.connect("system_health").await
    }

    async fn close(&self) {
        self.rpc.close();
    }
}

#[async_trait]
impl SourceChain for RelaychainChain {
    /// Number of the latest finalized block.
    async fn latest_block_number(&self) -> Result<u64> {
        let head: String = self.rpc.call("chain_getFinalizedHead", vec![]).await?;
        let header: Header = self.rpc.call("chain_getHeader", vec![json!(head)]).await?;
        parse_hex_u64(&header.number)
    }

    async fn payloads_in_block(&self, block_number: u64) -> Result<Vec<RelayPayload>> {
        let hash: String = self.rpc.call("chain_getBlockHash", vec![json!(block_number)]).await?;
        let block: SignedBlock = self.rpc.call("chain_getBlock", vec![json!(hash)]).await?;

        let justification = block
            .justifications
            .unwrap_or_default()
            .into_iter()
            .find(|(engine, _)| *engine == BEEFY_ENGINE_ID);

        let Some((_, encoded)) = justification else {
            return Ok(Vec::new());
        };

        let signed_commitment = decode_finality_proof(&decode_hex(&encoded)?)?;
        let validators = self.validator_set_at(&hash).await?;

        debug!(
            block_number,
            commitment_block = signed_commitment.commitment.block_number,
            validators = validators.len(),
            "Found BEEFY justification"
        );

        let justification = BeefyJustification::new(validators, signed_commitment)?;
        Ok(vec![RelayPayload::Justification(justification)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::justification::Commitment;
    use codec::Encode;

    #[test]
    fn test_decode_finality_proof_v1() {
        let signed = SignedCommitment {
            commitment: Commitment {
                payload: [7u8; 32],
                block_number: 42,
                validator_set_id: 3,
            },
            signatures: vec![None, Some([1u8; 65])],
        };
        let mut bytes = vec![FINALITY_PROOF_V1];
        bytes.extend(signed.encode());

        assert_eq!(decode_finality_proof(&bytes).unwrap(), signed);
    }

    #[test]
    fn test_decode_finality_proof_rejects_unknown_version() {
        assert!(matches!(
            decode_finality_proof(&[2, 0, 0]),
            Err(RelayError::Decode(_))
        ));
        assert!(matches!(decode_finality_proof(&[]), Err(RelayError::Decode(_))));
    }
}
