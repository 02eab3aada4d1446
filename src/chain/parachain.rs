//! Parachain Adapter
//!
//! Destination of the eth-relayer. The parachain's Ethereum light client stores
//! the id of the last imported Ethereum header; relaying resumes after it.

use async_trait::async_trait;
use codec::Decode;
use ethereum_types::H256;
use serde_json::json;
use tracing::info;

use super::ethereum::SubmissionReceipt;
use super::{decode_hex, ChainConnection, DestinationChain, JsonRpcClient, MessagePayload};
use crate::config::ParachainConfig;
use crate::error::{RelayError, Result};

/// Last imported Ethereum header, as stored on the parachain.
#[derive(Debug, Clone, PartialEq, Eq, Decode)]
pub struct HeaderId {
    pub hash: [u8; 32],
    pub number: u64,
}

/// JSON-RPC adapter for a parachain node.
pub struct ParachainChain {
    rpc: JsonRpcClient,
    finalized_block_storage_key: String,
    submit_message_method: String,
}

impl ParachainChain {
    pub fn new(config: &ParachainConfig) -> Result<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(&config.endpoint)?,
            finalized_block_storage_key: config.finalized_block_storage_key.clone(),
            submit_message_method: config.submit_message_method.clone(),
        })
    }
}

#[async_trait]
impl ChainConnection for ParachainChain {
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
impl DestinationChain for ParachainChain {
    /// Block number of the last imported Ethereum header; 0 before the first import.
    async fn finalized_cursor(&self) -> Result<u64> {
        let stored: Option<String> = self
            .rpc
            .call_optional("state_getStorage", vec![json!(self.finalized_block_storage_key)])
            .await?;

        let Some(stored) = stored else {
            return Ok(0);
        };

        let bytes = decode_hex(&stored)?;
        let header = HeaderId::decode(&mut bytes.as_slice())
            .map_err(|e| RelayError::Decode(format!("Invalid HeaderId in storage: {}", e)))?;
        Ok(header.number)
    }

    async fn submit_message(&self, payload: &MessagePayload) -> Result<H256> {
        let receipt: SubmissionReceipt = self
            .rpc
            .call(&self.submit_message_method, vec![json!(payload)])
            .await?;
        info!(
            tx_hash = ?receipt.transaction_hash,
            source_tx = ?payload.transaction_hash,
            log_index = payload.log_index,
            "Submitted Ethereum message to parachain"
        );
        Ok(receipt.transaction_hash)
    }
}
