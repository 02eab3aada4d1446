//! Ethereum Chain Adapter
//!
//! Ethereum is the source of the eth-relayer (outbound channel logs) and the
//! destination of the beefy-relayer (the BEEFY light client contract).

use async_trait::async_trait;
use ethereum_types::{Address, H256, U256};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{
    decode_hex, parse_hex_u64, ChainConnection, DestinationChain, JsonRpcClient, MessagePayload,
    RelayPayload, SourceChain,
};
use crate::config::EthereumConfig;
use crate::crypto::{keccak256, RelayerKey};
use crate::error::{RelayError, Result};
use crate::justification::{Bitfield, CompleteMessage, InitialMessage};

const WORD_LEN: usize = 32;

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// Log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: String,
    pub block_number: String,
    pub transaction_hash: H256,
    pub log_index: String,
    #[serde(default)]
    pub removed: bool,
}

/// Receipt returned by the submission gateway.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub validation_id: Option<u64>,
}

// ============================================================================
// ADAPTER
// ============================================================================

/// JSON-RPC adapter for an Ethereum node.
pub struct EthereumChain {
    rpc: JsonRpcClient,
    channel_addresses: Vec<Address>,
    light_client: Option<Address>,
    relayer: Option<RelayerKey>,
    submit_initial_method: String,
    submit_complete_method: String,
}

impl EthereumChain {
    /// Creates an adapter from configuration. The relayer key is not loaded here;
    /// attach it with [`with_relayer_key`](Self::with_relayer_key) when submitting.
    pub fn new(config: &EthereumConfig) -> Result<Self> {
        Ok(Self {
            rpc: JsonRpcClient::new(&config.endpoint)?,
            channel_addresses: config.channel_addresses.clone(),
            light_client: config.beefy_light_client,
            relayer: None,
            submit_initial_method: config.submit_initial_method.clone(),
            submit_complete_method: config.submit_complete_method.clone(),
        })
    }

    pub fn with_relayer_key(mut self, key: RelayerKey) -> Self {
        self.relayer = Some(key);
        self
    }

    fn light_client(&self) -> Result<Address> {
        self.light_client
            .ok_or_else(|| RelayError::Config("ethereum.beefy_light_client is not set".to_string()))
    }

    fn relayer_address(&self) -> Result<Address> {
        self.relayer
            .as_ref()
            .map(RelayerKey::address)
            .ok_or_else(|| RelayError::Config("No relayer key loaded for Ethereum submissions".to_string()))
    }

    /// Read-only call against the light client.
    async fn call_light_client(&self, calldata: Vec<u8>) -> Result<Vec<u8>> {
        let to = self.light_client()?;
        let result: String = self
            .rpc
            .call(
                "eth_call",
                vec![
                    json!({ "to": to, "data": format!("0x{}", hex::encode(calldata)) }),
                    json!("latest"),
                ],
            )
            .await?;
        decode_hex(&result)
    }

    async fn submit<T: serde::Serialize + Sync>(&self, method: &str, message: &T) -> Result<SubmissionReceipt> {
        let params = json!({
            "from": self.relayer_address()?,
            "to": self.light_client()?,
            "message": message,
        });
        self.rpc.call(method, vec![params]).await
    }
}

#[async_trait]
impl ChainConnection for EthereumChain {
    fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }

    async fn connect(&self) -> Result<()> {
        self.rpc.connect("eth_chainId").await
    }

    async fn close(&self) {
        self.rpc.close();
    }
}

#[async_trait]
impl SourceChain for EthereumChain {
    async fn latest_block_number(&self) -> Result<u64> {
        let number: String = self.rpc.call("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&number)
    }

    async fn payloads_in_block(&self, block_number: u64) -> Result<Vec<RelayPayload>> {
        let block = format!("0x{:x}", block_number);
        let filter = json!({
            "fromBlock": block,
            "toBlock": block,
            "address": self.channel_addresses,
        });

        let logs: Vec<EthLog> = self.rpc.call("eth_getLogs", vec![filter]).await?;

        let mut messages = Vec::with_capacity(logs.len());
        for log in logs.into_iter().filter(|log| !log.removed) {
            messages.push(MessagePayload {
                contract: log.address,
                topics: log.topics,
                data: decode_hex(&log.data)?,
                transaction_hash: log.transaction_hash,
                log_index: parse_hex_u64(&log.log_index)?,
            });
        }
        messages.sort_by_key(|message| message.log_index);

        if !messages.is_empty() {
            debug!(block_number, count = messages.len(), "Found channel messages");
        }

        Ok(messages.into_iter().map(RelayPayload::Message).collect())
    }
}

#[async_trait]
impl DestinationChain for EthereumChain {
    /// Latest relay chain block the light client has accepted.
    async fn finalized_cursor(&self) -> Result<u64> {
        let output = self.call_light_client(selector("latestBeefyBlock()").to_vec()).await?;
        let word = output
            .get(..WORD_LEN)
            .ok_or_else(|| RelayError::Decode("latestBeefyBlock returned fewer than 32 bytes".to_string()))?;
        u256_to_u64("latestBeefyBlock", U256::from_big_endian(word))
    }

    async fn submit_initial(&self, message: &InitialMessage) -> Result<u64> {
        let receipt = self.submit(&self.submit_initial_method, message).await?;
        let id = receipt.validation_id.ok_or_else(|| {
            RelayError::rpc(&self.submit_initial_method, "receipt carries no validation id")
        })?;
        info!(
            tx_hash = ?receipt.transaction_hash,
            validation_id = id,
            "Submitted initial signature commitment"
        );
        Ok(id)
    }

    async fn random_bitfield(&self, validation_id: u64, validator_count: usize) -> Result<Bitfield> {
        let mut calldata = selector("createRandomBitfield(uint256)").to_vec();
        calldata.extend_from_slice(&encode_word(U256::from(validation_id)));

        let output = self.call_light_client(calldata).await?;
        let words = decode_uint256_array(&output)?;
        Ok(Bitfield::from_words(&words, validator_count))
    }

    async fn submit_complete(&self, message: &CompleteMessage) -> Result<H256> {
        let receipt = self.submit(&self.submit_complete_method, message).await?;
        info!(
            tx_hash = ?receipt.transaction_hash,
            validation_id = message.id,
            "Submitted complete signature commitment"
        );
        Ok(receipt.transaction_hash)
    }
}

// ============================================================================
// ABI HELPERS
// ============================================================================

/// First four bytes of keccak256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.as_bytes()[..4]);
    out
}

fn encode_word(value: U256) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    value.to_big_endian(&mut word);
    word
}

fn u256_to_u64(field: &'static str, value: U256) -> Result<u64> {
    if value > U256::from(u64::MAX) {
        return Err(RelayError::NumericOverflow {
            field,
            value: value.low_u128(),
        });
    }
    Ok(value.low_u64())
}

fn read_word(data: &[u8], offset: usize) -> Result<U256> {
    offset
        .checked_add(WORD_LEN)
        .and_then(|end| data.get(offset..end))
        .map(U256::from_big_endian)
        .ok_or_else(|| RelayError::Decode(format!("ABI output truncated at offset {}", offset)))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize> {
    let value = read_word(data, offset)?;
    if value > U256::from(usize::MAX) {
        return Err(RelayError::Decode(format!("ABI length {} out of range", value)));
    }
    Ok(value.low_u64() as usize)
}

/// Decodes an ABI-encoded dynamic `uint256[]` return value.
pub fn decode_uint256_array(data: &[u8]) -> Result<Vec<U256>> {
    let offset = read_usize(data, 0)?;
    let len = read_usize(data, offset)?;
    // Elements follow the length word; all of them must fit in the output
    let available = (data.len() - offset) / WORD_LEN - 1;
    if len > available {
        return Err(RelayError::Decode(format!(
            "ABI array of {} elements exceeds output of {} bytes",
            len,
            data.len()
        )));
    }
    let start = offset + WORD_LEN;
    (0..len).map(|i| read_word(data, start + WORD_LEN * i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches_known_signature() {
        // transfer(address,uint256)
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_decode_uint256_array() {
        let mut data = Vec::new();
        data.extend_from_slice(&encode_word(U256::from(32)));
        data.extend_from_slice(&encode_word(U256::from(2)));
        data.extend_from_slice(&encode_word(U256::from(5)));
        data.extend_from_slice(&encode_word(U256::from(9)));

        let words = decode_uint256_array(&data).unwrap();
        assert_eq!(words, vec![U256::from(5), U256::from(9)]);
    }

    #[test]
    fn test_decode_uint256_array_truncated() {
        let mut data = Vec::new();
        data.extend_from_slice(&encode_word(U256::from(32)));
        data.extend_from_slice(&encode_word(U256::from(3)));
        assert!(matches!(decode_uint256_array(&data), Err(RelayError::Decode(_))));
    }

    #[test]
    fn test_decode_uint256_array_rejects_huge_offset_and_length() {
        // Offset near usize::MAX must not wrap around
        let huge_offset = encode_word(U256::from(u64::MAX));
        assert!(matches!(
            decode_uint256_array(&huge_offset),
            Err(RelayError::Decode(_))
        ));

        let mut huge_len = Vec::new();
        huge_len.extend_from_slice(&encode_word(U256::from(32)));
        huge_len.extend_from_slice(&encode_word(U256::from(u64::MAX)));
        assert!(matches!(
            decode_uint256_array(&huge_len),
            Err(RelayError::Decode(_))
        ));
    }

    #[test]
    fn test_u256_to_u64_overflow() {
        assert_eq!(u256_to_u64("x", U256::from(7)).unwrap(), 7);
        assert!(matches!(
            u256_to_u64("x", U256::from(u64::MAX) + 1),
            Err(RelayError::NumericOverflow { field: "x", .. })
        ));
    }
}
