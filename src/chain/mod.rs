//! Chain Collaborator Interfaces
//!
//! Traits the relay pipeline talks to, the events that flow from a listener to a
//! writer, and the JSON-RPC adapters for the chains this relayer bridges.
//!
//! Adapters own their connection state. `connect` is called once when a worker
//! starts and `close` when its scope is cancelled; neither is shared between
//! workers.

pub mod ethereum;
pub mod parachain;
pub mod relaychain;
pub mod rpc;

use async_trait::async_trait;
use ethereum_types::{Address, H256};
use serde::{Serialize, Serializer};

use crate::error::{RelayError, Result};
use crate::justification::{BeefyJustification, Bitfield, CompleteMessage, InitialMessage};

pub use ethereum::EthereumChain;
pub use parachain::ParachainChain;
pub use relaychain::RelaychainChain;
pub use rpc::JsonRpcClient;

// ============================================================================
// RELAY EVENTS
// ============================================================================

/// Outbound message log observed on the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Contract that emitted the log
    pub contract: Address,
    pub topics: Vec<H256>,
    #[serde(serialize_with = "serialize_hex")]
    pub data: Vec<u8>,
    pub transaction_hash: H256,
    pub log_index: u64,
}

/// Unit of work handed from a listener to a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPayload {
    /// Submitted directly
    Message(MessagePayload),
    /// Submitted as an initial + complete message pair
    Justification(BeefyJustification),
}

/// A payload tagged with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEvent {
    pub block_number: u64,
    /// Position of the payload within its block
    pub index: u32,
    pub payload: RelayPayload,
}

// ============================================================================
// CHAIN TRAITS
// ============================================================================

/// Connection lifecycle shared by every chain adapter.
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// Endpoint this adapter talks to.
    fn endpoint(&self) -> &str;

    /// Establishes the connection. Fails with [`RelayError::Connection`] when the
    /// endpoint is unreachable.
    async fn connect(&self) -> Result<()>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&self);
}

/// Chain the relayer reads finalized events from.
#[async_trait]
pub trait SourceChain: ChainConnection {
    /// Latest block number known to the source chain.
    async fn latest_block_number(&self) -> Result<u64>;

    /// Relevant payloads in `block_number`, in in-block order.
    async fn payloads_in_block(&self, block_number: u64) -> Result<Vec<RelayPayload>>;
}

/// Chain the relayer submits to.
///
/// Submission methods a destination does not support keep their default, which
/// rejects the payload.
#[async_trait]
pub trait DestinationChain: ChainConnection {
    /// Last source block the destination has durably recorded.
    async fn finalized_cursor(&self) -> Result<u64>;

    /// Submits a plain message payload, returning the transaction hash.
    async fn submit_message(&self, _payload: &MessagePayload) -> Result<H256> {
        Err(unsupported(self.endpoint(), "message payloads"))
    }

    /// Submits a phase-1 commitment message, returning the validation id the
    /// light client assigned to it.
    async fn submit_initial(&self, _message: &InitialMessage) -> Result<u64> {
        Err(unsupported(self.endpoint(), "initial commitment messages"))
    }

    /// Bitfield of validators the light client selected for `validation_id`.
    async fn random_bitfield(&self, _validation_id: u64, _validator_count: usize) -> Result<Bitfield> {
        Err(unsupported(self.endpoint(), "random bitfields"))
    }

    /// Submits a phase-2 commitment message, returning the transaction hash.
    async fn submit_complete(&self, _message: &CompleteMessage) -> Result<H256> {
        Err(unsupported(self.endpoint(), "complete commitment messages"))
    }
}

fn unsupported(endpoint: &str, what: &str) -> RelayError {
    RelayError::Config(format!("Destination {} does not accept {}", endpoint, what))
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

/// Parses a `0x`-prefixed hex quantity (e.g. `"0x1b4"`).
pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| RelayError::Decode(format!("Invalid hex quantity {:?}: {}", value, e)))
}

/// Decodes `0x`-prefixed hex data.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| RelayError::Decode(format!("Invalid hex data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x1b4").unwrap(), 436);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_message_payload_serializes_data_as_hex() {
        let payload = MessagePayload {
            contract: Address::zero(),
            topics: vec![],
            data: vec![0xde, 0xad],
            transaction_hash: H256::zero(),
            log_index: 3,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["data"], "0xdead");
        assert_eq!(json["logIndex"], 3);
    }
}
