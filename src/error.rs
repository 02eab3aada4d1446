//! Error Types
//!
//! Typed errors shared by the justification engine, the Merkle prover, the chain
//! adapters, and the worker pool. Configuration loading and the binary entry point
//! use `anyhow` on top of these.

use ethereum_types::Address;
use thiserror::Error;

/// Result alias used throughout the relayer library.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors produced while building proofs or running relay pipelines.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Chain endpoint could not be reached or refused the connection.
    #[error("Connection error ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    /// JSON-RPC call returned an error object or an unusable result.
    #[error("RPC error calling {method}: {message}")]
    Rpc { method: String, message: String },

    /// Chain data could not be decoded into the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A requested validator position carries no signature.
    #[error("Missing signature for validator at position {position}")]
    MissingSignature { position: usize },

    /// Validator index outside the validator set.
    #[error("Validator index {index} out of range for validator set of {len}")]
    ValidatorIndexOutOfRange { index: usize, len: usize },

    /// Signed commitment does not carry one signature slot per validator.
    #[error("Signed commitment has {signatures} signature slots for {validators} validators")]
    SignatureCountMismatch { signatures: usize, validators: usize },

    /// Merkle tree requested over zero leaves.
    #[error("Cannot build a Merkle tree from an empty leaf set")]
    EmptyInput,

    /// Leaf bytes are not part of the tree.
    #[error("Leaf not found in Merkle tree")]
    LeafNotFound,

    /// A freshly generated proof does not verify against its own tree.
    #[error("Merkle proof failed self-verification")]
    ProofSelfVerificationFailed,

    /// Source signature recovery byte outside {0, 1}.
    #[error("Invalid recovery id {0}: expected 0 or 1")]
    InvalidRecoveryId(u8),

    /// Signature is not 65 bytes long.
    #[error("Invalid signature length: expected 65 bytes, got {0}")]
    InvalidSignatureLength(usize),

    /// Commitment field does not fit the destination chain's integer width.
    #[error("Numeric overflow: {field} = {value} does not fit the destination width")]
    NumericOverflow { field: &'static str, value: u128 },

    /// Bitfield string is malformed.
    #[error("Invalid bitfield: {0}")]
    InvalidBitfield(String),

    /// The same address appears twice in a validator set.
    #[error("Duplicate validator address {0:?}")]
    DuplicateValidator(Address),

    /// A worker was started without both halves of its pipeline.
    #[error("Sender and/or receiver need to be set before starting the worker")]
    MissingSenderOrReceiver,

    /// The listener/writer channel closed while the peer still needed it.
    #[error("Relay channel closed unexpectedly")]
    ChannelClosed,

    /// Invalid worker or chain configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    TaskPanicked(String),
}

impl RelayError {
    /// Builds an RPC error for `method`.
    pub fn rpc(method: &str, message: impl Into<String>) -> Self {
        RelayError::Rpc {
            method: method.to_string(),
            message: message.into(),
        }
    }

    /// Builds a connection error for `endpoint`.
    pub fn connection(endpoint: &str, message: impl Into<String>) -> Self {
        RelayError::Connection {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }
}
