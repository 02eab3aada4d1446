//! Bridge Relayer Library
//!
//! Relays finalized state between chains: BEEFY commitments from the relay chain
//! to the Ethereum light client, and outbound channel messages from Ethereum to
//! the parachain.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod justification;
pub mod merkle;
pub mod relay;
pub mod workers;

// Re-export commonly used types
pub use config::{Config, FailurePolicy, WorkerConfig, WorkerKind};
pub use error::{RelayError, Result};
pub use justification::{BeefyJustification, Bitfield, CompleteMessage, InitialMessage};
pub use merkle::{verify_proof, MerkleProof, MerkleTree};
pub use relay::{Shutdown, ShutdownTrigger};
pub use workers::{build_pool, Worker, WorkerPool, WorkerState};
