//! Relay chain to Ethereum worker
//!
//! Relays BEEFY commitments from finalized relay chain blocks to the Ethereum
//! light client. The relay chain only reports finalized heads, so no extra
//! finality depth applies.

use std::sync::Arc;

use super::RelayWorker;
use crate::chain::{EthereumChain, RelaychainChain};
use crate::config::{EthereumConfig, RelaychainConfig, WorkerConfig, WorkerKind};
use crate::crypto::RelayerKey;
use crate::error::Result;
use crate::relay::PipelineConfig;

/// Builds the worker. No connection is opened until it is started.
///
/// Without `key` the worker can start but every submission is rejected.
pub fn new_worker(
    relaychain: &RelaychainConfig,
    ethereum: &EthereumConfig,
    key: Option<RelayerKey>,
    worker: &WorkerConfig,
) -> Result<RelayWorker> {
    let source = RelaychainChain::new(relaychain)?;
    let mut destination = EthereumChain::new(ethereum)?;
    if let Some(key) = key {
        destination = destination.with_relayer_key(key);
    }

    Ok(RelayWorker::new(WorkerKind::BeefyRelayer.name())
        .with_source(Arc::new(source))
        .with_destination(Arc::new(destination))
        .with_pipeline_config(PipelineConfig {
            finality_depth: 0,
            poll_interval: relaychain.poll_interval(),
            channel_capacity: worker.channel_capacity,
        }))
}
