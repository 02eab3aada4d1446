//! Ethereum to parachain worker
//!
//! Relays outbound channel logs from finalized Ethereum blocks to the parachain.
//! A block is final once `descendants_until_final` blocks have been built on it.

use std::sync::Arc;

use super::RelayWorker;
use crate::chain::{EthereumChain, ParachainChain};
use crate::config::{EthereumConfig, ParachainConfig, WorkerConfig, WorkerKind};
use crate::error::Result;
use crate::relay::PipelineConfig;

/// Builds the worker. No connection is opened until it is started.
pub fn new_worker(
    ethereum: &EthereumConfig,
    parachain: &ParachainConfig,
    worker: &WorkerConfig,
) -> Result<RelayWorker> {
    let source = EthereumChain::new(ethereum)?;
    let destination = ParachainChain::new(parachain)?;

    Ok(RelayWorker::new(WorkerKind::EthRelayer.name())
        .with_source(Arc::new(source))
        .with_destination(Arc::new(destination))
        .with_pipeline_config(PipelineConfig {
            finality_depth: ethereum.descendants_until_final,
            poll_interval: ethereum.poll_interval(),
            channel_capacity: worker.channel_capacity,
        }))
}
