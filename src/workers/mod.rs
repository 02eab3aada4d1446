//! Workers
//!
//! A worker is one relay pipeline between a source and a destination chain. The
//! [`WorkerPool`] starts every configured worker and supervises its tasks.
//!
//! The set of workers is data-driven: [`build_pool`] registers one factory per
//! `[[workers]]` entry, keyed by [`WorkerKind`].

pub mod beefyrelayer;
pub mod ethrelayer;
pub mod pool;

pub use pool::{PoolHealth, WorkerFactory, WorkerPool, WorkerState};

use anyhow::Context;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

use crate::chain::{DestinationChain, SourceChain};
use crate::config::{Config, WorkerKind};
use crate::crypto::RelayerKey;
use crate::error::{RelayError, Result};
use crate::relay::{pipeline, PipelineConfig, Shutdown};

/// A task spawned by a started worker.
pub type WorkerTask = BoxFuture<'static, Result<()>>;

/// Common capability of every relay pipeline kind.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// Connects both chains and returns the worker's tasks.
    ///
    /// The tasks run until `shutdown` fires or one of them fails; the worker
    /// releases its connections once `shutdown` fires. An error here means no
    /// task was returned and no connection is left open.
    async fn start(&self, shutdown: Shutdown) -> Result<Vec<WorkerTask>>;
}

// ============================================================================
// RELAY WORKER
// ============================================================================

/// Listener/writer pipeline between a source and a destination chain.
pub struct RelayWorker {
    name: String,
    source: Option<Arc<dyn SourceChain>>,
    destination: Option<Arc<dyn DestinationChain>>,
    config: PipelineConfig,
}

impl RelayWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            destination: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn SourceChain>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_destination(mut self, destination: Arc<dyn DestinationChain>) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// First source block to relay: one past the destination's cursor.
    async fn resume_block(source: &dyn SourceChain, destination: &dyn DestinationChain) -> Result<u64> {
        source.connect().await?;
        destination.connect().await?;

        let cursor = destination.finalized_cursor().await?;
        cursor.checked_add(1).ok_or(RelayError::NumericOverflow {
            field: "finalized_cursor",
            value: u128::from(cursor),
        })
    }
}

#[async_trait]
impl Worker for RelayWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, shutdown: Shutdown) -> Result<Vec<WorkerTask>> {
        let (source, destination) = match (&self.source, &self.destination) {
            (Some(source), Some(destination)) => (Arc::clone(source), Arc::clone(destination)),
            _ => return Err(RelayError::MissingSenderOrReceiver),
        };

        let start_block = match Self::resume_block(source.as_ref(), destination.as_ref()).await {
            Ok(block) => block,
            Err(e) => {
                source.close().await;
                destination.close().await;
                return Err(e);
            }
        };
        info!(worker = %self.name, start_block, "Resuming relay");

        let (listener, writer) = pipeline(Arc::clone(&source), Arc::clone(&destination), self.config);

        let cleanup = {
            let mut shutdown = shutdown.clone();
            async move {
                shutdown.recv().await;
                source.close().await;
                destination.close().await;
                debug!("Chain connections closed");
                Ok(())
            }
        };

        let span = info_span!("worker", name = %self.name);
        Ok(vec![
            listener.run(start_block, shutdown.clone()).instrument(span.clone()).boxed(),
            writer.run(shutdown).instrument(span.clone()).boxed(),
            cleanup.instrument(span).boxed(),
        ])
    }
}

// ============================================================================
// POOL CONSTRUCTION
// ============================================================================

/// Registers one factory per configured worker, in configuration order.
///
/// Factories build clients but open no connections; disabled workers are
/// registered and skipped by the pool.
pub fn build_pool(config: &Config) -> anyhow::Result<WorkerPool> {
    let shared = Arc::new(config.clone());
    let mut pool = WorkerPool::new(config.relay.failure_policy);

    for worker in &config.workers {
        let shared = Arc::clone(&shared);
        let worker = worker.clone();
        let factory: WorkerFactory = match worker.kind {
            WorkerKind::EthRelayer => Box::new(move || {
                let built = ethrelayer::new_worker(&shared.ethereum, &shared.parachain, &worker)?;
                Ok((Box::new(built) as Box<dyn Worker>, worker.clone()))
            }),
            WorkerKind::BeefyRelayer => {
                // Resolve the key now so a missing variable fails at startup
                let private_key = if worker.enabled {
                    Some(shared.ethereum.get_private_key().with_context(|| {
                        format!("Failed to load private key for {}", worker.kind)
                    })?)
                } else {
                    None
                };
                Box::new(move || {
                    let key = private_key.as_deref().map(RelayerKey::from_hex).transpose()?;
                    let built = beefyrelayer::new_worker(&shared.relaychain, &shared.ethereum, key, &worker)?;
                    Ok((Box::new(built) as Box<dyn Worker>, worker.clone()))
                })
            }
        };
        pool.register(factory);
    }

    Ok(pool)
}

