//! Relay Pipeline
//!
//! A listener and a writer joined by a bounded channel. The listener forwards
//! finalized source payloads in (block, in-block index) order; the writer submits
//! them in the same order. The channel capacity bounds how far the listener can
//! run ahead of the writer.

pub mod listener;
pub mod shutdown;
pub mod writer;

pub use listener::Listener;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use writer::Writer;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::chain::{DestinationChain, SourceChain};

/// Tuning for one listener/writer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub finality_depth: u64,
    pub poll_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            finality_depth: 0,
            poll_interval: Duration::from_secs(6),
            channel_capacity: 1,
        }
    }
}

/// Wires a listener to a writer over a channel of `config.channel_capacity`
/// (at least 1).
pub fn pipeline(
    source: Arc<dyn SourceChain>,
    destination: Arc<dyn DestinationChain>,
    config: PipelineConfig,
) -> (Listener, Writer) {
    let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
    (
        Listener::new(source, sender, config.finality_depth, config.poll_interval),
        Writer::new(destination, receiver),
    )
}
