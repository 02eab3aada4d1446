//! Source chain listener
//!
//! Walks source blocks in ascending order from a start block, forwarding each
//! block's payloads once the block is final. A block `b` is final when the chain
//! head is at least `b + finality_depth`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::shutdown::Shutdown;
use crate::chain::{RelayEvent, SourceChain};
use crate::error::{RelayError, Result};

pub struct Listener {
    source: Arc<dyn SourceChain>,
    sender: mpsc::Sender<RelayEvent>,
    finality_depth: u64,
    poll_interval: Duration,
}

impl Listener {
    pub fn new(
        source: Arc<dyn SourceChain>,
        sender: mpsc::Sender<RelayEvent>,
        finality_depth: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            sender,
            finality_depth,
            poll_interval,
        }
    }

    /// Highest final block for `head`, or `None` while nothing is final yet.
    pub fn final_block(head: u64, finality_depth: u64) -> Option<u64> {
        head.checked_sub(finality_depth)
    }

    /// Runs until shutdown or the first source error.
    ///
    /// Sending blocks while the channel is full, so the listener never runs more
    /// than one payload ahead of the buffered ones.
    pub async fn run(self, start_block: u64, mut shutdown: Shutdown) -> Result<()> {
        info!(
            start_block,
            finality_depth = self.finality_depth,
            source = self.source.endpoint(),
            "Listener started"
        );
        let mut next = start_block;

        loop {
            let head = tokio::select! {
                _ = shutdown.recv() => break,
                head = self.source.latest_block_number() => head?,
            };

            if let Some(final_block) = Self::final_block(head, self.finality_depth) {
                while next <= final_block {
                    let payloads = tokio::select! {
                        _ = shutdown.recv() => return Ok(()),
                        payloads = self.source.payloads_in_block(next) => payloads?,
                    };

                    for (index, payload) in payloads.into_iter().enumerate() {
                        let event = RelayEvent {
                            block_number: next,
                            index: index as u32,
                            payload,
                        };
                        tokio::select! {
                            _ = shutdown.recv() => return Ok(()),
                            sent = self.sender.send(event) => {
                                if sent.is_err() {
                                    // Writer gone: expected only while shutting down
                                    return if shutdown.is_shutdown() {
                                        Ok(())
                                    } else {
                                        Err(RelayError::ChannelClosed)
                                    };
                                }
                            }
                        }
                    }

                    next += 1;
                }
            } else {
                debug!(head, "No final blocks yet");
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!(next_block = next, "Listener stopped");
        Ok(())
    }
}
