//! Destination chain writer
//!
//! Consumes relay events in the order the listener produced them and submits
//! each one to the destination chain before taking the next.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::shutdown::Shutdown;
use crate::chain::{DestinationChain, RelayEvent, RelayPayload};
use crate::error::Result;
use crate::justification::{BeefyJustification, Bitfield};

pub struct Writer {
    destination: Arc<dyn DestinationChain>,
    receiver: mpsc::Receiver<RelayEvent>,
}

impl Writer {
    pub fn new(destination: Arc<dyn DestinationChain>, receiver: mpsc::Receiver<RelayEvent>) -> Self {
        Self {
            destination,
            receiver,
        }
    }

    /// Runs until shutdown, until the listener side of the channel is dropped, or
    /// until the first submission error.
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        info!(destination = self.destination.endpoint(), "Writer started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                written = self.write(event) => written?,
            }
        }

        debug!("Writer stopped");
        Ok(())
    }

    async fn write(&self, event: RelayEvent) -> Result<()> {
        debug!(block_number = event.block_number, index = event.index, "Writing event");

        match event.payload {
            RelayPayload::Message(message) => {
                self.destination.submit_message(&message).await?;
                Ok(())
            }
            RelayPayload::Justification(justification) => self.write_justification(&justification).await,
        }
    }

    /// Two-phase submission: the lowest signed position claims the commitment,
    /// then the light client's random selection is answered in full.
    async fn write_justification(&self, justification: &BeefyJustification) -> Result<()> {
        let validator_count = justification.validators().len();

        let Some(position) = justification.signed_commitment().first_signer() else {
            warn!(
                block_number = justification.block_number(),
                "Skipping commitment without signatures"
            );
            return Ok(());
        };

        let claims = Bitfield::from_positions(validator_count, &[position])?;
        let initial = justification.build_initial_message(position, &claims)?;
        let validation_id = self.destination.submit_initial(&initial).await?;

        let selected = self
            .destination
            .random_bitfield(validation_id, validator_count)
            .await?;
        let complete = justification.build_complete_message(validation_id, &selected)?;
        self.destination.submit_complete(&complete).await?;

        info!(
            block_number = justification.block_number(),
            validation_id,
            signatures = complete.len(),
            "Relayed BEEFY commitment"
        );
        Ok(())
    }
}
