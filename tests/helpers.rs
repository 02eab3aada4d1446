//! Shared test helpers
//!
//! - **Validators**: real secp256k1 keys and commitments signed with them
//! - **Mock chains**: in-memory `SourceChain` / `DestinationChain` implementations
//!   that record what the pipeline did
//! - **Mock workers**: scripted `Worker` implementations for pool tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_relayer::chain::{
    ChainConnection, DestinationChain, MessagePayload, RelayPayload, SourceChain,
};
use bridge_relayer::config::{WorkerConfig, WorkerKind};
use bridge_relayer::crypto::{eth_address_from_verifying_key, keccak256};
use bridge_relayer::justification::{
    BeefyJustification, BeefySignature, Bitfield, Commitment, CompleteMessage, InitialMessage,
    SignedCommitment, ValidatorSet,
};
use bridge_relayer::relay::Shutdown;
use bridge_relayer::workers::{Worker, WorkerFactory, WorkerTask};
use bridge_relayer::{RelayError, Result};
use codec::Encode;
use ethereum_types::{Address, H256};
use futures::FutureExt;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// VALIDATORS
// ============================================================================

pub struct TestValidators {
    pub keys: Vec<SigningKey>,
    pub addresses: Vec<Address>,
}

impl TestValidators {
    pub fn generate(count: usize) -> Self {
        let keys: Vec<SigningKey> = (0..count).map(|_| SigningKey::random(&mut OsRng)).collect();
        let addresses = keys
            .iter()
            .map(|key| eth_address_from_verifying_key(key.verifying_key()))
            .collect();
        Self { keys, addresses }
    }

    pub fn validator_set(&self) -> ValidatorSet {
        ValidatorSet::new(self.addresses.clone()).expect("generated addresses are unique")
    }

    /// Source-chain signature (recovery id 0 or 1) over the commitment hash.
    pub fn sign(&self, position: usize, commitment: &Commitment) -> BeefySignature {
        let hash = keccak256(&commitment.encode());
        let (signature, recovery_id) = self.keys[position]
            .sign_prehash_recoverable(hash.as_bytes())
            .expect("signing succeeds");

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte();
        out
    }

    pub fn signed_commitment(&self, commitment: Commitment, signers: &[usize]) -> SignedCommitment {
        let signatures = (0..self.keys.len())
            .map(|position| signers.contains(&position).then(|| self.sign(position, &commitment)))
            .collect();
        SignedCommitment {
            commitment,
            signatures,
        }
    }

    pub fn justification(&self, commitment: Commitment, signers: &[usize]) -> BeefyJustification {
        BeefyJustification::new(self.validator_set(), self.signed_commitment(commitment, signers))
            .expect("one signature slot per validator")
    }
}

pub fn test_commitment(block_number: u32) -> Commitment {
    Commitment {
        payload: [0xab; 32],
        block_number,
        validator_set_id: 7,
    }
}

pub fn message_payload(block_number: u64, log_index: u64) -> MessagePayload {
    MessagePayload {
        contract: Address::repeat_byte(0x11),
        topics: vec![H256::repeat_byte(0x22)],
        data: block_number.to_be_bytes().to_vec(),
        transaction_hash: H256::from_low_u64_be(block_number),
        log_index,
    }
}

/// Polls `condition` every 5ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// ============================================================================
// MOCK SOURCE CHAIN
// ============================================================================

#[derive(Default)]
pub struct MockSource {
    head: AtomicU64,
    blocks: Mutex<BTreeMap<u64, Vec<RelayPayload>>>,
    fetched: Mutex<Vec<u64>>,
    fail_connect: AtomicBool,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl MockSource {
    pub fn new(head: u64) -> Self {
        let source = Self::default();
        source.head.store(head, Ordering::SeqCst);
        source
    }

    pub fn with_block(self, number: u64, payloads: Vec<RelayPayload>) -> Self {
        self.blocks.lock().unwrap().insert(number, payloads);
        self
    }

    pub fn failing_connect(self) -> Self {
        self.fail_connect.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Block numbers queried so far, in query order.
    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainConnection for MockSource {
    fn endpoint(&self) -> &str {
        "mock://source"
    }

    async fn connect(&self) -> Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(RelayError::connection("mock://source", "connection refused"));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceChain for MockSource {
    async fn latest_block_number(&self) -> Result<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn payloads_in_block(&self, block_number: u64) -> Result<Vec<RelayPayload>> {
        self.fetched.lock().unwrap().push(block_number);
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&block_number)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// MOCK DESTINATION CHAIN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Message(MessagePayload),
    Initial(InitialMessage),
    Complete(CompleteMessage),
}

#[derive(Default)]
pub struct MockDestination {
    cursor: AtomicU64,
    submissions: Mutex<Vec<Submission>>,
    selection: Mutex<Vec<usize>>,
    next_validation_id: AtomicU64,
    fail_connect: AtomicBool,
    fail_submit: AtomicBool,
    closed: AtomicBool,
}

impl MockDestination {
    pub fn new(cursor: u64) -> Self {
        let destination = Self::default();
        destination.cursor.store(cursor, Ordering::SeqCst);
        destination.next_validation_id.store(100, Ordering::SeqCst);
        destination
    }

    /// Positions the light client "randomly" selects for every validation.
    pub fn with_selection(self, positions: &[usize]) -> Self {
        *self.selection.lock().unwrap() = positions.to_vec();
        self
    }

    pub fn failing_connect(self) -> Self {
        self.fail_connect.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_submit(self) -> Self {
        self.fail_submit.store(true, Ordering::SeqCst);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, submission: Submission) -> Result<()> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(RelayError::rpc("mock_submit", "execution reverted"));
        }
        self.submissions.lock().unwrap().push(submission);
        Ok(())
    }
}

#[async_trait]
impl ChainConnection for MockDestination {
    fn endpoint(&self) -> &str {
        "mock://destination"
    }

    async fn connect(&self) -> Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(RelayError::connection("mock://destination", "connection refused"));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DestinationChain for MockDestination {
    async fn finalized_cursor(&self) -> Result<u64> {
        Ok(self.cursor.load(Ordering::SeqCst))
    }

    async fn submit_message(&self, payload: &MessagePayload) -> Result<H256> {
        self.record(Submission::Message(payload.clone()))?;
        Ok(payload.transaction_hash)
    }

    async fn submit_initial(&self, message: &InitialMessage) -> Result<u64> {
        self.record(Submission::Initial(message.clone()))?;
        Ok(self.next_validation_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn random_bitfield(&self, _validation_id: u64, validator_count: usize) -> Result<Bitfield> {
        let selection = self.selection.lock().unwrap().clone();
        Bitfield::from_positions(validator_count, &selection)
    }

    async fn submit_complete(&self, message: &CompleteMessage) -> Result<H256> {
        self.record(Submission::Complete(message.clone()))?;
        Ok(H256::from_low_u64_be(message.id))
    }
}

// ============================================================================
// MOCK WORKERS
// ============================================================================

/// What a [`MockWorker`] does once started.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// `start` fails with a connection error
    FailConnect,
    /// One task fails after the given delay; another waits for shutdown
    FailAfter(Duration),
    /// Tasks run until shutdown
    RunUntilShutdown,
    /// `start` takes the given time to connect, then tasks run until shutdown
    SlowStart(Duration),
}

/// Counters shared between a test and the workers its factory builds.
#[derive(Debug, Clone, Default)]
pub struct WorkerProbe {
    pub built: Arc<AtomicUsize>,
    pub started: Arc<AtomicUsize>,
    pub cancelled: Arc<AtomicUsize>,
}

impl WorkerProbe {
    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct MockWorker {
    name: String,
    behavior: Behavior,
    probe: WorkerProbe,
}

#[async_trait]
impl Worker for MockWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, shutdown: Shutdown) -> Result<Vec<WorkerTask>> {
        match self.behavior {
            Behavior::FailConnect => {
                return Err(RelayError::connection(&format!("mock://{}", self.name), "connection refused"));
            }
            Behavior::SlowStart(delay) => tokio::time::sleep(delay).await,
            _ => {}
        }
        self.probe.started.fetch_add(1, Ordering::SeqCst);

        let cancelled = Arc::clone(&self.probe.cancelled);
        let mut waiter = shutdown.clone();
        let mut tasks: Vec<WorkerTask> = vec![async move {
            waiter.recv().await;
            cancelled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()];

        if let Behavior::FailAfter(delay) = self.behavior {
            let name = self.name.clone();
            tasks.push(
                async move {
                    tokio::time::sleep(delay).await;
                    Err(RelayError::rpc("mock_submit", format!("{} writer failed", name)))
                }
                .boxed(),
            );
        }

        Ok(tasks)
    }
}

/// Factory building a [`MockWorker`] named after `kind`.
pub fn mock_factory(kind: WorkerKind, enabled: bool, behavior: Behavior, probe: WorkerProbe) -> WorkerFactory {
    Box::new(move || {
        probe.built.fetch_add(1, Ordering::SeqCst);
        let worker = MockWorker {
            name: kind.name().to_string(),
            behavior,
            probe: probe.clone(),
        };
        let mut config = WorkerConfig::new(kind);
        config.enabled = enabled;
        Ok((Box::new(worker) as Box<dyn Worker>, config))
    })
}
