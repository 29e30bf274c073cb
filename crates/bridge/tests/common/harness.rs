use spibridge_core::bridge::{BridgeClient, BusMemory};
use spibridge_core::config::TransferConfig;
use spibridge_core::protocol::PollPolicy;
use spibridge_core::sim::BridgeModel;
use tracing_subscriber::EnvFilter;

/// Polls allowed per wait in tests; the model never needs more than its latency.
pub const TEST_POLLS: u32 = 64;

/// Installs a test-friendly subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builds a client over `model` that polls back to back.
pub fn client(model: BridgeModel) -> BridgeClient<BridgeModel> {
    init_tracing();
    let mut client = BridgeClient::new(model);
    client.set_policy(PollPolicy::immediate(TEST_POLLS));
    client.set_idle_cycles(8);
    client
}

/// A memory engine wired to a fresh bridge model.
pub struct TestContext {
    pub memory: BusMemory<BridgeModel>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_transfer(TransferConfig::default())
    }

    pub fn with_transfer(transfer: TransferConfig) -> Self {
        Self {
            memory: BusMemory::new(client(BridgeModel::new()), transfer),
        }
    }

    /// Small batches, so short requests still span several transactions.
    pub fn with_batches(read_bytes: usize, write_bytes: usize) -> Self {
        Self::with_transfer(TransferConfig {
            read_batch_bytes: read_bytes,
            write_batch_bytes: write_bytes,
            ..TransferConfig::default()
        })
    }

    pub fn model(&self) -> &BridgeModel {
        self.memory.client().transport()
    }

    pub fn model_mut(&mut self) -> &mut BridgeModel {
        self.memory.client_mut().transport_mut()
    }
}

/// Deterministic non-repeating-ish fill pattern.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
