//! Configuration system for the bridge driver.
//!
//! This module defines the configuration structures used to parameterize the
//! driver. It provides:
//! 1. **Defaults:** Baseline polling limits, batch sizes, and control addresses.
//! 2. **Structures:** Hierarchical config for polling, transfers, execution control, and links.
//! 3. **Loading:** JSON deserialization with per-field defaults, plus validation.
//!
//! Any field missing from the JSON document takes its default, so `{}` is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::common::constants::{LINE_BYTES, MAX_LINES_PER_BATCH, WORD_BYTES};
use crate::common::error::{BridgeError, Result};
use crate::protocol::poll::PollPolicy;
use crate::transport::mpsse::{self, MpsseConfig};

/// Default configuration constants for the driver.
mod defaults {
    /// Status polls before a transaction is declared stuck.
    pub const POLL_MAX_ATTEMPTS: u32 = 1000;

    /// Sleep between status polls, in microseconds.
    pub const POLL_DELAY_US: u64 = 50;

    /// Wall-clock budget for one polling loop, in milliseconds.
    pub const POLL_TIMEOUT_MS: u64 = 2000;

    /// Largest read batch (4 KiB, the device's bulk-read buffer).
    pub const READ_BATCH_BYTES: usize = 4096;

    /// Largest write batch (4 KiB).
    pub const WRITE_BATCH_BYTES: usize = 4096;

    /// Image load granularity for progress reporting (4 KiB pages).
    pub const LOAD_PAGE_BYTES: usize = 4096;

    /// Idle clocks issued after each transaction to flush the synchronizers.
    pub const IDLE_CYCLES: u32 = 8;

    /// Program counter control word.
    pub const PC_ADDRESS: u32 = 0x0200_0000;

    /// Reset / clock-gate control word.
    pub const RESET_ADDRESS: u32 = 0x0200_0004;

    /// Reset held (bit 0) and clock gated (bit 1).
    pub const RESET_HOLD_VALUE: u32 = 0x3;

    /// Simulated bridge address.
    pub const SOCKET_ADDR: &str = "127.0.0.1:7777";

    /// Socket read/write timeout, in milliseconds.
    pub const SOCKET_TIMEOUT_MS: u64 = 5000;

    /// Largest bulk payload per socket command.
    pub const MAX_FRAME: usize = 512;

    /// SPI clock for the MPSSE link (1 MHz).
    pub const MPSSE_CLOCK_HZ: u32 = 1_000_000;

    /// Largest bulk payload per MPSSE chip-select frame.
    pub const MPSSE_MAX_CHUNK: usize = 512;
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Status polling limits.
    pub poll: PollConfig,
    /// Batch sizes and link flushing.
    pub transfer: TransferConfig,
    /// Execution-control addresses.
    pub control: ControlConfig,
    /// Link parameters.
    pub link: LinkConfig,
}

impl Config {
    /// Parses and validates a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| BridgeError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Checks cross-field invariants.
    ///
    /// Batch sizes must be nonzero multiples of the line size that fit the
    /// bulk registers; control addresses must be word aligned.
    pub fn validate(&self) -> Result<()> {
        let t = &self.transfer;
        check_batch("transfer.read_batch_bytes", t.read_batch_bytes)?;
        check_batch("transfer.write_batch_bytes", t.write_batch_bytes)?;
        if t.load_page_bytes == 0 || t.load_page_bytes % LINE_BYTES != 0 {
            return Err(BridgeError::config(format!(
                "transfer.load_page_bytes must be a nonzero multiple of {LINE_BYTES}, got {}",
                t.load_page_bytes
            )));
        }
        for (field, addr) in [
            ("control.pc_address", self.control.pc_address),
            ("control.reset_address", self.control.reset_address),
        ] {
            if addr as usize % WORD_BYTES != 0 {
                return Err(BridgeError::config(format!(
                    "{field} must be {WORD_BYTES}-byte aligned, got {addr:#x}"
                )));
            }
        }
        if self.link.max_frame == 0 || self.link.mpsse_max_chunk == 0 {
            return Err(BridgeError::config("link frame sizes must be nonzero"));
        }
        if self.link.mpsse_max_chunk > mpsse::MAX_CHUNK {
            return Err(BridgeError::config(format!(
                "link.mpsse_max_chunk must be at most {}, got {}",
                mpsse::MAX_CHUNK,
                self.link.mpsse_max_chunk
            )));
        }
        Ok(())
    }
}

/// Checks that a batch size is a whole number of lines within the bulk limit.
fn check_batch(field: &str, bytes: usize) -> Result<()> {
    let max = MAX_LINES_PER_BATCH * LINE_BYTES;
    if bytes == 0 || bytes % LINE_BYTES != 0 || bytes > max {
        return Err(BridgeError::config(format!(
            "{field} must be a multiple of {LINE_BYTES} in 16..={max}, got {bytes}"
        )));
    }
    Ok(())
}

/// Status polling limits.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum polls per wait.
    #[serde(default = "PollConfig::default_max_attempts")]
    pub max_attempts: u32,

    /// Sleep between polls in microseconds.
    #[serde(default = "PollConfig::default_delay_us")]
    pub delay_us: u64,

    /// Wall-clock budget per wait in milliseconds.
    #[serde(default = "PollConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl PollConfig {
    /// Returns the default number of polls.
    fn default_max_attempts() -> u32 {
        defaults::POLL_MAX_ATTEMPTS
    }

    /// Returns the default inter-poll delay.
    fn default_delay_us() -> u64 {
        defaults::POLL_DELAY_US
    }

    /// Returns the default polling budget.
    fn default_timeout_ms() -> u64 {
        defaults::POLL_TIMEOUT_MS
    }

    /// Converts to the policy consumed by the polling primitive.
    pub const fn policy(&self) -> PollPolicy {
        PollPolicy::new(
            self.max_attempts,
            Duration::from_micros(self.delay_us),
            Duration::from_millis(self.timeout_ms),
        )
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::POLL_MAX_ATTEMPTS,
            delay_us: defaults::POLL_DELAY_US,
            timeout_ms: defaults::POLL_TIMEOUT_MS,
        }
    }
}

/// Batch sizes and link flushing.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TransferConfig {
    /// Largest multi-line read, in bytes.
    #[serde(default = "TransferConfig::default_read_batch")]
    pub read_batch_bytes: usize,

    /// Largest multi-line write, in bytes.
    #[serde(default = "TransferConfig::default_write_batch")]
    pub write_batch_bytes: usize,

    /// Image load step, in bytes.
    #[serde(default = "TransferConfig::default_load_page")]
    pub load_page_bytes: usize,

    /// Issue multi-line writes as one packed sequence.
    #[serde(default = "TransferConfig::default_packed_writes")]
    pub packed_writes: bool,

    /// Idle clocks after each transaction.
    #[serde(default = "TransferConfig::default_idle_cycles")]
    pub idle_cycles: u32,
}

impl TransferConfig {
    /// Returns the default read batch size.
    fn default_read_batch() -> usize {
        defaults::READ_BATCH_BYTES
    }

    /// Returns the default write batch size.
    fn default_write_batch() -> usize {
        defaults::WRITE_BATCH_BYTES
    }

    /// Returns the default image load step.
    fn default_load_page() -> usize {
        defaults::LOAD_PAGE_BYTES
    }

    /// Packed writes are on by default.
    fn default_packed_writes() -> bool {
        true
    }

    /// Returns the default idle clock count.
    fn default_idle_cycles() -> u32 {
        defaults::IDLE_CYCLES
    }

    /// Lines per read batch.
    pub const fn read_batch_lines(&self) -> usize {
        self.read_batch_bytes / LINE_BYTES
    }

    /// Lines per write batch.
    pub const fn write_batch_lines(&self) -> usize {
        self.write_batch_bytes / LINE_BYTES
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            read_batch_bytes: defaults::READ_BATCH_BYTES,
            write_batch_bytes: defaults::WRITE_BATCH_BYTES,
            load_page_bytes: defaults::LOAD_PAGE_BYTES,
            packed_writes: true,
            idle_cycles: defaults::IDLE_CYCLES,
        }
    }
}

/// Execution-control word addresses on the target.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ControlConfig {
    /// Program counter word.
    #[serde(default = "ControlConfig::default_pc")]
    pub pc_address: u32,

    /// Reset / clock-gate word.
    #[serde(default = "ControlConfig::default_reset")]
    pub reset_address: u32,

    /// Value that holds the core in reset with its clock gated.
    #[serde(default = "ControlConfig::default_hold")]
    pub reset_hold_value: u32,
}

impl ControlConfig {
    fn default_pc() -> u32 {
        defaults::PC_ADDRESS
    }

    fn default_reset() -> u32 {
        defaults::RESET_ADDRESS
    }

    fn default_hold() -> u32 {
        defaults::RESET_HOLD_VALUE
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            pc_address: defaults::PC_ADDRESS,
            reset_address: defaults::RESET_ADDRESS,
            reset_hold_value: defaults::RESET_HOLD_VALUE,
        }
    }
}

/// Link parameters for both transports.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LinkConfig {
    /// Simulated bridge address.
    #[serde(default = "LinkConfig::default_socket_addr")]
    pub socket_addr: String,

    /// Socket timeout in milliseconds.
    #[serde(default = "LinkConfig::default_socket_timeout")]
    pub socket_timeout_ms: u64,

    /// Largest bulk payload per socket command.
    #[serde(default = "LinkConfig::default_max_frame")]
    pub max_frame: usize,

    /// MPSSE SPI clock in Hz.
    #[serde(default = "LinkConfig::default_mpsse_clock")]
    pub mpsse_clock_hz: u32,

    /// Largest bulk payload per MPSSE frame.
    #[serde(default = "LinkConfig::default_mpsse_chunk")]
    pub mpsse_max_chunk: usize,
}

impl LinkConfig {
    fn default_socket_addr() -> String {
        defaults::SOCKET_ADDR.to_string()
    }

    fn default_socket_timeout() -> u64 {
        defaults::SOCKET_TIMEOUT_MS
    }

    fn default_max_frame() -> usize {
        defaults::MAX_FRAME
    }

    fn default_mpsse_clock() -> u32 {
        defaults::MPSSE_CLOCK_HZ
    }

    fn default_mpsse_chunk() -> usize {
        defaults::MPSSE_MAX_CHUNK
    }

    /// Socket timeout as a `Duration`.
    pub const fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    /// MPSSE link parameters.
    pub const fn mpsse(&self) -> MpsseConfig {
        MpsseConfig {
            clock_hz: self.mpsse_clock_hz,
            max_chunk: self.mpsse_max_chunk,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            socket_addr: defaults::SOCKET_ADDR.to_string(),
            socket_timeout_ms: defaults::SOCKET_TIMEOUT_MS,
            max_frame: defaults::MAX_FRAME,
            mpsse_clock_hz: defaults::MPSSE_CLOCK_HZ,
            mpsse_max_chunk: defaults::MPSSE_MAX_CHUNK,
        }
    }
}
