//! Bridge error definitions.
//!
//! This module defines every failure the driver can report. It provides:
//! 1. **Link Failures:** I/O errors from the socket or USB adapter.
//! 2. **Protocol Failures:** Polling timeouts, byte-count desyncs, and device-reported faults.
//! 3. **Caller Errors:** Misaligned or oversized requests, rejected before any wire activity.
//!
//! No layer retries on its own; every error carries the address and the
//! expected/actual values so the caller can log and decide.

use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while driving the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Socket or adapter I/O failed; the link should be considered unusable.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// A status or byte-count poll ran out of attempts or time.
    #[error(
        "timed out polling {register} for {address:#010x}: expected {expected:#x}, last read {last:#x} after {attempts} polls"
    )]
    ProtocolTimeout {
        /// Name of the register being polled.
        register: &'static str,
        /// Bus address of the transaction in flight.
        address: u32,
        /// Value the poll was waiting for.
        expected: u16,
        /// Last value read.
        last: u16,
        /// Number of polls performed.
        attempts: u32,
    },

    /// The device drained a different number of bytes than requested.
    #[error("size mismatch at {address:#010x}: expected {expected} bytes, device reported {actual}")]
    SizeMismatch {
        /// Bus address of the transaction.
        address: u32,
        /// Bytes requested.
        expected: usize,
        /// Bytes reported or delivered.
        actual: usize,
    },

    /// The request violates an alignment invariant.
    #[error("alignment violation at {address:#x} (+{len} bytes): {reason}")]
    AlignmentViolation {
        /// Offending address.
        address: u64,
        /// Request length in bytes.
        len: usize,
        /// Which invariant was violated.
        reason: &'static str,
    },

    /// A status register reported `ERROR`.
    #[error("device reported error status {status:#04x} for {address:#010x}")]
    DeviceFault {
        /// Bus address of the transaction.
        address: u32,
        /// Raw status value read.
        status: u8,
    },

    /// A single transfer exceeds what the length registers can describe.
    #[error("transfer of {len} bytes exceeds the {max}-byte limit")]
    TooLarge {
        /// Requested length.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// The request runs past the end of the 32-bit address space.
    #[error("request at {address:#x} (+{len} bytes) leaves the 32-bit address space")]
    OutOfRange {
        /// Start address.
        address: u64,
        /// Request length in bytes.
        len: usize,
    },

    /// Read-back after a load did not match what was written.
    #[error("verify failed at {address:#010x}: wrote {expected:#04x}, read {actual:#04x}")]
    VerifyMismatch {
        /// First differing address.
        address: u32,
        /// Byte written.
        expected: u8,
        /// Byte read back.
        actual: u8,
    },

    /// Execution control was requested before any image was loaded.
    #[error("no image has been loaded")]
    NotLoaded,

    /// An executable image could not be parsed.
    #[error("invalid image: {reason}")]
    Image {
        /// Reason for failure.
        reason: String,
    },

    /// Configuration is malformed or inconsistent.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Reason for failure.
        reason: String,
    },
}

impl BridgeError {
    /// Create an image error.
    pub fn image(reason: impl Into<String>) -> Self {
        Self::Image {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a transport error from a message, for link failures that are not OS errors.
    pub fn link(reason: impl Into<String>) -> Self {
        Self::Transport(std::io::Error::other(reason.into()))
    }

    /// Returns `true` if the link should be reset before further use.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::SizeMismatch { .. })
    }
}
