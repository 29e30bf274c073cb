//! Host-side driver for a polled SPI-to-bus bridge.
//!
//! This crate reconstructs 128-bit on-chip bus transactions out of a narrow,
//! byte-serial register interface. It is organised as follows:
//! 1. **Protocol:** Register map, command/status codes, and the bounded polling primitive.
//! 2. **Transport:** The `Transport` trait plus FTDI MPSSE and TCP socket implementations.
//! 3. **Bridge:** Line-granular client, chunked byte-addressable memory access, transfer observers.
//! 4. **Simulation:** Image loading and execution control, ELF segments, a device model and its socket peer.
//! 5. **Support:** Configuration, error types, constants, and transfer statistics.

/// Line-granular client and chunked memory access.
pub mod bridge;
/// Common types and constants (line arithmetic, errors).
pub mod common;
/// Driver configuration (defaults, JSON loading, validation).
pub mod config;
/// Register map and polling.
pub mod protocol;
/// Image loading, ELF segments, device model and socket peer.
pub mod sim;
/// Transfer statistics collection and reporting.
pub mod stats;
/// Byte-level links to the bridge (MPSSE, TCP socket).
pub mod transport;

/// Line-granular bridge client; construct with `BridgeClient::new`.
pub use crate::bridge::BridgeClient;
/// Byte-addressable memory access over a bridge client.
pub use crate::bridge::BusMemory;
/// Error and result types shared by every layer.
pub use crate::common::error::{BridgeError, Result};
/// Root configuration type; use `Config::default()` or load from JSON.
pub use crate::config::Config;
/// Image loader and execution control.
pub use crate::sim::loader::{Image, ImageLoader, Segment};
/// Transport abstraction implemented by every link.
pub use crate::transport::Transport;
