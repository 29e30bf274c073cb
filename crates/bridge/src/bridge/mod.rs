//! Bridge access layers.
//!
//! [`BridgeClient`] runs one line-granular transaction per call; [`BusMemory`]
//! builds arbitrary byte-addressed transfers on top of it.

/// Line-granular transactions.
pub mod client;
/// Chunked byte-addressable access.
pub mod memory;
/// Timing and batch accounting hooks.
pub mod observer;

pub use client::BridgeClient;
pub use memory::{BusMemory, TransferReport};
pub use observer::{BatchEvent, BatchKind, BatchLog, Direction, Phase, TransferObserver};
