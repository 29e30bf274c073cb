//! Image loading and simulation support.
//!
//! Provides the image loader and execution control used against real hardware,
//! plus an in-process model of the bridge and a TCP peer that serves it, so
//! the full driver can run without a device attached.

/// ELF program-header parsing into loadable segments.
pub mod elf;
/// Segment loading and execution control.
pub mod loader;
/// In-process bridge model implementing `Transport`.
pub mod model;
/// TCP server exposing a bridge model over the socket protocol.
pub mod peer;

pub use loader::{Image, ImageLoader, LoadOptions, LoadReport, Segment};
pub use model::BridgeModel;
pub use peer::SocketPeer;
