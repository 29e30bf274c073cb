//! # Unit Components
//!
//! Tests for each layer of the driver, from register framing up to image loading.



/// ELF program-header parsing.
pub mod elf;

/// Image loading and execution control.
pub mod loader;

/// Chunked memory access: round trips, alignment, batching.
pub mod memory;
