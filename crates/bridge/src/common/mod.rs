//! Common utilities and types used throughout the bridge driver.
//!
//! This module provides the building blocks shared by every layer. It includes:
//! 1. **Address Types:** Line-aligned bus address arithmetic.
//! 2. **Constants:** Line size, register field widths, and derived transfer limits.
//! 3. **Error Handling:** The `BridgeError` enum and the crate-wide `Result` alias.

/// Bus address helpers (line alignment, splitting).
pub mod addr;

/// Common constants used throughout the driver.
pub mod constants;

/// Error types.
pub mod error;

pub use addr::BusAddr;
pub use constants::{LINE_BYTES, MAX_BULK_BYTES, MAX_LINES_PER_BATCH};
pub use error::{BridgeError, Result};
