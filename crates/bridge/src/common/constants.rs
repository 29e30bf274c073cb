//! Global Driver Constants.
//!
//! This module defines the constants that follow from the bridge's register
//! widths. It includes:
//! 1. **Line Constants:** Bus line size and alignment masks.
//! 2. **Field Limits:** Maximum values of the length and bulk registers.
//! 3. **Transfer Limits:** The largest transaction the registers can describe.

/// Size of one bus line in bytes (128-bit bus).
pub const LINE_BYTES: usize = 16;

/// Mask for extracting the byte offset within a line.
pub const LINE_OFFSET_MASK: u64 = LINE_BYTES as u64 - 1;

/// Largest line count the length register pair can encode (count - 1 in 16 bits).
pub const MAX_LINES_PER_TRANSACTION: usize = 1 << 16;

/// Largest byte count the bulk length and bulk-read count registers can hold.
pub const MAX_BULK_BYTES: usize = 0xFFFF;

/// Largest line count one transaction can move through the bulk ports.
pub const MAX_LINES_PER_BATCH: usize = MAX_BULK_BYTES / LINE_BYTES;

/// Size of the bus address space (32-bit address registers).
pub const ADDRESS_SPACE: u64 = 1 << 32;

/// Size of a control word poked by the execution-control sequence.
pub const WORD_BYTES: usize = 4;
