//! Bus address type.
//!
//! This module defines a strong type for addresses on the far side of the
//! bridge. It provides the following:
//! 1. **Type Safety:** Keeps 32-bit bus addresses apart from host offsets and lengths.
//! 2. **Line Arithmetic:** Line base, offset within a line, and alignment checks.
//! 3. **Range Checking:** Validates that a request fits inside the 32-bit address space.

use std::fmt;

use super::constants::{ADDRESS_SPACE, LINE_OFFSET_MASK};
use super::error::{BridgeError, Result};

/// An address in the bridge's 32-bit bus address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BusAddr(pub u32);

impl BusAddr {
    /// Creates a new bus address from a raw 32-bit value.
    #[inline(always)]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Returns the raw 32-bit address value.
    #[inline(always)]
    pub const fn val(self) -> u32 {
        self.0
    }

    /// Returns the address of the line containing this address.
    #[inline]
    pub const fn line_base(self) -> Self {
        Self(self.0 & !(LINE_OFFSET_MASK as u32))
    }

    /// Returns the byte offset of this address within its line (0-15).
    #[inline]
    pub const fn line_offset(self) -> usize {
        (self.0 as u64 & LINE_OFFSET_MASK) as usize
    }

    /// Returns `true` if the address falls on a line boundary.
    #[inline]
    pub const fn is_line_aligned(self) -> bool {
        self.line_offset() == 0
    }

    /// Returns the address `bytes` further on.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Distance in bytes; the caller has already range-checked it.
    ///
    /// # Returns
    ///
    /// The advanced address, wrapping at 2^32.
    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0.wrapping_add(bytes as u32))
    }

    /// Checks that `len` bytes starting here stay inside the address space.
    ///
    /// # Arguments
    ///
    /// * `len` - Length of the request in bytes.
    ///
    /// # Returns
    ///
    /// The exclusive end address as a `u64`, or `OutOfRange` if it passes 2^32.
    pub fn checked_end(self, len: usize) -> Result<u64> {
        let end = self.0 as u64 + len as u64;
        if end > ADDRESS_SPACE {
            return Err(BridgeError::OutOfRange {
                address: self.0 as u64,
                len,
            });
        }
        Ok(end)
    }

    /// Rejects addresses that are not on a line boundary.
    pub fn require_line_aligned(self, len: usize) -> Result<()> {
        if self.is_line_aligned() {
            Ok(())
        } else {
            Err(BridgeError::AlignmentViolation {
                address: self.0 as u64,
                len,
                reason: "address is not line aligned",
            })
        }
    }

    /// Returns the little-endian bytes written to the four address registers.
    #[inline]
    pub const fn register_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl From<u32> for BusAddr {
    fn from(addr: u32) -> Self {
        Self(addr)
    }
}

impl fmt::Display for BusAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
