//! Transport trait for byte-level access to the bridge registers.
//!
//! This module defines the `Transport` trait implemented by every link to the
//! device. It provides:
//! 1. **Register Access:** Single-byte register writes (fire-and-forget) and reads.
//! 2. **Bulk Ports:** In-order, lossless streaming into and out of the bulk ports.
//! 3. **Link Control:** Idle clocking with the device deselected.
//! 4. **Batched Sequences:** Register-pair access, remote polling, and packed writes,
//!    with default implementations that links may override to save round trips.
//!
//! The bridge client only ever sees `Transport`; it never depends on which link is in use.

use crate::common::addr::BusAddr;
use crate::common::error::Result;
use crate::protocol::poll::{PollOutcome, PollPolicy, poll_until};
use crate::protocol::regs::{self, Command};

/// FTDI MPSSE (USB-to-SPI) link.
pub mod mpsse;
/// TCP link to a simulated bridge.
pub mod socket;
/// Command/response framing for the TCP link.
pub mod wire;

pub use mpsse::{MpsseConfig, MpsseTransport};
pub use socket::SocketTransport;

/// Trait for links that expose the bridge's 8-bit register file.
///
/// Implementors provide the five primitive operations; the provided methods
/// compose them and may be overridden when the link can batch the sequence.
pub trait Transport: Send {
    /// Returns a short name for this link (e.g., `"mpsse"`, `"socket"`).
    fn name(&self) -> &str;

    /// Writes one register. No acknowledgement is required.
    fn write_register(&mut self, addr: u8, value: u8) -> Result<()>;

    /// Reads one register.
    fn read_register(&mut self, addr: u8) -> Result<u8>;

    /// Streams `data` into the bulk write port, in order and without loss.
    fn write_bulk(&mut self, data: &[u8]) -> Result<()>;

    /// Reads exactly `len` bytes from the bulk read port.
    ///
    /// Fails with a transport error if fewer bytes arrive in time.
    fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Clocks the link for `cycles` with the device deselected.
    fn idle_clock(&mut self, cycles: u32) -> Result<()>;

    /// Writes a little-endian register pair starting at `lo_addr`.
    fn write_register16(&mut self, lo_addr: u8, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.write_register(lo_addr, lo)?;
        self.write_register(lo_addr + 1, hi)
    }

    /// Reads a little-endian register pair starting at `lo_addr`.
    fn read_register16(&mut self, lo_addr: u8) -> Result<u16> {
        let lo = self.read_register(lo_addr)?;
        let hi = self.read_register(lo_addr + 1)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Polls `addr` until it reads `expected` or the policy runs out.
    fn poll_register(
        &mut self,
        addr: u8,
        expected: u8,
        policy: &PollPolicy,
    ) -> Result<PollOutcome<u8>> {
        poll_until(policy, || self.read_register(addr), |v| *v == expected)
    }

    /// Issues a complete write transaction without waiting for completion.
    ///
    /// Programs the address registers, the line-count field, the bulk length,
    /// streams `payload`, and writes `WRITE_START`, in that order.
    fn packed_write(&mut self, address: BusAddr, length_field: u16, payload: &[u8]) -> Result<()> {
        for (reg, byte) in regs::ADDRESS_REGS.iter().zip(address.register_bytes()) {
            self.write_register(*reg, byte)?;
        }
        self.write_register16(regs::LEN_LO, length_field)?;
        self.write_register16(regs::BULK_LEN_LO, payload.len() as u16)?;
        self.write_bulk(payload)?;
        self.write_register(regs::CMD, Command::WriteStart.code())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<()> {
        (**self).write_register(addr, value)
    }

    fn read_register(&mut self, addr: u8) -> Result<u8> {
        (**self).read_register(addr)
    }

    fn write_bulk(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_bulk(data)
    }

    fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>> {
        (**self).read_bulk(len)
    }

    fn idle_clock(&mut self, cycles: u32) -> Result<()> {
        (**self).idle_clock(cycles)
    }

    fn write_register16(&mut self, lo_addr: u8, value: u16) -> Result<()> {
        (**self).write_register16(lo_addr, value)
    }

    fn read_register16(&mut self, lo_addr: u8) -> Result<u16> {
        (**self).read_register16(lo_addr)
    }

    fn poll_register(
        &mut self,
        addr: u8,
        expected: u8,
        policy: &PollPolicy,
    ) -> Result<PollOutcome<u8>> {
        (**self).poll_register(addr, expected, policy)
    }

    fn packed_write(&mut self, address: BusAddr, length_field: u16, payload: &[u8]) -> Result<()> {
        (**self).packed_write(address, length_field, payload)
    }
}
