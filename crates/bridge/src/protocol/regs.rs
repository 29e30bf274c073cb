//! Bridge Register Map.
//!
//! Register addresses and command/status codes exposed by the device-side
//! bridge. These values are a wire contract with the RTL and must not change.
//! 1. **Control:** Address bytes, line-count pair, command, bulk length pair, scratch.
//! 2. **Status:** Main (read) status, write status, bulk-read byte count pair.
//! 3. **Data Ports:** Single-address streaming ports for bulk payloads.

use std::fmt;

use crate::common::constants::MAX_LINES_PER_TRANSACTION;

/// Bus address bits 7:0.
pub const ADDR0: u8 = 0x00;
/// Bus address bits 15:8.
pub const ADDR1: u8 = 0x01;
/// Bus address bits 23:16.
pub const ADDR2: u8 = 0x02;
/// Bus address bits 31:24.
pub const ADDR3: u8 = 0x03;
/// Line count minus one, low byte.
pub const LEN_LO: u8 = 0x04;
/// Line count minus one, high byte.
pub const LEN_HI: u8 = 0x05;
/// Command register.
pub const CMD: u8 = 0x06;
/// Main status; tracks read transactions.
pub const STATUS: u8 = 0x07;
/// Write status; tracks write transactions.
pub const WRITE_STATUS: u8 = 0x08;
/// Bytes drained into the bulk-read buffer, low byte.
pub const RD_COUNT_LO: u8 = 0x09;
/// Bytes drained into the bulk-read buffer, high byte.
pub const RD_COUNT_HI: u8 = 0x0A;
/// Bulk port transfer length, low byte.
pub const BULK_LEN_LO: u8 = 0x0B;
/// Bulk port transfer length, high byte.
pub const BULK_LEN_HI: u8 = 0x0C;
/// Streaming write port.
pub const BULK_WRITE_PORT: u8 = 0x0D;
/// Streaming read port.
pub const BULK_READ_PORT: u8 = 0x0E;
/// Scratch register; no side effects.
pub const SCRATCH: u8 = 0x0F;

/// Number of addressable registers.
pub const REGISTER_COUNT: usize = 16;

/// Address bit that marks a write in the SPI framing.
pub const WRITE_FLAG: u8 = 0x80;

/// The four address registers, least significant byte first.
pub const ADDRESS_REGS: [u8; 4] = [ADDR0, ADDR1, ADDR2, ADDR3];

/// Returns a short register name for logs and error messages.
pub const fn name(addr: u8) -> &'static str {
    match addr {
        ADDR0 => "ADDR0",
        ADDR1 => "ADDR1",
        ADDR2 => "ADDR2",
        ADDR3 => "ADDR3",
        LEN_LO => "LEN_LO",
        LEN_HI => "LEN_HI",
        CMD => "CMD",
        STATUS => "STATUS",
        WRITE_STATUS => "WRITE_STATUS",
        RD_COUNT_LO => "RD_COUNT",
        RD_COUNT_HI => "RD_COUNT_HI",
        BULK_LEN_LO => "BULK_LEN",
        BULK_LEN_HI => "BULK_LEN_HI",
        BULK_WRITE_PORT => "BULK_WRITE_PORT",
        BULK_READ_PORT => "BULK_READ_PORT",
        SCRATCH => "SCRATCH",
        _ => "UNKNOWN",
    }
}

/// Encodes a line count into the length register value (count - 1).
///
/// # Returns
///
/// `None` if `lines` is zero or exceeds the 16-bit field.
pub const fn length_field(lines: usize) -> Option<u16> {
    if lines == 0 || lines > MAX_LINES_PER_TRANSACTION {
        None
    } else {
        Some((lines - 1) as u16)
    }
}

/// Opcodes accepted by the command register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Idle; acknowledges a finished transaction.
    Null = 0x00,
    /// Start a line read at the programmed address.
    ReadStart = 0x01,
    /// Start a line write from the bulk write buffer.
    WriteStart = 0x02,
}

impl Command {
    /// Returns the raw register value.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0x00 => Ok(Self::Null),
            0x01 => Ok(Self::ReadStart),
            0x02 => Ok(Self::WriteStart),
            other => Err(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::ReadStart => write!(f, "READ_START"),
            Self::WriteStart => write!(f, "WRITE_START"),
        }
    }
}

/// Transaction states reported by the status registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Status {
    /// No transaction.
    #[default]
    Idle = 0x00,
    /// Transaction accepted, bus access in progress.
    Busy = 0x01,
    /// Bus access complete.
    Done = 0x02,
    /// The bridge rejected or failed the transaction.
    Error = 0x03,
}

impl Status {
    /// Returns the raw register value.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decodes a raw status register value.
    ///
    /// # Returns
    ///
    /// `None` for values outside the four defined states.
    pub const fn from_code(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::Idle),
            0x01 => Some(Self::Busy),
            0x02 => Some(Self::Done),
            0x03 => Some(Self::Error),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, u8> {
        Self::from_code(raw).ok_or(raw)
    }
}
