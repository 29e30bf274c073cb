//! Socket Wire Format.
//!
//! Length-prefixed command/response framing spoken between the socket
//! transport and a simulated bridge. It defines:
//! 1. **Commands:** A fixed 17-byte header `{u8 cmd_type, u32 addr, u64 data, u32 count}`,
//!    little-endian and packed, followed by `count` payload bytes for writes.
//! 2. **Responses:** A fixed 9-byte header `{u64 data, u8 success}`, followed by a
//!    payload for bulk reads.
//! 3. **Command Types:** One per transport operation.

use std::io::{Read, Write};

use crate::common::error::{BridgeError, Result};

/// Size of an encoded command header in bytes.
pub const COMMAND_HEADER_BYTES: usize = 17;

/// Size of an encoded response header in bytes.
pub const RESPONSE_HEADER_BYTES: usize = 9;

/// Command types carried in the first header byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    /// Write one register: `addr` = register, `data` = value.
    WriteReg = 0x01,
    /// Read one register: `addr` = register; response `data` = value.
    ReadReg = 0x02,
    /// Poll a register: `data` = expected, `count` = max polls;
    /// response `data` = last value | attempts << 32, `success` = matched.
    PollReg = 0x03,
    /// Idle clocking: `data` = cycles.
    IdleClock = 0x04,
    /// Full write transaction: `addr` = bus address, `data` = length field,
    /// `count` = payload bytes.
    PackedWrite = 0x05,
    /// Stream into the bulk write port: `count` = payload bytes.
    BulkWrite = 0x06,
    /// Stream out of the bulk read port: `count` = bytes; response carries them.
    BulkRead = 0x07,
    /// Read a register pair: `addr` = low register; response `data` = value.
    ReadReg16 = 0x08,
    /// Write a register pair: `addr` = low register, `data` = value.
    WriteReg16 = 0x09,
}

impl TryFrom<u8> for CommandType {
    type Error = BridgeError;

    fn try_from(raw: u8) -> Result<Self> {
        Ok(match raw {
            0x01 => Self::WriteReg,
            0x02 => Self::ReadReg,
            0x03 => Self::PollReg,
            0x04 => Self::IdleClock,
            0x05 => Self::PackedWrite,
            0x06 => Self::BulkWrite,
            0x07 => Self::BulkRead,
            0x08 => Self::ReadReg16,
            0x09 => Self::WriteReg16,
            other => return Err(BridgeError::link(format!("unknown command type {other:#04x}"))),
        })
    }
}

/// A decoded command header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandHeader {
    /// Operation requested.
    pub cmd_type: CommandType,
    /// Register or bus address, depending on the command.
    pub addr: u32,
    /// Value, expected value, or length field, depending on the command.
    pub data: u64,
    /// Payload length or poll count, depending on the command.
    pub count: u32,
}

impl CommandHeader {
    /// Creates a header with no payload or count.
    pub const fn new(cmd_type: CommandType, addr: u32, data: u64) -> Self {
        Self {
            cmd_type,
            addr,
            data,
            count: 0,
        }
    }

    /// Sets the count field.
    pub const fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Encodes the header into its 17-byte wire form.
    pub fn encode(&self) -> [u8; COMMAND_HEADER_BYTES] {
        let mut buf = [0u8; COMMAND_HEADER_BYTES];
        buf[0] = self.cmd_type as u8;
        buf[1..5].copy_from_slice(&self.addr.to_le_bytes());
        buf[5..13].copy_from_slice(&self.data.to_le_bytes());
        buf[13..17].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decodes a header from its 17-byte wire form.
    pub fn decode(buf: &[u8; COMMAND_HEADER_BYTES]) -> Result<Self> {
        let mut addr = [0u8; 4];
        let mut data = [0u8; 8];
        let mut count = [0u8; 4];
        addr.copy_from_slice(&buf[1..5]);
        data.copy_from_slice(&buf[5..13]);
        count.copy_from_slice(&buf[13..17]);
        Ok(Self {
            cmd_type: CommandType::try_from(buf[0])?,
            addr: u32::from_le_bytes(addr),
            data: u64::from_le_bytes(data),
            count: u32::from_le_bytes(count),
        })
    }
}

/// A decoded response header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ResponseHeader {
    /// Returned value, if any.
    pub data: u64,
    /// Whether the command succeeded.
    pub success: bool,
}

impl ResponseHeader {
    /// A successful response carrying `data`.
    pub const fn ok(data: u64) -> Self {
        Self {
            data,
            success: true,
        }
    }

    /// A failed response carrying `data`.
    pub const fn failed(data: u64) -> Self {
        Self {
            data,
            success: false,
        }
    }

    /// Encodes the header into its 9-byte wire form.
    pub fn encode(&self) -> [u8; RESPONSE_HEADER_BYTES] {
        let mut buf = [0u8; RESPONSE_HEADER_BYTES];
        buf[0..8].copy_from_slice(&self.data.to_le_bytes());
        buf[8] = u8::from(self.success);
        buf
    }

    /// Decodes a header from its 9-byte wire form.
    pub fn decode(buf: &[u8; RESPONSE_HEADER_BYTES]) -> Self {
        let mut data = [0u8; 8];
        data.copy_from_slice(&buf[0..8]);
        Self {
            data: u64::from_le_bytes(data),
            success: buf[8] != 0,
        }
    }
}

/// Writes a command header and its payload as one frame.
pub fn write_command<W: Write + ?Sized>(
    stream: &mut W,
    header: &CommandHeader,
    payload: &[u8],
) -> Result<()> {
    let mut frame = Vec::with_capacity(COMMAND_HEADER_BYTES + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(payload);
    stream.write_all(&frame)?;
    stream.flush()?;
    Ok(())
}

/// Reads a command header; returns `None` on a clean end of stream.
pub fn read_command<R: Read + ?Sized>(stream: &mut R) -> Result<Option<CommandHeader>> {
    let mut buf = [0u8; COMMAND_HEADER_BYTES];
    match stream.read_exact(&mut buf) {
        Ok(()) => CommandHeader::decode(&buf).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes a response header and its payload as one frame.
pub fn write_response<W: Write + ?Sized>(
    stream: &mut W,
    header: &ResponseHeader,
    payload: &[u8],
) -> Result<()> {
    let mut frame = Vec::with_capacity(RESPONSE_HEADER_BYTES + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(payload);
    stream.write_all(&frame)?;
    stream.flush()?;
    Ok(())
}

/// Reads a response header.
pub fn read_response<R: Read + ?Sized>(stream: &mut R) -> Result<ResponseHeader> {
    let mut buf = [0u8; RESPONSE_HEADER_BYTES];
    stream.read_exact(&mut buf)?;
    Ok(ResponseHeader::decode(&buf))
}

/// Reads exactly `len` payload bytes.
pub fn read_payload<R: Read + ?Sized>(stream: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload)?;
    Ok(payload)
}
