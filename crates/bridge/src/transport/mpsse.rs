//! FTDI MPSSE transport.
//!
//! Frames bridge register accesses as SPI transactions using the MPSSE
//! command set of FT2232H/FT232H adapters. The transport is generic over the
//! raw byte link to the chip (anything `Read + Write`), so the USB driver stays
//! outside this crate.
//!
//! # Framing
//!
//! | Access         | MOSI bytes                          | MISO bytes |
//! |----------------|-------------------------------------|------------|
//! | register write | `0x80 \| addr`, value               | -          |
//! | register read  | `addr`                              | value      |
//! | bulk write     | `0x80 \| BULK_WRITE_PORT`, payload  | -          |
//! | bulk read      | `BULK_READ_PORT`                    | payload    |
//!
//! Each access is one chip-select assertion. Data is shifted out on the
//! rising edge and sampled on the falling edge, with 3-phase clocking for
//! extra hold margin on reads.

use std::fmt;
use std::io::{Read, Write};

use tracing::{debug, trace};

use super::Transport;
use crate::common::addr::BusAddr;
use crate::common::error::{BridgeError, Result};
use crate::protocol::regs::{self, Command, WRITE_FLAG};

/// MPSSE opcodes and pin assignments used by this transport.
mod op {
    /// Shift bytes out, MSB first, on the rising edge.
    pub const WRITE_BYTES: u8 = 0x10;
    /// Shift bytes in, MSB first, sampled on the falling edge.
    pub const READ_BYTES: u8 = 0x24;
    /// Set the low GPIO byte: value, direction.
    pub const SET_BITS_LOW: u8 = 0x80;
    /// Disconnect TDI/TDO loopback.
    pub const LOOPBACK_OFF: u8 = 0x85;
    /// Set the clock divisor: low, high.
    pub const SET_DIVISOR: u8 = 0x86;
    /// Flush the read buffer back to the host.
    pub const SEND_IMMEDIATE: u8 = 0x87;
    /// Use the 60 MHz master clock.
    pub const DISABLE_DIV5: u8 = 0x8A;
    /// Enable 3-phase data clocking.
    pub const ENABLE_3_PHASE: u8 = 0x8C;
    /// Clock `n + 1` bits with no data transfer.
    pub const CLOCK_BITS: u8 = 0x8E;
    /// Clock `(n + 1) * 8` bits with no data transfer.
    pub const CLOCK_BYTES: u8 = 0x8F;
    /// Disable adaptive clocking.
    pub const DISABLE_ADAPTIVE: u8 = 0x97;

    /// SK (clock) on ADBUS0.
    pub const PIN_SK: u8 = 0x01;
    /// DO (MOSI) on ADBUS1.
    pub const PIN_DO: u8 = 0x02;
    /// CS# on ADBUS3.
    pub const PIN_CS: u8 = 0x08;
}

/// MPSSE master clock with divide-by-5 disabled.
const MASTER_CLOCK_HZ: u32 = 60_000_000;

/// Largest length one MPSSE data command can carry.
const MAX_COMMAND_BYTES: usize = 65536;

/// Largest bulk payload per frame: the port header shares the data command.
pub const MAX_CHUNK: usize = MAX_COMMAND_BYTES - 1;

/// Link parameters for the MPSSE transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MpsseConfig {
    /// Target SPI clock in Hz.
    pub clock_hz: u32,
    /// Largest bulk payload per chip-select frame, bounded by the adapter's buffers.
    ///
    /// Clamped to `1..=`[`MAX_CHUNK`] when the transport is opened.
    pub max_chunk: usize,
}

impl Default for MpsseConfig {
    fn default() -> Self {
        Self {
            clock_hz: 1_000_000,
            max_chunk: 512,
        }
    }
}

impl MpsseConfig {
    /// Computes the divisor for `clock_hz` with 3-phase clocking enabled.
    ///
    /// With 3-phase clocking the SPI clock is `60 MHz / ((1 + divisor) * 3)`.
    pub fn divisor(&self) -> u16 {
        let hz = self.clock_hz.max(1);
        let div = (MASTER_CLOCK_HZ / 3).div_ceil(hz).saturating_sub(1);
        div.min(u16::MAX as u32) as u16
    }
}

/// SPI-over-MPSSE transport to the bridge.
pub struct MpsseTransport<L> {
    link: L,
    config: MpsseConfig,
}

impl<L> fmt::Debug for MpsseTransport<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpsseTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<L: Read + Write> MpsseTransport<L> {
    /// Configures the MPSSE engine on `link` and returns the transport.
    ///
    /// The link must already be in MPSSE bit mode with its buffers purged.
    pub fn open(mut link: L, mut config: MpsseConfig) -> Result<Self> {
        config.max_chunk = config.max_chunk.clamp(1, MAX_CHUNK);
        let [div_lo, div_hi] = config.divisor().to_le_bytes();
        let init = [
            op::DISABLE_DIV5,
            op::DISABLE_ADAPTIVE,
            op::ENABLE_3_PHASE,
            op::LOOPBACK_OFF,
            op::SET_DIVISOR,
            div_lo,
            div_hi,
            op::SET_BITS_LOW,
            Self::IDLE_PINS,
            Self::PIN_DIRECTION,
        ];
        link.write_all(&init)?;
        link.flush()?;
        debug!(clock_hz = config.clock_hz, divisor = config.divisor(), "mpsse engine configured");
        Ok(Self { link, config })
    }

    /// Pins at rest: CS# high, clock low.
    const IDLE_PINS: u8 = op::PIN_CS;
    /// Outputs: SK, DO, CS#.
    const PIN_DIRECTION: u8 = op::PIN_SK | op::PIN_DO | op::PIN_CS;

    /// Consumes the transport and returns the underlying link.
    pub fn into_inner(self) -> L {
        self.link
    }

    /// Appends a chip-select assertion.
    fn select(cmd: &mut Vec<u8>) {
        cmd.extend_from_slice(&[op::SET_BITS_LOW, Self::IDLE_PINS & !op::PIN_CS, Self::PIN_DIRECTION]);
    }

    /// Appends a chip-select release.
    fn deselect(cmd: &mut Vec<u8>) {
        cmd.extend_from_slice(&[op::SET_BITS_LOW, Self::IDLE_PINS, Self::PIN_DIRECTION]);
    }

    /// Appends a data command header for `len` bytes (length encoded as len - 1).
    fn data_command(cmd: &mut Vec<u8>, opcode: u8, len: usize) {
        let [lo, hi] = ((len - 1) as u16).to_le_bytes();
        cmd.extend_from_slice(&[opcode, lo, hi]);
    }

    /// Appends one framed write of `header` followed by `payload`.
    fn queue_write(cmd: &mut Vec<u8>, header: u8, payload: &[u8]) {
        Self::select(cmd);
        Self::data_command(cmd, op::WRITE_BYTES, 1 + payload.len());
        cmd.push(header);
        cmd.extend_from_slice(payload);
        Self::deselect(cmd);
    }

    /// Appends one framed read: `header` out, then `len` bytes in.
    fn queue_read(cmd: &mut Vec<u8>, header: u8, len: usize) {
        Self::select(cmd);
        Self::data_command(cmd, op::WRITE_BYTES, 1);
        cmd.push(header);
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(MAX_COMMAND_BYTES);
            Self::data_command(cmd, op::READ_BYTES, chunk);
            remaining -= chunk;
        }
        Self::deselect(cmd);
    }

    /// Sends queued commands.
    fn send(&mut self, cmd: &[u8]) -> Result<()> {
        self.link.write_all(cmd)?;
        self.link.flush()?;
        Ok(())
    }

    /// Sends queued commands followed by `SEND_IMMEDIATE` and reads `len` bytes back.
    fn send_and_receive(&mut self, mut cmd: Vec<u8>, len: usize) -> Result<Vec<u8>> {
        cmd.push(op::SEND_IMMEDIATE);
        self.send(&cmd)?;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.link.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(BridgeError::link(format!(
                    "mpsse read returned {filled} of {len} bytes"
                )));
            }
            filled += n;
        }
        Ok(buf)
    }
}

impl<L: Read + Write + Send> Transport for MpsseTransport<L> {
    fn name(&self) -> &str {
        "mpsse"
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<()> {
        trace!(reg = regs::name(addr), value, "mpsse write");
        let mut cmd = Vec::with_capacity(12);
        Self::queue_write(&mut cmd, WRITE_FLAG | addr, &[value]);
        self.send(&cmd)
    }

    fn read_register(&mut self, addr: u8) -> Result<u8> {
        let mut cmd = Vec::with_capacity(16);
        Self::queue_read(&mut cmd, addr, 1);
        let value = self.send_and_receive(cmd, 1)?[0];
        trace!(reg = regs::name(addr), value, "mpsse read");
        Ok(value)
    }

    fn write_bulk(&mut self, data: &[u8]) -> Result<()> {
        let mut cmd = Vec::with_capacity(data.len() + 16);
        for chunk in data.chunks(self.config.max_chunk) {
            cmd.clear();
            Self::queue_write(&mut cmd, WRITE_FLAG | regs::BULK_WRITE_PORT, chunk);
            self.send(&cmd)?;
        }
        Ok(())
    }

    fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let chunk = (len - out.len()).min(self.config.max_chunk);
            let mut cmd = Vec::with_capacity(16);
            Self::queue_read(&mut cmd, regs::BULK_READ_PORT, chunk);
            out.extend_from_slice(&self.send_and_receive(cmd, chunk)?);
        }
        Ok(out)
    }

    fn idle_clock(&mut self, cycles: u32) -> Result<()> {
        if cycles == 0 {
            return Ok(());
        }
        let mut cmd = Vec::with_capacity(8);
        let mut bytes = (cycles / 8) as usize;
        while bytes > 0 {
            let chunk = bytes.min(MAX_COMMAND_BYTES);
            Self::data_command(&mut cmd, op::CLOCK_BYTES, chunk);
            bytes -= chunk;
        }
        let bits = (cycles % 8) as u8;
        if bits > 0 {
            cmd.extend_from_slice(&[op::CLOCK_BITS, bits - 1]);
        }
        self.send(&cmd)
    }

    fn read_register16(&mut self, lo_addr: u8) -> Result<u16> {
        let mut cmd = Vec::with_capacity(32);
        Self::queue_read(&mut cmd, lo_addr, 1);
        Self::queue_read(&mut cmd, lo_addr + 1, 1);
        let bytes = self.send_and_receive(cmd, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn packed_write(&mut self, address: BusAddr, length_field: u16, payload: &[u8]) -> Result<()> {
        let mut cmd = Vec::with_capacity(payload.len() + 128);
        for (reg, byte) in regs::ADDRESS_REGS.iter().zip(address.register_bytes()) {
            Self::queue_write(&mut cmd, WRITE_FLAG | reg, &[byte]);
        }
        let [len_lo, len_hi] = length_field.to_le_bytes();
        Self::queue_write(&mut cmd, WRITE_FLAG | regs::LEN_LO, &[len_lo]);
        Self::queue_write(&mut cmd, WRITE_FLAG | regs::LEN_HI, &[len_hi]);
        let [bulk_lo, bulk_hi] = (payload.len() as u16).to_le_bytes();
        Self::queue_write(&mut cmd, WRITE_FLAG | regs::BULK_LEN_LO, &[bulk_lo]);
        Self::queue_write(&mut cmd, WRITE_FLAG | regs::BULK_LEN_HI, &[bulk_hi]);
        for chunk in payload.chunks(self.config.max_chunk) {
            Self::queue_write(&mut cmd, WRITE_FLAG | regs::BULK_WRITE_PORT, chunk);
        }
        Self::queue_write(&mut cmd, WRITE_FLAG | regs::CMD, &[Command::WriteStart.code()]);
        self.send(&cmd)
    }
}
