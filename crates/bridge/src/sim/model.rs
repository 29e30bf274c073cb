//! Behavioural model of the device-side bridge.
//!
//! `BridgeModel` implements [`Transport`] directly, so the whole driver stack
//! runs in-process against it. It models:
//! 1. **Register file:** Control registers latch, status registers are read-only.
//! 2. **Commands:** `READ_START` fills the read FIFO, `WRITE_START` drains the write FIFO
//!    into line memory, `NULL` returns to idle and discards both FIFOs.
//! 3. **Timing:** Status reads `BUSY` and the byte count reads zero for a configurable
//!    number of polls after a start command.
//! 4. **Faults:** Byte-count skew and a stuck-busy mode.
//!
//! Memory is sparse and zero-filled; every line write and command is logged for
//! inspection.

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::common::addr::BusAddr;
use crate::common::constants::{LINE_BYTES, MAX_BULK_BYTES};
use crate::common::error::{BridgeError, Result};
use crate::protocol::regs::{self, Command, REGISTER_COUNT, Status};
use crate::transport::Transport;

/// One line-write transaction as applied to memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineWrite {
    /// First line written.
    pub address: BusAddr,
    /// Payload, `16 * lines` bytes.
    pub data: Vec<u8>,
}

/// One command-register write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandRecord {
    /// Decoded command.
    pub command: Command,
    /// Address registers at the time of the write.
    pub address: BusAddr,
    /// Line count at the time of the write.
    pub lines: usize,
}

/// In-memory model of the SPI-to-bus bridge.
#[derive(Debug, Default)]
pub struct BridgeModel {
    regs: [u8; REGISTER_COUNT],
    memory: BTreeMap<u32, [u8; LINE_BYTES]>,
    read_fifo: VecDeque<u8>,
    write_fifo: Vec<u8>,

    latency: u32,
    status_wait: u32,
    write_status_wait: u32,
    count_wait: u32,
    count_hidden: bool,
    count_skew: i32,
    stuck: bool,

    line_writes: Vec<LineWrite>,
    commands: Vec<CommandRecord>,
    idle_cycles: u64,
}

impl BridgeModel {
    /// Creates an idle model with zeroed memory and no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many status polls read `BUSY` after a start command.
    ///
    /// The byte count reads zero for the same number of polls after `DONE`.
    pub const fn set_latency(&mut self, polls: u32) {
        self.latency = polls;
    }

    /// Offsets the reported bulk-read byte count by `skew`.
    pub const fn set_count_skew(&mut self, skew: i32) {
        self.count_skew = skew;
    }

    /// Makes both status registers read `BUSY` forever.
    pub const fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    /// Reads `len` bytes of memory without going through the protocol.
    pub fn peek(&self, address: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let at = address.wrapping_add(i as u32);
                let base = BusAddr(at).line_base().val();
                self.memory
                    .get(&base)
                    .map_or(0, |line| line[BusAddr(at).line_offset()])
            })
            .collect()
    }

    /// Writes memory without going through the protocol or the write log.
    pub fn poke(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let at = BusAddr(address.wrapping_add(i as u32));
            let line = self.memory.entry(at.line_base().val()).or_default();
            line[at.line_offset()] = byte;
        }
    }

    /// Line writes applied by `WRITE_START`, oldest first.
    pub fn line_writes(&self) -> &[LineWrite] {
        &self.line_writes
    }

    /// Command-register writes, oldest first.
    pub fn commands(&self) -> &[CommandRecord] {
        &self.commands
    }

    /// Total idle clocks received.
    pub const fn idle_cycles(&self) -> u64 {
        self.idle_cycles
    }

    /// Current raw value of a register, without read side effects.
    pub fn register(&self, addr: u8) -> u8 {
        self.regs.get(addr as usize).copied().unwrap_or(0)
    }

    /// Clears the write and command logs.
    pub fn clear_logs(&mut self) {
        self.line_writes.clear();
        self.commands.clear();
    }

    fn address(&self) -> BusAddr {
        BusAddr(u32::from_le_bytes([
            self.regs[regs::ADDR0 as usize],
            self.regs[regs::ADDR1 as usize],
            self.regs[regs::ADDR2 as usize],
            self.regs[regs::ADDR3 as usize],
        ]))
    }

    fn lines(&self) -> usize {
        u16::from_le_bytes([self.regs[regs::LEN_LO as usize], self.regs[regs::LEN_HI as usize]])
            as usize
            + 1
    }

    fn set_status(&mut self, reg: u8, status: Status) {
        self.regs[reg as usize] = status.code();
    }

    /// Marks `reg` done, or busy for `latency` polls first.
    fn complete(&mut self, reg: u8) {
        if self.latency == 0 {
            self.set_status(reg, Status::Done);
        } else {
            self.set_status(reg, Status::Busy);
        }
        if reg == regs::STATUS {
            self.status_wait = self.latency;
        } else {
            self.write_status_wait = self.latency;
        }
    }

    fn execute(&mut self, raw: u8) {
        let Ok(command) = Command::try_from(raw) else {
            trace!(raw, "model: unknown command");
            self.set_status(regs::STATUS, Status::Error);
            return;
        };
        let address = self.address();
        let lines = self.lines();
        self.commands.push(CommandRecord {
            command,
            address,
            lines,
        });
        trace!(%command, %address, lines, "model: command");

        match command {
            Command::Null => {
                self.set_status(regs::STATUS, Status::Idle);
                self.set_status(regs::WRITE_STATUS, Status::Idle);
                self.read_fifo.clear();
                self.write_fifo.clear();
                self.status_wait = 0;
                self.write_status_wait = 0;
                self.count_wait = 0;
            }
            Command::ReadStart => {
                let bytes = lines * LINE_BYTES;
                if !address.is_line_aligned() || bytes > MAX_BULK_BYTES {
                    self.set_status(regs::STATUS, Status::Error);
                    return;
                }
                let data = self.peek(address.val(), bytes);
                self.read_fifo.clear();
                self.read_fifo.extend(data);
                self.count_wait = self.latency;
                self.complete(regs::STATUS);
            }
            Command::WriteStart => {
                let bytes = lines * LINE_BYTES;
                if !address.is_line_aligned() || self.write_fifo.len() != bytes {
                    trace!(expected = bytes, got = self.write_fifo.len(), "model: write rejected");
                    self.write_fifo.clear();
                    self.set_status(regs::WRITE_STATUS, Status::Error);
                    return;
                }
                let data = std::mem::take(&mut self.write_fifo);
                self.poke(address.val(), &data);
                self.line_writes.push(LineWrite { address, data });
                self.complete(regs::WRITE_STATUS);
            }
        }
    }

    fn read_status(&mut self, reg: u8) -> u8 {
        if self.stuck {
            return Status::Busy.code();
        }
        let wait = if reg == regs::STATUS {
            &mut self.status_wait
        } else {
            &mut self.write_status_wait
        };
        if *wait > 0 {
            *wait -= 1;
            if *wait == 0 {
                self.regs[reg as usize] = Status::Done.code();
            }
            return Status::Busy.code();
        }
        self.regs[reg as usize]
    }

    fn reported_count(&self) -> u16 {
        if Status::from_code(self.regs[regs::STATUS as usize]) != Some(Status::Done)
            || self.status_wait > 0
        {
            return 0;
        }
        let count = self.read_fifo.len() as i64 + self.count_skew as i64;
        count.clamp(0, u16::MAX as i64) as u16
    }
}

impl Transport for BridgeModel {
    fn name(&self) -> &str {
        "model"
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<()> {
        if addr as usize >= REGISTER_COUNT {
            return Err(BridgeError::link(format!("no register at {addr:#04x}")));
        }
        match addr {
            regs::STATUS | regs::WRITE_STATUS | regs::RD_COUNT_LO | regs::RD_COUNT_HI => {}
            regs::BULK_WRITE_PORT => self.write_fifo.push(value),
            regs::CMD => {
                self.regs[addr as usize] = value;
                self.execute(value);
            }
            _ => self.regs[addr as usize] = value,
        }
        Ok(())
    }

    fn read_register(&mut self, addr: u8) -> Result<u8> {
        if addr as usize >= REGISTER_COUNT {
            return Err(BridgeError::link(format!("no register at {addr:#04x}")));
        }
        let value = match addr {
            regs::STATUS | regs::WRITE_STATUS => self.read_status(addr),
            regs::RD_COUNT_LO => {
                if self.count_wait > 0 && self.reported_count() > 0 {
                    self.count_wait -= 1;
                    self.count_hidden = true;
                    0
                } else {
                    self.count_hidden = false;
                    self.reported_count().to_le_bytes()[0]
                }
            }
            regs::RD_COUNT_HI => {
                if self.count_hidden {
                    0
                } else {
                    self.reported_count().to_le_bytes()[1]
                }
            }
            regs::BULK_READ_PORT => self.read_fifo.pop_front().unwrap_or(0),
            _ => self.regs[addr as usize],
        };
        Ok(value)
    }

    fn write_bulk(&mut self, data: &[u8]) -> Result<()> {
        self.write_fifo.extend_from_slice(data);
        Ok(())
    }

    fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.read_fifo.len() < len {
            return Err(BridgeError::link(format!(
                "bulk read of {len} bytes with {} buffered",
                self.read_fifo.len()
            )));
        }
        Ok(self.read_fifo.drain(..len).collect())
    }

    fn idle_clock(&mut self, cycles: u32) -> Result<()> {
        self.idle_cycles += cycles as u64;
        Ok(())
    }
}
