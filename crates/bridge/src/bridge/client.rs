//! Line-granular bridge client.
//!
//! This module drives the register map over a [`Transport`] to perform exactly
//! one bus transaction per call. It provides:
//! 1. **Line Reads:** Program address and length, start, wait for `DONE`, wait for the
//!    drained byte count, bulk read, clear the command.
//! 2. **Line Writes:** Program, stream the payload, start, wait for write `DONE`, clear.
//!    A packed variant hands the whole issue sequence to the transport at once.
//! 3. **Bulk Ports:** Thin wrappers that program the bulk length and stream.
//! 4. **Polling:** Bounded register polling; exhaustion is a value, not an error.
//!
//! Completion is only ever detected by polling. Every method takes `&mut self`,
//! so one client can never interleave two transactions.

use std::fmt;
use std::time::Instant;

use tracing::{debug, warn};

use super::observer::{BatchEvent, Phase, TransferObserver};
use crate::common::addr::BusAddr;
use crate::common::constants::{LINE_BYTES, MAX_BULK_BYTES, MAX_LINES_PER_BATCH};
use crate::common::error::{BridgeError, Result};
use crate::config::Config;
use crate::protocol::poll::{PollOutcome, PollPolicy, poll_until};
use crate::protocol::regs::{self, Command, Status};
use crate::transport::Transport;

/// Client for the SPI-to-bus bridge.
pub struct BridgeClient<T> {
    transport: T,
    policy: PollPolicy,
    idle_cycles: u32,
    observer: Option<Box<dyn TransferObserver>>,
    in_flight: Option<BusAddr>,
}

impl<T> fmt::Debug for BridgeClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeClient")
            .field("policy", &self.policy)
            .field("idle_cycles", &self.idle_cycles)
            .field("observed", &self.observer.is_some())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> BridgeClient<T> {
    /// Creates a client with the default polling policy and no idle clocking.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: PollPolicy::default(),
            idle_cycles: 0,
            observer: None,
            in_flight: None,
        }
    }

    /// Creates a client using the polling and idle-clock settings of `config`.
    pub fn with_config(transport: T, config: &Config) -> Self {
        Self {
            transport,
            policy: config.poll.policy(),
            idle_cycles: config.transfer.idle_cycles,
            observer: None,
            in_flight: None,
        }
    }

    /// Replaces the polling policy.
    pub const fn set_policy(&mut self, policy: PollPolicy) {
        self.policy = policy;
    }

    /// Returns the polling policy.
    pub const fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Sets the number of idle clocks issued after each transaction.
    pub const fn set_idle_cycles(&mut self, cycles: u32) {
        self.idle_cycles = cycles;
    }

    /// Installs an observer for phase timings and batch events.
    pub fn set_observer(&mut self, observer: Box<dyn TransferObserver>) {
        self.observer = Some(observer);
    }

    /// Removes and returns the installed observer.
    pub fn take_observer(&mut self) -> Option<Box<dyn TransferObserver>> {
        self.observer.take()
    }

    /// Returns the underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the underlying transport mutably.
    ///
    /// Register accesses made through it bypass the transaction sequencing.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the client and returns the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Reads one line.
    ///
    /// # Arguments
    ///
    /// * `address` - Line-aligned bus address.
    ///
    /// # Returns
    ///
    /// The 16 bytes of the line.
    pub fn read_line(&mut self, address: BusAddr) -> Result<[u8; LINE_BYTES]> {
        let data = self.read_lines(address, 1)?;
        let mut line = [0u8; LINE_BYTES];
        line.copy_from_slice(&data);
        Ok(line)
    }

    /// Reads `lines` consecutive lines in one transaction.
    ///
    /// The main status is polled to `DONE` first, then the bulk-read byte count
    /// is polled to the full payload size: the bus accepts the transaction
    /// before the payload has drained into the read buffer. The command is
    /// cleared only after the payload has been read out.
    ///
    /// # Arguments
    ///
    /// * `address` - Line-aligned bus address.
    /// * `lines` - Number of lines, at most [`MAX_LINES_PER_BATCH`].
    ///
    /// # Returns
    ///
    /// `lines * 16` bytes in address order.
    pub fn read_lines(&mut self, address: BusAddr, lines: usize) -> Result<Vec<u8>> {
        let length = Self::check_lines(address, lines)?;
        let expected = lines * LINE_BYTES;
        debug!(%address, lines, "read transaction");

        let start = Instant::now();
        self.program(address, length)?;
        self.command(Command::ReadStart)?;
        self.wait_done(regs::STATUS, address)?;
        self.wait_read_count(address, expected)?;
        let data = self.bulk_read(expected)?;
        self.record(Phase::Read, start);

        let start = Instant::now();
        self.finish()?;
        self.record(Phase::Ack, start);
        Ok(data)
    }

    /// Writes one line.
    pub fn write_line(&mut self, address: BusAddr, line: &[u8; LINE_BYTES]) -> Result<()> {
        self.write_lines(address, 1, line)
    }

    /// Writes `lines` consecutive lines in one transaction, step by step.
    ///
    /// # Arguments
    ///
    /// * `address` - Line-aligned bus address.
    /// * `lines` - Number of lines, at most [`MAX_LINES_PER_BATCH`].
    /// * `payload` - Exactly `lines * 16` bytes.
    pub fn write_lines(&mut self, address: BusAddr, lines: usize, payload: &[u8]) -> Result<()> {
        let length = Self::check_lines(address, lines)?;
        Self::check_payload(address, lines, payload)?;
        debug!(%address, lines, "write transaction");

        let start = Instant::now();
        self.program(address, length)?;
        self.bulk_write(payload)?;
        self.command(Command::WriteStart)?;
        self.record(Phase::Write, start);
        self.complete_write(address)
    }

    /// Writes `lines` consecutive lines with one packed issue sequence.
    ///
    /// Address, length, payload, and start command go to the transport
    /// back-to-back; only the completion poll costs extra round trips.
    pub fn write_lines_packed(
        &mut self,
        address: BusAddr,
        lines: usize,
        payload: &[u8],
    ) -> Result<()> {
        let length = Self::check_lines(address, lines)?;
        Self::check_payload(address, lines, payload)?;
        debug!(%address, lines, "packed write transaction");

        let start = Instant::now();
        self.in_flight = Some(address);
        self.transport.packed_write(address, length, payload)?;
        self.record(Phase::Write, start);
        self.complete_write(address)
    }

    /// Programs the bulk length and reads `len` bytes from the bulk read port.
    ///
    /// A delivery of any other size is a `SizeMismatch`.
    pub fn bulk_read(&mut self, len: usize) -> Result<Vec<u8>> {
        let field = Self::bulk_length(len)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        self.transport.write_register16(regs::BULK_LEN_LO, field)?;
        let data = self.transport.read_bulk(len)?;
        if data.len() != len {
            return Err(BridgeError::SizeMismatch {
                address: self.context(),
                expected: len,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// Programs the bulk length and streams `data` into the bulk write port.
    pub fn bulk_write(&mut self, data: &[u8]) -> Result<()> {
        let field = Self::bulk_length(data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        self.transport.write_register16(regs::BULK_LEN_LO, field)?;
        self.transport.write_bulk(data)
    }

    /// Polls `addr` until it reads `expected`.
    ///
    /// # Returns
    ///
    /// `Exhausted` if the value never appeared; the caller decides whether
    /// that is an error.
    pub fn poll_register_for_value(&mut self, addr: u8, expected: u8) -> Result<PollOutcome<u8>> {
        let policy = self.policy;
        self.poll_register_with(addr, expected, &policy)
    }

    /// Polls `addr` until it reads `expected`, under an explicit attempt and time budget.
    pub fn poll_register_with(
        &mut self,
        addr: u8,
        expected: u8,
        policy: &PollPolicy,
    ) -> Result<PollOutcome<u8>> {
        self.transport.poll_register(addr, expected, policy)
    }

    /// Returns the protocol state machine to idle after a failed transaction.
    ///
    /// Writes `NULL` and idle-clocks the link. Anything still buffered on the
    /// device side is discarded.
    pub fn abort(&mut self) -> Result<()> {
        if let Some(address) = self.in_flight {
            warn!(%address, "aborting transaction");
        }
        self.finish()
    }

    /// Forwards a batch event from the memory engine to the observer.
    pub(crate) fn observe_batch(&mut self, event: &BatchEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_batch(event);
        }
    }

    /// Forwards a phase timing to the observer.
    pub(crate) fn record(&mut self, phase: Phase, start: Instant) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_phase(phase, start.elapsed());
        }
    }

    /// Writes the address registers and the line-count field.
    fn program(&mut self, address: BusAddr, length_field: u16) -> Result<()> {
        self.in_flight = Some(address);
        for (reg, byte) in regs::ADDRESS_REGS.iter().zip(address.register_bytes()) {
            self.transport.write_register(*reg, byte)?;
        }
        self.transport.write_register16(regs::LEN_LO, length_field)
    }

    /// Writes the command register.
    fn command(&mut self, command: Command) -> Result<()> {
        self.transport.write_register(regs::CMD, command.code())
    }

    /// Waits for write completion, then clears the command.
    fn complete_write(&mut self, address: BusAddr) -> Result<()> {
        let start = Instant::now();
        self.wait_done(regs::WRITE_STATUS, address)?;
        self.finish()?;
        self.record(Phase::Ack, start);
        Ok(())
    }

    /// Clears the command and flushes the link synchronizers.
    fn finish(&mut self) -> Result<()> {
        self.command(Command::Null)?;
        if self.idle_cycles > 0 {
            self.transport.idle_clock(self.idle_cycles)?;
        }
        self.in_flight = None;
        Ok(())
    }

    /// Polls a status register to `DONE`.
    fn wait_done(&mut self, reg: u8, address: BusAddr) -> Result<()> {
        match self.transport.poll_register(reg, Status::Done.code(), &self.policy)? {
            PollOutcome::Ready { .. } => Ok(()),
            PollOutcome::Exhausted { last, attempts } => {
                if Status::from_code(last) == Some(Status::Error) {
                    warn!(%address, reg = regs::name(reg), "device reported error status");
                    return Err(BridgeError::DeviceFault {
                        address: address.val(),
                        status: last,
                    });
                }
                warn!(%address, reg = regs::name(reg), last, attempts, "status poll timed out");
                Err(BridgeError::ProtocolTimeout {
                    register: regs::name(reg),
                    address: address.val(),
                    expected: Status::Done.code() as u16,
                    last: last as u16,
                    attempts,
                })
            }
        }
    }

    /// Polls the bulk-read byte count until it equals `expected`.
    ///
    /// A count above `expected`, or a partial count once polling gives up,
    /// means host and device disagree on framing.
    fn wait_read_count(&mut self, address: BusAddr, expected: usize) -> Result<()> {
        let target = expected as u16;
        let transport = &mut self.transport;
        let outcome = poll_until(
            &self.policy,
            || transport.read_register16(regs::RD_COUNT_LO),
            |count| *count >= target,
        )?;
        let count = outcome.value() as usize;
        if count == expected {
            return Ok(());
        }
        if count != 0 {
            warn!(%address, expected, count, "bulk-read count disagrees with request");
            return Err(BridgeError::SizeMismatch {
                address: address.val(),
                expected,
                actual: count,
            });
        }
        warn!(%address, expected, attempts = outcome.attempts(), "bulk-read buffer never filled");
        Err(BridgeError::ProtocolTimeout {
            register: regs::name(regs::RD_COUNT_LO),
            address: address.val(),
            expected: target,
            last: 0,
            attempts: outcome.attempts(),
        })
    }

    /// Address of the transaction in flight, for error context.
    fn context(&self) -> u32 {
        self.in_flight.map_or(0, BusAddr::val)
    }

    /// Validates a line transfer and returns its length field.
    fn check_lines(address: BusAddr, lines: usize) -> Result<u16> {
        if lines > MAX_LINES_PER_BATCH {
            return Err(BridgeError::TooLarge {
                len: lines.saturating_mul(LINE_BYTES),
                max: MAX_LINES_PER_BATCH * LINE_BYTES,
            });
        }
        let len = lines * LINE_BYTES;
        address.require_line_aligned(len)?;
        if lines == 0 {
            return Err(BridgeError::AlignmentViolation {
                address: address.val() as u64,
                len: 0,
                reason: "line count must be nonzero",
            });
        }
        let _ = address.checked_end(len)?;
        regs::length_field(lines).ok_or(BridgeError::TooLarge {
            len,
            max: MAX_LINES_PER_BATCH * LINE_BYTES,
        })
    }

    /// Validates that a write payload covers exactly `lines` lines.
    fn check_payload(address: BusAddr, lines: usize, payload: &[u8]) -> Result<()> {
        if lines.checked_mul(LINE_BYTES) == Some(payload.len()) {
            Ok(())
        } else {
            Err(BridgeError::AlignmentViolation {
                address: address.val() as u64,
                len: payload.len(),
                reason: "payload is not the declared number of lines",
            })
        }
    }

    /// Validates a bulk transfer length.
    fn bulk_length(len: usize) -> Result<u16> {
        if len > MAX_BULK_BYTES {
            return Err(BridgeError::TooLarge {
                len,
                max: MAX_BULK_BYTES,
            });
        }
        Ok(len as u16)
    }
}
