//! Byte-addressable memory access over line transactions.
//!
//! A request of any address and length is split into at most three pieces:
//! 1. **Head:** A leading fragment inside the first line.
//! 2. **Body:** Whole lines, moved in batches of the configured size.
//! 3. **Tail:** A trailing fragment inside the last line.
//!
//! Fragments are written by read-modify-write of their containing line, so
//! bytes outside `[address, address + len)` are rewritten with the values
//! just read. Every batch is reported to the client's observer.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::client::BridgeClient;
use super::observer::{BatchEvent, BatchKind, Direction, Phase};
use crate::common::addr::BusAddr;
use crate::common::constants::{LINE_BYTES, WORD_BYTES};
use crate::common::error::{BridgeError, Result};
use crate::config::{Config, TransferConfig};
use crate::transport::Transport;

/// Summary of one `read` or `write` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Caller bytes moved.
    pub bytes: usize,
    /// Bus transactions issued, partial lines included.
    pub batches: usize,
    /// Fragments moved through a single line.
    pub partial_lines: usize,
    /// Wall-clock time of the call.
    pub elapsed: Duration,
}

impl TransferReport {
    /// Throughput in bytes per second, or 0 if nothing was timed.
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.bytes as f64 / secs } else { 0.0 }
    }

    fn add(&mut self, event: &BatchEvent) {
        self.bytes += event.bytes;
        self.batches += 1;
        if event.kind == BatchKind::Partial {
            self.partial_lines += 1;
        }
    }
}

/// Chunked memory access engine.
#[derive(Debug)]
pub struct BusMemory<T> {
    client: BridgeClient<T>,
    transfer: TransferConfig,
}

impl<T: Transport> BusMemory<T> {
    /// Wraps `client` with the given batch settings.
    pub const fn new(client: BridgeClient<T>, transfer: TransferConfig) -> Self {
        Self { client, transfer }
    }

    /// Builds a client over `transport` and wraps it, all settings from `config`.
    pub fn from_config(transport: T, config: &Config) -> Self {
        Self::new(BridgeClient::with_config(transport, config), config.transfer)
    }

    /// Returns the line client.
    pub const fn client(&self) -> &BridgeClient<T> {
        &self.client
    }

    /// Returns the line client mutably.
    pub const fn client_mut(&mut self) -> &mut BridgeClient<T> {
        &mut self.client
    }

    /// Consumes the engine and returns the line client.
    pub fn into_client(self) -> BridgeClient<T> {
        self.client
    }

    /// Returns the batch settings.
    pub const fn transfer_config(&self) -> &TransferConfig {
        &self.transfer
    }

    /// Reads `len` bytes starting at `address`.
    ///
    /// # Arguments
    ///
    /// * `address` - Any bus address.
    /// * `len` - Byte count; zero returns an empty buffer without bus traffic.
    ///
    /// # Returns
    ///
    /// Exactly `len` bytes in address order.
    pub fn read(&mut self, address: impl Into<BusAddr>, len: usize) -> Result<Vec<u8>> {
        self.read_with_report(address, len).map(|(data, _)| data)
    }

    /// Like [`read`](Self::read), also returning the batch accounting.
    pub fn read_with_report(
        &mut self,
        address: impl Into<BusAddr>,
        len: usize,
    ) -> Result<(Vec<u8>, TransferReport)> {
        let address = address.into();
        let started = Instant::now();
        let mut report = TransferReport::default();
        if len == 0 {
            return Ok((Vec::new(), report));
        }
        let _ = address.checked_end(len)?;
        debug!(%address, len, "memory read");

        let mut out = Vec::with_capacity(len);
        let mut cursor = address;
        let mut remaining = len;

        let offset = cursor.line_offset();
        if offset != 0 {
            let take = (LINE_BYTES - offset).min(remaining);
            let line = self.client.read_line(cursor.line_base())?;
            out.extend_from_slice(&line[offset..offset + take]);
            self.batch(&mut report, Direction::Read, BatchKind::Partial, cursor, take, 1);
            cursor = cursor.offset(take);
            remaining -= take;
        }

        let batch_lines = self.transfer.read_batch_lines().max(1);
        while remaining >= LINE_BYTES {
            let lines = (remaining / LINE_BYTES).min(batch_lines);
            let bytes = lines * LINE_BYTES;
            let data = self.client.read_lines(cursor, lines)?;
            out.extend_from_slice(&data);
            self.batch(&mut report, Direction::Read, BatchKind::Lines, cursor, bytes, lines);
            cursor = cursor.offset(bytes);
            remaining -= bytes;
        }

        if remaining > 0 {
            let line = self.client.read_line(cursor)?;
            out.extend_from_slice(&line[..remaining]);
            self.batch(&mut report, Direction::Read, BatchKind::Partial, cursor, remaining, 1);
        }

        debug_assert_eq!(out.len(), len);
        report.elapsed = started.elapsed();
        Ok((out, report))
    }

    /// Writes `data` starting at `address`.
    ///
    /// Whole lines go out in batches of at most the configured write batch
    /// size; a sub-line head or tail is merged into its line by
    /// read-modify-write.
    pub fn write(&mut self, address: impl Into<BusAddr>, data: &[u8]) -> Result<TransferReport> {
        let address = address.into();
        let started = Instant::now();
        let mut report = TransferReport::default();
        if data.is_empty() {
            return Ok(report);
        }
        let _ = address.checked_end(data.len())?;
        debug!(%address, len = data.len(), "memory write");

        let mut cursor = address;
        let mut rest = data;

        let offset = cursor.line_offset();
        if offset != 0 {
            let take = (LINE_BYTES - offset).min(rest.len());
            self.patch_line(cursor, &rest[..take])?;
            self.batch(&mut report, Direction::Write, BatchKind::Partial, cursor, take, 1);
            cursor = cursor.offset(take);
            rest = &rest[take..];
        }

        let batch_lines = self.transfer.write_batch_lines().max(1);
        while rest.len() >= LINE_BYTES {
            let lines = (rest.len() / LINE_BYTES).min(batch_lines);
            let bytes = lines * LINE_BYTES;
            if self.transfer.packed_writes {
                self.client.write_lines_packed(cursor, lines, &rest[..bytes])?;
            } else {
                self.client.write_lines(cursor, lines, &rest[..bytes])?;
            }
            self.batch(&mut report, Direction::Write, BatchKind::Lines, cursor, bytes, lines);
            cursor = cursor.offset(bytes);
            rest = &rest[bytes..];
        }

        if !rest.is_empty() {
            self.patch_line(cursor, rest)?;
            self.batch(&mut report, Direction::Write, BatchKind::Partial, cursor, rest.len(), 1);
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Reads a little-endian word from a 4-byte aligned address.
    pub fn read_word(&mut self, address: impl Into<BusAddr>) -> Result<u32> {
        let address = Self::word_aligned(address.into())?;
        let bytes = self.read(address, WORD_BYTES)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Writes a little-endian word to a 4-byte aligned address.
    ///
    /// An aligned word never straddles a line, so this is one read-modify-write.
    pub fn write_word(&mut self, address: impl Into<BusAddr>, value: u32) -> Result<()> {
        let address = Self::word_aligned(address.into())?;
        self.write(address, &value.to_le_bytes()).map(drop)
    }

    /// Reads back `expected.len()` bytes and compares them.
    ///
    /// # Returns
    ///
    /// `VerifyMismatch` naming the first differing byte.
    pub fn verify(&mut self, address: impl Into<BusAddr>, expected: &[u8]) -> Result<()> {
        let address = address.into();
        let actual = self.read(address, expected.len())?;
        match expected.iter().zip(&actual).position(|(e, a)| e != a) {
            None => Ok(()),
            Some(i) => Err(BridgeError::VerifyMismatch {
                address: address.offset(i).val(),
                expected: expected[i],
                actual: actual[i],
            }),
        }
    }

    /// Merges `bytes` into the line containing `at`.
    fn patch_line(&mut self, at: BusAddr, bytes: &[u8]) -> Result<()> {
        let base = at.line_base();
        let offset = at.line_offset();
        let mut line = self.client.read_line(base)?;

        let prep = Instant::now();
        line[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.client.record(Phase::Prep, prep);
        trace!(line = %base, offset, len = bytes.len(), "read-modify-write");

        self.client.write_line(base, &line)
    }

    fn batch(
        &mut self,
        report: &mut TransferReport,
        direction: Direction,
        kind: BatchKind,
        address: BusAddr,
        bytes: usize,
        lines: usize,
    ) {
        let event = BatchEvent {
            direction,
            kind,
            address,
            bytes,
            lines,
        };
        report.add(&event);
        self.client.observe_batch(&event);
    }

    fn word_aligned(address: BusAddr) -> Result<BusAddr> {
        if address.val() as usize % WORD_BYTES == 0 {
            Ok(address)
        } else {
            Err(BridgeError::AlignmentViolation {
                address: address.val() as u64,
                len: WORD_BYTES,
                reason: "word access is not 4-byte aligned",
            })
        }
    }
}
