//! TCP socket transport.
//!
//! Speaks the command/response protocol of [`super::wire`] to a simulated
//! bridge. Every command is answered before the next one is sent, so ordering
//! is preserved by construction. Bulk payloads are split into frames of at most
//! `max_frame` bytes; register polling and packed writes are executed on the
//! peer in a single round trip.

use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use super::Transport;
use super::wire::{self, CommandHeader, CommandType, ResponseHeader};
use crate::common::addr::BusAddr;
use crate::common::error::{BridgeError, Result};
use crate::protocol::poll::{PollOutcome, PollPolicy};

/// Transport over a byte stream to a simulated bridge (normally a `TcpStream`).
pub struct SocketTransport<S = TcpStream> {
    stream: S,
    max_frame: usize,
}

impl SocketTransport<TcpStream> {
    /// Connects to a simulated bridge.
    ///
    /// # Arguments
    ///
    /// * `addr` - Peer address, e.g. `"127.0.0.1:7777"`.
    /// * `timeout` - Read/write timeout; a peer silent for longer is a transport error.
    /// * `max_frame` - Largest bulk payload per command.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration, max_frame: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "socket transport connected");
        Ok(Self::with_stream(stream, max_frame))
    }
}

impl<S: Read + Write> SocketTransport<S> {
    /// Wraps an already-connected stream.
    pub fn with_stream(stream: S, max_frame: usize) -> Self {
        Self {
            stream,
            max_frame: max_frame.max(1),
        }
    }

    /// Consumes the transport and returns the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Sends one command and waits for its response header.
    fn exchange(&mut self, header: CommandHeader, payload: &[u8]) -> Result<ResponseHeader> {
        trace!(cmd = ?header.cmd_type, addr = header.addr, data = header.data, count = header.count, "socket command");
        wire::write_command(&mut self.stream, &header, payload)?;
        wire::read_response(&mut self.stream)
    }

    /// Sends one command whose failure is a link error.
    fn expect_ok(&mut self, header: CommandHeader, payload: &[u8]) -> Result<u64> {
        let cmd_type = header.cmd_type;
        let response = self.exchange(header, payload)?;
        if response.success {
            Ok(response.data)
        } else {
            Err(BridgeError::link(format!(
                "peer rejected {cmd_type:?} (addr {:#x})",
                header.addr
            )))
        }
    }
}

impl<S> fmt::Debug for SocketTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTransport")
            .field("max_frame", &self.max_frame)
            .finish_non_exhaustive()
    }
}

impl<S: Read + Write + Send> Transport for SocketTransport<S> {
    fn name(&self) -> &str {
        "socket"
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<()> {
        let header = CommandHeader::new(CommandType::WriteReg, addr as u32, value as u64);
        self.expect_ok(header, &[]).map(drop)
    }

    fn read_register(&mut self, addr: u8) -> Result<u8> {
        let header = CommandHeader::new(CommandType::ReadReg, addr as u32, 0);
        self.expect_ok(header, &[]).map(|data| data as u8)
    }

    fn write_bulk(&mut self, data: &[u8]) -> Result<()> {
        for frame in data.chunks(self.max_frame) {
            let header = CommandHeader::new(CommandType::BulkWrite, 0, 0).with_count(frame.len() as u32);
            let _ = self.expect_ok(header, frame)?;
        }
        Ok(())
    }

    fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let want = (len - out.len()).min(self.max_frame);
            let header = CommandHeader::new(CommandType::BulkRead, 0, 0).with_count(want as u32);
            let delivered = self.expect_ok(header, &[])? as usize;
            if delivered != want {
                return Err(BridgeError::link(format!(
                    "bulk read delivered {delivered} of {want} bytes"
                )));
            }
            out.extend_from_slice(&wire::read_payload(&mut self.stream, delivered)?);
        }
        Ok(out)
    }

    fn idle_clock(&mut self, cycles: u32) -> Result<()> {
        let header = CommandHeader::new(CommandType::IdleClock, 0, cycles as u64);
        self.expect_ok(header, &[]).map(drop)
    }

    fn write_register16(&mut self, lo_addr: u8, value: u16) -> Result<()> {
        let header = CommandHeader::new(CommandType::WriteReg16, lo_addr as u32, value as u64);
        self.expect_ok(header, &[]).map(drop)
    }

    fn read_register16(&mut self, lo_addr: u8) -> Result<u16> {
        let header = CommandHeader::new(CommandType::ReadReg16, lo_addr as u32, 0);
        self.expect_ok(header, &[]).map(|data| data as u16)
    }

    fn poll_register(
        &mut self,
        addr: u8,
        expected: u8,
        policy: &PollPolicy,
    ) -> Result<PollOutcome<u8>> {
        let header = CommandHeader::new(CommandType::PollReg, addr as u32, expected as u64)
            .with_count(policy.max_attempts.max(1));
        let response = self.exchange(header, &[])?;
        let value = response.data as u8;
        let attempts = (response.data >> 32) as u32;
        Ok(if response.success {
            PollOutcome::Ready { value, attempts }
        } else {
            PollOutcome::Exhausted {
                last: value,
                attempts,
            }
        })
    }

    fn packed_write(&mut self, address: BusAddr, length_field: u16, payload: &[u8]) -> Result<()> {
        let header = CommandHeader::new(CommandType::PackedWrite, address.val(), length_field as u64)
            .with_count(payload.len() as u32);
        self.expect_ok(header, payload).map(drop)
    }
}
