//! TCP peer serving a [`BridgeModel`].
//!
//! Decodes the socket command protocol and applies each command to the model,
//! answering every command before reading the next. One client is served at a
//! time. Model-level failures (bad register, bulk underrun) are answered with
//! a failed response; I/O failures end the connection.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use tracing::{debug, info, warn};

use super::model::BridgeModel;
use crate::common::addr::BusAddr;
use crate::common::constants::MAX_BULK_BYTES;
use crate::common::error::{BridgeError, Result};
use crate::protocol::poll::PollPolicy;
use crate::transport::Transport;
use crate::transport::wire::{self, CommandHeader, CommandType, ResponseHeader};

/// Listening socket for simulated-bridge clients.
#[derive(Debug)]
pub struct SocketPeer {
    listener: TcpListener,
}

impl SocketPeer {
    /// Binds to `addr`; port 0 picks a free port.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts one client and serves it until it disconnects.
    ///
    /// # Returns
    ///
    /// The number of commands processed.
    pub fn serve_one(&self, model: &mut BridgeModel) -> Result<u64> {
        let (mut stream, peer) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        info!(%peer, "client connected");
        let served = serve_stream(&mut stream, model)?;
        info!(%peer, commands = served, "client disconnected");
        Ok(served)
    }

    /// Serves clients one after another, forever.
    ///
    /// A client whose connection fails is logged and dropped; the model keeps its state.
    pub fn serve(&self, model: &mut BridgeModel) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "simulated bridge listening");
        loop {
            if let Err(e) = self.serve_one(model) {
                warn!(error = %e, "connection ended with error");
            }
        }
    }
}

/// Serves commands from `stream` until a clean end of stream.
///
/// A payload longer than the bulk registers can describe is answered with a
/// failed response and ends the session, since the stream can no longer be
/// framed.
pub fn serve_stream<S: Read + Write>(stream: &mut S, model: &mut BridgeModel) -> Result<u64> {
    let mut served = 0;
    while let Some(header) = wire::read_command(stream)? {
        if carries_payload(header.cmd_type) && header.count as usize > MAX_BULK_BYTES {
            warn!(cmd = ?header.cmd_type, count = header.count, "payload exceeds bulk limit");
            wire::write_response(stream, &ResponseHeader::failed(0), &[])?;
            return Err(BridgeError::TooLarge {
                len: header.count as usize,
                max: MAX_BULK_BYTES,
            });
        }
        let (response, payload) = dispatch(stream, model, &header)?;
        wire::write_response(stream, &response, &payload)?;
        served += 1;
    }
    Ok(served)
}

/// Commands followed by `count` payload bytes on the stream.
const fn carries_payload(cmd_type: CommandType) -> bool {
    matches!(cmd_type, CommandType::BulkWrite | CommandType::PackedWrite)
}

/// Applies one command; reads any command payload from `stream`.
fn dispatch<S: Read>(
    stream: &mut S,
    model: &mut BridgeModel,
    header: &CommandHeader,
) -> Result<(ResponseHeader, Vec<u8>)> {
    let reg = u8::try_from(header.addr).ok();
    let answer = |r: Result<u64>| match r {
        Ok(data) => (ResponseHeader::ok(data), Vec::new()),
        Err(e) => {
            debug!(cmd = ?header.cmd_type, error = %e, "command failed");
            (ResponseHeader::failed(0), Vec::new())
        }
    };

    let result = match header.cmd_type {
        CommandType::WriteReg => match reg {
            Some(r) => answer(model.write_register(r, header.data as u8).map(|()| 0)),
            None => (ResponseHeader::failed(0), Vec::new()),
        },
        CommandType::ReadReg => match reg {
            Some(r) => answer(model.read_register(r).map(u64::from)),
            None => (ResponseHeader::failed(0), Vec::new()),
        },
        CommandType::ReadReg16 => match reg {
            Some(r) => answer(model.read_register16(r).map(u64::from)),
            None => (ResponseHeader::failed(0), Vec::new()),
        },
        CommandType::WriteReg16 => match reg {
            Some(r) => answer(model.write_register16(r, header.data as u16).map(|()| 0)),
            None => (ResponseHeader::failed(0), Vec::new()),
        },
        CommandType::PollReg => match reg {
            Some(r) => {
                let policy = PollPolicy::immediate(header.count.max(1));
                match model.poll_register(r, header.data as u8, &policy) {
                    Ok(outcome) => {
                        let data = u64::from(outcome.value()) | (u64::from(outcome.attempts()) << 32);
                        let response = if outcome.is_ready() {
                            ResponseHeader::ok(data)
                        } else {
                            ResponseHeader::failed(data)
                        };
                        (response, Vec::new())
                    }
                    Err(e) => answer(Err(e)),
                }
            }
            None => (ResponseHeader::failed(0), Vec::new()),
        },
        CommandType::IdleClock => answer(model.idle_clock(header.data as u32).map(|()| 0)),
        CommandType::BulkWrite => {
            let payload = wire::read_payload(stream, header.count as usize)?;
            answer(model.write_bulk(&payload).map(|()| 0))
        }
        CommandType::PackedWrite => {
            let payload = wire::read_payload(stream, header.count as usize)?;
            answer(
                model
                    .packed_write(BusAddr(header.addr), header.data as u16, &payload)
                    .map(|()| 0),
            )
        }
        CommandType::BulkRead => match model.read_bulk(header.count as usize) {
            Ok(data) => (ResponseHeader::ok(data.len() as u64), data),
            Err(e) => answer(Err(e)),
        },
    };
    Ok(result)
}
