//! Transfer observation hooks.
//!
//! Timing and accounting are kept out of the transfer algorithms: the client
//! and the memory engine report phases and batches to an optional
//! [`TransferObserver`], and do nothing else with them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::addr::BusAddr;

/// Stage of a transfer being timed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Host-side work: splicing partial lines, slicing payloads.
    Prep,
    /// Issuing a write: address, length, payload, start command.
    Write,
    /// Issuing a read: address, length, start command, payload drain.
    Read,
    /// Waiting for completion and clearing the command.
    Ack,
}

/// Direction of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host.
    Read,
    /// Host to device.
    Write,
}

/// How a batch was moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BatchKind {
    /// A sub-line fragment moved through one line (read-modify-write for writes).
    Partial,
    /// Whole lines moved in one multi-line transaction.
    Lines,
}

/// One unit of work performed by the memory engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchEvent {
    /// Read or write.
    pub direction: Direction,
    /// Partial line or whole lines.
    pub kind: BatchKind,
    /// First caller byte covered by the batch.
    pub address: BusAddr,
    /// Caller bytes moved by the batch.
    pub bytes: usize,
    /// Bus lines transferred on the wire.
    pub lines: usize,
}

/// Receives timing and accounting events from a transfer.
///
/// Both methods default to doing nothing.
pub trait TransferObserver: Send {
    /// Called when a phase of one transaction finishes.
    fn on_phase(&mut self, _phase: Phase, _elapsed: Duration) {}

    /// Called when the memory engine completes a batch.
    fn on_batch(&mut self, _event: &BatchEvent) {}
}

/// Shared observers, so a caller can keep a handle while the client owns a clone.
impl<O: TransferObserver> TransferObserver for Arc<Mutex<O>> {
    fn on_phase(&mut self, phase: Phase, elapsed: Duration) {
        if let Ok(mut inner) = self.lock() {
            inner.on_phase(phase, elapsed);
        }
    }

    fn on_batch(&mut self, event: &BatchEvent) {
        if let Ok(mut inner) = self.lock() {
            inner.on_batch(event);
        }
    }
}

/// Records every batch event in order.
#[derive(Debug, Default, Clone)]
pub struct BatchLog {
    /// Events in arrival order.
    pub events: Vec<BatchEvent>,
}

impl BatchLog {
    /// Sum of caller bytes over all recorded batches.
    pub fn total_bytes(&self) -> usize {
        self.events.iter().map(|e| e.bytes).sum()
    }

    /// Events of one kind.
    pub fn of_kind(&self, kind: BatchKind) -> impl Iterator<Item = &BatchEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

impl TransferObserver for BatchLog {
    fn on_batch(&mut self, event: &BatchEvent) {
        self.events.push(*event);
    }
}
