//! Transfer statistics.
//!
//! [`TransferStats`] is a [`TransferObserver`] that accumulates per-phase time
//! and batch counts, and prints them as a report.

use std::time::Duration;

use crate::bridge::observer::{BatchEvent, BatchKind, Direction, Phase, TransferObserver};

/// Accumulated transfer counters.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TransferStats {
    /// Payload bytes read from bus memory.
    pub bytes_read: u64,
    /// Payload bytes written to bus memory.
    pub bytes_written: u64,

    /// Read batches issued.
    pub read_batches: u64,
    /// Write batches issued.
    pub write_batches: u64,
    /// Batches that covered a single partially used line.
    pub partial_lines: u64,
    /// Lines moved in either direction.
    pub lines_moved: u64,

    /// Bridge transactions acknowledged with NULL.
    pub transactions: u64,

    /// Host-side time splicing partial lines and slicing payloads.
    pub prep_time: Duration,
    /// Time spent issuing writes.
    pub write_time: Duration,
    /// Time spent issuing reads and draining their payloads.
    pub read_time: Duration,
    /// Time spent waiting for completion and clearing the command.
    pub ack_time: Duration,
}

impl TransferStats {
    /// Total time spent in all phases.
    pub fn busy_time(&self) -> Duration {
        self.prep_time + self.write_time + self.read_time + self.ack_time
    }

    /// Bytes moved in both directions.
    pub const fn total_bytes(&self) -> u64 {
        self.bytes_read + self.bytes_written
    }

    /// Overall throughput in bytes per second.
    pub fn throughput(&self) -> f64 {
        let secs = self.busy_time().as_secs_f64();
        if secs > 0.0 {
            self.total_bytes() as f64 / secs
        } else {
            0.0
        }
    }

    /// Prints a human-readable report to stdout.
    #[allow(clippy::print_stdout)]
    pub fn print(&self) {
        println!("\n=========================================================");

        println!("\n[Volume]");
        println!("  Bytes Read:           {}", self.bytes_read);
        println!("  Bytes Written:        {}", self.bytes_written);
        println!("  Lines Moved:          {}", self.lines_moved);
        println!("  Transactions:         {}", self.transactions);

        println!("\n[Batches]");
        println!("  Read Batches:         {}", self.read_batches);
        println!("  Write Batches:        {}", self.write_batches);
        let batches = self.read_batches + self.write_batches;
        if batches > 0 {
            println!(
                "  Partial Lines:        {:<10} ({:.2}%)",
                self.partial_lines,
                (self.partial_lines as f64 / batches as f64) * 100.0
            );
        } else {
            println!("  Partial Lines:        0");
        }

        println!("\n[Phase Time]");
        let total = self.busy_time().as_secs_f64();
        let print_phase = |name: &str, time: Duration| {
            if total > 0.0 {
                println!(
                    "  {:<20} {:<12.3?} ({:.2}%)",
                    name,
                    time,
                    time.as_secs_f64() / total * 100.0
                );
            } else {
                println!("  {name:<20} -");
            }
        };
        print_phase("Prep:", self.prep_time);
        print_phase("Write:", self.write_time);
        print_phase("Read:", self.read_time);
        print_phase("Ack:", self.ack_time);

        println!("\n[Throughput]");
        println!("  {:<20} {:.1} KiB/s", "Overall:", self.throughput() / 1024.0);

        println!("=========================================================\n");
    }
}

impl TransferObserver for TransferStats {
    fn on_phase(&mut self, phase: Phase, elapsed: Duration) {
        match phase {
            Phase::Prep => self.prep_time += elapsed,
            Phase::Write => self.write_time += elapsed,
            Phase::Read => self.read_time += elapsed,
            Phase::Ack => {
                self.ack_time += elapsed;
                self.transactions += 1;
            }
        }
    }

    fn on_batch(&mut self, event: &BatchEvent) {
        let bytes = event.bytes as u64;
        match event.direction {
            Direction::Read => {
                self.bytes_read += bytes;
                self.read_batches += 1;
            }
            Direction::Write => {
                self.bytes_written += bytes;
                self.write_batches += 1;
            }
        }
        if event.kind == BatchKind::Partial {
            self.partial_lines += 1;
        }
        self.lines_moved += event.lines as u64;
    }
}
