//! Image Loader and Execution Control.
//!
//! This module places executable images in target memory and controls the
//! core through two memory-mapped control words. It performs:
//! 1. **Segment loading:** Pads each segment to whole lines and writes it page by page.
//! 2. **Verification:** Optionally reads every segment back and compares.
//! 3. **Execution control:** Sets the program counter, then pulses reset to start the core.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::bridge::memory::BusMemory;
use crate::common::addr::BusAddr;
use crate::common::constants::LINE_BYTES;
use crate::common::error::{BridgeError, Result};
use crate::config::ControlConfig;
use crate::transport::Transport;

/// A contiguous block of bytes destined for one physical address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Physical load address.
    pub address: u32,
    /// Bytes to place there.
    pub data: Vec<u8>,
}

impl Segment {
    /// Creates a segment.
    pub const fn new(address: u32, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    /// Returns the payload zero-padded to a whole number of lines.
    pub fn padded(&self) -> Vec<u8> {
        let mut data = self.data.clone();
        data.resize(self.data.len().next_multiple_of(LINE_BYTES), 0);
        data
    }
}

/// An executable image: segments in load order plus an entry point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Image {
    /// Segments, written in order.
    pub segments: Vec<Segment>,
    /// Address the core starts executing at.
    pub entry: u32,
}

impl Image {
    /// Creates an image.
    pub const fn new(segments: Vec<Segment>, entry: u32) -> Self {
        Self { segments, entry }
    }

    /// Total unpadded payload size.
    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }
}

/// Options for [`ImageLoader::load_image`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Read every segment back after writing it.
    pub verify: bool,
}

/// Outcome of a successful load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadReport {
    /// Segments written.
    pub segments: usize,
    /// Bytes written, padding included.
    pub bytes: usize,
    /// Entry point remembered for `start_execution`.
    pub entry: u32,
    /// Whether the image was read back.
    pub verified: bool,
    /// Wall-clock time of the load.
    pub elapsed: Duration,
}

/// Loads images through a [`BusMemory`] and starts or stops the core.
#[derive(Debug)]
pub struct ImageLoader<'a, T> {
    memory: &'a mut BusMemory<T>,
    control: ControlConfig,
    entry: Option<u32>,
}

impl<'a, T: Transport> ImageLoader<'a, T> {
    /// Creates a loader over `memory` using the given control-word addresses.
    pub const fn new(memory: &'a mut BusMemory<T>, control: ControlConfig) -> Self {
        Self {
            memory,
            control,
            entry: None,
        }
    }

    /// Returns the entry point of the last loaded image.
    pub const fn entry(&self) -> Option<u32> {
        self.entry
    }

    /// Writes every segment of `image` to target memory.
    ///
    /// Each segment is zero-padded to whole lines and written in pages of the
    /// configured load size, logging progress after each page.
    ///
    /// # Arguments
    ///
    /// * `image` - Segments and entry point.
    /// * `options` - Whether to verify by read-back.
    ///
    /// # Returns
    ///
    /// A summary of what was written.
    pub fn load_image(&mut self, image: &Image, options: LoadOptions) -> Result<LoadReport> {
        let started = Instant::now();
        let page = self.memory.transfer_config().load_page_bytes.max(LINE_BYTES);
        let mut written = 0;

        for (index, segment) in image.segments.iter().enumerate() {
            let payload = segment.padded();
            if payload.is_empty() {
                continue;
            }
            let base = BusAddr(segment.address);
            let _ = base.checked_end(payload.len())?;
            info!(
                segment = index,
                address = %base,
                bytes = payload.len(),
                "loading segment"
            );

            let mut done = 0;
            for chunk in payload.chunks(page) {
                let _ = self.memory.write(base.offset(done), chunk)?;
                done += chunk.len();
                info!(
                    segment = index,
                    done,
                    total = payload.len(),
                    "page written"
                );
            }

            if options.verify {
                self.memory.verify(base, &payload)?;
                debug!(segment = index, "segment verified");
            }
            written += payload.len();
        }

        self.entry = Some(image.entry);
        let report = LoadReport {
            segments: image.segments.len(),
            bytes: written,
            entry: image.entry,
            verified: options.verify,
            elapsed: started.elapsed(),
        };
        info!(
            segments = report.segments,
            bytes = report.bytes,
            entry = %BusAddr(report.entry),
            elapsed = ?report.elapsed,
            "image loaded"
        );
        Ok(report)
    }

    /// Starts the core at the loaded entry point.
    ///
    /// Writes the entry point to the program-counter word, holds the core in
    /// reset with its clock gated, then releases reset.
    pub fn start_execution(&mut self) -> Result<()> {
        let entry = self.entry.ok_or(BridgeError::NotLoaded)?;
        self.memory.write_word(self.control.pc_address, entry)?;
        self.memory
            .write_word(self.control.reset_address, self.control.reset_hold_value)?;
        self.memory.write_word(self.control.reset_address, 0)?;
        info!(entry = %BusAddr(entry), "execution started");
        Ok(())
    }

    /// Stops the core by holding it in reset with its clock gated.
    pub fn halt(&mut self) -> Result<()> {
        self.memory
            .write_word(self.control.reset_address, self.control.reset_hold_value)?;
        info!("core halted");
        Ok(())
    }

    /// Loads `image`, then starts it.
    pub fn run(&mut self, image: &Image, options: LoadOptions) -> Result<LoadReport> {
        let report = self.load_image(image, options)?;
        self.start_execution()?;
        Ok(report)
    }
}
