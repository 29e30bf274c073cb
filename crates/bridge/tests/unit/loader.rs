//! # Image Loader Tests
//!
//! Segment placement, read-back verification, and the execution-control
//! sequence on the program-counter and reset words.

use pretty_assertions::assert_eq;
use spibridge_core::bridge::{BridgeClient, BusMemory};
use spibridge_core::common::{BridgeError, BusAddr, Result};
use spibridge_core::config::{ControlConfig, TransferConfig};
use spibridge_core::protocol::PollPolicy;
use spibridge_core::sim::{BridgeModel, LoadOptions};
use spibridge_core::{Image, ImageLoader, Segment, Transport};

use crate::common::harness::{TestContext, pattern};

/// Line holding both control words at the default addresses.
const CONTROL_LINE: u32 = 0x0200_0000;

/// Control words decoded from one logged write of the control line.
fn control_words(data: &[u8]) -> (u32, u32) {
    let pc = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let reset = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    (pc, reset)
}

#[test]
fn run_loads_segments_then_starts_core() {
    let mut ctx = TestContext::new();
    let text = pattern(40, 0x13);
    let data = pattern(20, 0x77);
    let image = Image::new(
        vec![Segment::new(0x8000_0000, text.clone()), Segment::new(0x8000_1000, data.clone())],
        0x8000_0000,
    );

    let report = ImageLoader::new(&mut ctx.memory, ControlConfig::default())
        .run(&image, LoadOptions::default())
        .unwrap();
    assert_eq!(report.segments, 2);
    assert_eq!(report.bytes, 48 + 32);
    assert_eq!(report.entry, 0x8000_0000);

    let model = ctx.model();
    assert_eq!(model.peek(0x8000_0000, 40), text);
    assert_eq!(model.peek(0x8000_0028, 8), vec![0; 8]);
    assert_eq!(model.peek(0x8000_1000, 20), data);

    let control: Vec<(u32, u32)> = model
        .line_writes()
        .iter()
        .filter(|w| w.address == BusAddr(CONTROL_LINE))
        .map(|w| control_words(&w.data))
        .collect();
    assert_eq!(
        control,
        vec![(0x8000_0000, 0), (0x8000_0000, 0x3), (0x8000_0000, 0)]
    );
}

#[test]
fn start_before_load_is_rejected() {
    let mut ctx = TestContext::new();
    let mut loader = ImageLoader::new(&mut ctx.memory, ControlConfig::default());
    assert!(matches!(loader.start_execution(), Err(BridgeError::NotLoaded)));
    assert_eq!(loader.entry(), None);
    drop(loader);
    assert!(ctx.model().commands().is_empty());
}

#[test]
fn halt_holds_core_in_reset() {
    let mut ctx = TestContext::new();
    ctx.model_mut().poke(CONTROL_LINE, &0x1234u32.to_le_bytes());

    ImageLoader::new(&mut ctx.memory, ControlConfig::default())
        .halt()
        .unwrap();

    assert_eq!(ctx.model().peek(0x0200_0004, 4), 3u32.to_le_bytes().to_vec());
    assert_eq!(ctx.model().peek(CONTROL_LINE, 4), 0x1234u32.to_le_bytes().to_vec());
}

#[test]
fn custom_control_addresses_are_honoured() {
    let mut ctx = TestContext::new();
    let control = ControlConfig {
        pc_address: 0x1000_0010,
        reset_address: 0x1000_0020,
        reset_hold_value: 0x1,
    };
    let image = Image::new(vec![Segment::new(0x100, vec![1; 4])], 0x100);

    let mut loader = ImageLoader::new(&mut ctx.memory, control);
    let _ = loader.load_image(&image, LoadOptions::default()).unwrap();
    loader.start_execution().unwrap();

    assert_eq!(ctx.model().peek(0x1000_0010, 4), 0x100u32.to_le_bytes().to_vec());
    assert_eq!(ctx.model().peek(0x1000_0020, 4), vec![0; 4]);
}

#[test]
fn segments_are_written_in_load_pages() {
    let mut ctx = TestContext::with_transfer(TransferConfig {
        load_page_bytes: 1024,
        ..TransferConfig::default()
    });
    let payload = pattern(2500, 4);
    let image = Image::new(vec![Segment::new(0x4000_0000, payload.clone())], 0x4000_0000);

    let _ = ImageLoader::new(&mut ctx.memory, ControlConfig::default())
        .load_image(&image, LoadOptions::default())
        .unwrap();

    let sizes: Vec<usize> = ctx.model().line_writes().iter().map(|w| w.data.len()).collect();
    assert_eq!(sizes, vec![1024, 1024, 464]);
    assert_eq!(ctx.model().peek(0x4000_0000, 2500), payload);
}

#[test]
fn verified_load_reports_verification() {
    let mut ctx = TestContext::new();
    let image = Image::new(vec![Segment::new(0x20, pattern(100, 8))], 0x20);

    let report = ImageLoader::new(&mut ctx.memory, ControlConfig::default())
        .load_image(&image, LoadOptions { verify: true })
        .unwrap();
    assert!(report.verified);
    assert_eq!(report.bytes, 112);
}

/// Model wrapper whose bulk reads come back with the first byte flipped.
#[derive(Debug, Default)]
struct CorruptingModel(BridgeModel);

impl Transport for CorruptingModel {
    fn name(&self) -> &str {
        "corrupting"
    }

    fn write_register(&mut self, addr: u8, value: u8) -> Result<()> {
        self.0.write_register(addr, value)
    }

    fn read_register(&mut self, addr: u8) -> Result<u8> {
        self.0.read_register(addr)
    }

    fn write_bulk(&mut self, data: &[u8]) -> Result<()> {
        self.0.write_bulk(data)
    }

    fn read_bulk(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut data = self.0.read_bulk(len)?;
        if let Some(first) = data.first_mut() {
            *first ^= 0xFF;
        }
        Ok(data)
    }

    fn idle_clock(&mut self, cycles: u32) -> Result<()> {
        self.0.idle_clock(cycles)
    }
}

#[test]
fn corrupted_read_back_fails_verification() {
    let mut client = BridgeClient::new(CorruptingModel::default());
    client.set_policy(PollPolicy::immediate(16));
    let mut memory = BusMemory::new(client, TransferConfig::default());
    let image = Image::new(vec![Segment::new(0x200, vec![0x11; 32])], 0x200);

    let err = ImageLoader::new(&mut memory, ControlConfig::default())
        .load_image(&image, LoadOptions { verify: true })
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::VerifyMismatch {
            address: 0x200,
            expected: 0x11,
            actual: 0xEE
        }
    ));
}
