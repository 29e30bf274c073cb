//! # Memory Engine Tests
//!
//! Byte-addressable access on top of line transactions: round trips at every
//! alignment, read-modify-write isolation, batch accounting, and the
//! address-space boundary.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use spibridge_core::bridge::{BatchKind, BatchLog, Direction};
use spibridge_core::common::{BridgeError, BusAddr};
use spibridge_core::protocol::Command;

use crate::common::harness::{TestContext, pattern};

/// Byte used to fill memory around the region under test.
const GUARD: u8 = 0xA5;

// ══════════════════════════════════════════════════════════
// 1. Round trips
// ══════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn write_then_read_round_trips(
        address in 0x1000u32..0x1400,
        data in proptest::collection::vec(any::<u8>(), 0..300),
    ) {
        let mut ctx = TestContext::with_batches(64, 48);
        let guard_start = address - 0x40;
        ctx.model_mut().poke(guard_start, &[GUARD; 0x40 + 300 + 0x40]);

        let _ = ctx.memory.write(address, &data).unwrap();
        let back = ctx.memory.read(address, data.len()).unwrap();
        prop_assert_eq!(&back, &data);

        let before = ctx.model().peek(guard_start, 0x40);
        let after = ctx.model().peek(address + data.len() as u32, 0x40);
        prop_assert!(before.iter().all(|&b| b == GUARD));
        prop_assert!(after.iter().all(|&b| b == GUARD));
    }
}

#[rstest]
fn alignment_invariance(
    #[values(0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15)] offset: u32,
    #[values(1, 5, 15, 16, 17, 31, 32, 48, 100)] size: usize,
) {
    let mut ctx = TestContext::with_batches(32, 32);
    let address = 0x4000 + offset;
    let data = pattern(size, offset as u8);

    let report = ctx.memory.write(address, &data).unwrap();
    assert_eq!(report.bytes, size);
    assert_eq!(ctx.memory.read(address, size).unwrap(), data);
    assert_eq!(ctx.model().peek(address, size), data);
}

#[test]
fn zero_length_requests_are_no_ops() {
    let mut ctx = TestContext::new();
    assert!(ctx.memory.read(0x123u32, 0).unwrap().is_empty());
    let report = ctx.memory.write(0x123u32, &[]).unwrap();
    assert_eq!(report.batches, 0);
    assert!(ctx.model().commands().is_empty());
}

// ══════════════════════════════════════════════════════════
// 2. Read-modify-write
// ══════════════════════════════════════════════════════════

#[test]
fn partial_write_preserves_rest_of_line() {
    let mut ctx = TestContext::new();
    ctx.model_mut().poke(0x100, &[0xEE; 16]);

    let _ = ctx.memory.write(0x105u32, &[1, 2, 3]).unwrap();

    let mut expected = vec![0xEE; 16];
    expected[5..8].copy_from_slice(&[1, 2, 3]);
    assert_eq!(ctx.model().peek(0x100, 16), expected);
}

#[test]
fn unaligned_word_write_is_one_rmw() {
    let mut ctx = TestContext::new();
    let before = pattern(16, 0x10);
    ctx.model_mut().poke(0x2000_0000, &before);

    let report = ctx.memory.write(0x2000_0001u32, &0xDEAD_BEEFu32.to_le_bytes()).unwrap();
    assert_eq!(report.batches, 1);
    assert_eq!(report.partial_lines, 1);

    let writes = ctx.model().line_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].address, BusAddr(0x2000_0000));

    let mut expected = before;
    expected[1..5].copy_from_slice(&[0xEF, 0xBE, 0xAD, 0xDE]);
    assert_eq!(writes[0].data, expected);
    assert_eq!(ctx.memory.read(0x2000_0001u32, 4).unwrap(), vec![0xEF, 0xBE, 0xAD, 0xDE]);
}

#[test]
fn head_and_tail_in_distinct_lines_touch_each_once() {
    let mut ctx = TestContext::new();
    let data = pattern(40, 2);

    let _ = ctx.memory.write(0x30Au32, &data).unwrap();

    let addresses: Vec<u32> = ctx.model().line_writes().iter().map(|w| w.address.val()).collect();
    assert_eq!(addresses, vec![0x300, 0x310, 0x330]);
    assert_eq!(ctx.model().peek(0x30A, 40), data);
}

// ══════════════════════════════════════════════════════════
// 3. Batch accounting
// ══════════════════════════════════════════════════════════

#[test]
fn write_of_4100_bytes_is_one_full_batch_and_one_rmw() {
    let mut ctx = TestContext::new();
    let log = Arc::new(Mutex::new(BatchLog::default()));
    ctx.memory.client_mut().set_observer(Box::new(Arc::clone(&log)));
    let data = pattern(4100, 0x55);

    let report = ctx.memory.write(0x1_0000u32, &data).unwrap();
    assert_eq!(report.bytes, 4100);
    assert_eq!(report.batches, 2);
    assert_eq!(report.partial_lines, 1);

    let log = log.lock().unwrap();
    let full: Vec<_> = log.of_kind(BatchKind::Lines).collect();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].lines, 256);
    assert_eq!(full[0].bytes, 4096);
    let partial: Vec<_> = log.of_kind(BatchKind::Partial).collect();
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].address, BusAddr(0x1_1000));
    assert_eq!(partial[0].bytes, 4);
    assert_eq!(log.total_bytes(), 4100);

    let writes = ctx.model().line_writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].data.len(), 4096);
    assert_eq!(writes[1].address, BusAddr(0x1_1000));
    assert_eq!(ctx.model().peek(0x1_0000, 4100), data);
}

#[rstest]
#[case(0x000, 200, 64, 4)]
#[case(0x008, 201, 64, 5)]
#[case(0x000, 256, 64, 4)]
#[case(0x000, 16, 4096, 1)]
#[case(0x00F, 2, 4096, 2)]
fn read_batches_respect_configured_size(
    #[case] address: u32,
    #[case] len: usize,
    #[case] batch: usize,
    #[case] batches: usize,
) {
    let mut ctx = TestContext::with_batches(batch, 4096);
    ctx.model_mut().poke(address, &pattern(len, 1));

    let (data, report) = ctx.memory.read_with_report(address, len).unwrap();
    assert_eq!(data, pattern(len, 1));
    assert_eq!(report.bytes, len);
    assert_eq!(report.batches, batches);

    let reads = ctx
        .model()
        .commands()
        .iter()
        .filter(|c| c.command == Command::ReadStart)
        .count();
    assert_eq!(reads, batches);
    assert!(ctx.model().commands().iter().all(|c| c.lines * 16 <= batch.max(16)));
}

#[test]
fn stepwise_writes_match_packed_writes() {
    let data = pattern(1000, 9);

    let mut packed = TestContext::with_batches(4096, 256);
    let _ = packed.memory.write(0x7003u32, &data).unwrap();

    let mut stepwise = TestContext::with_batches(4096, 256);
    let mut transfer = *stepwise.memory.transfer_config();
    transfer.packed_writes = false;
    let client = stepwise.memory.into_client();
    stepwise.memory = spibridge_core::BusMemory::new(client, transfer);
    let _ = stepwise.memory.write(0x7003u32, &data).unwrap();

    assert_eq!(packed.model().line_writes(), stepwise.model().line_writes());
}

#[test]
fn batch_events_report_direction() {
    let mut ctx = TestContext::new();
    let log = Arc::new(Mutex::new(BatchLog::default()));
    ctx.memory.client_mut().set_observer(Box::new(Arc::clone(&log)));

    let _ = ctx.memory.write(0x20u32, &[1; 32]).unwrap();
    let _ = ctx.memory.read(0x20u32, 32).unwrap();

    let log = log.lock().unwrap();
    let directions: Vec<Direction> = log.events.iter().map(|e| e.direction).collect();
    assert_eq!(directions, vec![Direction::Write, Direction::Read]);
}

// ══════════════════════════════════════════════════════════
// 4. Words and range checks
// ══════════════════════════════════════════════════════════

#[test]
fn word_access_requires_four_byte_alignment() {
    let mut ctx = TestContext::new();
    ctx.memory.write_word(0x2000_0004u32, 0x1234_5678).unwrap();
    assert_eq!(ctx.memory.read_word(0x2000_0004u32).unwrap(), 0x1234_5678);
    assert_eq!(ctx.model().peek(0x2000_0004, 4), vec![0x78, 0x56, 0x34, 0x12]);

    ctx.model_mut().clear_logs();
    let err = ctx.memory.write_word(0x2000_0001u32, 0xDEAD_BEEF).unwrap_err();
    assert!(matches!(err, BridgeError::AlignmentViolation { address: 0x2000_0001, .. }));
    assert!(matches!(
        ctx.memory.read_word(0x2000_0002u32),
        Err(BridgeError::AlignmentViolation { .. })
    ));
    assert!(ctx.model().commands().is_empty());
}

#[test]
fn requests_past_four_gib_are_rejected() {
    let mut ctx = TestContext::new();
    let err = ctx.memory.write(0xFFFF_FFF0u32, &[0; 32]).unwrap_err();
    assert!(matches!(err, BridgeError::OutOfRange { .. }));
    assert!(ctx.model().commands().is_empty());

    let _ = ctx.memory.write(0xFFFF_FFF0u32, &[7; 16]).unwrap();
    assert_eq!(ctx.memory.read(0xFFFF_FFF8u32, 8).unwrap(), vec![7; 8]);
}

#[test]
fn verify_names_first_differing_byte() {
    let mut ctx = TestContext::new();
    let _ = ctx.memory.write(0x600u32, &[1, 2, 3, 4]).unwrap();
    ctx.memory.verify(0x600u32, &[1, 2, 3, 4]).unwrap();

    let err = ctx.memory.verify(0x600u32, &[1, 2, 9, 4]).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::VerifyMismatch {
            address: 0x602,
            expected: 9,
            actual: 3
        }
    ));
}
