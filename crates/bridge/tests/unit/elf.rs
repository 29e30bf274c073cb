//! # ELF Parsing Tests
//!
//! Loadable-segment extraction from hand-assembled executables.

use std::io::Write;

use pretty_assertions::assert_eq;
use spibridge_core::common::BridgeError;
use spibridge_core::sim::elf;
use tempfile::NamedTempFile;

use crate::common::builder::{ProgramDef, elf32, elf64};

fn sample() -> Vec<u8> {
    elf32(
        0x8000_0000,
        &[
            ProgramDef::load(0x8000_0000, vec![0x13, 0x00, 0x00, 0x00, 0x6F, 0x00, 0x00, 0x00]),
            ProgramDef::note(vec![0xAB; 12]),
            ProgramDef::load(0x8000_2000, vec![1, 2, 3, 4])
                .with_vaddr(0xC000_2000)
                .with_memsz(32),
        ],
    )
}

#[test]
fn extracts_load_segments_at_physical_addresses() {
    let image = elf::parse(&sample()).unwrap();

    assert_eq!(image.entry, 0x8000_0000);
    assert_eq!(image.segments.len(), 2);
    assert_eq!(image.segments[0].address, 0x8000_0000);
    assert_eq!(image.segments[0].data, vec![0x13, 0, 0, 0, 0x6F, 0, 0, 0]);
    assert_eq!(image.segments[1].address, 0x8000_2000);
}

#[test]
fn bss_is_zero_extended_to_memory_size() {
    let image = elf::parse(&sample()).unwrap();
    let bss = &image.segments[1].data;
    assert_eq!(bss.len(), 32);
    assert_eq!(&bss[..4], &[1, 2, 3, 4]);
    assert!(bss[4..].iter().all(|&b| b == 0));
}

#[test]
fn empty_memory_segments_are_skipped() {
    let bytes = elf32(
        0x100,
        &[
            ProgramDef::load(0x100, vec![]),
            ProgramDef::load(0x200, vec![5; 16]),
        ],
    );
    let image = elf::parse(&bytes).unwrap();
    assert_eq!(image.segments.len(), 1);
    assert_eq!(image.segments[0].address, 0x200);
}

#[test]
fn truncated_file_is_an_image_error() {
    let mut bytes = sample();
    bytes.truncate(bytes.len() - 6);
    assert!(matches!(elf::parse(&bytes), Err(BridgeError::Image { .. })));
}

#[test]
fn image_without_loadable_segments_is_rejected() {
    let bytes = elf32(0, &[ProgramDef::note(vec![0; 4])]);
    assert!(matches!(elf::parse(&bytes), Err(BridgeError::Image { .. })));
}

#[test]
fn elf64_segments_are_narrowed_to_bus_addresses() {
    let bytes = elf64(0x8000_0000, &[ProgramDef::load(0x8000_0000, vec![7; 24])]);
    let image = elf::parse(&bytes).unwrap();
    assert_eq!(image.entry, 0x8000_0000);
    assert_eq!(image.segments[0].address, 0x8000_0000);
    assert_eq!(image.segments[0].data, vec![7; 24]);
}

#[test]
fn elf64_entry_past_four_gib_is_out_of_range() {
    for entry in [0x1_0000_0000, 0x1_8000_0000] {
        let bytes = elf64(entry, &[ProgramDef::load(0x100, vec![1; 16])]);
        assert!(matches!(
            elf::parse(&bytes),
            Err(BridgeError::OutOfRange { address, len: 0 }) if address == entry
        ));
    }
}

#[test]
fn load_file_reads_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&sample()).unwrap();
    file.flush().unwrap();

    let image = elf::load_file(file.path()).unwrap();
    assert_eq!(image.total_bytes(), 8 + 32);

    let missing = file.path().with_extension("missing");
    assert!(matches!(elf::load_file(missing), Err(BridgeError::Image { .. })));
}
