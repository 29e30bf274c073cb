//! ELF program-header parsing.
//!
//! Turns an ELF executable into an [`Image`]: every `PT_LOAD` header with a
//! nonzero memory size becomes a segment at its physical address, with the
//! file bytes zero-extended to the memory size so BSS is cleared on load.

use std::fs;
use std::path::Path;

use object::elf::{FileHeader32, FileHeader64, PT_LOAD};
use object::read::elf::{ElfFile, FileHeader, ProgramHeader};
use object::{Endianness, FileKind};

use super::loader::{Image, Segment};
use crate::common::constants::ADDRESS_SPACE;
use crate::common::error::{BridgeError, Result};

/// Parses an ELF32 or ELF64 image of either endianness.
pub fn parse(data: &[u8]) -> Result<Image> {
    let kind = FileKind::parse(data).map_err(|e| BridgeError::image(e.to_string()))?;
    match kind {
        FileKind::Elf32 => parse_elf::<FileHeader32<Endianness>>(data),
        FileKind::Elf64 => parse_elf::<FileHeader64<Endianness>>(data),
        other => Err(BridgeError::image(format!("not an ELF file ({other:?})"))),
    }
}

/// Reads and parses an ELF file from disk.
pub fn load_file(path: impl AsRef<Path>) -> Result<Image> {
    let path = path.as_ref();
    let data =
        fs::read(path).map_err(|e| BridgeError::image(format!("{}: {e}", path.display())))?;
    parse(&data)
}

fn parse_elf<Elf: FileHeader<Endian = Endianness>>(data: &[u8]) -> Result<Image> {
    let file: ElfFile<'_, Elf> =
        ElfFile::parse(data).map_err(|e| BridgeError::image(e.to_string()))?;
    let endian = file.endian();

    let entry: u64 = file.elf_header().e_entry(endian).into();
    let entry = narrow(entry, 0)?;

    let mut segments = Vec::new();
    for header in file.elf_program_headers() {
        if header.p_type(endian) != PT_LOAD {
            continue;
        }
        let memsz: u64 = header.p_memsz(endian).into();
        if memsz == 0 {
            continue;
        }
        let paddr: u64 = header.p_paddr(endian).into();
        let address = narrow(paddr, memsz as usize)?;

        let bytes = header
            .data(endian, data)
            .map_err(|()| BridgeError::image(format!("segment at {paddr:#x} overruns the file")))?;
        if bytes.len() as u64 > memsz {
            return Err(BridgeError::image(format!(
                "segment at {paddr:#x} has file size above memory size"
            )));
        }
        let mut payload = bytes.to_vec();
        payload.resize(memsz as usize, 0);
        segments.push(Segment::new(address, payload));
    }

    if segments.is_empty() {
        return Err(BridgeError::image("no loadable segments"));
    }
    Ok(Image::new(segments, entry))
}

/// Checks that `addr` and `[addr, addr + len)` lie in the 32-bit bus address space.
fn narrow(addr: u64, len: usize) -> Result<u32> {
    if addr >= ADDRESS_SPACE || addr.saturating_add(len as u64) > ADDRESS_SPACE {
        return Err(BridgeError::OutOfRange { address: addr, len });
    }
    Ok(addr as u32)
}
