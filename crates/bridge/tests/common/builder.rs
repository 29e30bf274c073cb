//! Hand-assembled little-endian ELF32 and ELF64 executables.

const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;
const EHDR64_SIZE: usize = 64;
const PHDR64_SIZE: usize = 56;

pub const PT_LOAD: u32 = 1;
pub const PT_NOTE: u32 = 4;

/// One program header plus the file bytes it covers.
pub struct ProgramDef {
    pub p_type: u32,
    pub vaddr: u32,
    pub paddr: u32,
    pub data: Vec<u8>,
    pub memsz: u32,
}

impl ProgramDef {
    pub fn load(paddr: u32, data: Vec<u8>) -> Self {
        let memsz = data.len() as u32;
        Self {
            p_type: PT_LOAD,
            vaddr: paddr,
            paddr,
            data,
            memsz,
        }
    }

    pub fn with_vaddr(mut self, vaddr: u32) -> Self {
        self.vaddr = vaddr;
        self
    }

    pub fn with_memsz(mut self, memsz: u32) -> Self {
        self.memsz = memsz;
        self
    }

    pub fn note(data: Vec<u8>) -> Self {
        let memsz = data.len() as u32;
        Self {
            p_type: PT_NOTE,
            vaddr: 0,
            paddr: 0,
            data,
            memsz,
        }
    }
}

fn push16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Builds an ELF32 LE RISC-V executable with no section headers.
pub fn elf32(entry: u32, programs: &[ProgramDef]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    push16(&mut out, 2); // ET_EXEC
    push16(&mut out, 0xF3); // EM_RISCV
    push32(&mut out, 1);
    push32(&mut out, entry);
    push32(&mut out, EHDR_SIZE as u32);
    push32(&mut out, 0); // e_shoff
    push32(&mut out, 0);
    push16(&mut out, EHDR_SIZE as u16);
    push16(&mut out, PHDR_SIZE as u16);
    push16(&mut out, programs.len() as u16);
    push16(&mut out, 40);
    push16(&mut out, 0);
    push16(&mut out, 0);
    assert_eq!(out.len(), EHDR_SIZE);

    let mut offset = EHDR_SIZE + PHDR_SIZE * programs.len();
    for p in programs {
        push32(&mut out, p.p_type);
        push32(&mut out, offset as u32);
        push32(&mut out, p.vaddr);
        push32(&mut out, p.paddr);
        push32(&mut out, p.data.len() as u32);
        push32(&mut out, p.memsz);
        push32(&mut out, 0x5); // R+X
        push32(&mut out, 4);
        offset += p.data.len();
    }
    for p in programs {
        out.extend_from_slice(&p.data);
    }
    out
}

/// Builds an ELF64 LE RISC-V executable with no section headers.
///
/// Only the entry point is 64-bit; program addresses come from `programs`.
pub fn elf64(entry: u64, programs: &[ProgramDef]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    push16(&mut out, 2); // ET_EXEC
    push16(&mut out, 0xF3); // EM_RISCV
    push32(&mut out, 1);
    push64(&mut out, entry);
    push64(&mut out, EHDR64_SIZE as u64);
    push64(&mut out, 0); // e_shoff
    push32(&mut out, 0);
    push16(&mut out, EHDR64_SIZE as u16);
    push16(&mut out, PHDR64_SIZE as u16);
    push16(&mut out, programs.len() as u16);
    push16(&mut out, 64);
    push16(&mut out, 0);
    push16(&mut out, 0);
    assert_eq!(out.len(), EHDR64_SIZE);

    let mut offset = EHDR64_SIZE + PHDR64_SIZE * programs.len();
    for p in programs {
        push32(&mut out, p.p_type);
        push32(&mut out, 0x5); // R+X
        push64(&mut out, offset as u64);
        push64(&mut out, p.vaddr as u64);
        push64(&mut out, p.paddr as u64);
        push64(&mut out, p.data.len() as u64);
        push64(&mut out, p.memsz as u64);
        push64(&mut out, 8);
        offset += p.data.len();
    }
    for p in programs {
        out.extend_from_slice(&p.data);
    }
    out
}
