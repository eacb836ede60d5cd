// Default instruction code table (RFC 3284, Section 5.6).
//
// 256 opcodes, each describing one or two half-instructions.  A half with
// size 0 takes its size from a varint that follows in the instruction
// stream.  Layout:
//
//   0          RUN,  size from stream
//   1          ADD,  size from stream
//   2..=18     ADD   1..=17
//   19..=162   COPY  mode 0..=8, size from stream then 4..=18
//   163..=246  ADD 1..=4 + COPY (4..=6 for modes 0..=5, 4 for modes 6..=8)
//   247..=255  COPY 4 + ADD 1, modes 0..=8

use std::sync::LazyLock;

use super::address_cache::MODE_COUNT;

/// Half-instruction kinds.  COPY kinds are `INST_COPY + mode`.
pub const INST_NOOP: u8 = 0;
pub const INST_ADD: u8 = 1;
pub const INST_RUN: u8 = 2;
pub const INST_COPY: u8 = 3;

/// Shortest COPY the table has an implicit-size opcode for.
pub const MIN_COPY: u8 = 4;

const ADD_IMPLICIT_MAX: u8 = 17;
const COPY_IMPLICIT_MAX: u8 = 18;
const NEAR_MODE_END: u8 = 6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Opcode {
    pub type1: u8,
    pub size1: u8,
    pub type2: u8,
    pub size2: u8,
}

impl Opcode {
    const fn single(kind: u8, size: u8) -> Self {
        Self {
            type1: kind,
            size1: size,
            type2: INST_NOOP,
            size2: 0,
        }
    }

    const fn double(kind1: u8, size1: u8, kind2: u8, size2: u8) -> Self {
        Self {
            type1: kind1,
            size1,
            type2: kind2,
            size2,
        }
    }

    pub fn is_double(&self) -> bool {
        self.type2 != INST_NOOP
    }
}

pub type CodeTable = [Opcode; 256];

fn build() -> CodeTable {
    let mut entries = Vec::with_capacity(256);

    entries.push(Opcode::single(INST_RUN, 0));
    entries.push(Opcode::single(INST_ADD, 0));
    entries.extend((1..=ADD_IMPLICIT_MAX).map(|size| Opcode::single(INST_ADD, size)));

    for mode in 0..MODE_COUNT as u8 {
        entries.push(Opcode::single(INST_COPY + mode, 0));
        entries.extend(
            (MIN_COPY..=COPY_IMPLICIT_MAX).map(|size| Opcode::single(INST_COPY + mode, size)),
        );
    }

    for mode in 0..MODE_COUNT as u8 {
        let copy_max = if mode < NEAR_MODE_END { 6 } else { MIN_COPY };
        for add in 1..=4 {
            for copy in MIN_COPY..=copy_max {
                entries.push(Opcode::double(INST_ADD, add, INST_COPY + mode, copy));
            }
        }
    }

    for mode in 0..MODE_COUNT as u8 {
        entries.push(Opcode::double(INST_COPY + mode, MIN_COPY, INST_ADD, 1));
    }

    debug_assert_eq!(entries.len(), 256);
    let mut table = [Opcode::default(); 256];
    table.copy_from_slice(&entries);
    table
}

/// The shared default code table.
pub fn default_code_table() -> &'static CodeTable {
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build);
    &TABLE
}

// ---------------------------------------------------------------------------
// Opcode selection (encoder side)
// ---------------------------------------------------------------------------

/// One half-instruction as the encoder sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfInst {
    /// `INST_ADD`, `INST_RUN` or `INST_COPY + mode`.
    pub kind: u8,
    pub size: u32,
}

/// Opcodes available for an instruction.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeChoice {
    /// Opcode encoding the instruction on its own.
    pub single: u8,
    /// Opcode encoding the previous instruction and this one together.
    pub merged: Option<u8>,
}

/// Choose opcodes for `inst`, given the still-unwritten previous instruction.
pub fn choose_opcode(prev: Option<&HalfInst>, inst: &HalfInst) -> OpcodeChoice {
    match inst.kind {
        INST_RUN => OpcodeChoice {
            single: 0,
            merged: None,
        },
        INST_ADD => {
            if inst.size > ADD_IMPLICIT_MAX as u32 || inst.size == 0 {
                return OpcodeChoice {
                    single: 1,
                    merged: None,
                };
            }
            let merged = match prev {
                Some(p) if inst.size == 1 && p.kind >= INST_COPY && p.size == MIN_COPY as u32 => {
                    Some(247 + (p.kind - INST_COPY))
                }
                _ => None,
            };
            OpcodeChoice {
                single: 1 + inst.size as u8,
                merged,
            }
        }
        _ => {
            let mode = inst.kind - INST_COPY;
            let base = 19 + 16 * mode;
            if inst.size < MIN_COPY as u32 || inst.size > COPY_IMPLICIT_MAX as u32 {
                return OpcodeChoice {
                    single: base,
                    merged: None,
                };
            }
            let size = inst.size as u8;
            let merged = match prev {
                Some(p) if p.kind == INST_ADD && (1..=4).contains(&p.size) => {
                    let add = p.size as u8;
                    if mode < NEAR_MODE_END && size <= 6 {
                        Some(163 + mode * 12 + 3 * (add - 1) + (size - MIN_COPY))
                    } else if mode >= NEAR_MODE_END && size == MIN_COPY {
                        Some(235 + (mode - NEAR_MODE_END) * 4 + (add - 1))
                    } else {
                        None
                    }
                }
                _ => None,
            };
            OpcodeChoice {
                single: base + (size - 3),
                merged,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded instruction
// ---------------------------------------------------------------------------

/// An instruction with its size and, for COPY, its resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Append `len` literal bytes from the data section.
    Add { len: u32 },
    /// Append `len` bytes starting at `addr` in the window's address space.
    Copy { len: u32, addr: u64, mode: u8 },
    /// Append one data-section byte `len` times.
    Run { len: u32 },
}

impl Instruction {
    pub fn len(&self) -> u32 {
        match *self {
            Instruction::Add { len } | Instruction::Copy { len, .. } | Instruction::Run { len } => {
                len
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
