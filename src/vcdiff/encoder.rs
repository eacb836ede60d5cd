// Window encoder: opcode selection, section building and window emission.
//
// The match finder decides *what* to emit; this module turns a sequence of
// ADD/COPY/RUN calls into wire bytes.  Each instruction is held back one step
// so that it can merge with its successor into a double opcode.
//
// Plain layout writes payloads straight into the data and address sections.
// Interleaved layout keeps every byte in the instruction section, so the
// held-back instruction's payload is staged until its opcode is written.

use std::io::{self, Write};

use super::address_cache::AddressCache;
use super::checksum::ChecksumFn;
use super::code_table::{
    self, CodeTable, HalfInst, INST_ADD, INST_COPY, INST_RUN, choose_opcode,
};
use super::header::{FileHeader, WinIndicator, WindowHeader};
use super::varint;

// ---------------------------------------------------------------------------
// Copy segment
// ---------------------------------------------------------------------------

/// Where a window's copy segment comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Source,
    Target,
}

/// The `[0, len)` part of a window's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRef {
    pub kind: SegmentKind,
    pub len: u64,
    /// Offset into the source (or into earlier output for `Target`).
    pub pos: u64,
}

impl SegmentRef {
    pub fn source(pos: u64, len: u64) -> Self {
        Self {
            kind: SegmentKind::Source,
            len,
            pos,
        }
    }

    pub fn target(pos: u64, len: u64) -> Self {
        Self {
            kind: SegmentKind::Target,
            len,
            pos,
        }
    }

    fn indicator(&self) -> WinIndicator {
        match self.kind {
            SegmentKind::Source => WinIndicator::SOURCE,
            SegmentKind::Target => WinIndicator::TARGET,
        }
    }
}

// ---------------------------------------------------------------------------
// Window encoder
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Pending {
    half: HalfInst,
    code: u8,
}

#[derive(Clone, Copy)]
enum Payload<'a> {
    Data(&'a [u8]),
    Addr(&'a [u8]),
}

impl Payload<'_> {
    fn bytes(&self) -> &[u8] {
        match *self {
            Payload::Data(b) | Payload::Addr(b) => b,
        }
    }
}

/// Builds the sections of one window.
pub struct WindowEncoder {
    data: Vec<u8>,
    inst: Vec<u8>,
    addr: Vec<u8>,
    interleaved: bool,

    /// Previous instruction, not yet written.
    pending: Option<Pending>,
    /// Payload of `pending` in interleaved mode.
    staged: Vec<u8>,

    segment: Option<SegmentRef>,
    /// Target bytes produced by earlier windows of the session.
    produced_before: u64,
    /// Target bytes described by this window so far.
    target_len: u64,
    instructions: u64,

    table: &'static CodeTable,
}

impl WindowEncoder {
    /// Start a window.  `produced_before` is the number of target bytes the
    /// session emitted in earlier windows; COPY addresses at or beyond the
    /// segment length refer to those bytes and to this window's output.
    pub fn new(segment: Option<SegmentRef>, produced_before: u64, interleaved: bool) -> Self {
        Self {
            data: Vec::new(),
            inst: Vec::new(),
            addr: Vec::new(),
            interleaved,
            pending: None,
            staged: Vec::new(),
            segment,
            produced_before,
            target_len: 0,
            instructions: 0,
            table: code_table::default_code_table(),
        }
    }

    /// Length of the copy segment, i.e. the first target address.
    #[inline]
    pub fn segment_len(&self) -> u64 {
        self.segment.map_or(0, |s| s.len)
    }

    /// Current position in the address space.
    #[inline]
    pub fn here(&self) -> u64 {
        self.segment_len() + self.produced_before + self.target_len
    }

    /// Target bytes described so far.
    pub fn target_len(&self) -> u64 {
        self.target_len
    }

    /// Instructions emitted so far.
    pub fn instruction_count(&self) -> u64 {
        self.instructions
    }

    /// Append literal bytes.
    pub fn add(&mut self, bytes: &[u8]) {
        debug_assert!(!bytes.is_empty(), "zero-length ADD");
        if bytes.is_empty() {
            return;
        }
        let half = HalfInst {
            kind: INST_ADD,
            size: bytes.len() as u32,
        };
        self.emit(half, Payload::Data(bytes));
        self.target_len += bytes.len() as u64;
    }

    /// Append `len` copies of `byte`.
    pub fn run(&mut self, len: u32, byte: u8) {
        debug_assert!(len > 0, "zero-length RUN");
        if len == 0 {
            return;
        }
        let half = HalfInst {
            kind: INST_RUN,
            size: len,
        };
        self.emit(half, Payload::Data(&[byte]));
        self.target_len += u64::from(len);
    }

    /// Append `len` bytes copied from `addr`.  The cache picks the address
    /// mode and is updated.
    pub fn copy(&mut self, cache: &mut AddressCache, len: u32, addr: u64) {
        debug_assert!(len > 0, "zero-length COPY");
        if len == 0 {
            return;
        }
        let (mode, encoded) = cache.encode(addr, self.here());
        let half = HalfInst {
            kind: INST_COPY + mode,
            size: len,
        };
        self.emit(half, Payload::Addr(encoded.as_bytes()));
        self.target_len += u64::from(len);
    }

    /// Flush the held-back instruction and hand out the sections.
    ///
    /// `checksum` is applied to `target` (this window's bytes) when given.
    pub fn finish(mut self, target: &[u8], checksum: Option<ChecksumFn>) -> WindowSections {
        self.flush_pending();
        debug_assert_eq!(target.len() as u64, self.target_len);

        WindowSections {
            segment: self.segment,
            target_len: self.target_len,
            checksum: checksum.map(|f| f(target)),
            instructions: self.instructions,
            data: self.data,
            inst: self.inst,
            addr: self.addr,
        }
    }

    // -----------------------------------------------------------------------
    // Opcode packing
    // -----------------------------------------------------------------------

    fn emit(&mut self, half: HalfInst, payload: Payload<'_>) {
        self.instructions += 1;
        let choice = choose_opcode(self.pending.as_ref().map(|p| &p.half), &half);

        if let Some(code) = choice.merged {
            // Both sizes are implicit; payloads follow in instruction order.
            self.pending = None;
            self.inst.push(code);
            if self.interleaved {
                self.inst.append(&mut self.staged);
            }
            self.write_payload(payload);
            return;
        }

        self.flush_pending();
        self.pending = Some(Pending {
            half,
            code: choice.single,
        });
        if self.interleaved {
            self.staged.extend_from_slice(payload.bytes());
        } else {
            self.write_payload(payload);
        }
    }

    fn flush_pending(&mut self) {
        let Some(p) = self.pending.take() else {
            return;
        };
        self.inst.push(p.code);
        if self.table[p.code as usize].size1 == 0 {
            varint::push(&mut self.inst, u64::from(p.half.size));
        }
        if self.interleaved {
            self.inst.append(&mut self.staged);
        }
    }

    fn write_payload(&mut self, payload: Payload<'_>) {
        match payload {
            _ if self.interleaved => self.inst.extend_from_slice(payload.bytes()),
            Payload::Data(b) => self.data.extend_from_slice(b),
            Payload::Addr(b) => self.addr.extend_from_slice(b),
        }
    }
}

// ---------------------------------------------------------------------------
// Finished window
// ---------------------------------------------------------------------------

/// The sections of a finished window, ready to be framed.
#[derive(Debug, Clone)]
pub struct WindowSections {
    pub segment: Option<SegmentRef>,
    pub target_len: u64,
    pub checksum: Option<u32>,
    pub instructions: u64,
    pub data: Vec<u8>,
    pub inst: Vec<u8>,
    pub addr: Vec<u8>,
}

impl WindowSections {
    /// The window header describing these sections.
    pub fn header(&self) -> WindowHeader {
        let mut indicator = self.segment.map_or(WinIndicator::empty(), |s| s.indicator());
        if self.checksum.is_some() {
            indicator |= WinIndicator::CHECKSUM;
        }
        let hdr = WindowHeader {
            indicator,
            segment_len: self.segment.map_or(0, |s| s.len),
            segment_pos: self.segment.map_or(0, |s| s.pos),
            enc_len: 0,
            target_len: self.target_len,
            delta_indicator: Default::default(),
            data_len: self.data.len() as u64,
            inst_len: self.inst.len() as u64,
            addr_len: self.addr.len() as u64,
            checksum: self.checksum,
        };
        WindowHeader {
            enc_len: hdr.compute_enc_len().unwrap_or(0),
            ..hdr
        }
    }

    /// Header and sections, in wire order.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.header().encode(w)?;
        w.write_all(&self.data)?;
        w.write_all(&self.inst)?;
        w.write_all(&self.addr)
    }

    /// Header and sections as one buffer.
    pub fn assemble(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(32 + self.data.len() + self.inst.len() + self.addr.len());
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }
}

// ---------------------------------------------------------------------------
// Stream encoder
// ---------------------------------------------------------------------------

/// Writes the file header once, then windows.
pub struct StreamEncoder<W: Write> {
    writer: W,
    header: FileHeader,
    header_written: bool,
    bytes_written: u64,
}

impl<W: Write> StreamEncoder<W> {
    pub fn new(writer: W, interleaved: bool, app_header: Option<Vec<u8>>) -> Self {
        Self {
            writer,
            header: FileHeader::new(interleaved, app_header),
            header_written: false,
            bytes_written: 0,
        }
    }

    pub fn interleaved(&self) -> bool {
        self.header.interleaved
    }

    /// Delta bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn ensure_header(&mut self) -> io::Result<()> {
        if !self.header_written {
            self.header.encode(&mut self.writer)?;
            self.bytes_written += self.header.encoded_len() as u64;
            self.header_written = true;
        }
        Ok(())
    }

    /// Write one finished window.
    pub fn write_window(&mut self, window: &WindowSections) -> io::Result<()> {
        self.ensure_header()?;
        let bytes = window.assemble();
        self.writer.write_all(&bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Flush and return the sink.  A stream with no windows still gets its
    /// file header.
    pub fn finish(mut self) -> io::Result<W> {
        self.ensure_header()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
