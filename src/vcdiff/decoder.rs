// Stream decoder: window parsing and instruction execution.
//
// Each window goes through
//   AwaitingHeader -> ParsingSections -> ExecutingInstructions -> WindowComplete
// and the stream ends in StreamComplete when input runs out exactly at a
// window boundary.  Any fault moves the decoder to Failed for good.
//
// The decoder keeps every byte it has produced.  COPY addresses at or past
// the window's segment length index that output, across window boundaries,
// and VCD_TARGET segments are cut from it.

use std::io::{self, Read};

use super::address_cache::{AddressCache, AddressCacheError};
use super::checksum::{ChecksumFn, DEFAULT_CHECKSUM};
use super::code_table::{
    self, CodeTable, INST_ADD, INST_COPY, INST_NOOP, INST_RUN, Instruction,
};
use super::header::{FileHeader, MAX_WINDOW_SIZE, WinIndicator, WindowHeader};
use super::sections::SectionCursors;
use super::varint::VarIntError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
    #[error("checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("truncated delta: {0}")]
    Truncated(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("decoder already failed")]
    Poisoned,
}

impl From<VarIntError> for DecodeError {
    fn from(e: VarIntError) -> Self {
        match e {
            VarIntError::Io(e) => Self::Io(e),
            other => Self::InvalidInstruction(other.to_string()),
        }
    }
}

impl From<AddressCacheError> for DecodeError {
    fn from(e: AddressCacheError) -> Self {
        Self::InvalidInstruction(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Source provider
// ---------------------------------------------------------------------------

/// Random access to the source for VCD_SOURCE windows.
pub trait SourceProvider {
    /// Read bytes at `offset` into `buf`, returning how many were read.
    fn read_source(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DecodeError>;

    /// Total source length.
    fn source_len(&self) -> u64;

    /// Borrow `[offset, offset + len)` directly when the source is in memory.
    fn source_slice(&self, _offset: u64, _len: usize) -> Option<&[u8]> {
        None
    }
}

impl SourceProvider for &[u8] {
    fn read_source(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, DecodeError> {
        let Ok(offset) = usize::try_from(offset) else {
            return Ok(0);
        };
        let available = self.get(offset..).unwrap_or_default();
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn source_len(&self) -> u64 {
        self.len() as u64
    }

    fn source_slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        self.get(start..start.checked_add(len)?)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Compare window checksums when the stream carries them.
    pub verify_checksum: bool,
    /// Largest target window accepted from a header.
    pub max_window_size: u64,
    pub checksum_fn: ChecksumFn,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            max_window_size: MAX_WINDOW_SIZE as u64,
            checksum_fn: DEFAULT_CHECKSUM,
        }
    }
}

// ---------------------------------------------------------------------------
// Instruction iterator
// ---------------------------------------------------------------------------

/// One decoded instruction together with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op<'a> {
    Add(&'a [u8]),
    Run { len: u32, byte: u8 },
    Copy { len: u32, addr: u64, mode: u8 },
}

impl Op<'_> {
    pub fn len(&self) -> u32 {
        match *self {
            Op::Add(bytes) => bytes.len() as u32,
            Op::Run { len, .. } | Op::Copy { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn instruction(&self) -> Instruction {
        match *self {
            Op::Add(bytes) => Instruction::Add {
                len: bytes.len() as u32,
            },
            Op::Run { len, .. } => Instruction::Run { len },
            Op::Copy { len, addr, mode } => Instruction::Copy { len, addr, mode },
        }
    }
}

/// Walks a window's instructions, resolving sizes, payloads and addresses.
///
/// The address cache is borrowed from the session so that addresses decode
/// the same way they were encoded.
pub struct InstructionIterator<'a, 'c> {
    cursors: SectionCursors<'a>,
    cache: &'c mut AddressCache,
    table: &'static CodeTable,
    here: u64,
    /// Second half of a double opcode.
    second: Option<(u8, u8)>,
    failed: bool,
}

impl<'a, 'c> InstructionIterator<'a, 'c> {
    /// `here` is the address of the window's first target byte.
    pub fn new(cursors: SectionCursors<'a>, cache: &'c mut AddressCache, here: u64) -> Self {
        Self {
            cursors,
            cache,
            table: code_table::default_code_table(),
            here,
            second: None,
            failed: false,
        }
    }

    /// Current position in the address space.
    pub fn here(&self) -> u64 {
        self.here
    }

    /// Next instruction, or `None` once the instruction section is exhausted.
    pub fn next_op(&mut self) -> Result<Option<Op<'a>>, DecodeError> {
        loop {
            let (kind, size) = match self.second.take() {
                Some(half) => half,
                None => {
                    if !self.cursors.has_instructions() {
                        return Ok(None);
                    }
                    let opcode = self.cursors.inst().read_byte()?;
                    let entry = self.table[opcode as usize];
                    if entry.type2 != INST_NOOP {
                        self.second = Some((entry.type2, entry.size2));
                    }
                    (entry.type1, entry.size1)
                }
            };
            if kind != INST_NOOP {
                return self.resolve(kind, size).map(Some);
            }
        }
    }

    fn resolve(&mut self, kind: u8, table_size: u8) -> Result<Op<'a>, DecodeError> {
        let size = if table_size == 0 {
            self.cursors.inst().read_varint()?
        } else {
            u64::from(table_size)
        };
        if size == 0 {
            return Err(DecodeError::InvalidInstruction(
                "zero-length instruction".into(),
            ));
        }
        let len = u32::try_from(size).map_err(|_| {
            DecodeError::InvalidInstruction(format!("instruction size {size} too large"))
        })?;

        let op = match kind {
            INST_ADD => Op::Add(self.cursors.data().read_bytes(len as usize)?),
            INST_RUN => Op::Run {
                len,
                byte: self.cursors.data().read_byte()?,
            },
            _ => {
                let mode = kind - INST_COPY;
                let addr_cursor = self.cursors.addr();
                let (addr, used) = self.cache.decode(mode, addr_cursor.rest(), self.here)?;
                addr_cursor.advance(used)?;
                Op::Copy { len, addr, mode }
            }
        };
        self.here += size;
        Ok(op)
    }

    /// Fail if any section bytes were left unread.
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.second.is_some() {
            return Err(DecodeError::InvalidInstruction(
                "window ends inside a double instruction".into(),
            ));
        }
        self.cursors.finish()
    }
}

impl Iterator for InstructionIterator<'_, '_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_op() {
            Ok(op) => op.map(|op| Ok(op.instruction())),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Window execution
// ---------------------------------------------------------------------------

/// Execute one window, appending its bytes to `target`.
///
/// `target` holds everything produced earlier in the session.  On error the
/// caller is responsible for truncating it back.
#[allow(clippy::too_many_arguments)]
fn execute_window<S: SourceProvider>(
    hdr: &WindowHeader,
    body: &[u8],
    interleaved: bool,
    cache: &mut AddressCache,
    source: &mut S,
    target: &mut Vec<u8>,
    copy_buf: &mut Vec<u8>,
    mut trace: Option<&mut Vec<Instruction>>,
) -> Result<u64, DecodeError> {
    let window_start = target.len();
    let target_len = usize::try_from(hdr.target_len).map_err(|_| {
        DecodeError::MalformedHeader(format!("target window of {} bytes", hdr.target_len))
    })?;
    let seg_len = hdr.segment_len;
    let here = seg_len + window_start as u64;

    let cursors = SectionCursors::split(
        body,
        hdr.data_len as usize,
        hdr.inst_len as usize,
        interleaved,
    )?;
    let mut iter = InstructionIterator::new(cursors, cache, here);
    target.reserve(target_len);
    let mut count = 0u64;

    while let Some(op) = iter.next_op()? {
        let produced = target.len() - window_start;
        let len = op.len() as usize;
        if len > target_len - produced {
            return Err(DecodeError::InvalidInstruction(format!(
                "instruction of {len} bytes overruns window ({produced} of {target_len} produced)"
            )));
        }

        match op {
            Op::Add(bytes) => target.extend_from_slice(bytes),
            Op::Run { byte, .. } => target.resize(target.len() + len, byte),
            Op::Copy { addr, .. } if addr < seg_len => {
                if addr + len as u64 > seg_len {
                    return Err(DecodeError::InvalidInstruction(format!(
                        "COPY at {addr} of {len} bytes crosses segment end {seg_len}"
                    )));
                }
                let offset = hdr.segment_pos + addr;
                if hdr.indicator.contains(WinIndicator::TARGET) {
                    // Segment bounds were checked against earlier output.
                    let start = offset as usize;
                    target.extend_from_within(start..start + len);
                } else if let Some(slice) = source.source_slice(offset, len) {
                    target.extend_from_slice(slice);
                } else {
                    copy_buf.resize(len, 0);
                    let n = source.read_source(offset, copy_buf)?;
                    if n < len {
                        return Err(DecodeError::InvalidInstruction(format!(
                            "source ends at {} inside COPY of {len} bytes at {offset}",
                            offset + n as u64
                        )));
                    }
                    target.extend_from_slice(copy_buf);
                }
            }
            Op::Copy { addr, .. } => {
                let start = (addr - seg_len) as usize;
                if start + len <= target.len() {
                    target.extend_from_within(start..start + len);
                } else {
                    // Overlaps the bytes being written.
                    for i in start..start + len {
                        let b = target[i];
                        target.push(b);
                    }
                }
            }
        }

        if let Some(t) = trace.as_deref_mut() {
            t.push(op.instruction());
        }
        count += 1;
    }

    let produced = target.len() - window_start;
    if produced != target_len {
        return Err(DecodeError::InvalidInstruction(format!(
            "window produced {produced} of {target_len} bytes"
        )));
    }
    iter.finish()?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Stream decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingHeader,
    ParsingSections,
    ExecutingInstructions,
    WindowComplete,
    StreamComplete,
    Failed,
}

/// Decodes a delta stream window by window.
pub struct StreamDecoder<R: Read> {
    reader: R,
    options: DecodeOptions,
    state: DecoderState,
    file_header: Option<FileHeader>,
    cache: AddressCache,
    /// Every byte produced so far.
    target: Vec<u8>,
    /// Section bytes of the current window (reused).
    body: Vec<u8>,
    copy_buf: Vec<u8>,
    windows_decoded: u64,
    last_window: Option<WindowHeader>,
    trace: Option<Vec<Instruction>>,
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(reader: R, options: DecodeOptions) -> Self {
        Self {
            reader,
            options,
            state: DecoderState::AwaitingHeader,
            file_header: None,
            cache: AddressCache::new(),
            target: Vec::new(),
            body: Vec::new(),
            copy_buf: Vec::new(),
            windows_decoded: 0,
            last_window: None,
            trace: None,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::StreamComplete
    }

    pub fn windows_decoded(&self) -> u64 {
        self.windows_decoded
    }

    /// Everything decoded so far.
    pub fn output(&self) -> &[u8] {
        &self.target
    }

    pub fn into_output(self) -> Vec<u8> {
        self.target
    }

    /// Header of the most recently decoded window.
    pub fn last_window(&self) -> Option<&WindowHeader> {
        self.last_window.as_ref()
    }

    /// Record the instructions of each window for `last_instructions`.
    pub fn set_trace_instructions(&mut self, on: bool) {
        self.trace = on.then(Vec::new);
    }

    /// Instructions of the most recent window, when tracing is on.
    pub fn last_instructions(&self) -> &[Instruction] {
        self.trace.as_deref().unwrap_or_default()
    }

    /// The delta stream being read.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    /// Parse the file header if that has not happened yet.
    pub fn read_header(&mut self) -> Result<&FileHeader, DecodeError> {
        self.check_usable()?;
        if self.file_header.is_none() {
            match FileHeader::decode(&mut self.reader) {
                Ok(hdr) => {
                    log::debug!(
                        "file header: interleaved={} app_header={:?}",
                        hdr.interleaved,
                        hdr.app_header.as_ref().map(Vec::len)
                    );
                    self.file_header = Some(hdr);
                }
                Err(e) => {
                    self.state = DecoderState::Failed;
                    return Err(e);
                }
            }
        }
        self.file_header
            .as_ref()
            .ok_or(DecodeError::Poisoned)
    }

    /// Mark the stream failed after a fault outside the decoder, such as a
    /// sink write error on a window already handed out.
    pub(crate) fn poison(&mut self) {
        log::debug!("decoder poisoned after window {}", self.windows_decoded);
        self.state = DecoderState::Failed;
    }

    fn check_usable(&self) -> Result<(), DecodeError> {
        if self.state == DecoderState::Failed {
            Err(DecodeError::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Decode the next window.
    ///
    /// Returns the window's bytes, or `None` once the stream has ended.
    pub fn next_window<S: SourceProvider>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<&[u8]>, DecodeError> {
        self.check_usable()?;
        if self.state == DecoderState::StreamComplete {
            return Ok(None);
        }
        self.read_header()?;

        let window_start = self.target.len();
        match self.decode_window(source) {
            Ok(true) => Ok(Some(&self.target[window_start..])),
            Ok(false) => Ok(None),
            Err(e) => {
                self.target.truncate(window_start);
                self.state = DecoderState::Failed;
                log::debug!("window {} failed: {e}", self.windows_decoded);
                Err(e)
            }
        }
    }

    /// Decode every remaining window.
    pub fn decode_all<S: SourceProvider>(&mut self, source: &mut S) -> Result<&[u8], DecodeError> {
        while self.next_window(source)?.is_some() {}
        Ok(&self.target)
    }

    fn decode_window<S: SourceProvider>(&mut self, source: &mut S) -> Result<bool, DecodeError> {
        self.state = DecoderState::AwaitingHeader;
        let Some(hdr) = WindowHeader::decode(&mut self.reader, self.options.max_window_size)?
        else {
            self.state = DecoderState::StreamComplete;
            log::debug!(
                "stream complete: {} windows, {} bytes",
                self.windows_decoded,
                self.target.len()
            );
            return Ok(false);
        };

        self.state = DecoderState::ParsingSections;
        self.check_segment(&hdr, source)?;
        let interleaved = self.file_header.as_ref().is_some_and(|h| h.interleaved);
        if !interleaved && hdr.data_len > hdr.target_len {
            return Err(DecodeError::MalformedHeader(format!(
                "data section of {} bytes for a {}-byte window",
                hdr.data_len, hdr.target_len
            )));
        }

        let body_len = hdr.sections_len().ok_or_else(|| {
            DecodeError::MalformedHeader("section lengths overflow".into())
        })?;
        self.body.clear();
        let got = (&mut self.reader)
            .take(body_len)
            .read_to_end(&mut self.body)?;
        if (got as u64) < body_len {
            return Err(DecodeError::Truncated(format!(
                "window {} sections: {got} of {body_len} bytes",
                self.windows_decoded
            )));
        }

        self.state = DecoderState::ExecutingInstructions;
        if let Some(t) = self.trace.as_mut() {
            t.clear();
        }
        let window_start = self.target.len();
        let count = execute_window(
            &hdr,
            &self.body,
            interleaved,
            &mut self.cache,
            source,
            &mut self.target,
            &mut self.copy_buf,
            self.trace.as_mut(),
        )?;

        if self.options.verify_checksum
            && let Some(expected) = hdr.checksum
        {
            let actual = (self.options.checksum_fn)(&self.target[window_start..]);
            if actual != expected {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }

        log::debug!(
            "window {}: {} bytes from {} instructions, segment {:?} {}+{}",
            self.windows_decoded,
            hdr.target_len,
            count,
            hdr.indicator - WinIndicator::CHECKSUM,
            hdr.segment_pos,
            hdr.segment_len
        );
        self.windows_decoded += 1;
        self.last_window = Some(hdr);
        self.state = DecoderState::WindowComplete;
        Ok(true)
    }

    fn check_segment<S: SourceProvider>(
        &self,
        hdr: &WindowHeader,
        source: &S,
    ) -> Result<(), DecodeError> {
        let end = hdr.segment_pos + hdr.segment_len;
        if hdr.indicator.contains(WinIndicator::SOURCE) {
            let available = source.source_len();
            if end > available {
                return Err(DecodeError::MalformedHeader(format!(
                    "source segment {}..{end} exceeds source of {available} bytes",
                    hdr.segment_pos
                )));
            }
        } else if hdr.indicator.contains(WinIndicator::TARGET) {
            let available = self.target.len() as u64;
            if end > available {
                return Err(DecodeError::MalformedHeader(format!(
                    "target segment {}..{end} exceeds {available} decoded bytes",
                    hdr.segment_pos
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory convenience
// ---------------------------------------------------------------------------

/// Decode a complete delta held in memory.
pub fn decode_memory(delta: &[u8], source: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_memory_with(delta, source, DecodeOptions::default())
}

pub fn decode_memory_with(
    delta: &[u8],
    source: &[u8],
    options: DecodeOptions,
) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = StreamDecoder::new(delta, options);
    let mut src = source;
    decoder.decode_all(&mut src)?;
    Ok(decoder.into_output())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
