// Streaming delta encoder.
//
// DeltaEncoder drives the block matcher and the window encoder:
//   - Source is indexed once; target blocks join the index as they are produced
//   - Target data is fed in chunks via write_target()
//   - Each full window is parsed greedily and written immediately
//   - One address cache spans the whole session, never reset between windows
//
// Every window carries the whole source as its VCD_SOURCE segment, so target
// addresses are the same in every window: `source.len() + offset`, where the
// offset counts target bytes from the start of the session.

use std::io::Write;

use crate::hash::config::{DEFAULT_BLOCK_SIZE, DEFAULT_WINDOW_SIZE, MIN_BLOCK_SIZE, MatcherConfig};
use crate::hash::matching::{BlockMatcher, MatchFinder, MatchQuery};
use crate::hash::rolling::run_length;
use crate::vcdiff::address_cache::AddressCache;
use crate::vcdiff::checksum::{ChecksumFn, DEFAULT_CHECKSUM};
use crate::vcdiff::encoder::{SegmentRef, StreamEncoder, WindowEncoder};
use crate::vcdiff::header::MAX_WINDOW_SIZE;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the streaming delta encoder.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Width of indexed blocks.  Also the shortest match the index can find.
    pub block_size: usize,
    /// Emit a checksum per window.
    pub checksum: bool,
    /// Write the single-section interleaved layout.
    pub interleaved: bool,
    /// Maximum target bytes per window.
    pub window_size: usize,
    pub matcher: MatcherConfig,
    /// Window checksum; must match the decoder's.
    pub checksum_fn: ChecksumFn,
    /// Written to the file header as `VCD_APPHEADER` data.
    pub app_header: Option<Vec<u8>>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            checksum: false,
            interleaved: false,
            window_size: DEFAULT_WINDOW_SIZE,
            matcher: MatcherConfig::default(),
            checksum_fn: DEFAULT_CHECKSUM,
            app_header: None,
        }
    }
}

impl CompressOptions {
    /// Reject settings the encoder cannot honor.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.block_size < MIN_BLOCK_SIZE {
            return Err(EncodeError::InvalidOptions(format!(
                "block size {} is below the minimum of {MIN_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SIZE {
            return Err(EncodeError::InvalidOptions(format!(
                "window size {} is outside 1..={MAX_WINDOW_SIZE}",
                self.window_size
            )));
        }
        if self.matcher.min_match == 0 || self.matcher.min_run == 0 {
            return Err(EncodeError::InvalidOptions(
                "min_match and min_run must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

// ---------------------------------------------------------------------------
// DeltaEncoder
// ---------------------------------------------------------------------------

/// Streaming delta encoder.
///
/// Indexes the source once upfront, then processes target data in windows.
/// Each completed window is immediately encoded and written to the output.
/// Target bytes are retained for the whole session so later windows can
/// copy from earlier ones.
///
/// # Example
/// ```no_run
/// use vcdelta::compress::encoder::{CompressOptions, DeltaEncoder};
/// let source = b"original data";
/// let target = b"modified data";
/// let mut output = Vec::new();
/// let mut enc = DeltaEncoder::new(&mut output, source, CompressOptions::default()).unwrap();
/// enc.write_target(target).unwrap();
/// enc.finish().unwrap();
/// ```
pub struct DeltaEncoder<'s, W: Write> {
    stream: StreamEncoder<W>,
    opts: CompressOptions,
    source: &'s [u8],
    matcher: Box<dyn MatchFinder + 's>,
    cache: AddressCache,
    /// Every target byte received so far.
    history: Vec<u8>,
    /// Prefix of `history` already written as windows.
    encoded: usize,
    windows_written: u64,
}

impl<'s, W: Write> DeltaEncoder<'s, W> {
    /// Create a new streaming encoder using the block matcher.
    ///
    /// The source is indexed immediately.
    pub fn new(writer: W, source: &'s [u8], opts: CompressOptions) -> Result<Self, EncodeError> {
        opts.validate()?;
        let matcher = BlockMatcher::new(opts.block_size, opts.matcher);
        Self::with_matcher(writer, source, opts, Box::new(matcher))
    }

    /// Create an encoder around a custom match finder.
    pub fn with_matcher(
        writer: W,
        source: &'s [u8],
        opts: CompressOptions,
        mut matcher: Box<dyn MatchFinder + 's>,
    ) -> Result<Self, EncodeError> {
        opts.validate()?;
        matcher.index_source(source);
        let stream = StreamEncoder::new(writer, opts.interleaved, opts.app_header.clone());
        Ok(Self {
            stream,
            opts,
            source,
            matcher,
            cache: AddressCache::new(),
            history: Vec::new(),
            encoded: 0,
            windows_written: 0,
        })
    }

    /// Feed target data to the encoder.
    ///
    /// Whenever `window_size` bytes are waiting, a window is encoded and
    /// written to the output.
    pub fn write_target(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        self.history.extend_from_slice(data);
        while self.history.len() - self.encoded >= self.opts.window_size {
            self.encode_window(self.encoded + self.opts.window_size)?;
        }
        Ok(())
    }

    /// Encode any remaining data and finalize the stream.
    ///
    /// Returns the underlying writer and the number of windows written.  An
    /// empty target still gets one empty window.
    pub fn finish(mut self) -> Result<(W, u64), EncodeError> {
        if self.encoded < self.history.len() || self.windows_written == 0 {
            self.encode_window(self.history.len())?;
        }
        log::debug!(
            "encoded {} target bytes in {} windows, {} delta bytes",
            self.history.len(),
            self.windows_written,
            self.stream.bytes_written()
        );
        let windows = self.windows_written;
        Ok((self.stream.finish()?, windows))
    }

    /// Number of target bytes received so far.
    pub fn bytes_in(&self) -> u64 {
        self.history.len() as u64
    }

    /// Number of windows written so far.
    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    /// Delta bytes written so far.
    pub fn bytes_out(&self) -> u64 {
        self.stream.bytes_written()
    }

    /// Encode `history[self.encoded..end]` as one window.
    fn encode_window(&mut self, end: usize) -> Result<(), EncodeError> {
        let start = self.encoded;
        let segment = (!self.source.is_empty())
            .then(|| SegmentRef::source(0, self.source.len() as u64));
        let mut we = WindowEncoder::new(segment, start as u64, self.opts.interleaved);

        self.parse(&mut we, start, end);

        let checksum = self.opts.checksum.then_some(self.opts.checksum_fn);
        let sections = we.finish(&self.history[start..end], checksum);
        log::debug!(
            "window {}: {} target bytes, {} instructions, sections {}/{}/{}",
            self.windows_written,
            end - start,
            sections.instructions,
            sections.data.len(),
            sections.inst.len(),
            sections.addr.len()
        );
        self.stream.write_window(&sections)?;
        self.encoded = end;
        self.windows_written += 1;
        Ok(())
    }

    /// Greedy left-to-right parse of `history[start..end]`.
    fn parse(&mut self, we: &mut WindowEncoder, start: usize, end: usize) {
        let cfg = self.opts.matcher;
        let target = &self.history[..end];
        let mut p = start;
        let mut literal_start = start;

        while p < end {
            self.matcher.index_target(target, p);
            let query = MatchQuery {
                source: self.source,
                target,
                pos: p,
                window_end: end,
                literal_start,
            };
            let candidate = self.matcher.find_match(&query, &self.cache);
            let byte = target[p];
            let run = run_length(&target[p..], byte, end - p);

            if run >= cfg.min_run && run >= candidate.map_or(0, |c| c.len) {
                flush_literals(we, &target[literal_start..p]);
                log::trace!("RUN {run} x {byte:#04X} at {p}");
                // Window length bounds the run.
                we.run(run as u32, byte);
                p += run;
                literal_start = p;
            } else if let Some(c) = candidate {
                let copy_start = p - c.backtrack;
                flush_literals(we, &target[literal_start..copy_start]);
                log::trace!("COPY {} from {} at {copy_start}", c.len, c.addr);
                we.copy(&mut self.cache, c.len as u32, c.addr);
                p = copy_start + c.len;
                literal_start = p;
            } else {
                p += 1;
            }
        }
        flush_literals(we, &target[literal_start..end]);
    }
}

fn flush_literals(we: &mut WindowEncoder, bytes: &[u8]) {
    if !bytes.is_empty() {
        we.add(bytes);
    }
}

/// Convenience: encode an entire target at once into `writer`.
pub fn encode_all<W: Write>(
    writer: W,
    source: &[u8],
    target: &[u8],
    opts: CompressOptions,
) -> Result<W, EncodeError> {
    let mut enc = DeltaEncoder::new(writer, source, opts)?;
    enc.write_target(target)?;
    let (w, _) = enc.finish()?;
    Ok(w)
}

/// Convenience: encode an entire target into a new buffer.
pub fn encode_memory(
    source: &[u8],
    target: &[u8],
    opts: CompressOptions,
) -> Result<Vec<u8>, EncodeError> {
    encode_all(Vec::new(), source, target, opts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
