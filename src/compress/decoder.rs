// Streaming delta decoder.
//
// DeltaDecoder wraps StreamDecoder with:
//   - Window-by-window output to any Write sink
//   - Progress tracking (bytes decoded, windows decoded)
//
// A window reaches the sink only after it has executed completely and its
// checksum (if any) has been verified.

use std::io::{Read, Write};

use crate::vcdiff::decoder::{DecodeError, DecodeOptions, SourceProvider, StreamDecoder};

// ---------------------------------------------------------------------------
// DeltaDecoder
// ---------------------------------------------------------------------------

/// Streaming delta decoder with progress tracking.
pub struct DeltaDecoder<R: Read> {
    inner: StreamDecoder<R>,
    bytes_decoded: u64,
}

impl<R: Read> DeltaDecoder<R> {
    /// Create a decoder with default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, DecodeOptions::default())
    }

    pub fn with_options(reader: R, options: DecodeOptions) -> Self {
        Self {
            inner: StreamDecoder::new(reader, options),
            bytes_decoded: 0,
        }
    }

    /// Create a decoder that optionally skips checksum verification.
    pub fn with_checksum(reader: R, verify: bool) -> Self {
        Self::with_options(
            reader,
            DecodeOptions {
                verify_checksum: verify,
                ..Default::default()
            },
        )
    }

    /// Decode the next non-empty window into `sink`.
    ///
    /// Returns the number of bytes written, or 0 once the stream is complete.
    pub fn decode_chunk<S: SourceProvider, W: Write>(
        &mut self,
        source: &mut S,
        sink: &mut W,
    ) -> Result<u64, DecodeError> {
        loop {
            let Some(window) = self.inner.next_window(source)? else {
                return Ok(0);
            };
            if window.is_empty() {
                continue;
            }
            let n = window.len() as u64;
            if let Err(e) = sink.write_all(window) {
                self.inner.poison();
                return Err(e.into());
            }
            self.bytes_decoded += n;
            return Ok(n);
        }
    }

    /// Decode all remaining windows into `sink`.
    ///
    /// Returns the total number of bytes decoded by this decoder.
    pub fn decode_to<S: SourceProvider, W: Write>(
        &mut self,
        source: &mut S,
        sink: &mut W,
    ) -> Result<u64, DecodeError> {
        while self.decode_chunk(source, sink)? > 0 {}
        Ok(self.bytes_decoded)
    }

    /// Total bytes decoded so far.
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    /// Number of windows decoded so far, empty ones included.
    pub fn windows_decoded(&self) -> u64 {
        self.inner.windows_decoded()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }

    /// The underlying window decoder.
    pub fn inner(&self) -> &StreamDecoder<R> {
        &self.inner
    }
}

// ---------------------------------------------------------------------------
// Convenience function
// ---------------------------------------------------------------------------

/// Decode a delta held in memory.
pub fn decode_all(source: &[u8], delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
    crate::vcdiff::decoder::decode_memory(delta, source)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
