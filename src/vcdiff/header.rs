// File header and per-window header.
//
// File header:
//   D6 C3 C4 <version> <hdr_ind> [app header length, app header bytes]
// where version 0x00 marks the plain section layout and 'S' the interleaved
// one.
//
// Window header:
//   win_ind [segment length, segment position] enc_len target_len del_ind
//   data_len inst_len addr_len [checksum (4 bytes, big-endian)]
// followed by the section bytes.  enc_len counts everything after itself.

use std::io::{self, Read, Write};

use bitflags::bitflags;

use super::decoder::DecodeError;
use super::varint::{self, VarIntError};

// ---------------------------------------------------------------------------
// Magic and version
// ---------------------------------------------------------------------------

pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

/// Version byte for three separate sections.
pub const VERSION_PLAIN: u8 = 0x00;
/// Version byte for the interleaved layout.
pub const VERSION_INTERLEAVED: u8 = b'S';

/// Largest target window the encoder will produce.
pub const MAX_WINDOW_SIZE: usize = 1 << 26;

// ---------------------------------------------------------------------------
// Indicator bytes
// ---------------------------------------------------------------------------

bitflags! {
    /// `hdr_ind`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeaderIndicator: u8 {
        const SECONDARY = 1 << 0;
        const CODETABLE = 1 << 1;
        const APPHEADER = 1 << 2;
    }
}

bitflags! {
    /// `win_ind`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WinIndicator: u8 {
        /// Copy segment taken from the source.
        const SOURCE = 1 << 0;
        /// Copy segment taken from earlier target output.
        const TARGET = 1 << 1;
        /// A 4-byte window checksum follows the section lengths.
        const CHECKSUM = 1 << 2;
    }
}

bitflags! {
    /// `del_ind`.  Any bit set means a secondary compressor was applied.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 1 << 0;
        const INSTCOMP = 1 << 1;
        const ADDRCOMP = 1 << 2;
    }
}

// ---------------------------------------------------------------------------
// Shared read helpers
// ---------------------------------------------------------------------------

fn read_byte<R: Read>(r: &mut R, what: &str) -> Result<u8, DecodeError> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).map_err(|e| eof_as_truncated(e, what))?;
    Ok(b[0])
}

fn read_varint<R: Read>(r: &mut R, what: &str) -> Result<u64, DecodeError> {
    varint::read(r).map_err(|e| match e {
        VarIntError::Underflow => DecodeError::Truncated(format!("stream ends inside {what}")),
        VarIntError::Overflow => DecodeError::MalformedHeader(format!("{what} overflows 64 bits")),
        VarIntError::Io(e) => DecodeError::Io(e),
    })
}

fn eof_as_truncated(e: io::Error, what: &str) -> DecodeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DecodeError::Truncated(format!("stream ends inside {what}"))
    } else {
        DecodeError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// Sections of every window are interleaved.
    pub interleaved: bool,
    pub indicator: HeaderIndicator,
    /// Opaque application data.
    pub app_header: Option<Vec<u8>>,
}

impl FileHeader {
    pub fn new(interleaved: bool, app_header: Option<Vec<u8>>) -> Self {
        let indicator = if app_header.is_some() {
            HeaderIndicator::APPHEADER
        } else {
            HeaderIndicator::empty()
        };
        Self {
            interleaved,
            indicator,
            app_header,
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        let app = self
            .app_header
            .as_ref()
            .map_or(0, |a| varint::encoded_len(a.len() as u64) + a.len());
        VCDIFF_MAGIC.len() + 2 + app
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&VCDIFF_MAGIC)?;
        let version = if self.interleaved {
            VERSION_INTERLEAVED
        } else {
            VERSION_PLAIN
        };
        w.write_all(&[version, self.indicator.bits()])?;
        if self.indicator.contains(HeaderIndicator::APPHEADER) {
            let data = self.app_header.as_deref().unwrap_or_default();
            varint::write(w, data.len() as u64)?;
            w.write_all(data)?;
        }
        Ok(())
    }

    /// Parse a file header.  Secondary compression and custom code tables
    /// are refused.
    pub fn decode<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 3];
        r.read_exact(&mut magic)
            .map_err(|e| eof_as_truncated(e, "file header"))?;
        if magic != VCDIFF_MAGIC {
            return Err(DecodeError::MalformedHeader(format!(
                "bad magic {:02X} {:02X} {:02X}",
                magic[0], magic[1], magic[2]
            )));
        }

        let interleaved = match read_byte(r, "file header")? {
            VERSION_PLAIN => false,
            VERSION_INTERLEAVED => true,
            v => {
                return Err(DecodeError::Unsupported(format!(
                    "format version {v:#04X}"
                )));
            }
        };

        let raw = read_byte(r, "file header")?;
        let indicator = HeaderIndicator::from_bits(raw).ok_or_else(|| {
            DecodeError::MalformedHeader(format!("undefined header indicator bits {raw:#04X}"))
        })?;
        if indicator.contains(HeaderIndicator::SECONDARY) {
            return Err(DecodeError::Unsupported("secondary compression".into()));
        }
        if indicator.contains(HeaderIndicator::CODETABLE) {
            return Err(DecodeError::Unsupported("custom code table".into()));
        }

        let app_header = if indicator.contains(HeaderIndicator::APPHEADER) {
            let len = read_varint(r, "application header length")?;
            let mut data = Vec::new();
            let got = r.by_ref().take(len).read_to_end(&mut data)?;
            if (got as u64) < len {
                return Err(DecodeError::Truncated(format!(
                    "application header: {got} of {len} bytes"
                )));
            }
            Some(data)
        } else {
            None
        };

        Ok(Self {
            interleaved,
            indicator,
            app_header,
        })
    }
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowHeader {
    pub indicator: WinIndicator,
    /// Length of the copy segment (0 when neither SOURCE nor TARGET is set).
    pub segment_len: u64,
    /// Offset of the copy segment in the source or in earlier output.
    pub segment_pos: u64,
    /// Byte count of everything after the `enc_len` field.
    pub enc_len: u64,
    pub target_len: u64,
    pub delta_indicator: DeltaIndicator,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    pub checksum: Option<u32>,
}

impl WindowHeader {
    #[inline]
    pub fn has_segment(&self) -> bool {
        self.indicator
            .intersects(WinIndicator::SOURCE | WinIndicator::TARGET)
    }

    /// Combined length of the three sections.
    pub fn sections_len(&self) -> Option<u64> {
        self.data_len
            .checked_add(self.inst_len)?
            .checked_add(self.addr_len)
    }

    /// The `enc_len` implied by the other fields, or `None` on overflow.
    pub fn compute_enc_len(&self) -> Option<u64> {
        let fixed = varint::encoded_len(self.target_len)
            + 1
            + varint::encoded_len(self.data_len)
            + varint::encoded_len(self.inst_len)
            + varint::encoded_len(self.addr_len)
            + if self.checksum.is_some() { 4 } else { 0 };
        self.sections_len()?.checked_add(fixed as u64)
    }

    /// Write the header.  `enc_len` is recomputed from the other fields.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let enc_len = self.compute_enc_len().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "window sections overflow u64")
        })?;
        let mut indicator = self.indicator - WinIndicator::CHECKSUM;
        if self.checksum.is_some() {
            indicator |= WinIndicator::CHECKSUM;
        }

        w.write_all(&[indicator.bits()])?;
        if self.has_segment() {
            varint::write(w, self.segment_len)?;
            varint::write(w, self.segment_pos)?;
        }
        varint::write(w, enc_len)?;
        varint::write(w, self.target_len)?;
        w.write_all(&[self.delta_indicator.bits()])?;
        varint::write(w, self.data_len)?;
        varint::write(w, self.inst_len)?;
        varint::write(w, self.addr_len)?;
        if let Some(sum) = self.checksum {
            w.write_all(&sum.to_be_bytes())?;
        }
        Ok(())
    }

    /// Parse a window header.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before the first byte.
    /// Target windows larger than `max_window` are refused before any
    /// allocation happens.
    pub fn decode<R: Read>(r: &mut R, max_window: u64) -> Result<Option<Self>, DecodeError> {
        let mut first = [0u8; 1];
        loop {
            match r.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }

        let indicator = WinIndicator::from_bits(first[0]).ok_or_else(|| {
            DecodeError::MalformedHeader(format!(
                "undefined window indicator bits {:#04X}",
                first[0]
            ))
        })?;
        if indicator.contains(WinIndicator::SOURCE | WinIndicator::TARGET) {
            return Err(DecodeError::MalformedHeader(
                "window sets both SOURCE and TARGET".into(),
            ));
        }

        let (segment_len, segment_pos) =
            if indicator.intersects(WinIndicator::SOURCE | WinIndicator::TARGET) {
                let len = read_varint(r, "segment length")?;
                let pos = read_varint(r, "segment position")?;
                if pos.checked_add(len).is_none() {
                    return Err(DecodeError::MalformedHeader(format!(
                        "segment {pos}+{len} overflows"
                    )));
                }
                (len, pos)
            } else {
                (0, 0)
            };

        let enc_len = read_varint(r, "delta encoding length")?;
        let target_len = read_varint(r, "target window length")?;
        if target_len > max_window {
            return Err(DecodeError::MalformedHeader(format!(
                "target window of {target_len} bytes exceeds limit {max_window}"
            )));
        }

        let raw = read_byte(r, "delta indicator")?;
        let delta_indicator = DeltaIndicator::from_bits(raw).ok_or_else(|| {
            DecodeError::MalformedHeader(format!("undefined delta indicator bits {raw:#04X}"))
        })?;
        if !delta_indicator.is_empty() {
            return Err(DecodeError::Unsupported(format!(
                "compressed sections ({delta_indicator:?})"
            )));
        }

        let data_len = read_varint(r, "data section length")?;
        let inst_len = read_varint(r, "instruction section length")?;
        let addr_len = read_varint(r, "address section length")?;

        let checksum = if indicator.contains(WinIndicator::CHECKSUM) {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)
                .map_err(|e| eof_as_truncated(e, "window checksum"))?;
            Some(u32::from_be_bytes(buf))
        } else {
            None
        };

        let hdr = WindowHeader {
            indicator,
            segment_len,
            segment_pos,
            enc_len,
            target_len,
            delta_indicator,
            data_len,
            inst_len,
            addr_len,
            checksum,
        };

        match hdr.compute_enc_len() {
            Some(expected) if expected == enc_len => Ok(Some(hdr)),
            Some(expected) => Err(DecodeError::MalformedHeader(format!(
                "delta encoding length {enc_len} disagrees with computed {expected}"
            ))),
            None => Err(DecodeError::MalformedHeader(
                "section lengths overflow".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
