// Read cursors over a window's sections.
//
// A plain window has three independent cursors.  An interleaved window has
// one cursor that serves instruction, data and address reads in the order
// they were written.

use super::decoder::DecodeError;
use super::varint::{self, VarIntError};

/// Forward-only reader over one section.
#[derive(Debug, Clone, Copy)]
pub struct SectionCursor<'a> {
    name: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SectionCursor<'a> {
    pub fn new(name: &'static str, buf: &'a [u8]) -> Self {
        Self { name, buf, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unread bytes.
    #[inline]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn advance(&mut self, n: usize) -> Result<(), DecodeError> {
        if n > self.remaining() {
            return Err(self.underflow(n));
        }
        self.pos += n;
        Ok(())
    }

    #[inline]
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.buf.get(self.pos).ok_or_else(|| self.underflow(1))?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(self.underflow(n));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let (value, used) = varint::decode(self.rest()).map_err(|e| match e {
            VarIntError::Overflow => {
                DecodeError::InvalidInstruction(format!("{} varint overflows", self.name))
            }
            _ => self.underflow(1),
        })?;
        self.pos += used;
        Ok(value)
    }

    fn underflow(&self, wanted: usize) -> DecodeError {
        DecodeError::InvalidInstruction(format!(
            "{} section underflow: wanted {wanted} bytes, {} left",
            self.name,
            self.remaining()
        ))
    }
}

/// The cursors of one window.
#[derive(Debug)]
pub enum SectionCursors<'a> {
    Plain {
        data: SectionCursor<'a>,
        inst: SectionCursor<'a>,
        addr: SectionCursor<'a>,
    },
    Interleaved(SectionCursor<'a>),
}

impl<'a> SectionCursors<'a> {
    /// Split a window body (`data ++ inst ++ addr`) according to its header
    /// lengths.  The body must already have exactly that length.
    pub fn split(
        body: &'a [u8],
        data_len: usize,
        inst_len: usize,
        interleaved: bool,
    ) -> Result<Self, DecodeError> {
        if interleaved {
            if data_len != 0 || inst_len != body.len() {
                return Err(DecodeError::MalformedHeader(
                    "interleaved window has separate data or address bytes".into(),
                ));
            }
            return Ok(Self::Interleaved(SectionCursor::new("instruction", body)));
        }
        let inst_end = data_len
            .checked_add(inst_len)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| DecodeError::MalformedHeader("section lengths exceed window".into()))?;
        Ok(Self::Plain {
            data: SectionCursor::new("data", &body[..data_len]),
            inst: SectionCursor::new("instruction", &body[data_len..inst_end]),
            addr: SectionCursor::new("address", &body[inst_end..]),
        })
    }

    #[inline]
    pub fn data(&mut self) -> &mut SectionCursor<'a> {
        match self {
            Self::Plain { data, .. } => data,
            Self::Interleaved(c) => c,
        }
    }

    #[inline]
    pub fn inst(&mut self) -> &mut SectionCursor<'a> {
        match self {
            Self::Plain { inst, .. } => inst,
            Self::Interleaved(c) => c,
        }
    }

    #[inline]
    pub fn addr(&mut self) -> &mut SectionCursor<'a> {
        match self {
            Self::Plain { addr, .. } => addr,
            Self::Interleaved(c) => c,
        }
    }

    /// Whether any instruction bytes remain.
    pub fn has_instructions(&self) -> bool {
        match self {
            Self::Plain { inst, .. } => !inst.is_empty(),
            Self::Interleaved(c) => !c.is_empty(),
        }
    }

    /// Fail if any section still holds unread bytes.
    pub fn finish(&self) -> Result<(), DecodeError> {
        let leftovers: Vec<(&str, usize)> = match self {
            Self::Plain { data, inst, addr } => [data, inst, addr]
                .into_iter()
                .filter(|c| !c.is_empty())
                .map(|c| (c.name, c.remaining()))
                .collect(),
            Self::Interleaved(c) if !c.is_empty() => vec![(c.name, c.remaining())],
            Self::Interleaved(_) => Vec::new(),
        };
        match leftovers.first() {
            None => Ok(()),
            Some((name, n)) => Err(DecodeError::InvalidInstruction(format!(
                "{n} unused bytes left in {name} section"
            ))),
        }
    }
}
