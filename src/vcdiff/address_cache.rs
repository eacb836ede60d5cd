// NEAR/SAME address cache for COPY addresses.
//
// One cache lives for a whole encode or decode session and is never reset
// between windows.  The encoder updates it when it commits a COPY, the
// decoder when it executes one; both sides must see the same address
// sequence or later addresses decode to garbage.
//
// Modes:
//   0      SELF  absolute address
//   1      HERE  here - value
//   2..5   NEAR  near[mode - 2] + value
//   6..8   SAME  same[(mode - 6) * 256 + byte]

use super::varint::{self, MAX_VARINT_LEN};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address relative to the current position.
pub const VCD_HERE: u8 = 1;

/// Depth of the NEAR ring.
pub const NEAR_SLOTS: usize = 4;
/// Number of 256-entry SAME pages.
pub const SAME_PAGES: usize = 3;

const SAME_SLOTS: usize = SAME_PAGES * 256;
const NEAR_FIRST: u8 = 2;
const SAME_FIRST: u8 = NEAR_FIRST + NEAR_SLOTS as u8;

/// Total number of address modes.
pub const MODE_COUNT: usize = 2 + NEAR_SLOTS + SAME_PAGES;

/// Marks a slot that has never been written.
const EMPTY: u64 = u64::MAX;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AddressCache {
    near: [u64; NEAR_SLOTS],
    same: Box<[u64; SAME_SLOTS]>,
    next_slot: usize,
}

impl AddressCache {
    /// A cache with every slot empty.
    pub fn new() -> Self {
        Self {
            near: [EMPTY; NEAR_SLOTS],
            same: Box::new([EMPTY; SAME_SLOTS]),
            next_slot: 0,
        }
    }

    /// Record `addr` as the most recent COPY address.
    #[inline]
    pub fn update(&mut self, addr: u64) {
        self.near[self.next_slot] = addr;
        self.next_slot = (self.next_slot + 1) % NEAR_SLOTS;
        self.same[(addr % SAME_SLOTS as u64) as usize] = addr;
    }

    /// Current NEAR ring contents in slot order (`None` for empty slots).
    pub fn near_slots(&self) -> [Option<u64>; NEAR_SLOTS] {
        self.near.map(|a| (a != EMPTY).then_some(a))
    }

    /// Contents of the SAME slot that `addr` hashes to.
    pub fn same_slot(&self, addr: u64) -> Option<u64> {
        let v = self.same[(addr % SAME_SLOTS as u64) as usize];
        (v != EMPTY).then_some(v)
    }

    // -----------------------------------------------------------------------
    // Mode selection
    // -----------------------------------------------------------------------

    /// Pick the cheapest mode for `addr` without touching the cache.
    ///
    /// A SAME hit wins outright.  Otherwise the smallest value among SELF,
    /// HERE and the non-empty NEAR slots is used; earlier modes win ties.
    fn select(&self, addr: u64, here: u64) -> Selection {
        let idx = (addr % SAME_SLOTS as u64) as usize;
        if self.same[idx] == addr {
            return Selection::Same {
                mode: SAME_FIRST + (idx / 256) as u8,
                byte: (idx % 256) as u8,
            };
        }

        let mut best = (VCD_SELF, addr);
        if let Some(d) = here.checked_sub(addr)
            && d < best.1
        {
            best = (VCD_HERE, d);
        }
        for (i, &near) in self.near.iter().enumerate() {
            if near != EMPTY && addr >= near && addr - near < best.1 {
                best = (NEAR_FIRST + i as u8, addr - near);
            }
        }
        Selection::Varint {
            mode: best.0,
            value: best.1,
        }
    }

    /// Number of address-section bytes `addr` would cost at `here`.
    pub fn cost(&self, addr: u64, here: u64) -> usize {
        match self.select(addr, here) {
            Selection::Same { .. } => 1,
            Selection::Varint { value, .. } => varint::encoded_len(value),
        }
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Encode `addr` with the cheapest mode and update the cache.
    ///
    /// `here` is the current position in the address space; `addr < here`.
    pub fn encode(&mut self, addr: u64, here: u64) -> (u8, EncodedAddr) {
        debug_assert!(addr < here, "COPY address {addr} not below {here}");
        let encoded = match self.select(addr, here) {
            Selection::Same { mode, byte } => (mode, EncodedAddr::SameByte(byte)),
            Selection::Varint { mode, value } => {
                let mut buf = [0u8; MAX_VARINT_LEN];
                let len = varint::encode(value, &mut buf).len();
                (mode, EncodedAddr::Varint { buf, len })
            }
        };
        self.update(addr);
        encoded
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Decode an address for `mode` from the front of `data`.
    ///
    /// Returns `(addr, bytes_consumed)`.  The cache is updated only when the
    /// address is valid.
    pub fn decode(
        &mut self,
        mode: u8,
        data: &[u8],
        here: u64,
    ) -> Result<(u64, usize), AddressCacheError> {
        let (addr, used) = match mode {
            VCD_SELF | VCD_HERE => {
                let (value, used) = varint::decode(data).map_err(AddressCacheError::from)?;
                let addr = if mode == VCD_SELF {
                    value
                } else {
                    here.checked_sub(value)
                        .ok_or(AddressCacheError::OutOfRange { addr: u64::MAX, here })?
                };
                (addr, used)
            }
            m if m < SAME_FIRST => {
                let base = self.near[(m - NEAR_FIRST) as usize];
                if base == EMPTY {
                    return Err(AddressCacheError::EmptySlot(mode));
                }
                let (value, used) = varint::decode(data).map_err(AddressCacheError::from)?;
                let addr = base
                    .checked_add(value)
                    .ok_or(AddressCacheError::OutOfRange { addr: u64::MAX, here })?;
                (addr, used)
            }
            m if (m as usize) < MODE_COUNT => {
                let &byte = data.first().ok_or(AddressCacheError::Underflow)?;
                let addr = self.same[(m - SAME_FIRST) as usize * 256 + byte as usize];
                if addr == EMPTY {
                    return Err(AddressCacheError::EmptySlot(mode));
                }
                (addr, 1)
            }
            _ => return Err(AddressCacheError::InvalidMode(mode)),
        };

        if addr >= here {
            return Err(AddressCacheError::OutOfRange { addr, here });
        }
        self.update(addr);
        Ok((addr, used))
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AddressCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressCache")
            .field("near", &self.near_slots())
            .field("next_slot", &self.next_slot)
            .finish_non_exhaustive()
    }
}

enum Selection {
    Same { mode: u8, byte: u8 },
    Varint { mode: u8, value: u64 },
}

// ---------------------------------------------------------------------------
// Encoded address representation
// ---------------------------------------------------------------------------

/// Address-section bytes for one COPY.
#[derive(Debug, Clone, Copy)]
pub enum EncodedAddr {
    /// SELF, HERE and NEAR modes; the varint sits in `buf[10 - len..]`.
    Varint { buf: [u8; MAX_VARINT_LEN], len: usize },
    /// SAME mode.
    SameByte(u8),
}

impl EncodedAddr {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EncodedAddr::Varint { buf, len } => &buf[MAX_VARINT_LEN - len..],
            EncodedAddr::SameByte(b) => std::slice::from_ref(b),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressCacheError {
    #[error("address section underflow")]
    Underflow,
    #[error("address varint overflows 64 bits")]
    Overflow,
    #[error("address mode {0} is not defined")]
    InvalidMode(u8),
    #[error("address mode {0} refers to an empty cache slot")]
    EmptySlot(u8),
    #[error("COPY address {addr} is not below current position {here}")]
    OutOfRange { addr: u64, here: u64 },
}

impl From<varint::VarIntError> for AddressCacheError {
    fn from(e: varint::VarIntError) -> Self {
        match e {
            varint::VarIntError::Overflow => Self::Overflow,
            _ => Self::Underflow,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
