// Polynomial rolling hash over fixed-size blocks, plus the byte-comparison
// helpers the matcher uses to verify and extend candidates.
//
//   H(b[0..n]) = b[0]*B^(n-1) + b[1]*B^(n-2) + ... + b[n-1]   (mod 2^32)
//
// Sliding the window one byte right removes b[0]*B^(n-1), multiplies by B
// and adds the new byte.

/// Polynomial base.  Odd, so multiplication is a bijection mod 2^32.
pub const HASH_BASE: u32 = 0x0100_0193;

/// Multiplier used to spread hashes over buckets (2^32 / golden ratio).
const BUCKET_MIX: u32 = 0x9E37_79B1;

/// Rolling hash for one block width.
#[derive(Debug, Clone, Copy)]
pub struct RollingHash {
    width: usize,
    /// `HASH_BASE^(width - 1)`.
    out_factor: u32,
}

impl RollingHash {
    pub fn new(width: usize) -> Self {
        debug_assert!(width > 0);
        let out_factor = (1..width).fold(1u32, |acc, _| acc.wrapping_mul(HASH_BASE));
        Self { width, out_factor }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Hash of `bytes[..width]`.
    #[inline]
    pub fn hash(&self, bytes: &[u8]) -> u32 {
        debug_assert!(bytes.len() >= self.width);
        bytes[..self.width]
            .iter()
            .fold(0u32, |h, &b| h.wrapping_mul(HASH_BASE).wrapping_add(u32::from(b)))
    }

    /// Slide the window: drop `out`, append `incoming`.
    #[inline(always)]
    pub fn roll(&self, hash: u32, out: u8, incoming: u8) -> u32 {
        hash.wrapping_sub(u32::from(out).wrapping_mul(self.out_factor))
            .wrapping_mul(HASH_BASE)
            .wrapping_add(u32::from(incoming))
    }
}

/// Bucket index in a table of `2^bits` buckets.
#[inline(always)]
pub fn bucket_index(hash: u32, bits: u32) -> usize {
    debug_assert!((1..=32).contains(&bits));
    (hash.wrapping_mul(BUCKET_MIX) >> (32 - bits)) as usize
}

// ---------------------------------------------------------------------------
// Byte comparison
// ---------------------------------------------------------------------------

/// Length of the common prefix of `a` and `b`, at most `max`.
#[inline]
pub fn forward_match(a: &[u8], b: &[u8], max: usize) -> usize {
    let n = max.min(a.len()).min(b.len());
    let (a, b) = (&a[..n], &b[..n]);
    let mut i = 0;
    for (ca, cb) in a.chunks_exact(8).zip(b.chunks_exact(8)) {
        if ca != cb {
            break;
        }
        i += 8;
    }
    i + a[i..]
        .iter()
        .zip(&b[i..])
        .take_while(|(x, y)| x == y)
        .count()
}

/// Length of the common suffix of `a` and `b`, at most `max`.
#[inline]
pub fn backward_match(a: &[u8], b: &[u8], max: usize) -> usize {
    let n = max.min(a.len()).min(b.len());
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let mut i = 0;
    for (ca, cb) in a.rchunks_exact(8).zip(b.rchunks_exact(8)) {
        if ca != cb {
            break;
        }
        i += 8;
    }
    i + a[..n - i]
        .iter()
        .rev()
        .zip(b[..n - i].iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Number of leading bytes of `data` equal to `byte`, at most `max`.
#[inline]
pub fn run_length(data: &[u8], byte: u8, max: usize) -> usize {
    let n = max.min(data.len());
    let pattern = [byte; 8];
    let mut i = 0;
    for chunk in data[..n].chunks_exact(8) {
        if chunk != pattern {
            break;
        }
        i += 8;
    }
    i + data[i..n].iter().take_while(|&&b| b == byte).count()
}
