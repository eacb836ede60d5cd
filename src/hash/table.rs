// Chained block index.
//
// Buckets hold `entry index + HASH_CKOFFSET`, so 0 means "empty".  Each
// entry links to the previous head of its bucket, which makes every chain
// most-recent-first.  Entries keep their full hash so lookups skip bucket
// collisions without touching the data.

use super::rolling::bucket_index;

/// Offset added to stored entry indices so 0 means "empty".
pub const HASH_CKOFFSET: u32 = 1;

/// Entries the index can address with 32-bit links.
pub const MAX_ENTRIES: usize = (u32::MAX - HASH_CKOFFSET) as usize;

const MIN_BITS: u32 = 4;
const MAX_BITS: u32 = 30;

#[derive(Debug, Clone, Copy)]
struct Entry {
    addr: u64,
    hash: u32,
    next: u32,
}

/// Block index keyed by rolling hash.
pub struct BlockTable {
    buckets: Vec<u32>,
    entries: Vec<Entry>,
    bits: u32,
    limit: usize,
    full: bool,
}

impl BlockTable {
    /// An index sized for about `expected` blocks.  It grows as needed.
    pub fn with_capacity(expected: usize) -> Self {
        Self::with_limit(expected, MAX_ENTRIES)
    }

    /// Like `with_capacity`, but stops accepting entries after `limit`.
    pub fn with_limit(expected: usize, limit: usize) -> Self {
        let bits = bits_for(expected);
        Self {
            buckets: vec![0; 1 << bits],
            entries: Vec::with_capacity(expected.min(limit)),
            bits,
            limit: limit.min(MAX_ENTRIES),
            full: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Whether inserts are being dropped.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Record a block starting at `addr`.  Returns `false` once the index
    /// has reached its entry limit.
    pub fn insert(&mut self, hash: u32, addr: u64) -> bool {
        if self.entries.len() >= self.limit {
            if !self.full {
                log::warn!(
                    "block index full at {} entries; later blocks are not indexed",
                    self.entries.len()
                );
                self.full = true;
            }
            return false;
        }
        if self.entries.len() >= self.buckets.len() && self.bits < MAX_BITS {
            self.grow();
        }

        let b = bucket_index(hash, self.bits);
        self.entries.push(Entry {
            addr,
            hash,
            next: self.buckets[b],
        });
        // Fits: len <= limit <= MAX_ENTRIES.
        self.buckets[b] = self.entries.len() as u32;
        true
    }

    /// Addresses of blocks with exactly `hash`, most recent first.
    pub fn chain(&self, hash: u32) -> Chain<'_> {
        Chain {
            table: self,
            hash,
            cursor: self.buckets[bucket_index(hash, self.bits)],
        }
    }

    /// Double the bucket array and relink entries in insertion order.
    fn grow(&mut self) {
        self.bits += 1;
        self.buckets.clear();
        self.buckets.resize(1 << self.bits, 0);
        for (i, e) in self.entries.iter_mut().enumerate() {
            let b = bucket_index(e.hash, self.bits);
            e.next = self.buckets[b];
            self.buckets[b] = i as u32 + HASH_CKOFFSET;
        }
        log::trace!("block index grown to {} buckets", self.buckets.len());
    }
}

fn bits_for(expected: usize) -> u32 {
    let n = expected.max(1).next_power_of_two();
    n.trailing_zeros().clamp(MIN_BITS, MAX_BITS)
}

/// Iterator over one hash chain.
pub struct Chain<'a> {
    table: &'a BlockTable,
    hash: u32,
    cursor: u32,
}

impl Iterator for Chain<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.cursor != 0 {
            let e = self.table.entries[(self.cursor - HASH_CKOFFSET) as usize];
            self.cursor = e.next;
            if e.hash == self.hash {
                return Some(e.addr);
            }
        }
        None
    }
}
