// Block matching.
//
// The source is cut into non-overlapping blocks of `block_size` bytes, each
// indexed by its rolling hash.  Target blocks join the same index once they
// lie entirely behind the scan position, addressed past the end of the
// source, so one lookup covers both source copies and self-copies.
//
// A lookup hashes the block at the scan position, verifies up to
// `max_probes` chain entries with the same hash, extends each one forward
// and backward, and keeps the best by length, then address cost.

use super::config::{DEFAULT_BLOCK_SIZE, MatcherConfig};
use super::rolling::{RollingHash, backward_match, forward_match};
use super::table::BlockTable;
use crate::vcdiff::address_cache::AddressCache;
use crate::vcdiff::varint;

/// Longest COPY with an implicit size in the default code table.
const IMPLICIT_COPY_MAX: usize = 18;

// ---------------------------------------------------------------------------
// Query and result
// ---------------------------------------------------------------------------

/// A match accepted by the finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCandidate {
    /// Address of the first matched byte (already moved back by `backtrack`).
    pub addr: u64,
    /// Total length, including `backtrack`.
    pub len: usize,
    /// Bytes of pending literal the match absorbs before the scan position.
    pub backtrack: usize,
}

/// Where to look.  Positions index `target`, which holds every target byte
/// of the session up to at least `window_end`.
#[derive(Debug, Clone, Copy)]
pub struct MatchQuery<'a> {
    pub source: &'a [u8],
    pub target: &'a [u8],
    /// Scan position.
    pub pos: usize,
    /// Forward extension stops here.
    pub window_end: usize,
    /// Backward extension stops here (start of the unemitted literal run).
    pub literal_start: usize,
}

/// Bytes a COPY of `len` costs when its address costs `addr_cost` bytes.
#[inline]
pub fn copy_cost(len: usize, addr_cost: usize) -> usize {
    let size_cost = if len > IMPLICIT_COPY_MAX {
        varint::encoded_len(len as u64)
    } else {
        0
    };
    1 + addr_cost + size_cost
}

// ---------------------------------------------------------------------------
// Match finder
// ---------------------------------------------------------------------------

/// Match-finding heuristic used by the encoder.
pub trait MatchFinder {
    /// Index the whole source.  Called once per session, before any lookup.
    fn index_source(&mut self, source: &[u8]);

    /// Index target blocks that end at or before `upto`.
    fn index_target(&mut self, target: &[u8], upto: usize);

    /// Best acceptable match at `query.pos`, if any.
    fn find_match(
        &mut self,
        query: &MatchQuery<'_>,
        cache: &AddressCache,
    ) -> Option<MatchCandidate>;
}

/// Greedy rolling-hash block matcher.
pub struct BlockMatcher {
    config: MatcherConfig,
    hasher: RollingHash,
    table: BlockTable,
    source_len: u64,
    /// Start of the next target block to index.
    next_target_block: usize,
    /// Position and hash of the previous lookup, for rolling.
    last_probe: Option<(usize, u32)>,
}

impl BlockMatcher {
    pub fn new(block_size: usize, config: MatcherConfig) -> Self {
        Self {
            config,
            hasher: RollingHash::new(block_size.max(1)),
            table: BlockTable::with_capacity(0),
            source_len: 0,
            next_target_block: 0,
            last_probe: None,
        }
    }

    /// Blocks currently indexed.
    pub fn indexed_blocks(&self) -> usize {
        self.table.len()
    }

    fn probe_hash(&mut self, target: &[u8], pos: usize) -> u32 {
        let bs = self.hasher.width();
        let hash = match self.last_probe {
            Some((prev, h)) if prev + 1 == pos => self.hasher.roll(h, target[prev], target[prev + bs]),
            _ => self.hasher.hash(&target[pos..]),
        };
        self.last_probe = Some((pos, hash));
        hash
    }
}

impl Default for BlockMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, MatcherConfig::default())
    }
}

impl MatchFinder for BlockMatcher {
    fn index_source(&mut self, source: &[u8]) {
        let bs = self.hasher.width();
        self.source_len = source.len() as u64;
        self.table = BlockTable::with_capacity(source.len() / bs);
        for (i, block) in source.chunks_exact(bs).enumerate() {
            if !self.table.insert(self.hasher.hash(block), (i * bs) as u64) {
                break;
            }
        }
        log::debug!(
            "indexed {} source blocks of {bs} bytes",
            self.table.len()
        );
    }

    fn index_target(&mut self, target: &[u8], upto: usize) {
        let bs = self.hasher.width();
        let upto = upto.min(target.len());
        while self.next_target_block + bs <= upto {
            let start = self.next_target_block;
            let hash = self.hasher.hash(&target[start..]);
            self.table.insert(hash, self.source_len + start as u64);
            self.next_target_block += bs;
        }
    }

    fn find_match(
        &mut self,
        q: &MatchQuery<'_>,
        cache: &AddressCache,
    ) -> Option<MatchCandidate> {
        let bs = self.hasher.width();
        if q.pos + bs > q.window_end || self.table.is_empty() {
            self.last_probe = None;
            return None;
        }
        let hash = self.probe_hash(q.target, q.pos);

        let s = self.source_len;
        let here = s + q.pos as u64;
        let ahead = &q.target[q.pos..q.window_end];
        let behind = &q.target[q.literal_start..q.pos];
        let mut best: Option<(MatchCandidate, usize)> = None;

        for addr in self.table.chain(hash).take(self.config.max_probes) {
            // Source matches end at the source; target matches may overlap
            // the scan position.
            let (fwd, back) = if addr < s {
                let a = addr as usize;
                let fwd = forward_match(&q.source[a..], ahead, usize::MAX);
                if fwd < bs {
                    continue;
                }
                (fwd, backward_match(&q.source[..a], behind, usize::MAX))
            } else {
                let t = (addr - s) as usize;
                let fwd = forward_match(&q.target[t..q.window_end], ahead, usize::MAX);
                if fwd < bs {
                    continue;
                }
                (fwd, backward_match(&q.target[..t], behind, usize::MAX))
            };

            let cand = MatchCandidate {
                addr: addr - back as u64,
                len: fwd + back,
                backtrack: back,
            };
            let cost = cache.cost(cand.addr, here - back as u64);
            let better = match &best {
                None => true,
                Some((b, b_cost)) => cand.len > b.len || (cand.len == b.len && cost < *b_cost),
            };
            if better {
                best = Some((cand, cost));
            }
        }

        let (cand, addr_cost) = best?;
        if cand.len < self.config.min_match || copy_cost(cand.len, addr_cost) >= cand.len {
            return None;
        }
        Some(cand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::config::DEFAULT;

    fn noise(n: usize, seed: u32) -> Vec<u8> {
        let mut x = seed;
        (0..n)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                // Keep clear of the ASCII letters used as markers.
                ((x >> 16) % 60) as u8 + 128
            })
            .collect()
    }

    fn query<'a>(source: &'a [u8], target: &'a [u8], pos: usize) -> MatchQuery<'a> {
        MatchQuery {
            source,
            target,
            pos,
            window_end: target.len(),
            literal_start: 0,
        }
    }

    #[test]
    fn identical_input_matches_whole_source() {
        let source = noise(256, 1);
        let mut m = BlockMatcher::new(16, DEFAULT);
        m.index_source(&source);
        let c = m
            .find_match(&query(&source, &source, 0), &AddressCache::new())
            .unwrap();
        assert_eq!(c, MatchCandidate { addr: 0, len: 256, backtrack: 0 });
    }

    #[test]
    fn backward_extension_absorbs_literals() {
        let source = noise(128, 2);
        let mut target = b"XY".to_vec();
        target.extend_from_slice(&source[10..50]);
        let mut m = BlockMatcher::new(16, DEFAULT);
        m.index_source(&source);
        // target[8..] lines up with the source block at 16.
        let c = m
            .find_match(&query(&source, &target, 8), &AddressCache::new())
            .unwrap();
        assert_eq!(c, MatchCandidate { addr: 10, len: 40, backtrack: 6 });
    }

    #[test]
    fn backward_extension_respects_literal_start() {
        let source = noise(128, 2);
        let mut target = b"XY".to_vec();
        target.extend_from_slice(&source[10..50]);
        let mut m = BlockMatcher::new(16, DEFAULT);
        m.index_source(&source);
        let q = MatchQuery {
            literal_start: 5,
            ..query(&source, &target, 8)
        };
        let c = m.find_match(&q, &AddressCache::new()).unwrap();
        assert_eq!(c.backtrack, 3);
        assert_eq!(c.addr, 13);
    }

    #[test]
    fn self_copy_from_indexed_target() {
        let block = noise(32, 3);
        let target = [block.clone(), block].concat();
        let mut m = BlockMatcher::new(16, DEFAULT);
        m.index_source(&[]);
        m.index_target(&target, 32);
        assert_eq!(m.indexed_blocks(), 2);
        let c = m
            .find_match(&query(&[], &target, 32), &AddressCache::new())
            .unwrap();
        assert_eq!(c, MatchCandidate { addr: 0, len: 32, backtrack: 0 });
    }

    #[test]
    fn target_blocks_are_addressed_after_source() {
        let source = noise(64, 4);
        let block = noise(16, 5);
        let target = [block.clone(), block].concat();
        let mut m = BlockMatcher::new(16, DEFAULT);
        m.index_source(&source);
        m.index_target(&target, 16);
        let c = m
            .find_match(&query(&source, &target, 16), &AddressCache::new())
            .unwrap();
        assert_eq!(c.addr, 64);
    }

    #[test]
    fn nothing_without_a_full_block() {
        let source = noise(64, 6);
        let mut m = BlockMatcher::new(16, DEFAULT);
        m.index_source(&source);
        let short = &source[..15];
        assert!(
            m.find_match(&query(&source, short, 0), &AddressCache::new())
                .is_none()
        );

        let mut empty = BlockMatcher::new(16, DEFAULT);
        empty.index_source(&[]);
        assert!(
            empty
                .find_match(&query(&[], &source, 0), &AddressCache::new())
                .is_none()
        );
    }

    #[test]
    fn equal_lengths_prefer_cheaper_then_recent() {
        let mut source = noise(1000, 7);
        let block: Vec<u8> = source[16..32].to_vec();
        source[496..512].copy_from_slice(&block);
        let mut m = BlockMatcher::new(16, DEFAULT);
        m.index_source(&source);

        // From an empty cache, 16 is a one-byte SELF address; 496 needs two.
        let mut cache = AddressCache::new();
        let c = m.find_match(&query(&source, &block, 0), &cache).unwrap();
        assert_eq!(c.addr, 16);

        // With 490 in the NEAR ring both cost one byte; the later block wins.
        cache.update(490);
        let c = m.find_match(&query(&source, &block, 0), &cache).unwrap();
        assert_eq!(c.addr, 496);
    }

    #[test]
    fn rolling_lookups_agree_with_fresh_ones() {
        let source = noise(512, 8);
        let mut target = noise(7, 9);
        target.extend_from_slice(&source[100..300]);
        let mut rolling = BlockMatcher::new(8, DEFAULT);
        rolling.index_source(&source);
        for pos in 0..target.len() {
            let mut fresh = BlockMatcher::new(8, DEFAULT);
            fresh.index_source(&source);
            let q = MatchQuery {
                literal_start: pos,
                ..query(&source, &target, pos)
            };
            let cache = AddressCache::new();
            assert_eq!(
                rolling.find_match(&q, &cache),
                fresh.find_match(&q, &cache),
                "pos {pos}"
            );
        }
    }

    #[test]
    fn unprofitable_matches_are_rejected() {
        let source = noise(64, 10);
        let mut m = BlockMatcher::new(
            2,
            MatcherConfig {
                min_match: 4,
                ..DEFAULT
            },
        );
        m.index_source(&source);
        // Two matching bytes are below min_match.
        let target = [source[0], source[1], 0, 0];
        assert!(
            m.find_match(&query(&source, &target, 0), &AddressCache::new())
                .is_none()
        );
    }

    #[test]
    fn copy_cost_counts_explicit_sizes() {
        assert_eq!(copy_cost(18, 1), 2);
        assert_eq!(copy_cost(19, 1), 3);
        assert_eq!(copy_cost(200, 2), 5);
    }
}
