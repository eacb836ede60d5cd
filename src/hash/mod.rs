// Match finding for the encoder.
//
// - `rolling`  polynomial rolling hash and byte-comparison helpers
// - `table`    chained block index with HASH_CKOFFSET semantics
// - `matching` the `MatchFinder` trait and the greedy block matcher
// - `config`   matcher tuning and named profiles

pub mod config;
pub mod matching;
pub mod rolling;
pub mod table;

pub use config::MatcherConfig;
pub use matching::{BlockMatcher, MatchCandidate, MatchFinder, MatchQuery};
