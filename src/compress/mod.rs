// Streaming delta API on top of the wire format and the matcher:
//
// - `encoder`  DeltaEncoder: greedy parse, session-wide windows
// - `decoder`  DeltaDecoder: window-at-a-time decode with progress tracking

pub mod decoder;
pub mod encoder;

pub use decoder::DeltaDecoder;
pub use encoder::{CompressOptions, DeltaEncoder, EncodeError, encode_all, encode_memory};
