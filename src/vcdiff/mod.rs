// Delta wire format: integers, address cache, code table, framing and the
// instruction interpreter.
//
// - `varint`        base-128 integers, most-significant group first
// - `address_cache` NEAR/SAME cache for COPY addresses (one per session)
// - `code_table`    default 256-entry opcode table and opcode selection
// - `checksum`      pluggable per-window checksum, Adler-32 by default
// - `header`        file header and window header
// - `sections`      read cursors over plain or interleaved window sections
// - `encoder`       section building and window emission
// - `decoder`       window parsing and instruction execution

pub mod address_cache;
pub mod checksum;
pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod sections;
pub mod varint;

pub use address_cache::AddressCache;
pub use checksum::{ChecksumFn, DEFAULT_CHECKSUM, adler32};
pub use code_table::Instruction;
pub use decoder::{
    DecodeError, DecodeOptions, DecoderState, InstructionIterator, Op, SourceProvider,
    StreamDecoder, decode_memory, decode_memory_with,
};
pub use encoder::{SegmentKind, SegmentRef, StreamEncoder, WindowEncoder, WindowSections};
pub use header::{FileHeader, MAX_WINDOW_SIZE, VCDIFF_MAGIC, WindowHeader};
