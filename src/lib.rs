//! vcdelta: binary delta encoding and decoding in the VCDIFF family.
//!
//! The crate provides:
//! - The wire format and instruction interpreter (`vcdiff`)
//! - The block-hash match finder (`hash`)
//! - Streaming encoder and decoder APIs (`compress`)
//! - Stream and file helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use vcdelta::compress::encoder::{self, CompressOptions};
//! use vcdelta::compress::decoder;
//!
//! let source = b"hello old world";
//! let target = b"hello new world";
//!
//! let delta = encoder::encode_memory(source, target, CompressOptions::default()).unwrap();
//! let decoded = decoder::decode_all(source, &delta).unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod compress;
pub mod hash;
pub mod io;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;
