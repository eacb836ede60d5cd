// File-level helpers around the streaming encoder and decoder.
//
// The source is read into memory; target, delta and output go through
// buffered readers and writers.  With the `file-io` feature, SHA-256
// digests are computed while the data flows.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::{Digest, Sha256};

use crate::compress::decoder::DeltaDecoder;
use crate::compress::encoder::{CompressOptions, DeltaEncoder, EncodeError};
use crate::vcdiff::decoder::{DecodeError, DecodeOptions};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `encode_file()`.
#[derive(Debug, Clone)]
pub struct EncodeStats {
    pub source_size: u64,
    pub target_size: u64,
    pub delta_size: u64,
    /// Windows written.
    pub windows: u64,
    /// SHA-256 of the target, with the `file-io` feature.
    pub target_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `decode_file()`.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    pub source_size: u64,
    pub delta_size: u64,
    pub output_size: u64,
    /// Windows decoded, empty ones included.
    pub windows: u64,
    /// SHA-256 of the reconstructed output, with the `file-io` feature.
    pub output_sha256: Option<[u8; 32]>,
}

/// Lowercase hex rendering of a digest.
pub fn hex_digest(digest: &[u8]) -> String {
    use std::fmt::Write as _;
    digest.iter().fold(String::with_capacity(digest.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("{context}: {source}")]
    File {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

fn file_err(what: &str, path: &Path) -> impl FnOnce(io::Error) -> IoError {
    let context = format!("{what} {}", path.display());
    move |source| IoError::File { context, source }
}

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Encode everything `target` yields against `source`, writing the delta to
/// `delta`.  The sink is flushed before returning.
pub fn encode_stream<R: Read, W: Write>(
    source: &[u8],
    mut target: R,
    delta: W,
    opts: CompressOptions,
) -> Result<EncodeStats, IoError> {
    let mut encoder = DeltaEncoder::new(Counting::new(delta), source, opts)?;

    #[cfg(feature = "file-io")]
    let mut target_hasher = Sha256::new();

    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match target.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        #[cfg(feature = "file-io")]
        target_hasher.update(&buf[..n]);
        encoder.write_target(&buf[..n])?;
    }

    let target_size = encoder.bytes_in();
    let (writer, windows) = encoder.finish()?;

    #[cfg(feature = "file-io")]
    let target_sha256 = Some(target_hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let target_sha256: Option<[u8; 32]> = None;

    Ok(EncodeStats {
        source_size: source.len() as u64,
        target_size,
        delta_size: writer.count(),
        windows,
        target_sha256,
    })
}

/// Apply the delta read from `delta` to `source`, writing the result to
/// `output`.  The sink is flushed before returning.
pub fn decode_stream<R: Read, W: Write>(
    source: &[u8],
    delta: R,
    output: W,
    options: DecodeOptions,
) -> Result<DecodeStats, IoError> {
    let mut decoder = DeltaDecoder::with_options(Counting::new(delta), options);
    let mut src: &[u8] = source;

    #[cfg(feature = "file-io")]
    let (output_size, output_sha256) = {
        let mut hashing = HashingWriter {
            inner: output,
            hasher: Sha256::new(),
        };
        let n = decoder.decode_to(&mut src, &mut hashing)?;
        hashing.flush()?;
        (n, Some(hashing.hasher.finalize().into()))
    };
    #[cfg(not(feature = "file-io"))]
    let (output_size, output_sha256) = {
        let mut output = output;
        let n = decoder.decode_to(&mut src, &mut output)?;
        output.flush()?;
        (n, None)
    };

    Ok(DecodeStats {
        source_size: source.len() as u64,
        delta_size: decoder.inner().reader().count(),
        output_size,
        windows: decoder.windows_decoded(),
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Encode the delta from `source_path` to `target_path` into `delta_path`.
pub fn encode_file(
    source_path: &Path,
    target_path: &Path,
    delta_path: &Path,
    opts: CompressOptions,
) -> Result<EncodeStats, IoError> {
    let source = std::fs::read(source_path).map_err(file_err("reading source", source_path))?;
    let target_file = File::open(target_path).map_err(file_err("opening target", target_path))?;
    let delta_file = File::create(delta_path).map_err(file_err("creating delta", delta_path))?;

    let stats = encode_stream(
        &source,
        BufReader::with_capacity(BUF_SIZE, target_file),
        BufWriter::with_capacity(BUF_SIZE, delta_file),
        opts,
    )?;
    log::info!(
        "encoded {} -> {}: {} target bytes, {} delta bytes, {} windows",
        target_path.display(),
        delta_path.display(),
        stats.target_size,
        stats.delta_size,
        stats.windows
    );
    Ok(stats)
}

/// Apply the delta in `delta_path` to `source_path`, writing `output_path`.
pub fn decode_file(
    source_path: &Path,
    delta_path: &Path,
    output_path: &Path,
) -> Result<DecodeStats, IoError> {
    decode_file_with(source_path, delta_path, output_path, DecodeOptions::default())
}

pub fn decode_file_with(
    source_path: &Path,
    delta_path: &Path,
    output_path: &Path,
    options: DecodeOptions,
) -> Result<DecodeStats, IoError> {
    let source = std::fs::read(source_path).map_err(file_err("reading source", source_path))?;
    let delta_file = File::open(delta_path).map_err(file_err("opening delta", delta_path))?;
    let output_file =
        File::create(output_path).map_err(file_err("creating output", output_path))?;

    let stats = decode_stream(
        &source,
        BufReader::with_capacity(BUF_SIZE, delta_file),
        BufWriter::with_capacity(BUF_SIZE, output_file),
        options,
    )?;
    log::info!(
        "decoded {} -> {}: {} bytes from {} windows",
        delta_path.display(),
        output_path.display(),
        stats.output_size,
        stats.windows
    );
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Byte counting
// ---------------------------------------------------------------------------

/// Counts bytes passing through a reader or writer.
pub struct Counting<T> {
    inner: T,
    count: u64,
}

impl<T> Counting<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for Counting<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

impl<W: Write> Write for Counting<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Hashing writer
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn encode_decode_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let source_data = b"The quick brown fox jumps over the lazy dog. 1234567890";
        let target_data = b"The quick brown cat sits on the lazy mat. 1234567890!!!";

        let source = write_file(&dir, "source.bin", source_data);
        let target = write_file(&dir, "target.bin", target_data);
        let delta = dir.path().join("delta.vcdiff");
        let output = dir.path().join("output.bin");

        let enc = encode_file(&source, &target, &delta, CompressOptions::default()).unwrap();
        assert_eq!(enc.source_size, source_data.len() as u64);
        assert_eq!(enc.target_size, target_data.len() as u64);
        assert_eq!(enc.delta_size, std::fs::metadata(&delta).unwrap().len());
        assert_eq!(enc.windows, 1);

        let dec = decode_file(&source, &delta, &output).unwrap();
        assert_eq!(dec.output_size, target_data.len() as u64);
        assert_eq!(dec.delta_size, enc.delta_size);
        assert_eq!(std::fs::read(&output).unwrap(), target_data);
    }

    #[test]
    fn empty_source_and_target() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "source.bin", b"");
        let target = write_file(&dir, "target.bin", b"");
        let delta = dir.path().join("delta.vcdiff");
        let output = dir.path().join("output.bin");

        let enc = encode_file(&source, &target, &delta, CompressOptions::default()).unwrap();
        assert!(enc.delta_size > 0);
        let dec = decode_file(&source, &delta, &output).unwrap();
        assert_eq!(dec.output_size, 0);
        assert!(std::fs::read(&output).unwrap().is_empty());
    }

    #[test]
    fn missing_source_names_the_file() {
        let dir = TempDir::new().unwrap();
        let target = write_file(&dir, "target.bin", b"data");
        let missing = dir.path().join("nope.bin");
        let err = encode_file(
            &missing,
            &target,
            &dir.path().join("delta"),
            CompressOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IoError::File { .. }));
        assert!(err.to_string().contains("nope.bin"));
    }

    #[test]
    fn checksum_failure_surfaces_as_decode_error() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "source.bin", b"");
        let target = write_file(&dir, "target.bin", b"literal data that will be damaged");
        let delta = dir.path().join("delta.vcdiff");
        let opts = CompressOptions {
            checksum: true,
            ..Default::default()
        };
        encode_file(&source, &target, &delta, opts).unwrap();

        let mut bytes = std::fs::read(&delta).unwrap();
        let at = bytes.len() - 4;
        bytes[at] ^= 0x20;
        std::fs::write(&delta, &bytes).unwrap();

        let err = decode_file(&source, &delta, &dir.path().join("out")).unwrap_err();
        assert!(matches!(
            err,
            IoError::Decode(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn sha256_digests_agree() {
        let dir = TempDir::new().unwrap();
        let source = write_file(&dir, "source.bin", b"source for checksum test");
        let target = write_file(&dir, "target.bin", b"target for checksum test");
        let delta = dir.path().join("delta.vcdiff");
        let output = dir.path().join("output.bin");

        let enc = encode_file(&source, &target, &delta, CompressOptions::default()).unwrap();
        let dec = decode_file(&source, &delta, &output).unwrap();
        assert!(enc.target_sha256.is_some());
        assert_eq!(dec.output_sha256, enc.target_sha256);
    }

    #[test]
    fn multi_window_file() {
        let dir = TempDir::new().unwrap();
        let source_data: Vec<u8> = (0..=255u8).cycle().take(1 << 20).collect();
        let mut target_data = source_data.clone();
        for i in (0..target_data.len()).step_by(4096) {
            target_data[i] = target_data[i].wrapping_add(1);
        }
        let source = write_file(&dir, "source.bin", &source_data);
        let target = write_file(&dir, "target.bin", &target_data);
        let delta = dir.path().join("delta.vcdiff");
        let output = dir.path().join("output.bin");

        let enc = encode_file(
            &source,
            &target,
            &delta,
            CompressOptions {
                window_size: 64 * 1024,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(enc.windows, 16);
        assert!(enc.delta_size < enc.target_size / 10);

        let dec = decode_file(&source, &delta, &output).unwrap();
        assert_eq!(dec.windows, 16);
        assert_eq!(std::fs::read(&output).unwrap(), target_data);
    }

    #[test]
    fn hex_digest_formats_lowercase() {
        assert_eq!(hex_digest(&[0x00, 0xAB, 0x7f]), "00ab7f");
    }
}
