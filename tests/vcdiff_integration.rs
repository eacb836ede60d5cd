// Wire-level integration tests.
//
// These tests drive the window encoder with explicit instructions and check:
//   - End-to-end reconstruction for both section layouts
//   - Multi-window sessions (cross-window copies, VCD_TARGET segments)
//   - Format details (magic, version byte, header lengths, checksum)
//   - Size boundaries around 2^32
//   - Decoder robustness against malformed input

use vcdelta::vcdiff::{
    AddressCache, DecodeError, DecodeOptions, DecoderState, FileHeader, Instruction,
    SegmentRef, StreamDecoder, StreamEncoder, VCDIFF_MAGIC, WindowEncoder, WindowHeader,
    adler32, decode_memory, decode_memory_with,
    header::{DeltaIndicator, VERSION_INTERLEAVED, VERSION_PLAIN, WinIndicator},
    varint,
};

// ===========================================================================
// Helpers
// ===========================================================================

#[derive(Clone, Copy)]
enum Step<'a> {
    Add(&'a [u8]),
    Run(u32, u8),
    Copy(u32, u64),
}

struct Session {
    cache: AddressCache,
    produced: u64,
    stream: StreamEncoder<Vec<u8>>,
    interleaved: bool,
}

impl Session {
    fn new(interleaved: bool) -> Self {
        Self {
            cache: AddressCache::new(),
            produced: 0,
            stream: StreamEncoder::new(Vec::new(), interleaved, None),
            interleaved,
        }
    }

    /// Emit one window; `expected` is the window's reconstructed bytes.
    fn window(&mut self, segment: Option<SegmentRef>, steps: &[Step<'_>], expected: &[u8], checksum: bool) {
        let mut we = WindowEncoder::new(segment, self.produced, self.interleaved);
        for step in steps {
            match *step {
                Step::Add(b) => we.add(b),
                Step::Run(len, byte) => we.run(len, byte),
                Step::Copy(len, addr) => we.copy(&mut self.cache, len, addr),
            }
        }
        let sections = we.finish(expected, checksum.then_some(adler32 as fn(&[u8]) -> u32));
        self.stream.write_window(&sections).unwrap();
        self.produced += expected.len() as u64;
    }

    fn finish(self) -> Vec<u8> {
        self.stream.finish().unwrap()
    }
}

fn single_window(source: &[u8], steps: &[Step<'_>], expected: &[u8], interleaved: bool) -> Vec<u8> {
    let mut s = Session::new(interleaved);
    let segment = (!source.is_empty()).then(|| SegmentRef::source(0, source.len() as u64));
    s.window(segment, steps, expected, true);
    s.finish()
}

fn roundtrip_both_layouts(source: &[u8], steps: &[Step<'_>], expected: &[u8]) {
    for interleaved in [false, true] {
        let delta = single_window(source, steps, expected, interleaved);
        let decoded = decode_memory(&delta, source).unwrap();
        assert_eq!(decoded, expected, "interleaved={interleaved}");
    }
}

/// A small valid plain delta: "abc" via ADD, no source.
fn tiny_delta() -> Vec<u8> {
    single_window(&[], &[Step::Add(b"abc")], b"abc", false)
}

// ===========================================================================
// Reconstruction
// ===========================================================================

#[test]
fn add_only() {
    roundtrip_both_layouts(&[], &[Step::Add(b"Hello, world!")], b"Hello, world!");
}

#[test]
fn copy_from_source_then_add() {
    let source = b"The quick brown fox jumps over the lazy dog";
    let mut expected = source[..16].to_vec();
    expected.extend_from_slice(b"cat");
    roundtrip_both_layouts(
        source,
        &[Step::Copy(16, 0), Step::Add(b"cat")],
        &expected,
    );
}

#[test]
fn run_and_small_add_pairs() {
    // Small ADDs next to COPYs exercise the double opcodes.
    let source = b"0123456789abcdef";
    let steps = [
        Step::Add(b"x"),
        Step::Copy(4, 0),
        Step::Add(b"yz"),
        Step::Copy(4, 12),
        Step::Run(40, b'-'),
        Step::Copy(5, 3),
        Step::Add(b"!"),
    ];
    let mut expected = b"x0123yzcdef".to_vec();
    expected.extend_from_slice(&[b'-'; 40]);
    expected.extend_from_slice(b"34567!");
    roundtrip_both_layouts(source, &steps, &expected);
}

#[test]
fn overlapping_self_copy_repeats_pattern() {
    // COPY from just behind `here` with len > distance replicates "ab".
    let steps = [Step::Add(b"ab"), Step::Copy(10, 0)];
    roundtrip_both_layouts(&[], &steps, b"abababababab");
}

#[test]
fn long_sizes_use_explicit_varints() {
    let source: Vec<u8> = (0..70_000u32).map(|i| (i % 251) as u8).collect();
    let mut expected = source[100..70_000].to_vec();
    expected.extend(std::iter::repeat_n(9u8, 20_000));
    let steps = [Step::Copy(69_900, 100), Step::Run(20_000, 9)];
    roundtrip_both_layouts(&source, &steps, &expected);
}

#[test]
fn cache_persists_across_windows() {
    let source: Vec<u8> = (0..=255u8).collect();
    let mut s = Session::new(false);
    let seg = Some(SegmentRef::source(0, 256));
    // Window 1 copies from 200, window 2 copies from 200 again (NEAR/SAME hit).
    s.window(seg, &[Step::Copy(8, 200)], &source[200..208], true);
    s.window(seg, &[Step::Copy(8, 200), Step::Copy(8, 256)], &[&source[200..208], &source[200..208]].concat(), true);
    let delta = s.finish();

    let decoded = decode_memory(&delta, &source).unwrap();
    let mut expected = source[200..208].to_vec();
    expected.extend_from_slice(&source[200..208]);
    expected.extend_from_slice(&source[200..208]);
    assert_eq!(decoded, expected);
}

#[test]
fn copy_from_earlier_window_output() {
    let mut s = Session::new(true);
    s.window(None, &[Step::Add(b"first window bytes")], b"first window bytes", false);
    // Address 0 with no segment is the first byte of the session's output.
    s.window(None, &[Step::Copy(5, 0), Step::Add(b"!")], b"first!", false);
    let delta = s.finish();
    assert_eq!(decode_memory(&delta, &[]).unwrap(), b"first window bytesfirst!");
}

#[test]
fn target_segment_window() {
    let mut s = Session::new(false);
    s.window(None, &[Step::Add(b"0123456789")], b"0123456789", true);
    // Segment = output[2..8].  Addresses past the segment index the
    // session output from its first byte.
    s.window(
        Some(SegmentRef::target(2, 6)),
        &[Step::Copy(6, 0), Step::Copy(3, 6)],
        b"234567012",
        true,
    );
    let delta = s.finish();
    assert_eq!(decode_memory(&delta, &[]).unwrap(), b"0123456789234567012");
}

#[test]
fn empty_stream_has_only_the_file_header() {
    let delta = StreamEncoder::new(Vec::new(), false, None).finish().unwrap();
    assert_eq!(delta, [0xD6, 0xC3, 0xC4, VERSION_PLAIN, 0x00]);
    assert!(decode_memory(&delta, &[]).unwrap().is_empty());
}

// ===========================================================================
// Format
// ===========================================================================

#[test]
fn magic_and_version_bytes() {
    let plain = single_window(&[], &[Step::Add(b"x")], b"x", false);
    assert_eq!(&plain[..3], &VCDIFF_MAGIC);
    assert_eq!(plain[3], VERSION_PLAIN);

    let interleaved = single_window(&[], &[Step::Add(b"x")], b"x", true);
    assert_eq!(interleaved[3], VERSION_INTERLEAVED);
}

#[test]
fn window_header_describes_sections() {
    let source = b"abcdefghijklmnopqrstuvwxyz";
    let delta = single_window(source, &[Step::Copy(10, 3), Step::Add(b"??")], b"defghijklm??", false);
    let mut r = &delta[..];
    let fh = FileHeader::decode(&mut r).unwrap();
    assert!(!fh.interleaved);
    let wh = WindowHeader::decode(&mut r, 1 << 20).unwrap().unwrap();
    assert!(wh.indicator.contains(WinIndicator::SOURCE | WinIndicator::CHECKSUM));
    assert_eq!((wh.segment_pos, wh.segment_len), (0, 26));
    assert_eq!(wh.target_len, 12);
    assert_eq!(wh.data_len, 2);
    assert_eq!(wh.checksum, Some(adler32(b"defghijklm??")));
    assert_eq!(Some(wh.enc_len), wh.compute_enc_len());
    assert_eq!(r.len() as u64, wh.sections_len().unwrap());
}

#[test]
fn interleaved_windows_have_one_section() {
    let delta = single_window(b"0123456789", &[Step::Copy(4, 0), Step::Add(b"ab")], b"0123ab", true);
    let mut r = &delta[..];
    FileHeader::decode(&mut r).unwrap();
    let wh = WindowHeader::decode(&mut r, 1 << 20).unwrap().unwrap();
    assert_eq!((wh.data_len, wh.addr_len), (0, 0));
    assert_eq!(wh.inst_len as usize, r.len());
}

#[test]
fn app_header_roundtrips() {
    let mut enc = StreamEncoder::new(Vec::new(), false, Some(b"file=a.bin".to_vec()));
    let we = WindowEncoder::new(None, 0, false);
    enc.write_window(&we.finish(&[], None)).unwrap();
    let delta = enc.finish().unwrap();

    let mut dec = StreamDecoder::new(&delta[..], DecodeOptions::default());
    assert_eq!(
        dec.read_header().unwrap().app_header.as_deref(),
        Some(&b"file=a.bin"[..])
    );
    let mut src: &[u8] = &[];
    assert!(dec.decode_all(&mut src).unwrap().is_empty());
}

#[test]
fn instruction_trace_matches_emitted_steps() {
    let source = b"0123456789abcdef";
    let delta = single_window(
        source,
        &[Step::Add(b"zz"), Step::Copy(6, 4), Step::Run(9, 0)],
        b"zz456789\0\0\0\0\0\0\0\0\0",
        false,
    );
    let mut dec = StreamDecoder::new(&delta[..], DecodeOptions::default());
    dec.set_trace_instructions(true);
    dec.next_window(&mut &source[..]).unwrap().unwrap();
    let kinds: Vec<(u8, u32)> = dec
        .last_instructions()
        .iter()
        .map(|i| match *i {
            Instruction::Add { len } => (0, len),
            Instruction::Run { len } => (1, len),
            Instruction::Copy { len, addr, .. } => {
                assert_eq!(addr, 4);
                (2, len)
            }
        })
        .collect();
    assert_eq!(kinds, vec![(0, 2), (2, 6), (1, 9)]);
}

// ===========================================================================
// Size boundaries
// ===========================================================================

#[test]
fn varints_around_u32_max() {
    for v in [
        u64::from(u32::MAX) - 1,
        u64::from(u32::MAX),
        u64::from(u32::MAX) + 1,
        1 << 35,
        u64::MAX,
    ] {
        let mut buf = Vec::new();
        varint::push(&mut buf, v);
        assert_eq!(buf.len(), varint::encoded_len(v));
        assert_eq!(varint::decode(&buf).unwrap(), (v, buf.len()));
    }
}

#[test]
fn addresses_beyond_u32_encode_and_decode() {
    let here = (1u64 << 32) + 1000;
    for addr in [0u64, 5, u64::from(u32::MAX), (1 << 32) + 10, here - 1] {
        let mut enc = AddressCache::new();
        let mut dec = AddressCache::new();
        let (mode, bytes) = enc.encode(addr, here);
        let (decoded, used) = dec.decode(mode, bytes.as_bytes(), here).unwrap();
        assert_eq!((decoded, used), (addr, bytes.len()), "addr {addr}");
    }
}

// ===========================================================================
// Checksums
// ===========================================================================

#[test]
fn corrupted_literal_fails_checksum() {
    let mut delta = single_window(&[], &[Step::Add(b"checksummed literal bytes")], b"checksummed literal bytes", false);
    // Data section sits right before the two-byte instruction section.
    let at = delta.len() - 4;
    delta[at] ^= 0x40;

    let err = decode_memory(&delta, &[]).unwrap_err();
    assert!(matches!(err, DecodeError::ChecksumMismatch { .. }));

    let relaxed = DecodeOptions {
        verify_checksum: false,
        ..Default::default()
    };
    let decoded = decode_memory_with(&delta, &[], relaxed).unwrap();
    assert_ne!(decoded, b"checksummed literal bytes");
    assert_eq!(decoded.len(), 25);
}

#[test]
fn custom_checksum_function() {
    fn xor_sum(data: &[u8]) -> u32 {
        data.iter().fold(0u32, |acc, &b| acc.rotate_left(5) ^ u32::from(b))
    }
    let we = {
        let mut we = WindowEncoder::new(None, 0, false);
        we.add(b"payload");
        we
    };
    let mut enc = StreamEncoder::new(Vec::new(), false, None);
    enc.write_window(&we.finish(b"payload", Some(xor_sum))).unwrap();
    let delta = enc.finish().unwrap();

    assert!(matches!(
        decode_memory(&delta, &[]),
        Err(DecodeError::ChecksumMismatch { .. })
    ));
    let opts = DecodeOptions {
        checksum_fn: xor_sum,
        ..Default::default()
    };
    assert_eq!(decode_memory_with(&delta, &[], opts).unwrap(), b"payload");
}

// ===========================================================================
// Malformed input
// ===========================================================================

#[test]
fn bad_magic_rejected() {
    let mut delta = tiny_delta();
    delta[0] = 0x00;
    assert!(matches!(
        decode_memory(&delta, &[]),
        Err(DecodeError::MalformedHeader(_))
    ));
}

#[test]
fn unknown_version_rejected() {
    let mut delta = tiny_delta();
    delta[3] = 0x01;
    assert!(decode_memory(&delta, &[]).is_err());
}

#[test]
fn secondary_and_code_table_are_unsupported() {
    for bit in [0x01u8, 0x02] {
        let mut delta = tiny_delta();
        delta[4] = bit;
        assert!(
            matches!(decode_memory(&delta, &[]), Err(DecodeError::Unsupported(_))),
            "hdr_ind {bit:#x}"
        );
    }
}

#[test]
fn compressed_sections_are_unsupported() {
    let mut wh = WindowHeader {
        target_len: 1,
        data_len: 1,
        inst_len: 1,
        delta_indicator: DeltaIndicator::all(),
        ..Default::default()
    };
    wh.enc_len = wh.compute_enc_len().unwrap();
    let mut delta = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
    wh.encode(&mut delta).unwrap();
    delta.extend_from_slice(&[b'x', 0x02]);
    assert!(matches!(
        decode_memory(&delta, &[]),
        Err(DecodeError::Unsupported(_))
    ));
}

#[test]
fn every_truncation_is_an_error() {
    let source = b"0123456789abcdef";
    let delta = single_window(
        source,
        &[Step::Copy(8, 2), Step::Add(b"tail"), Step::Run(12, 7)],
        b"23456789tail\x07\x07\x07\x07\x07\x07\x07\x07\x07\x07\x07\x07",
        false,
    );
    let header_len = 5;
    for cut in 0..delta.len() {
        let result = decode_memory(&delta[..cut], source);
        if cut == header_len {
            // A header with no windows is a complete, empty stream.
            assert_eq!(result.unwrap(), b"");
        } else {
            assert!(result.is_err(), "cut at {cut} decoded");
        }
    }
}

#[test]
fn truncated_sections_report_truncated() {
    let delta = tiny_delta();
    let err = decode_memory(&delta[..delta.len() - 1], &[]).unwrap_err();
    assert!(matches!(err, DecodeError::Truncated(_)));
}

#[test]
fn source_segment_beyond_source_rejected() {
    let source = b"0123456789";
    let delta = single_window(source, &[Step::Copy(4, 0)], b"0123", false);
    assert!(matches!(
        decode_memory(&delta, b"0123"),
        Err(DecodeError::MalformedHeader(_))
    ));
}

#[test]
fn oversized_window_refused() {
    let delta = single_window(&[], &[Step::Run(5000, 1)], &[1; 5000], false);
    let opts = DecodeOptions {
        max_window_size: 4096,
        ..Default::default()
    };
    assert!(matches!(
        decode_memory_with(&delta, &[], opts),
        Err(DecodeError::MalformedHeader(_))
    ));
}

#[test]
fn decoder_is_poisoned_after_failure() {
    let mut delta = tiny_delta();
    delta.extend_from_slice(&[0xFF, 0xFF]);
    let mut dec = StreamDecoder::new(&delta[..], DecodeOptions::default());
    let mut src: &[u8] = &[];
    assert_eq!(dec.next_window(&mut src).unwrap().unwrap(), b"abc");
    assert!(dec.next_window(&mut src).is_err());
    assert_eq!(dec.state(), DecoderState::Failed);
    assert!(matches!(dec.next_window(&mut src), Err(DecodeError::Poisoned)));
    // Output of the good window is kept.
    assert_eq!(dec.output(), b"abc");
}

#[test]
fn random_garbage_never_panics() {
    let mut x = 0x1234_5678u32;
    for len in 0..400usize {
        let mut data = vec![0xD6, 0xC3, 0xC4, 0x00, 0x00];
        for _ in 0..len {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            data.push(x as u8);
        }
        let opts = DecodeOptions {
            max_window_size: 1 << 16,
            ..Default::default()
        };
        let _ = decode_memory_with(&data, b"some source bytes", opts);
    }
}
