#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::vcdiff::{AddressCache, SegmentRef, StreamEncoder, WindowEncoder, decoder};

// Drive the window encoder with a scripted instruction stream and check
// that the decoder reproduces exactly the bytes the script describes.
fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let interleaved = data[0] & 1 != 0;
    let split = (data[1] as usize).min(data.len() - 2);
    let source = &data[2..2 + split];
    let script = &data[2 + split..];

    let segment = (!source.is_empty()).then(|| SegmentRef::source(0, source.len() as u64));
    let seg_len = source.len();
    let mut cache = AddressCache::new();
    let mut we = WindowEncoder::new(segment, 0, interleaved);
    let mut target = Vec::new();

    for step in script.chunks_exact(3) {
        let len = usize::from(step[1] % 32) + 1;
        match step[0] % 3 {
            0 => {
                let lit = &step[..];
                we.add(lit);
                target.extend_from_slice(lit);
            }
            1 => {
                we.run(len as u32, step[2]);
                target.resize(target.len() + len, step[2]);
            }
            _ => {
                let here = seg_len + target.len();
                if here == 0 {
                    continue;
                }
                let addr = usize::from(step[2]) % here;
                // Source copies may not run past the segment.
                let len = if addr < seg_len { len.min(seg_len - addr) } else { len };
                we.copy(&mut cache, len as u32, addr as u64);
                for i in 0..len {
                    let b = if addr + i < seg_len {
                        source[addr + i]
                    } else {
                        target[addr + i - seg_len]
                    };
                    target.push(b);
                }
            }
        }
    }

    let sections = we.finish(&target, Some(vcdelta::vcdiff::adler32));
    let mut enc = StreamEncoder::new(Vec::new(), interleaved, None);
    enc.write_window(&sections).expect("write");
    let delta = enc.finish().expect("finish");

    let decoded = decoder::decode_memory(&delta, source).expect("decode");
    assert_eq!(decoded, target);
});
