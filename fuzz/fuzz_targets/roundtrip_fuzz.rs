#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::compress::decoder;
use vcdelta::compress::encoder::{self, CompressOptions};
use vcdelta::hash::config;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let flags = data[0];
    let split = 2 + (data[1] as usize % (data.len() - 2));
    let source = &data[2..split];
    let target = &data[split..];

    let opts = CompressOptions {
        block_size: [4, 8, 16, 32][(flags & 3) as usize],
        checksum: flags & 4 != 0,
        interleaved: flags & 8 != 0,
        window_size: if flags & 16 != 0 { 64 } else { 1 << 16 },
        matcher: config::config_for_level(u32::from(flags >> 5)),
        ..Default::default()
    };

    let delta = encoder::encode_memory(source, target, opts).expect("encode");
    let decoded = decoder::decode_all(source, &delta).expect("decode");
    assert_eq!(decoded, target);
});
