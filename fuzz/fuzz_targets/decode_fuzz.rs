#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::vcdiff::decoder::{self, DecodeOptions};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must produce an error, never a panic.
    let _ = decoder::decode_memory(data, &[]);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (source, delta) = data.split_at(split);
        let options = DecodeOptions {
            max_window_size: 1 << 20,
            ..Default::default()
        };
        let _ = decoder::decode_memory_with(delta, source, options);
    }
});
