//! Fuzz target for one-shot decompression of arbitrary bytes.
//!
//! Run with: cargo +nightly fuzz run decompress_oneshot

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Bounded output so malformed chunk headers cannot request huge buffers
    let mut dst = vec![0u8; 1 << 20];
    let _ = flzma2::decompress(&mut dst, data);

    if let Ok(size) = flzma2::find_decompressed_size(data) {
        if size <= 1 << 20 {
            let _ = flzma2::decompress_to_vec(data);
        }
    }
});
