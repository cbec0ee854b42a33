//! Fuzz target for the streaming decoder.
//!
//! The first input byte picks the thread count and the buffer split, the
//! rest is decoded as a stream. Both decoders must agree on the output.
//!
//! Run with: cargo +nightly fuzz run decompress_stream

#![no_main]

use flzma2::{DStream, DecoderConfig, InBuffer, OutBuffer, Threads};
use libfuzzer_sys::fuzz_target;

fn run(config: DecoderConfig, src: &[u8], step: usize) -> Option<Vec<u8>> {
    let mut stream = DStream::with_config(config).ok()?;
    stream.init_stream();
    let mut out = Vec::new();
    let mut buf = vec![0u8; step];
    for piece in src.chunks(step) {
        let mut input = InBuffer::new(piece);
        loop {
            let mut output = OutBuffer::new(&mut buf);
            let more = stream.decompress_stream(&mut output, &mut input).ok()?;
            out.extend_from_slice(output.written());
            if !more {
                return Some(out);
            }
            if out.len() > 1 << 22 {
                return None;
            }
            if input.is_consumed() && output.pos == 0 {
                break;
            }
        }
    }
    None
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, src)) = data.split_first() else {
        return;
    };
    // Skip dictionary classes whose window would dominate the run time
    if src.first().is_some_and(|&p| p & 0x3F > 24) {
        return;
    }
    let step = usize::from(selector & 0x3F) + 1;
    let workers = usize::from(selector >> 6) + 1;

    let single = run(DecoderConfig::single_threaded(), src, step);
    let config = DecoderConfig::new()
        .threads(Threads::count_or_single(workers))
        .memory_limit(64 << 20);
    let multi = run(config, src, step);
    if let (Some(a), Some(b)) = (&single, &multi) {
        assert_eq!(a, b);
    }
});
