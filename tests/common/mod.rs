//! Shared test utilities for integration tests.
//!
//! Streams are produced with `lzma_rust2` as the reference LZMA2 encoder (or
//! from hand-built uncompressed chunks), wrapped with a property byte and an
//! optional XXH32 trailer.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::Write;

use flzma2::{DStream, DecoderConfig, InBuffer, OutBuffer, Threads, dict_size_from_prop};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Flag bit in the property byte announcing a trailing checksum.
pub const CHECKSUM_FLAG: u8 = 0x80;

/// Dictionary class used by most tests (1 MiB).
pub const DICT_PROP_1M: u8 = 16;

/// Stream for "AB" stored in one uncompressed chunk, prop 0x01.
pub const AB_STREAM: [u8; 7] = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];

/// Encodes `data` as raw LZMA2 chunks closed by an end marker.
pub fn lzma2_chunks(data: &[u8], dict_prop: u8, preset: u32) -> Vec<u8> {
    let dict_size = dict_size_from_prop(dict_prop).unwrap().min(64 << 20) as u32;
    let mut opts = lzma_rust2::Lzma2Options::with_preset(preset);
    opts.lzma_options.dict_size = dict_size.max(4096);

    let mut compressed = Vec::new();
    let mut writer = lzma_rust2::Lzma2Writer::new(&mut compressed, opts);
    writer.write_all(data).unwrap();
    writer.finish().unwrap();
    compressed
}

/// Wraps raw LZMA2 chunks in a stream: property byte, chunks, and an
/// XXH32 trailer over `content` when `checksum` is set.
pub fn wrap_stream(chunks: &[u8], content: &[u8], dict_prop: u8, checksum: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(chunks.len() + 5);
    out.push(dict_prop | if checksum { CHECKSUM_FLAG } else { 0 });
    out.extend_from_slice(chunks);
    if checksum {
        out.extend_from_slice(&xxhash_rust::xxh32::xxh32(content, 0).to_be_bytes());
    }
    out
}

/// Compresses `data` into a complete stream.
pub fn fl2_stream(data: &[u8], dict_prop: u8, checksum: bool) -> Vec<u8> {
    wrap_stream(&lzma2_chunks(data, dict_prop, 6), data, dict_prop, checksum)
}

/// Compresses each block independently and joins them into one stream.
///
/// Every block after the first starts with a dictionary reset, so the
/// multithreaded decoder can split the stream at each join.
pub fn fl2_multi_block(blocks: &[&[u8]], dict_prop: u8, checksum: bool) -> Vec<u8> {
    let mut chunks = Vec::new();
    let mut content = Vec::new();
    for block in blocks {
        if block.is_empty() {
            continue;
        }
        let mut encoded = lzma2_chunks(block, dict_prop, 3);
        // Remove the trailing end marker (0x00); one is added at the end
        if encoded.last() == Some(&0x00) {
            encoded.pop();
        }
        chunks.extend_from_slice(&encoded);
        content.extend_from_slice(block);
    }
    chunks.push(0x00);
    wrap_stream(&chunks, &content, dict_prop, checksum)
}

/// Builds a stream from uncompressed chunks, resetting the dictionary at the
/// start of every piece flagged `true`.
pub fn uncompressed_stream(pieces: &[(bool, &[u8])], dict_prop: u8, checksum: bool) -> Vec<u8> {
    let mut chunks = Vec::new();
    let mut content = Vec::new();
    for &(reset, piece) in pieces {
        for (i, part) in piece.chunks(1 << 16).enumerate() {
            chunks.push(if reset && i == 0 { 0x01 } else { 0x02 });
            chunks.extend_from_slice(&((part.len() - 1) as u16).to_be_bytes());
            chunks.extend_from_slice(part);
        }
        content.extend_from_slice(piece);
    }
    chunks.push(0x00);
    wrap_stream(&chunks, &content, dict_prop, checksum)
}

/// Generates compressible pseudo-random text.
///
/// Words are drawn from a small vocabulary so the encoder finds matches at
/// many distances, with occasional random bytes mixed in.
pub fn sample_data(len: usize, seed: u64) -> Vec<u8> {
    const WORDS: [&[u8]; 12] = [
        b"lorem ", b"ipsum ", b"dolor ", b"sit ", b"amet ", b"block ", b"chunk ", b"range ",
        b"coder ", b"window ", b"match ", b"literal\n",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        if rng.gen_ratio(1, 16) {
            out.push(rng.r#gen());
        } else {
            out.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())]);
        }
    }
    out.truncate(len);
    out
}

/// Generates incompressible bytes.
pub fn random_data(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = vec![0u8; len];
    rng.fill(&mut out[..]);
    out
}

/// Configuration selecting the multithreaded decoder with `workers` threads.
pub fn mt_config(workers: usize) -> DecoderConfig {
    DecoderConfig::new().threads(Threads::count_or_single(workers))
}

/// Runs one session of `stream` over `src`, feeding at most `in_step` bytes
/// and offering at most `out_step` bytes of output space per call.
///
/// Returns `SrcSizeWrong` if the input runs out before the stream ends.
pub fn stream_decode(
    stream: &mut DStream,
    src: &[u8],
    in_step: usize,
    out_step: usize,
) -> flzma2::Result<Vec<u8>> {
    stream.init_stream();
    let mut out = Vec::new();
    let mut buf = vec![0u8; out_step];
    let mut fed = 0;
    let mut input = InBuffer::new(&src[..0]);
    loop {
        if input.is_consumed() && fed < src.len() {
            let end = (fed + in_step).min(src.len());
            input = InBuffer::new(&src[fed..end]);
            fed = end;
        }
        let mut output = OutBuffer::new(&mut buf);
        let more = stream.decompress_stream(&mut output, &mut input)?;
        out.extend_from_slice(output.written());
        if !more {
            return Ok(out);
        }
        if input.is_consumed() && fed == src.len() && output.pos == 0 {
            return Err(flzma2::Error::SrcSizeWrong);
        }
    }
}

/// Decodes `src` with a fresh stream decoder built from `config`.
pub fn decode_with(
    config: DecoderConfig,
    src: &[u8],
    in_step: usize,
    out_step: usize,
) -> flzma2::Result<Vec<u8>> {
    let mut stream = DStream::with_config(config)?;
    stream_decode(&mut stream, src, in_step, out_step)
}
