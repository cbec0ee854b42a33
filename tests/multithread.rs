//! Integration tests for the multithreaded decoder.
//!
//! The multithreaded decoder must produce exactly the single-threaded output
//! and checksum verdict for every worker count, input split and output split.

mod common;

use std::io::Read;

use flzma2::{DStream, DecoderConfig, Error, Fl2Reader, Threads, decompress_to_vec};

use common::*;

fn multi_block_fixture(checksum: bool) -> (Vec<u8>, Vec<u8>) {
    let blocks = [
        sample_data(90_000, 1),
        random_data(30_000, 2),
        sample_data(5_000, 3),
        sample_data(150_000, 4),
        random_data(1_000, 5),
        sample_data(60_000, 6),
    ];
    let refs: Vec<&[u8]> = blocks.iter().map(Vec::as_slice).collect();
    (fl2_multi_block(&refs, DICT_PROP_1M, checksum), blocks.concat())
}

#[test]
fn test_trailing_bytes_left_unconsumed() {
    for checksum in [false, true] {
        let (stream, plain) = multi_block_fixture(checksum);
        let mut src = stream.clone();
        src.extend_from_slice(b"NEXT MEMBER");
        for config in [DecoderConfig::single_threaded(), mt_config(1), mt_config(3)] {
            let mut dstream = DStream::with_config(config).unwrap();
            dstream.init_stream();
            let mut dst = vec![0u8; plain.len()];
            let mut output = flzma2::OutBuffer::new(&mut dst);
            let mut input = flzma2::InBuffer::new(&src);
            let mut calls = 0;
            while dstream.decompress_stream(&mut output, &mut input).unwrap() {
                calls += 1;
                assert!(calls < 1000, "stream stalled");
            }
            assert!(output.written() == &plain[..]);
            assert_eq!(input.pos, stream.len(), "checksum {}", checksum);
            assert_eq!(input.remaining(), b"NEXT MEMBER");
        }
    }
}

#[test]
fn test_ab_multithreaded() {
    let checked = wrap_stream(&AB_STREAM[1..], b"AB", 0x01, true);
    for workers in [1, 2, 4] {
        for src in [&AB_STREAM[..], &checked[..]] {
            for in_step in [1, 3, 64] {
                let out = decode_with(mt_config(workers), src, in_step, 1).unwrap();
                assert_eq!(out, b"AB");
            }
        }
    }
}

#[test]
fn test_matches_single_threaded() {
    let (src, expected) = multi_block_fixture(true);
    let single = decode_with(DecoderConfig::single_threaded(), &src, 8192, 8192).unwrap();
    assert_eq!(single, expected);

    for workers in [1, 2, 3, 4, 8] {
        for (in_step, out_step) in [(src.len(), expected.len()), (4096, 1000), (777, 65536)] {
            let out = decode_with(mt_config(workers), &src, in_step, out_step).unwrap();
            assert_eq!(
                out, expected,
                "workers {} in_step {} out_step {}",
                workers, in_step, out_step
            );
        }
    }
}

#[test]
fn test_small_input_nodes() {
    let (src, expected) = multi_block_fixture(false);
    let config = mt_config(3).input_node_size(1000);
    assert_eq!(decode_with(config, &src, 333, 4096).unwrap(), expected);
}

#[test]
fn test_split_without_dictionary_reset() {
    // One encoder run: only the first chunk resets the dictionary, so every
    // block after a forced split depends on the output before it.
    let data = sample_data(1_500_000, 99);
    let src = fl2_stream(&data, DICT_PROP_1M, true);
    for workers in [1, 2, 4] {
        let config = mt_config(workers).max_block_size(100_000);
        let out = decode_with(config, &src, 50_000, 30_000).unwrap();
        assert!(out == data, "workers {}", workers);
    }
}

#[test]
fn test_mixed_independent_and_dependent_blocks() {
    let a = sample_data(400_000, 10);
    let b = sample_data(250_000, 11);
    let src = fl2_multi_block(&[&a, &b], DICT_PROP_1M, true);
    let expected = [a, b].concat();
    let config = mt_config(4).max_block_size(64 * 1024);
    assert!(decode_with(config, &src, 10_000, 10_000).unwrap() == expected);
}

#[test]
fn test_checksum_mismatch() {
    let (mut src, _) = multi_block_fixture(true);
    let last = src.len() - 1;
    src[last] ^= 0x01;
    for workers in [1, 4] {
        let err = decode_with(mt_config(workers), &src, 4096, 4096).unwrap_err();
        assert!(matches!(err, Error::ChecksumWrong { .. }));
    }
}

#[test]
fn test_checksum_split_from_chunks() {
    // The end marker and checksum arrive in separate pieces.
    let src = wrap_stream(&AB_STREAM[1..], b"AB", 0x01, true);
    let out = decode_with(mt_config(2), &src, src.len() - 2, 16).unwrap();
    assert_eq!(out, b"AB");
}

#[test]
fn test_memory_limit() {
    let (src, _) = multi_block_fixture(false);
    let config = mt_config(2).memory_limit(10_000);
    let err = decode_with(config, &src, 4096, 4096).unwrap_err();
    assert!(matches!(err, Error::NoMemory { limit: 10_000, .. }));
}

#[test]
fn test_stream_reuse() {
    let (src, expected) = multi_block_fixture(true);
    let mut stream = DStream::with_config(mt_config(3)).unwrap();
    for _ in 0..3 {
        assert_eq!(stream_decode(&mut stream, &src, 20_000, 20_000).unwrap(), expected);
        assert_eq!(stream_decode(&mut stream, &AB_STREAM, 2, 2).unwrap(), b"AB");
    }
}

#[test]
fn test_truncated_input() {
    let (src, _) = multi_block_fixture(true);
    for cut in [1, 100, src.len() / 2, src.len() - 5, src.len() - 1] {
        let result = decode_with(mt_config(2), &src[..cut], 4096, 4096);
        assert!(matches!(result, Err(Error::SrcSizeWrong)), "cut {}", cut);
    }
}

#[test]
fn test_reader_multithreaded() {
    let (src, expected) = multi_block_fixture(true);
    let config = DecoderConfig::new()
        .threads(Threads::count_or_single(4))
        .read_buffer_size(10_000);
    let mut reader = Fl2Reader::with_config(&src[..], config).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    assert!(out == expected);
    assert_eq!(decompress_to_vec(&src).unwrap(), out);
}

#[test]
fn test_auto_threads() {
    let (src, expected) = multi_block_fixture(false);
    let out = decode_with(DecoderConfig::default(), &src, 65536, 65536).unwrap();
    assert!(out == expected);
}
