//! Streaming decompression with caller-owned buffers.
//!
//! [`DStream`] decodes a stream that arrives in pieces of any size into an
//! output buffer of any size, keeping its position between calls. Each call
//! to [`DStream::decompress_stream`] consumes what it can from an
//! [`InBuffer`], writes what it can to an [`OutBuffer`], and reports whether
//! the stream has more to give.
//!
//! # Overview
//!
//! - **[`DStream`]**: Resumable decoder driving the stream stages
//! - **[`DecoderConfig`]**: Thread selection and memory bounds
//! - **[`Fl2Reader`]**: `Read` adapter over any compressed reader
//! - **[`MemoryTracker`]**: Accounting for multithreaded block buffers
//!
//! # Example
//!
//! ```rust
//! use flzma2::{DStream, InBuffer, OutBuffer};
//!
//! let src = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
//! let mut stream = DStream::new();
//! stream.init_stream();
//!
//! let mut out = Vec::new();
//! for piece in src.chunks(2) {
//!     let mut input = InBuffer::new(piece);
//!     while input.pos < piece.len() {
//!         let mut buf = [0u8; 1];
//!         let mut output = OutBuffer::new(&mut buf);
//!         stream.decompress_stream(&mut output, &mut input)?;
//!         out.extend_from_slice(output.written());
//!     }
//! }
//! assert_eq!(out, b"AB");
//! # Ok::<(), flzma2::Error>(())
//! ```
//!
//! # Threads
//!
//! With [`Threads::Single`] the stream is decoded on the calling thread
//! through a dictionary-sized window. Otherwise input is buffered until
//! blocks separated by dictionary resets are known, the blocks are decoded
//! on a worker pool, and their output is flushed in order:
//!
//! ```rust
//! use flzma2::{DStream, DecoderConfig, Threads};
//!
//! let config = DecoderConfig::new().threads(Threads::count_or_single(4));
//! let stream = DStream::with_config(config)?;
//! assert_eq!(stream.workers(), 4);
//! # Ok::<(), flzma2::Error>(())
//! ```

pub mod config;
mod inbuf;
mod memory;
mod parallel;
mod parser;
mod pool;
mod reader;

use crate::checksum::{CHECKSUM_SIZE, Checksum, Xxh32Digest, hash_from_canonical};
use crate::codec::{DecodeStatus, FinishMode, StreamProp, WindowDecoder};
use crate::{Error, Result};

use parallel::{LoadStatus, Lzma2DecMt};

// Re-export main types
pub use config::{DecoderConfig, Threads};
pub use memory::{MemoryGuard, MemoryTracker, TrackedBuffer};
pub use reader::Fl2Reader;

/// Compressed input for one [`DStream::decompress_stream`] call.
///
/// `pos` is advanced past every byte the decoder consumed.
#[derive(Debug, Clone, Copy)]
pub struct InBuffer<'a> {
    /// The input bytes.
    pub src: &'a [u8],
    /// Read position in `src`.
    pub pos: usize,
}

impl<'a> InBuffer<'a> {
    /// Wraps `src` with the read position at its start.
    pub fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    /// Returns the bytes not consumed yet.
    pub fn remaining(&self) -> &'a [u8] {
        &self.src[self.pos..]
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_consumed(&self) -> bool {
        self.pos >= self.src.len()
    }
}

/// Output space for one [`DStream::decompress_stream`] call.
///
/// `pos` is advanced past every byte the decoder wrote.
#[derive(Debug)]
pub struct OutBuffer<'a> {
    /// The output space.
    pub dst: &'a mut [u8],
    /// Write position in `dst`.
    pub pos: usize,
}

impl<'a> OutBuffer<'a> {
    /// Wraps `dst` with the write position at its start.
    pub fn new(dst: &'a mut [u8]) -> Self {
        Self { dst, pos: 0 }
    }

    /// Returns the bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.dst[..self.pos]
    }

    /// Returns the space left.
    pub fn available(&self) -> usize {
        self.dst.len() - self.pos
    }
}

/// Stage of a [`DStream`] session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderStage {
    /// Waiting for the property byte.
    #[default]
    Init,
    /// Decoding chunks.
    Decomp,
    /// Collecting the trailing checksum.
    Hash,
    /// The stream ended and was verified.
    Finished,
}

/// Byte counts for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamProgress {
    /// Compressed bytes consumed, including the property byte and checksum.
    pub bytes_in: u64,
    /// Decompressed bytes produced.
    pub bytes_out: u64,
}

/// A resumable stream decoder.
///
/// Create once and call [`init_stream`](Self::init_stream) before each
/// stream; window, pool and digest are reused across sessions.
#[derive(Debug)]
pub struct DStream {
    window: WindowDecoder,
    mt: Option<Lzma2DecMt>,
    digest: Option<Xxh32Digest>,
    stage: DecoderStage,
    do_hash: bool,
    hash_buf: [u8; CHECKSUM_SIZE],
    hash_len: usize,
    progress: StreamProgress,
    config: DecoderConfig,
}

impl Default for DStream {
    fn default() -> Self {
        Self::new()
    }
}

impl DStream {
    /// Creates a single-threaded stream decoder.
    pub fn new() -> Self {
        Self {
            window: WindowDecoder::new(),
            mt: None,
            digest: None,
            stage: DecoderStage::Init,
            do_hash: false,
            hash_buf: [0; CHECKSUM_SIZE],
            hash_len: 0,
            progress: StreamProgress::default(),
            config: DecoderConfig::single_threaded(),
        }
    }

    /// Creates a stream decoder for `config`.
    ///
    /// Starts the worker pool when the configuration selects the
    /// multithreaded decoder.
    pub fn with_config(config: DecoderConfig) -> Result<Self> {
        let mt = match config.threads.workers() {
            Some(workers) => Some(Lzma2DecMt::new(workers, &config)?),
            None => None,
        };
        Ok(Self {
            mt,
            config,
            ..Self::new()
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Returns the number of decoding threads.
    pub fn workers(&self) -> usize {
        self.mt.as_ref().map_or(1, Lzma2DecMt::workers)
    }

    /// Returns the current stage.
    pub fn stage(&self) -> DecoderStage {
        self.stage
    }

    /// Returns the byte counts of the current session.
    pub fn progress(&self) -> StreamProgress {
        self.progress
    }

    /// Prepares for a new stream whose first byte is the property byte.
    pub fn init_stream(&mut self) {
        self.stage = DecoderStage::Init;
        self.hash_len = 0;
        self.progress = StreamProgress::default();
    }

    /// Prepares for a new stream whose property byte is stored elsewhere.
    ///
    /// Input passed to the next call starts with the first chunk.
    pub fn init_stream_with_prop(&mut self, prop: u8) -> Result<()> {
        self.init_stream();
        self.start_session(prop)
    }

    fn start_session(&mut self, prop_byte: u8) -> Result<()> {
        let prop = StreamProp::parse(prop_byte);
        match self.mt.as_mut() {
            Some(mt) => mt.reset(prop.dict_prop)?,
            None => self.window.init(prop.dict_prop)?,
        }
        self.do_hash = prop.has_checksum;
        if self.do_hash {
            self.digest.get_or_insert_with(Xxh32Digest::new).reset();
        }
        log::debug!(
            "stream started: dict prop {:#04x}, checksum {}, {} threads",
            prop.dict_prop,
            prop.has_checksum,
            self.workers()
        );
        self.stage = DecoderStage::Decomp;
        Ok(())
    }

    /// Decodes as much as possible from `input` into `output`.
    ///
    /// Returns `Ok(true)` while the stream is unfinished and `Ok(false)` once
    /// the end marker (and checksum, if present) has been processed. Call
    /// again with more input, more output space, or both until it returns
    /// `Ok(false)`; bytes already consumed may still produce output when
    /// `input` is empty.
    ///
    /// Input is consumed up to the end of the stream and no further, so
    /// bytes following it remain in `input` after the last call.
    pub fn decompress_stream(
        &mut self,
        output: &mut OutBuffer<'_>,
        input: &mut InBuffer<'_>,
    ) -> Result<bool> {
        let in_start = input.pos;
        let out_start = output.pos;
        let result = self.run_stages(output, input);
        self.progress.bytes_in += (input.pos - in_start) as u64;
        self.progress.bytes_out += (output.pos - out_start) as u64;
        result?;
        Ok(self.stage != DecoderStage::Finished)
    }

    fn run_stages(&mut self, output: &mut OutBuffer<'_>, input: &mut InBuffer<'_>) -> Result<()> {
        if self.stage == DecoderStage::Init {
            let Some(&prop) = input.src.get(input.pos) else {
                return Ok(());
            };
            input.pos += 1;
            self.start_session(prop)?;
        }

        if self.stage == DecoderStage::Decomp {
            let done = if self.mt.is_some() {
                self.decomp_mt(output, input)?
            } else {
                self.decomp_single(output, input)?
            };
            if done {
                self.stage = if self.do_hash {
                    DecoderStage::Hash
                } else {
                    DecoderStage::Finished
                };
            }
        }

        if self.stage == DecoderStage::Hash {
            let take = (CHECKSUM_SIZE - self.hash_len).min(input.remaining().len());
            self.hash_buf[self.hash_len..self.hash_len + take]
                .copy_from_slice(&input.remaining()[..take]);
            self.hash_len += take;
            input.pos += take;
            if self.hash_len < CHECKSUM_SIZE {
                return Ok(());
            }

            let expected = hash_from_canonical(self.hash_buf);
            let actual = self.digest.as_ref().map_or(0, |d| d.finalize());
            if expected != actual {
                return Err(Error::ChecksumWrong { expected, actual });
            }
            log::debug!("checksum verified: {:#010x}", actual);
            self.stage = DecoderStage::Finished;
        }
        Ok(())
    }

    fn decomp_single(
        &mut self,
        output: &mut OutBuffer<'_>,
        input: &mut InBuffer<'_>,
    ) -> Result<bool> {
        let out = &mut output.dst[output.pos..];
        let (consumed, produced, status) =
            self.window.decode_to_buf(out, input.remaining(), FinishMode::Any)?;
        if self.do_hash {
            if let Some(digest) = self.digest.as_mut() {
                digest.update(&out[..produced]);
            }
        }
        output.pos += produced;
        input.pos += consumed;
        Ok(status == DecodeStatus::FinishedWithMark)
    }

    fn decomp_mt(
        &mut self,
        output: &mut OutBuffer<'_>,
        input: &mut InBuffer<'_>,
    ) -> Result<bool> {
        let Self { mt, digest, do_hash, .. } = self;
        let Some(mt) = mt.as_mut() else {
            return Ok(false);
        };

        loop {
            if mt.is_flushing() {
                let digest = if *do_hash { digest.as_mut() } else { None };
                mt.flush_completed(output, digest);
                if mt.is_flushing() {
                    return Ok(false);
                }
            }
            if mt.is_finished() {
                return Ok(true);
            }
            match mt.load_input(input)? {
                LoadStatus::NeedInput => return Ok(false),
                LoadStatus::RoundReady => mt.decode_blocks()?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AB: [u8; 7] = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];

    fn with_checksum(stream: &[u8], content: &[u8]) -> Vec<u8> {
        let mut v = stream.to_vec();
        v[0] |= 0x80;
        v.extend_from_slice(&Xxh32Digest::compute(content).to_be_bytes());
        v
    }

    /// Feeds `src` in `in_step` pieces with `out_step` output space per call.
    fn drive(stream: &mut DStream, src: &[u8], in_step: usize, out_step: usize) -> Result<Vec<u8>> {
        stream.init_stream();
        let mut out = Vec::new();
        let mut input = InBuffer::new(&src[..0]);
        let mut fed = 0;
        loop {
            if input.is_consumed() && fed < src.len() {
                let end = (fed + in_step).min(src.len());
                input = InBuffer::new(&src[fed..end]);
                fed = end;
            }
            let mut buf = vec![0u8; out_step];
            let mut output = OutBuffer::new(&mut buf);
            let more = stream.decompress_stream(&mut output, &mut input)?;
            out.extend_from_slice(output.written());
            if !more {
                return Ok(out);
            }
            if input.is_consumed() && fed == src.len() && output.pos == 0 {
                return Err(Error::SrcSizeWrong);
            }
        }
    }

    #[test]
    fn test_module_exports() {
        let _ = DecoderConfig::default();
        let tracker = MemoryTracker::new(1024);
        assert_eq!(tracker.in_use(), 0);
        assert_eq!(DStream::new().stage(), DecoderStage::Init);
    }

    #[test]
    fn test_init_without_input() {
        let mut stream = DStream::new();
        stream.init_stream();
        let mut buf = [0u8; 4];
        let mut output = OutBuffer::new(&mut buf);
        let mut input = InBuffer::new(&[]);
        assert!(stream.decompress_stream(&mut output, &mut input).unwrap());
        assert_eq!(stream.stage(), DecoderStage::Init);
    }

    #[test]
    fn test_single_threaded_pieces() {
        let src = with_checksum(&AB, b"AB");
        let mut stream = DStream::new();
        for (in_step, out_step) in [(1, 1), (2, 1), (100, 100), (3, 2)] {
            assert_eq!(drive(&mut stream, &src, in_step, out_step).unwrap(), b"AB");
            assert_eq!(stream.stage(), DecoderStage::Finished);
            assert_eq!(
                stream.progress(),
                StreamProgress {
                    bytes_in: src.len() as u64,
                    bytes_out: 2
                }
            );
        }
    }

    #[test]
    fn test_multithreaded_pieces() {
        let src = with_checksum(&AB, b"AB");
        let config = DecoderConfig::new().threads(Threads::count_or_single(2));
        let mut stream = DStream::with_config(config).unwrap();
        assert_eq!(stream.workers(), 2);
        for (in_step, out_step) in [(1, 1), (100, 100), (5, 3)] {
            assert_eq!(drive(&mut stream, &src, in_step, out_step).unwrap(), b"AB");
            assert_eq!(stream.stage(), DecoderStage::Finished);
        }
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut src = with_checksum(&AB, b"AB");
        let last = src.len() - 1;
        src[last] ^= 0xFF;
        for config in [
            DecoderConfig::single_threaded(),
            DecoderConfig::new().threads(Threads::count_or_single(2)),
        ] {
            let mut stream = DStream::with_config(config).unwrap();
            assert!(matches!(
                drive(&mut stream, &src, 64, 64),
                Err(Error::ChecksumWrong { .. })
            ));
        }
    }

    #[test]
    fn test_finished_is_noop() {
        let mut stream = DStream::new();
        drive(&mut stream, &AB, 64, 64).unwrap();
        let mut buf = [0u8; 4];
        let mut output = OutBuffer::new(&mut buf);
        let mut input = InBuffer::new(&AB);
        assert!(!stream.decompress_stream(&mut output, &mut input).unwrap());
        assert_eq!(input.pos, 0);
        assert_eq!(output.pos, 0);
    }

    #[test]
    fn test_prop_out_of_band() {
        let mut stream = DStream::new();
        stream.init_stream_with_prop(AB[0]).unwrap();
        assert_eq!(stream.stage(), DecoderStage::Decomp);
        let mut buf = [0u8; 8];
        let mut output = OutBuffer::new(&mut buf);
        let mut input = InBuffer::new(&AB[1..]);
        assert!(!stream.decompress_stream(&mut output, &mut input).unwrap());
        assert_eq!(output.written(), b"AB");
    }

    #[test]
    fn test_invalid_prop() {
        let mut stream = DStream::new();
        stream.init_stream();
        let mut buf = [0u8; 8];
        let mut output = OutBuffer::new(&mut buf);
        let mut input = InBuffer::new(&[41, 0x00]);
        assert!(matches!(
            stream.decompress_stream(&mut output, &mut input),
            Err(Error::InvalidProperty(41))
        ));
    }
}
