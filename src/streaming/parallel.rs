//! Multithreaded decode coordinator.
//!
//! The coordinator splits a stream into blocks that can be decoded
//! separately and reassembles their output in order:
//!
//! 1. **Load**: input is copied into an [`InputChain`] while the
//!    [`ChunkParser`] walks chunk headers. Each dictionary reset ends a block.
//!    A block that grows past the configured size limit without a reset is
//!    ended too; the block after it depends on its state and history.
//! 2. **Decode**: once as many blocks as there are workers are known, or
//!    the end marker is reached, each *run* (an independent block followed by
//!    its dependent blocks) is decoded as one task on the worker pool.
//! 3. **Flush**: block outputs are copied to the caller strictly in order,
//!    feeding the digest, and each buffer is released as soon as it has been
//!    copied out completely.
//!
//! Decoding is never concurrent with loading or flushing.

use std::sync::Arc;

use super::config::DecoderConfig;
use super::inbuf::{InputBlock, InputChain};
use super::memory::{MemoryTracker, TrackedBuffer};
use super::parser::{ChunkParser, ChunkStatus};
use super::pool::WorkerPool;
use super::{InBuffer, OutBuffer};
use crate::checksum::{Checksum, Xxh32Digest};
use crate::codec::{DecodeStatus, FinishMode, Lzma2Decoder, dict_size_from_prop};
use crate::{Error, Result};

/// Outcome of [`Lzma2DecMt::load_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// All input was taken and no round is complete yet.
    NeedInput,
    /// A round of blocks is ready for [`Lzma2DecMt::decode_blocks`].
    RoundReady,
}

/// One resolved block and its output buffer.
///
/// The buffer holds `history` bytes of earlier output (for dependent blocks)
/// followed by the block's own `unpack` bytes.
#[derive(Debug)]
struct ThreadSlot {
    block: InputBlock,
    buf: Option<TrackedBuffer>,
    history: usize,
    unpack: usize,
    last: bool,
}

/// Decoder state and output tail carried into the next round when a block
/// was split without a dictionary reset.
#[derive(Debug)]
struct Carry {
    dec: Lzma2Decoder,
    history: Vec<u8>,
}

/// A run of slots decoded sequentially by one worker.
struct RunTask<'a> {
    slots: &'a mut [ThreadSlot],
    carry: Option<Carry>,
}

/// Multithreaded LZMA2 decoder.
#[derive(Debug)]
pub struct Lzma2DecMt {
    chain: InputChain,
    parser: ChunkParser,
    slots: Vec<ThreadSlot>,
    pending: InputBlock,
    pending_continues: bool,
    max_slots: usize,
    flush_slot: usize,
    flush_pos: usize,
    flushing: bool,
    final_seen: bool,
    finished: bool,
    dict_prop: u8,
    dict_size: usize,
    carry: Option<Carry>,
    pool: WorkerPool,
    tracker: Arc<MemoryTracker>,
    node_size: usize,
    max_block_size: u64,
    rounds: u64,
}

impl Lzma2DecMt {
    /// Creates a coordinator with `workers` threads.
    pub fn new(workers: usize, config: &DecoderConfig) -> Result<Self> {
        let workers = workers.max(1);
        let node_size = config.effective_node_size();
        Ok(Self {
            chain: InputChain::new(node_size)?,
            parser: ChunkParser::new(),
            slots: Vec::with_capacity(workers),
            pending: InputBlock::default(),
            pending_continues: false,
            max_slots: workers,
            flush_slot: 0,
            flush_pos: 0,
            flushing: false,
            final_seen: false,
            finished: false,
            dict_prop: 0,
            dict_size: 0,
            carry: None,
            pool: WorkerPool::new(workers)?,
            tracker: Arc::new(MemoryTracker::new(config.memory_limit)),
            node_size,
            max_block_size: config.max_block_size.max(1) as u64,
            rounds: 0,
        })
    }

    /// Starts a new stream, dropping all state of the previous one.
    ///
    /// The worker pool is kept.
    pub fn reset(&mut self, dict_prop: u8) -> Result<()> {
        self.dict_size = dict_size_from_prop(dict_prop)?;
        self.dict_prop = dict_prop;
        self.slots.clear();
        self.carry = None;
        self.chain = InputChain::new(self.node_size)?;
        self.parser = ChunkParser::new();
        self.pending = self.parser.next_block(&self.chain);
        self.pending_continues = false;
        self.flush_slot = 0;
        self.flush_pos = 0;
        self.flushing = false;
        self.final_seen = false;
        self.finished = false;
        self.rounds = 0;
        log::debug!(
            "multithreaded decode: {} workers, dictionary {} bytes",
            self.max_slots,
            self.dict_size
        );
        Ok(())
    }

    /// Returns the number of workers.
    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// Returns `true` while decoded output is waiting to be flushed.
    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Returns `true` once the final round has been flushed completely.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Buffers input and parses block boundaries until a round is ready or
    /// the input is exhausted.
    pub fn load_input(&mut self, input: &mut InBuffer<'_>) -> Result<LoadStatus> {
        if self.final_seen {
            return Ok(LoadStatus::RoundReady);
        }
        loop {
            loop {
                if self.pending.unpack_size >= self.max_block_size
                    && self.chain.end() >= self.parser.pos()
                {
                    self.resolve_pending(false, true)?;
                    if self.slots.len() >= self.max_slots {
                        return Ok(LoadStatus::RoundReady);
                    }
                }
                match self.parser.step(&self.chain, &mut self.pending)? {
                    ChunkStatus::Continue => {}
                    ChunkStatus::DictReset => {
                        self.resolve_pending(false, false)?;
                        if self.slots.len() >= self.max_slots {
                            return Ok(LoadStatus::RoundReady);
                        }
                    }
                    ChunkStatus::Final => {
                        self.final_seen = true;
                        self.resolve_pending(true, false)?;
                        return Ok(LoadStatus::RoundReady);
                    }
                    ChunkStatus::NeedMoreData => break,
                }
            }

            let want = self.parser.needed_end(&self.chain).saturating_sub(self.chain.end());
            let rest = input.remaining();
            let take = rest.len().min(usize::try_from(want).unwrap_or(usize::MAX));
            if take == 0 {
                return Ok(LoadStatus::NeedInput);
            }
            input.pos += self.chain.fill_tail(&rest[..take])?;
        }
    }

    /// Turns the pending block into a slot with a reserved output buffer and
    /// starts a new pending block at the parse position.
    fn resolve_pending(&mut self, last: bool, continues: bool) -> Result<()> {
        let next = self.parser.next_block(&self.chain);
        let block = std::mem::replace(&mut self.pending, next);
        self.pending_continues = continues;

        let unpack = usize::try_from(block.unpack_size).map_err(|_| Error::NoMemory {
            requested: usize::MAX,
            limit: self.tracker.limit(),
        })?;
        let history = if block.independent {
            0
        } else {
            let before = match self.slots.last() {
                Some(prev) => prev.history + prev.unpack,
                None => self.carry.as_ref().map_or(0, |c| c.history.len()),
            };
            before.min(self.dict_size)
        };
        let size = history.checked_add(unpack).ok_or(Error::NoMemory {
            requested: usize::MAX,
            limit: self.tracker.limit(),
        })?;
        let buf = TrackedBuffer::zeroed(&self.tracker, size)?;

        log::trace!(
            "slot {}: {} input bytes, {} output bytes, {} history, independent {}",
            self.slots.len(),
            self.chain.offset_of(block.end) - self.chain.offset_of(block.start),
            unpack,
            history,
            block.independent
        );
        self.slots.push(ThreadSlot {
            block,
            buf: Some(buf),
            history,
            unpack,
            last,
        });
        Ok(())
    }

    /// Decodes every resolved slot of the current round on the worker pool.
    pub fn decode_blocks(&mut self) -> Result<()> {
        self.rounds += 1;
        log::debug!(
            "round {}: decoding {} blocks",
            self.rounds,
            self.slots.len()
        );

        let dict_prop = self.dict_prop;
        let chain = &self.chain;
        let mut carry = self.carry.take();
        let tasks: Vec<RunTask<'_>> = self
            .slots
            .chunk_by_mut(|_, next| !next.block.independent)
            .map(|run| {
                let carry = if run[0].block.independent {
                    None
                } else {
                    carry.take()
                };
                RunTask { slots: run, carry }
            })
            .collect();

        let results = self
            .pool
            .run_ordered(tasks, |task| decode_run(task, chain, dict_prop));
        let mut last_state = None;
        for result in results {
            last_state = Some(result?);
        }

        if self.pending_continues && !self.final_seen {
            if let (Some(dec), Some(buf)) = (
                last_state,
                self.slots.last().and_then(|s| s.buf.as_ref()),
            ) {
                let keep = buf.len().min(self.dict_size);
                self.carry = Some(Carry {
                    dec,
                    history: buf[buf.len() - keep..].to_vec(),
                });
            }
        }
        self.flushing = !self.slots.is_empty();
        if !self.flushing && self.final_seen {
            self.finished = true;
        }
        Ok(())
    }

    /// Copies decoded output to `output` in slot order, updating `digest`.
    ///
    /// Returns the number of bytes written. Buffers and input nodes are
    /// released as soon as the slots using them are fully flushed.
    pub fn flush_completed(
        &mut self,
        output: &mut OutBuffer<'_>,
        mut digest: Option<&mut Xxh32Digest>,
    ) -> usize {
        let mut written = 0;
        while self.flush_slot < self.slots.len() {
            let slot = &mut self.slots[self.flush_slot];
            if let Some(buf) = slot.buf.as_ref() {
                let data = &buf[slot.history + self.flush_pos..];
                let n = data.len().min(output.dst.len() - output.pos);
                output.dst[output.pos..output.pos + n].copy_from_slice(&data[..n]);
                if let Some(d) = digest.as_deref_mut() {
                    d.update(&data[..n]);
                }
                output.pos += n;
                self.flush_pos += n;
                written += n;
            }
            if self.flush_pos < slot.unpack {
                break;
            }

            slot.buf = None;
            self.flush_slot += 1;
            self.flush_pos = 0;
            let next_start = self
                .slots
                .get(self.flush_slot)
                .map_or(self.pending.start, |s| s.block.start);
            self.chain.release_before(self.chain.offset_of(next_start));
        }

        if self.flush_slot == self.slots.len() {
            log::trace!("round {} flushed", self.rounds);
            self.slots.clear();
            self.flush_slot = 0;
            self.flushing = false;
            if self.final_seen {
                self.finished = true;
            }
        }
        written
    }
}

/// Decodes a run of slots in order, passing decoder state from each slot to
/// the next. Returns the state after the last slot.
fn decode_run(task: RunTask<'_>, chain: &InputChain, dict_prop: u8) -> Result<Lzma2Decoder> {
    let RunTask { slots, carry } = task;
    let (mut state, carry_history) = match carry {
        Some(c) => (Some(c.dec), c.history),
        None => (None, Vec::new()),
    };

    for i in 0..slots.len() {
        let (done, rest) = slots.split_at_mut(i);
        let slot = &mut rest[0];
        let Some(buf) = slot.buf.as_mut() else {
            return Err(Error::corrupted("block buffer released before decoding"));
        };

        let history = slot.history;
        if history > 0 {
            let prev: &[u8] = match done.last().and_then(|p| p.buf.as_deref()) {
                Some(prev) => prev,
                None => &carry_history,
            };
            buf[..history].copy_from_slice(&prev[prev.len() - history..]);
        }

        let mut dec = match state.take() {
            Some(dec) if !slot.block.independent => dec,
            _ => {
                let mut dec = Lzma2Decoder::new();
                dec.init(dict_prop)?;
                dec
            }
        };
        dec.set_dic_pos(history, history);
        decode_slot(&mut dec, &slot.block, slot.last, buf, chain)?;
        state = Some(dec);
    }

    state.ok_or_else(|| Error::corrupted("empty block run"))
}

/// Decodes one block into its buffer and checks that it ended where the
/// chunk headers said it would.
fn decode_slot(
    dec: &mut Lzma2Decoder,
    block: &InputBlock,
    last: bool,
    buf: &mut [u8],
    chain: &InputChain,
) -> Result<()> {
    let start = chain.offset_of(block.start);
    let end = chain.offset_of(block.end);
    let limit = buf.len();
    let finish = if last { FinishMode::End } else { FinishMode::Any };

    let mut consumed = 0u64;
    let mut status = DecodeStatus::NeedsMoreInput;
    for piece in chain.slices(start, end) {
        let (used, st) = dec.decode_to_dic(buf, limit, piece, finish)?;
        consumed += used as u64;
        status = st;
        if used < piece.len() {
            break;
        }
    }

    let ended_cleanly = if last {
        status == DecodeStatus::FinishedWithMark
    } else {
        dec.at_chunk_boundary() && !dec.is_finished()
    };
    if consumed != end - start || dec.dic_pos() != limit || !ended_cleanly {
        return Err(Error::corrupted(format!(
            "block at offset {} decoded {} of {} input bytes into {} of {} output bytes",
            start,
            consumed,
            end - start,
            dec.dic_pos(),
            limit
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_chunk(reset: bool, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![if reset { 0x01 } else { 0x02 }];
        v.extend_from_slice(&((payload.len() - 1) as u16).to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    /// Chunks (without property byte) of three independent blocks.
    fn three_blocks() -> (Vec<u8>, Vec<u8>) {
        let mut chunks = Vec::new();
        let mut plain = Vec::new();
        for (i, text) in [&b"first block "[..], b"second ", b"third and last"]
            .iter()
            .enumerate()
        {
            chunks.extend(raw_chunk(true, text));
            chunks.extend(raw_chunk(false, &[b'0' + i as u8; 5]));
            plain.extend_from_slice(text);
            plain.extend_from_slice(&[b'0' + i as u8; 5]);
        }
        chunks.push(0x00);
        (chunks, plain)
    }

    fn run_to_end(mt: &mut Lzma2DecMt, src: &[u8], out_step: usize) -> Vec<u8> {
        let mut input = InBuffer::new(src);
        let mut out = Vec::new();
        let mut digest = Xxh32Digest::new();
        loop {
            let mut buf = vec![0u8; out_step];
            let mut output = OutBuffer::new(&mut buf);
            if mt.is_flushing() {
                mt.flush_completed(&mut output, Some(&mut digest));
            } else if mt.is_finished() {
                break;
            } else {
                match mt.load_input(&mut input).unwrap() {
                    LoadStatus::RoundReady => mt.decode_blocks().unwrap(),
                    LoadStatus::NeedInput => panic!("input exhausted before end marker"),
                }
            }
            let n = output.pos;
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(digest.finalize(), Xxh32Digest::compute(&out));
        out
    }

    #[test]
    fn test_decodes_independent_blocks() {
        let (chunks, plain) = three_blocks();
        for workers in [1, 2, 4] {
            let config = DecoderConfig::new().input_node_size(16);
            let mut mt = Lzma2DecMt::new(workers, &config).unwrap();
            mt.reset(1).unwrap();
            assert_eq!(run_to_end(&mut mt, &chunks, 7), plain);
            assert_eq!(mt.tracker.in_use(), 0);
        }
    }

    #[test]
    fn test_continuation_blocks_carry_history() {
        // A single dictionary reset; the small block limit forces dependent
        // blocks that continue from the previous round's decoder.
        let mut chunks = raw_chunk(true, b"0123456789");
        let mut plain = b"0123456789".to_vec();
        for i in 0..6u8 {
            let piece = [b'a' + i; 9];
            chunks.extend(raw_chunk(false, &piece));
            plain.extend_from_slice(&piece);
        }
        chunks.push(0x00);

        let config = DecoderConfig::new().max_block_size(15).input_node_size(16);
        let mut mt = Lzma2DecMt::new(2, &config).unwrap();
        mt.reset(0).unwrap();
        assert_eq!(run_to_end(&mut mt, &chunks, 5), plain);
    }

    #[test]
    fn test_stops_reading_at_end_marker() {
        let (mut chunks, plain) = three_blocks();
        let stream_len = chunks.len();
        chunks.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
        let config = DecoderConfig::new();
        let mut mt = Lzma2DecMt::new(2, &config).unwrap();
        mt.reset(1).unwrap();
        let mut input = InBuffer::new(&chunks);
        let mut buf = vec![0u8; 1024];
        let mut out = Vec::new();
        loop {
            let mut output = OutBuffer::new(&mut buf);
            if mt.is_flushing() {
                mt.flush_completed(&mut output, None);
            } else if mt.is_finished() {
                break;
            } else if mt.load_input(&mut input).unwrap() == LoadStatus::RoundReady {
                mt.decode_blocks().unwrap();
            }
            out.extend_from_slice(output.written());
        }
        assert_eq!(out, plain);
        assert_eq!(input.pos, stream_len);
        assert_eq!(input.remaining(), &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(mt.chain.end(), stream_len as u64);
    }

    #[test]
    fn test_memory_limit() {
        let (chunks, _) = three_blocks();
        let config = DecoderConfig::new().memory_limit(4);
        let mut mt = Lzma2DecMt::new(2, &config).unwrap();
        mt.reset(1).unwrap();
        let mut input = InBuffer::new(&chunks);
        assert!(matches!(
            mt.load_input(&mut input),
            Err(Error::NoMemory { limit: 4, .. })
        ));
    }

    #[test]
    fn test_corrupt_block_is_reported() {
        let (mut chunks, _) = three_blocks();
        // Invalid control byte at the start of the second block.
        let second = chunks
            .iter()
            .enumerate()
            .skip(1)
            .find(|&(_, &b)| b == 0x01)
            .map(|(i, _)| i)
            .unwrap();
        chunks[second] = 0x07;
        let mut mt = Lzma2DecMt::new(2, &DecoderConfig::new()).unwrap();
        mt.reset(1).unwrap();
        let mut input = InBuffer::new(&chunks);
        let result = (|| loop {
            if mt.load_input(&mut input)? == LoadStatus::RoundReady {
                mt.decode_blocks()?;
                return Ok(());
            }
        })();
        assert!(matches!(result, Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_missing_first_reset_fails_decode() {
        let (mut chunks, _) = three_blocks();
        chunks[0] = 0x02;
        let mut mt = Lzma2DecMt::new(2, &DecoderConfig::new()).unwrap();
        mt.reset(1).unwrap();
        let mut input = InBuffer::new(&chunks);
        assert_eq!(mt.load_input(&mut input).unwrap(), LoadStatus::RoundReady);
        assert!(matches!(mt.decode_blocks(), Err(Error::Corrupted(_))));
    }
}
