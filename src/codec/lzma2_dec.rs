//! Resumable LZMA2 chunk decoder.
//!
//! [`Lzma2Decoder`] decodes LZMA2 chunks into a dictionary slice supplied by
//! the caller on every call. Input may be split anywhere: header bytes are
//! consumed one at a time and partial LZMA symbols are held in a small
//! internal buffer until enough bytes arrive to decode them.
//!
//! Two dictionary layouts are supported:
//!
//! - **Flat**: the dictionary is the final output buffer. Used for one-shot
//!   decoding and for each block of the multithreaded decoder.
//! - **Circular**: [`WindowDecoder`] owns a window of exactly the dictionary
//!   size and copies fresh bytes out to the caller, wrapping at the end.

use super::dict_size_from_prop;
use super::lzma_context::{Dict, LzmaDecoderState, LzmaProps};
use super::lzma_rc::{LZMA_IN_REQUIRED, LzmaRangeDecoder, RcInput};
use super::lzma2_chunk::ctrl;
use crate::{Error, Result};

/// Bytes of range coder initialization at the start of each LZMA chunk.
const RC_INIT_BYTES: u32 = 5;

/// Size of the partial-symbol buffer.
const TEMP_SIZE: usize = 3 * LZMA_IN_REQUIRED;

/// How far the partial-symbol buffer is filled before decoding from it.
const TEMP_FILL: usize = 2 * LZMA_IN_REQUIRED;

/// How a decode call treats the output limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishMode {
    /// Stop as soon as the output limit is reached.
    Any,
    /// Keep reading chunk headers at the output limit so the end marker can
    /// be recognized without further output space.
    End,
}

/// Outcome of a decode call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The end marker was consumed.
    FinishedWithMark,
    /// The output limit was reached before the end marker.
    NotFinished,
    /// All input was used and more is required to make progress.
    NeedsMoreInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    Control,
    Unpacked1,
    Unpacked2,
    Packed0,
    Packed1,
    Props,
    LzmaPrepare,
    LzmaRun,
    Copy,
    Finished,
}

/// LZMA2 decoder state, independent of where the dictionary lives.
///
/// Cloning captures everything needed to resume at a chunk boundary, which is
/// how the multithreaded decoder hands state from one block to the next.
#[derive(Clone)]
pub struct Lzma2Decoder {
    seq: Sequence,
    next_seq: Sequence,
    unpacked: u32,
    packed: u32,
    need_dict_reset: bool,
    need_props: bool,
    rc: LzmaRangeDecoder,
    lzma: LzmaDecoderState,
    temp: [u8; TEMP_SIZE],
    temp_len: usize,
    pos: usize,
    full: usize,
    processed: u64,
    dict_size: usize,
}

impl std::fmt::Debug for Lzma2Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lzma2Decoder")
            .field("seq", &self.seq)
            .field("unpacked", &self.unpacked)
            .field("packed", &self.packed)
            .field("pos", &self.pos)
            .field("full", &self.full)
            .field("dict_size", &self.dict_size)
            .finish_non_exhaustive()
    }
}

impl Default for Lzma2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Lzma2Decoder {
    /// Creates a decoder. Call [`init`](Self::init) before decoding.
    pub fn new() -> Self {
        Self {
            seq: Sequence::Control,
            next_seq: Sequence::Control,
            unpacked: 0,
            packed: 0,
            need_dict_reset: true,
            need_props: true,
            rc: LzmaRangeDecoder::new(),
            lzma: LzmaDecoderState::new(),
            temp: [0; TEMP_SIZE],
            temp_len: 0,
            pos: 0,
            full: 0,
            processed: 0,
            dict_size: 0,
        }
    }

    /// Starts a new stream with the given dictionary class (`0..=40`).
    pub fn init(&mut self, dict_prop: u8) -> Result<()> {
        self.dict_size = dict_size_from_prop(dict_prop)?;
        self.seq = Sequence::Control;
        self.next_seq = Sequence::Control;
        self.unpacked = 0;
        self.packed = 0;
        self.need_dict_reset = true;
        self.need_props = true;
        self.rc.reset();
        self.temp_len = 0;
        self.pos = 0;
        self.full = 0;
        self.processed = 0;
        Ok(())
    }

    /// Returns the dictionary size selected by [`init`](Self::init).
    pub fn dict_size(&self) -> usize {
        self.dict_size
    }

    /// Returns the current write position in the dictionary.
    pub fn dic_pos(&self) -> usize {
        self.pos
    }

    /// Moves the write position inside a caller-owned flat dictionary.
    ///
    /// The first `history` bytes before `pos` are treated as valid match
    /// history. The position counter used for literal and position contexts
    /// is left untouched, so a decoder cloned at a chunk boundary continues
    /// exactly where it stopped.
    pub fn set_dic_pos(&mut self, pos: usize, history: usize) {
        self.pos = pos;
        self.full = history.min(pos);
    }

    /// Returns `true` once the end marker has been consumed.
    pub fn is_finished(&self) -> bool {
        self.seq == Sequence::Finished
    }

    /// Returns `true` when the decoder is positioned between chunks.
    pub fn at_chunk_boundary(&self) -> bool {
        matches!(self.seq, Sequence::Control | Sequence::Finished)
    }

    /// Consumes the end marker if it is the next byte of `src` and the
    /// decoder sits between chunks. Needs no output room.
    pub fn take_end_marker(&mut self, src: &[u8]) -> (usize, DecodeStatus) {
        match self.seq {
            Sequence::Finished => (0, DecodeStatus::FinishedWithMark),
            Sequence::Control if src.first() == Some(&ctrl::END_MARKER) => {
                self.seq = Sequence::Finished;
                log::trace!("LZMA2 end marker at dictionary position {}", self.pos);
                (1, DecodeStatus::FinishedWithMark)
            }
            Sequence::Control if src.is_empty() => (0, DecodeStatus::NeedsMoreInput),
            _ => (0, DecodeStatus::NotFinished),
        }
    }

    /// Decodes from `src` into `dic[pos..dic_limit]`.
    ///
    /// Returns the number of input bytes consumed and the status. The write
    /// position advances by the number of bytes produced; read it back with
    /// [`dic_pos`](Self::dic_pos).
    pub fn decode_to_dic(
        &mut self,
        dic: &mut [u8],
        dic_limit: usize,
        src: &[u8],
        finish: FinishMode,
    ) -> Result<(usize, DecodeStatus)> {
        let mut in_pos = 0usize;
        loop {
            if self.seq == Sequence::Finished {
                return Ok((in_pos, DecodeStatus::FinishedWithMark));
            }
            if self.pos >= dic_limit && finish == FinishMode::Any {
                return Ok((in_pos, DecodeStatus::NotFinished));
            }

            match self.seq {
                Sequence::LzmaRun => {
                    if self.unpacked > 0 {
                        if self.pos >= dic_limit {
                            return Ok((in_pos, DecodeStatus::NotFinished));
                        }
                        let limit = dic_limit.min(self.pos + self.unpacked as usize);
                        let (in_before, out_before) = (in_pos, self.pos);
                        self.run_lzma(dic, limit, src, &mut in_pos)?;
                        self.unpacked -= (self.pos - out_before) as u32;
                        if self.unpacked > 0 {
                            if in_pos == in_before && self.pos == out_before {
                                return Ok((in_pos, DecodeStatus::NeedsMoreInput));
                            }
                            continue;
                        }
                    }
                    self.finish_lzma_chunk()?;
                }
                Sequence::Copy => {
                    if self.pos >= dic_limit {
                        return Ok((in_pos, DecodeStatus::NotFinished));
                    }
                    if in_pos == src.len() {
                        return Ok((in_pos, DecodeStatus::NeedsMoreInput));
                    }
                    let n = (self.packed as usize)
                        .min(dic_limit - self.pos)
                        .min(src.len() - in_pos);
                    let mut dict = self.dict(dic, dic_limit);
                    dict.copy_uncompressed(&src[in_pos..in_pos + n]);
                    self.store_dict(&dict);
                    in_pos += n;
                    self.packed -= n as u32;
                    if self.packed == 0 {
                        self.seq = Sequence::Control;
                    }
                }
                _ => {
                    let Some(&byte) = src.get(in_pos) else {
                        return Ok((in_pos, DecodeStatus::NeedsMoreInput));
                    };
                    in_pos += 1;
                    self.header_byte(byte)?;
                }
            }
        }
    }

    /// Advances the header state machine by one byte.
    fn header_byte(&mut self, byte: u8) -> Result<()> {
        match self.seq {
            Sequence::Control => self.control(byte)?,
            Sequence::Unpacked1 => {
                self.unpacked += (byte as u32) << 8;
                self.seq = Sequence::Unpacked2;
            }
            Sequence::Unpacked2 => {
                self.unpacked += byte as u32 + 1;
                self.seq = Sequence::Packed0;
            }
            Sequence::Packed0 => {
                self.packed = (byte as u32) << 8;
                self.seq = Sequence::Packed1;
            }
            Sequence::Packed1 => {
                self.packed += byte as u32 + 1;
                if self.next_seq == Sequence::Copy {
                    self.unpacked = self.packed;
                }
                self.seq = self.next_seq;
            }
            Sequence::Props => {
                let props = LzmaProps::from_byte(byte)?;
                self.lzma.set_props(props);
                self.lzma.reset();
                self.seq = Sequence::LzmaPrepare;
            }
            Sequence::LzmaPrepare => {
                if self.packed < RC_INIT_BYTES {
                    return Err(Error::corrupted(format!(
                        "LZMA chunk packed size {} is smaller than the range coder header",
                        self.packed
                    )));
                }
                let mut pos = 0;
                if self.rc.read_init(&[byte], &mut pos)? {
                    self.packed -= RC_INIT_BYTES;
                    self.seq = Sequence::LzmaRun;
                }
            }
            Sequence::LzmaRun | Sequence::Copy | Sequence::Finished => {}
        }
        Ok(())
    }

    fn control(&mut self, c: u8) -> Result<()> {
        if c == ctrl::END_MARKER {
            log::trace!("LZMA2 end marker at dictionary position {}", self.pos);
            self.seq = Sequence::Finished;
            return Ok(());
        }
        if (0x03..ctrl::LZMA_BASE).contains(&c) {
            return Err(Error::corrupted(format!("invalid LZMA2 control byte {:#04x}", c)));
        }

        if c >= ctrl::LZMA_RESET_ALL || c == ctrl::UNCOMPRESSED_RESET {
            self.need_props = true;
            self.need_dict_reset = false;
            self.full = 0;
            self.processed = 0;
        } else if self.need_dict_reset {
            return Err(Error::corrupted("first LZMA2 chunk does not reset the dictionary"));
        }

        if c >= ctrl::LZMA_BASE {
            self.unpacked = ((c & 0x1F) as u32) << 16;
            self.seq = Sequence::Unpacked1;
            if c >= ctrl::LZMA_RESET_STATE_PROPS {
                self.need_props = false;
                self.next_seq = Sequence::Props;
            } else if self.need_props {
                return Err(Error::corrupted("LZMA chunk without properties after dictionary reset"));
            } else {
                self.next_seq = Sequence::LzmaPrepare;
                if c >= ctrl::LZMA_RESET_STATE {
                    self.lzma.reset();
                }
            }
        } else {
            self.seq = Sequence::Packed0;
            self.next_seq = Sequence::Copy;
        }
        Ok(())
    }

    /// Checks that an LZMA chunk ended exactly where its header said.
    fn finish_lzma_chunk(&mut self) -> Result<()> {
        if self.packed != 0 || self.temp_len != 0 {
            return Err(Error::corrupted(format!(
                "LZMA chunk has {} unused packed bytes",
                self.packed as usize + self.temp_len
            )));
        }
        if self.lzma.pending_len() != 0 || !self.rc.is_finished() {
            return Err(Error::corrupted("LZMA chunk did not end on a symbol boundary"));
        }
        self.rc.reset();
        self.seq = Sequence::Control;
        Ok(())
    }

    fn dict<'a>(&self, dic: &'a mut [u8], limit: usize) -> Dict<'a> {
        Dict {
            buf: dic,
            pos: self.pos,
            full: self.full,
            limit,
            processed: self.processed,
        }
    }

    fn store_dict(&mut self, dict: &Dict<'_>) {
        self.pos = dict.pos;
        self.full = dict.full;
        self.processed = dict.processed;
    }

    fn run_lzma(&mut self, dic: &mut [u8], limit: usize, src: &[u8], in_pos: &mut usize) -> Result<()> {
        let mut dict = self.dict(dic, limit);
        let result = self.run_lzma_inner(&mut dict, src, in_pos);
        self.store_dict(&dict);
        result
    }

    /// Decodes LZMA symbols of the current chunk.
    ///
    /// Symbols are decoded directly from `src` while at least
    /// [`LZMA_IN_REQUIRED`] bytes remain; the last few bytes go through the
    /// partial-symbol buffer so a symbol is never decoded from a short window.
    fn run_lzma_inner(&mut self, dict: &mut Dict<'_>, src: &[u8], in_pos: &mut usize) -> Result<()> {
        if self.temp_len > 0 || self.packed == 0 {
            let packed = self.packed as usize;
            let avail = src.len() - *in_pos;
            let take = (TEMP_FILL - self.temp_len)
                .min(packed - self.temp_len)
                .min(avail);
            self.temp[self.temp_len..self.temp_len + take]
                .copy_from_slice(&src[*in_pos..*in_pos + take]);
            let filled = self.temp_len + take;

            let limit = if filled == packed {
                self.temp[filled..].fill(0);
                filled
            } else if filled < LZMA_IN_REQUIRED {
                self.temp_len = filled;
                *in_pos += take;
                return Ok(());
            } else {
                filled - LZMA_IN_REQUIRED
            };

            let mut inp = RcInput::new(&self.temp, 0, limit);
            self.lzma.decode(&mut self.rc, &mut inp, dict)?;
            let used = inp.pos();
            if used > filled {
                return Err(Error::corrupted("LZMA data runs past the end of its chunk"));
            }
            self.packed -= used as u32;

            if used < self.temp_len {
                self.temp.copy_within(used..self.temp_len, 0);
                self.temp_len -= used;
                return Ok(());
            }
            *in_pos += used - self.temp_len;
            self.temp_len = 0;
        }

        let avail = src.len() - *in_pos;
        if avail >= LZMA_IN_REQUIRED {
            let packed = self.packed as usize;
            let limit = if avail >= packed + LZMA_IN_REQUIRED {
                *in_pos + packed
            } else {
                src.len() - LZMA_IN_REQUIRED
            };
            let mut inp = RcInput::new(src, *in_pos, limit);
            self.lzma.decode(&mut self.rc, &mut inp, dict)?;
            let used = inp.pos() - *in_pos;
            if used > packed {
                return Err(Error::corrupted("LZMA data runs past the end of its chunk"));
            }
            self.packed -= used as u32;
            *in_pos = inp.pos();
        }

        let avail = src.len() - *in_pos;
        if avail < LZMA_IN_REQUIRED {
            let take = avail.min(self.packed as usize);
            self.temp[..take].copy_from_slice(&src[*in_pos..*in_pos + take]);
            self.temp_len = take;
            *in_pos += take;
        }
        Ok(())
    }
}

/// LZMA2 decoder with an owned circular dictionary window.
///
/// Used by the single-threaded streaming path, where output goes to caller
/// buffers that are reused between calls and cannot serve as history.
#[derive(Debug, Default)]
pub struct WindowDecoder {
    dec: Lzma2Decoder,
    window: Vec<u8>,
}

impl WindowDecoder {
    /// Creates a decoder without a window. [`init`](Self::init) allocates it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new stream, (re)allocating the window if its size changes.
    pub fn init(&mut self, dict_prop: u8) -> Result<()> {
        self.dec.init(dict_prop)?;
        let size = self.dec.dict_size();
        if self.window.len() != size {
            self.window = Vec::new();
            self.window.try_reserve_exact(size).map_err(|_| {
                Error::allocation(format!("{} byte dictionary window", size))
            })?;
            self.window.resize(size, 0);
            log::debug!("allocated {} byte dictionary window", size);
        }
        Ok(())
    }

    /// Returns the size of the window in bytes.
    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Returns `true` once the end marker has been consumed.
    pub fn is_finished(&self) -> bool {
        self.dec.is_finished()
    }

    /// Decodes `src` into `out`, returning `(consumed, produced, status)`.
    ///
    /// Once `out` is full, an end marker that directly follows the last
    /// chunk is still consumed, so an exactly sized `out` finishes the stream.
    pub fn decode_to_buf(
        &mut self,
        out: &mut [u8],
        src: &[u8],
        finish: FinishMode,
    ) -> Result<(usize, usize, DecodeStatus)> {
        let mut consumed = 0usize;
        let mut produced = 0usize;
        loop {
            if self.dec.pos == self.window.len() {
                self.dec.pos = 0;
            }
            let start = self.dec.pos;
            let room = out.len() - produced;
            let (limit, cur_finish) = if self.window.len() - start >= room {
                (start + room, finish)
            } else {
                (self.window.len(), FinishMode::Any)
            };

            let (used, status) =
                self.dec
                    .decode_to_dic(&mut self.window, limit, &src[consumed..], cur_finish)?;
            consumed += used;

            let n = self.dec.pos - start;
            out[produced..produced + n].copy_from_slice(&self.window[start..start + n]);
            produced += n;

            if status == DecodeStatus::NotFinished && produced == out.len() {
                let (used, status) = self.dec.take_end_marker(&src[consumed..]);
                return Ok((consumed + used, produced, status));
            }
            if n == 0 || status != DecodeStatus::NotFinished {
                return Ok((consumed, produced, status));
            }
        }
    }
}
