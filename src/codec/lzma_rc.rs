//! LZMA Range Decoder.
//!
//! This module provides the binary range decoder used by LZMA chunks:
//! - Adaptive probability-based bit decoding
//! - Direct bit decoding (for distance extra bits)
//! - Bit tree decoding (for literals, lengths and slots)
//!
//! The decoder reads from an [`RcInput`] window. Callers guarantee that the
//! window holds enough bytes for one whole symbol past its limit (see
//! [`LZMA_IN_REQUIRED`]), so symbol decoding never has to suspend halfway.
//! Reads past the end of the window yield zero and are caught afterwards by
//! comparing the consumed count against the chunk's packed size.

use crate::{Error, Result};

/// Number of bits for probability model total.
pub const NUM_BIT_MODEL_TOTAL_BITS: u32 = 11;

/// Total probability value (2048).
pub const BIT_MODEL_TOTAL: u32 = 1 << NUM_BIT_MODEL_TOTAL_BITS;

/// Number of bits to shift for probability updates.
pub const NUM_MOVE_BITS: u32 = 5;

/// Normalization threshold.
pub const TOP_VALUE: u32 = 1 << 24;

/// Initial probability value (50% = 1024).
pub const INITIAL_PROB: u16 = (BIT_MODEL_TOTAL / 2) as u16;

/// Maximum number of input bytes a single LZMA symbol can consume.
pub const LZMA_IN_REQUIRED: usize = 21;

/// Bytes read when the range decoder starts a chunk.
const RC_INIT_BYTES: u32 = 5;

/// Initializes a probability array to 50%.
pub fn init_probs(probs: &mut [u16]) {
    probs.fill(INITIAL_PROB);
}

/// Window of compressed bytes the range decoder reads from.
#[derive(Debug)]
pub(crate) struct RcInput<'a> {
    buf: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> RcInput<'a> {
    /// Creates a window reading `buf[pos..]`, decoding symbols while `pos <= limit`.
    pub(crate) fn new(buf: &'a [u8], pos: usize, limit: usize) -> Self {
        Self { buf, pos, limit }
    }

    /// Returns the current read position.
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Returns `true` once decoding has moved past the limit.
    pub(crate) fn limit_exceeded(&self) -> bool {
        self.pos > self.limit
    }

    fn next_byte(&mut self) -> u8 {
        let b = self.buf.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }
}

/// LZMA Range Decoder.
#[derive(Debug, Clone)]
pub struct LzmaRangeDecoder {
    range: u32,
    code: u32,
    init_bytes_left: u32,
}

impl Default for LzmaRangeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LzmaRangeDecoder {
    /// Creates a range decoder waiting for its initialization bytes.
    pub fn new() -> Self {
        Self {
            range: u32::MAX,
            code: 0,
            init_bytes_left: RC_INIT_BYTES,
        }
    }

    /// Prepares the decoder for the next LZMA chunk.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Consumes initialization bytes from `src[*in_pos..]`.
    ///
    /// Returns `Ok(true)` once all five bytes have been read. The first byte
    /// is always zero in a valid stream.
    pub(crate) fn read_init(&mut self, src: &[u8], in_pos: &mut usize) -> Result<bool> {
        while self.init_bytes_left > 0 {
            let Some(&b) = src.get(*in_pos) else {
                return Ok(false);
            };
            if self.init_bytes_left == RC_INIT_BYTES && b != 0 {
                return Err(Error::corrupted("range coder init byte is not zero"));
            }
            self.code = (self.code << 8) | b as u32;
            *in_pos += 1;
            self.init_bytes_left -= 1;
        }
        Ok(true)
    }

    /// Returns `true` if the decoder ended exactly on a chunk boundary.
    pub fn is_finished(&self) -> bool {
        self.code == 0
    }

    /// Reads another byte into the code register when the range gets small.
    #[inline]
    pub(crate) fn normalize(&mut self, inp: &mut RcInput<'_>) {
        if self.range < TOP_VALUE {
            self.range <<= 8;
            self.code = (self.code << 8) | inp.next_byte() as u32;
        }
    }

    /// Decodes a single bit with adaptive probability.
    ///
    /// Updates the probability toward the decoded value:
    /// - If bit=0: prob increases toward 2048
    /// - If bit=1: prob decreases toward 0
    #[inline]
    pub(crate) fn decode_bit(&mut self, prob: &mut u16, inp: &mut RcInput<'_>) -> u32 {
        self.normalize(inp);
        let bound = (self.range >> NUM_BIT_MODEL_TOTAL_BITS) * (*prob as u32);
        if self.code < bound {
            self.range = bound;
            *prob += ((BIT_MODEL_TOTAL - *prob as u32) >> NUM_MOVE_BITS) as u16;
            0
        } else {
            self.range -= bound;
            self.code -= bound;
            *prob -= *prob >> NUM_MOVE_BITS;
            1
        }
    }

    /// Decodes a symbol from a bit tree (most significant bit first).
    ///
    /// `probs` is indexed from 1; its length must be at least `1 << num_bits`.
    pub(crate) fn decode_bit_tree(
        &mut self,
        probs: &mut [u16],
        num_bits: u32,
        inp: &mut RcInput<'_>,
    ) -> u32 {
        let mut m = 1u32;
        for _ in 0..num_bits {
            m = (m << 1) | self.decode_bit(&mut probs[m as usize], inp);
        }
        m - (1 << num_bits)
    }

    /// Decodes a symbol from a reverse bit tree (least significant bit first).
    ///
    /// `probs[0]` is the root of the tree.
    pub(crate) fn decode_bit_tree_reverse(
        &mut self,
        probs: &mut [u16],
        num_bits: u32,
        inp: &mut RcInput<'_>,
    ) -> u32 {
        let mut m = 1u32;
        let mut symbol = 0u32;
        for i in 0..num_bits {
            let bit = self.decode_bit(&mut probs[m as usize - 1], inp);
            m = (m << 1) | bit;
            symbol |= bit << i;
        }
        symbol
    }

    /// Decodes `num_bits` bits with fixed 50% probability (most significant first).
    pub(crate) fn decode_direct_bits(&mut self, num_bits: u32, inp: &mut RcInput<'_>) -> u32 {
        let mut result = 0u32;
        for _ in 0..num_bits {
            self.normalize(inp);
            self.range >>= 1;
            let bit = if self.code >= self.range {
                self.code -= self.range;
                1
            } else {
                0
            };
            result = (result << 1) | bit;
        }
        result
    }
}
