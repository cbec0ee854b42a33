//! LZMA Decoder Context and Symbol Decoding.
//!
//! This module implements the LZMA probability context and decoding logic for:
//! - Literal bytes (with context-dependent decoding)
//! - Match lengths (using length decoder trees)
//! - Match distances (using slot and alignment decoding)
//! - State machine transitions (12 states)
//!
//! Output goes to a [`Dict`], a view over a dictionary slice owned by the
//! caller. The slice is either a circular window (streaming) or the final
//! output buffer itself (one-shot and per-block decoding).

use super::lzma_rc::{INITIAL_PROB, LzmaRangeDecoder, RcInput, init_probs};
use crate::{Error, Result};

// LZMA Constants
const NUM_REPS: usize = 4;
const NUM_STATES: usize = 12;
const NUM_LIT_STATES: usize = 7;
const NUM_LIT_TABLES: usize = 3;
const LITERAL_CODER_SIZE: usize = NUM_LIT_TABLES * 256;

/// LZMA2 limits `lc + lp` to four.
const LCLP_MAX: u32 = 4;

/// Heap bytes held by the literal probability table of one decoder state.
pub(crate) const LITERAL_PROBS_BYTES: usize = (LITERAL_CODER_SIZE << LCLP_MAX) * std::mem::size_of::<u16>();

/// Largest valid LZMA properties byte (`(4 * 5 + 4) * 9 + 8`).
const PROPS_MAX: u8 = 224;

// Position state constants
const NUM_POS_BITS_MAX: usize = 4;
const NUM_POS_STATES_MAX: usize = 1 << NUM_POS_BITS_MAX;

// Length decoding constants
const LEN_NUM_LOW_BITS: u32 = 3;
const LEN_NUM_LOW_SYMBOLS: usize = 1 << LEN_NUM_LOW_BITS;
const LEN_NUM_MID_BITS: u32 = 3;
const LEN_NUM_MID_SYMBOLS: usize = 1 << LEN_NUM_MID_BITS;
const LEN_NUM_HIGH_BITS: u32 = 8;
const LEN_NUM_HIGH_SYMBOLS: usize = 1 << LEN_NUM_HIGH_BITS;

const MATCH_LEN_MIN: u32 = 2;

// Distance decoding constants
const NUM_LEN_TO_POS_STATES: usize = 4;
const NUM_POS_SLOT_BITS: u32 = 6;
const NUM_ALIGN_BITS: u32 = 4;
const ALIGN_TABLE_SIZE: usize = 1 << NUM_ALIGN_BITS;

const START_POS_MODEL_INDEX: u32 = 4;
const END_POS_MODEL_INDEX: u32 = 14;
const NUM_FULL_DISTANCES: usize = 1 << (END_POS_MODEL_INDEX / 2);

// State transitions
const LIT_NEXT_STATES: [usize; NUM_STATES] = [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 4, 5];
const MATCH_NEXT_STATES: [usize; NUM_STATES] = [7, 7, 7, 7, 7, 7, 7, 10, 10, 10, 10, 10];
const REP_NEXT_STATES: [usize; NUM_STATES] = [8, 8, 8, 8, 8, 8, 8, 11, 11, 11, 11, 11];
const SHORT_REP_NEXT_STATES: [usize; NUM_STATES] = [9, 9, 9, 9, 9, 9, 9, 11, 11, 11, 11, 11];

/// Literal, length and position-state parameters from an LZMA props byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaProps {
    /// Literal context bits.
    pub lc: u32,
    /// Literal position bits.
    pub lp: u32,
    /// Position bits.
    pub pb: u32,
}

impl LzmaProps {
    /// Decodes a props byte, rejecting values LZMA2 does not allow.
    pub fn from_byte(props: u8) -> Result<Self> {
        if props > PROPS_MAX {
            return Err(Error::corrupted(format!(
                "invalid LZMA properties byte {:#04x}",
                props
            )));
        }
        let props = props as u32;
        let lc = props % 9;
        let lp = (props / 9) % 5;
        let pb = props / 45;
        if lc + lp > LCLP_MAX {
            return Err(Error::corrupted(format!(
                "lc + lp exceeds {} (lc={}, lp={})",
                LCLP_MAX, lc, lp
            )));
        }
        Ok(Self { lc, lp, pb })
    }
}

impl Default for LzmaProps {
    fn default() -> Self {
        Self { lc: 3, lp: 0, pb: 2 }
    }
}

/// Dictionary view used while decoding one batch of symbols.
///
/// `pos` is the write position in `buf`, `full` the number of bytes behind it
/// that matches may reference, and `processed` the uncompressed position since
/// the last dictionary reset (it drives the `lp`/`pb` contexts).
#[derive(Debug)]
pub(crate) struct Dict<'a> {
    pub(crate) buf: &'a mut [u8],
    pub(crate) pos: usize,
    pub(crate) full: usize,
    pub(crate) limit: usize,
    pub(crate) processed: u64,
}

impl Dict<'_> {
    #[inline]
    fn has_space(&self) -> bool {
        self.pos < self.limit
    }

    #[inline]
    fn back_index(&self, dist: usize) -> usize {
        if self.pos > dist {
            self.pos - dist - 1
        } else {
            self.pos + self.buf.len() - dist - 1
        }
    }

    /// Returns the byte `dist + 1` positions back, or zero if there is no history.
    #[inline]
    fn get(&self, dist: u32) -> u8 {
        let dist = dist as usize;
        if dist >= self.full {
            return 0;
        }
        self.buf[self.back_index(dist)]
    }

    #[inline]
    fn put(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos += 1;
        if self.full < self.buf.len() {
            self.full += 1;
        }
        self.processed += 1;
    }

    /// Copies up to `*len` bytes from distance `dist`, stopping at the limit.
    fn repeat(&mut self, len: &mut u32, dist: u32) -> Result<()> {
        let dist = dist as usize;
        if dist >= self.full {
            return Err(Error::corrupted(format!(
                "match distance {} exceeds available history {}",
                dist + 1,
                self.full
            )));
        }
        let count = (self.limit - self.pos).min(*len as usize);
        *len -= count as u32;

        let mut back = self.back_index(dist);
        for _ in 0..count {
            self.buf[self.pos] = self.buf[back];
            self.pos += 1;
            back += 1;
            if back == self.buf.len() {
                back = 0;
            }
        }
        self.full = (self.full + count).min(self.buf.len());
        self.processed += count as u64;
        Ok(())
    }

    /// Appends raw bytes from an uncompressed chunk.
    pub(crate) fn copy_uncompressed(&mut self, src: &[u8]) {
        self.buf[self.pos..self.pos + src.len()].copy_from_slice(src);
        self.pos += src.len();
        self.full = (self.full + src.len()).min(self.buf.len());
        self.processed += src.len() as u64;
    }
}

/// Length decoder for match and rep lengths.
///
/// Uses a 3-tree structure:
/// - Low tree: lengths 0-7 (decoded as 2-9)
/// - Mid tree: lengths 8-15 (decoded as 10-17)
/// - High tree: lengths 16-271 (decoded as 18-273)
#[derive(Clone)]
pub struct LengthDecoder {
    choice: u16,
    choice2: u16,
    low: [[u16; LEN_NUM_LOW_SYMBOLS]; NUM_POS_STATES_MAX],
    mid: [[u16; LEN_NUM_MID_SYMBOLS]; NUM_POS_STATES_MAX],
    high: [u16; LEN_NUM_HIGH_SYMBOLS],
}

impl LengthDecoder {
    /// Creates a new length decoder with probabilities initialized.
    pub fn new() -> Self {
        Self {
            choice: INITIAL_PROB,
            choice2: INITIAL_PROB,
            low: [[INITIAL_PROB; LEN_NUM_LOW_SYMBOLS]; NUM_POS_STATES_MAX],
            mid: [[INITIAL_PROB; LEN_NUM_MID_SYMBOLS]; NUM_POS_STATES_MAX],
            high: [INITIAL_PROB; LEN_NUM_HIGH_SYMBOLS],
        }
    }

    /// Resets all probabilities to initial values.
    pub fn reset(&mut self) {
        self.choice = INITIAL_PROB;
        self.choice2 = INITIAL_PROB;
        for ps in &mut self.low {
            init_probs(ps);
        }
        for ps in &mut self.mid {
            init_probs(ps);
        }
        init_probs(&mut self.high);
    }

    /// Decodes a match length (2-273).
    fn decode(&mut self, rc: &mut LzmaRangeDecoder, inp: &mut RcInput<'_>, pos_state: usize) -> u32 {
        if rc.decode_bit(&mut self.choice, inp) == 0 {
            MATCH_LEN_MIN + rc.decode_bit_tree(&mut self.low[pos_state], LEN_NUM_LOW_BITS, inp)
        } else if rc.decode_bit(&mut self.choice2, inp) == 0 {
            MATCH_LEN_MIN
                + LEN_NUM_LOW_SYMBOLS as u32
                + rc.decode_bit_tree(&mut self.mid[pos_state], LEN_NUM_MID_BITS, inp)
        } else {
            MATCH_LEN_MIN
                + (LEN_NUM_LOW_SYMBOLS + LEN_NUM_MID_SYMBOLS) as u32
                + rc.decode_bit_tree(&mut self.high, LEN_NUM_HIGH_BITS, inp)
        }
    }
}

impl Default for LengthDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// LZMA decoder state with all probability arrays.
///
/// This structure carries everything that survives between LZMA2 chunks
/// without a state reset: the adaptive probabilities, the 12-state machine,
/// the last four distances and a match that was cut short by the output limit.
#[derive(Clone)]
pub struct LzmaDecoderState {
    props: LzmaProps,
    literal_pos_mask: u64,
    pos_mask: u64,

    // State machine (0-11)
    state: usize,

    // Last 4 repetition distances
    reps: [u32; NUM_REPS],

    // Remaining length of a match interrupted by the output limit
    len: u32,

    // Decision probabilities
    is_match: [[u16; NUM_POS_STATES_MAX]; NUM_STATES],
    is_rep: [u16; NUM_STATES],
    is_rep_g0: [u16; NUM_STATES],
    is_rep_g1: [u16; NUM_STATES],
    is_rep_g2: [u16; NUM_STATES],
    is_rep0_long: [[u16; NUM_POS_STATES_MAX]; NUM_STATES],

    // Literal decoding (context-dependent)
    literal_probs: Vec<u16>,

    // Distance decoding
    dist_slot_decoders: [[u16; 1 << NUM_POS_SLOT_BITS]; NUM_LEN_TO_POS_STATES],
    dist_align_decoders: [u16; ALIGN_TABLE_SIZE],
    dist_decoders: [u16; NUM_FULL_DISTANCES - END_POS_MODEL_INDEX as usize],

    // Length decoding (match + rep)
    len_decoder: LengthDecoder,
    rep_len_decoder: LengthDecoder,
}

impl std::fmt::Debug for LzmaDecoderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzmaDecoderState")
            .field("props", &self.props)
            .field("state", &self.state)
            .field("reps", &self.reps)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl Default for LzmaDecoderState {
    fn default() -> Self {
        Self::new()
    }
}

impl LzmaDecoderState {
    /// Creates a decoder state sized for the largest `lc + lp` LZMA2 permits.
    pub fn new() -> Self {
        let mut state = Self {
            props: LzmaProps::default(),
            literal_pos_mask: 0,
            pos_mask: 0,
            state: 0,
            reps: [0; NUM_REPS],
            len: 0,
            is_match: [[INITIAL_PROB; NUM_POS_STATES_MAX]; NUM_STATES],
            is_rep: [INITIAL_PROB; NUM_STATES],
            is_rep_g0: [INITIAL_PROB; NUM_STATES],
            is_rep_g1: [INITIAL_PROB; NUM_STATES],
            is_rep_g2: [INITIAL_PROB; NUM_STATES],
            is_rep0_long: [[INITIAL_PROB; NUM_POS_STATES_MAX]; NUM_STATES],
            literal_probs: vec![INITIAL_PROB; LITERAL_CODER_SIZE << LCLP_MAX],
            dist_slot_decoders: [[INITIAL_PROB; 1 << NUM_POS_SLOT_BITS]; NUM_LEN_TO_POS_STATES],
            dist_align_decoders: [INITIAL_PROB; ALIGN_TABLE_SIZE],
            dist_decoders: [INITIAL_PROB; NUM_FULL_DISTANCES - END_POS_MODEL_INDEX as usize],
            len_decoder: LengthDecoder::new(),
            rep_len_decoder: LengthDecoder::new(),
        };
        state.set_props(LzmaProps::default());
        state
    }

    /// Installs new literal/position parameters. Call [`reset`](Self::reset) afterwards.
    pub fn set_props(&mut self, props: LzmaProps) {
        self.props = props;
        self.literal_pos_mask = (1u64 << props.lp) - 1;
        self.pos_mask = (1u64 << props.pb) - 1;
    }

    /// Resets the state machine and all probabilities.
    pub fn reset(&mut self) {
        self.state = 0;
        self.reps = [0; NUM_REPS];
        self.len = 0;

        for row in &mut self.is_match {
            init_probs(row);
        }
        init_probs(&mut self.is_rep);
        init_probs(&mut self.is_rep_g0);
        init_probs(&mut self.is_rep_g1);
        init_probs(&mut self.is_rep_g2);
        for row in &mut self.is_rep0_long {
            init_probs(row);
        }
        let used = LITERAL_CODER_SIZE << (self.props.lc + self.props.lp);
        init_probs(&mut self.literal_probs[..used]);
        for row in &mut self.dist_slot_decoders {
            init_probs(row);
        }
        init_probs(&mut self.dist_align_decoders);
        init_probs(&mut self.dist_decoders);
        self.len_decoder.reset();
        self.rep_len_decoder.reset();
    }

    /// Returns the length of a match still waiting for output space.
    pub(crate) fn pending_len(&self) -> u32 {
        self.len
    }

    /// Decodes symbols until the dictionary limit is reached or the input
    /// window's limit has been passed.
    pub(crate) fn decode(
        &mut self,
        rc: &mut LzmaRangeDecoder,
        inp: &mut RcInput<'_>,
        dict: &mut Dict<'_>,
    ) -> Result<()> {
        if self.len > 0 && dict.has_space() {
            dict.repeat(&mut self.len, self.reps[0])?;
        }

        while dict.has_space() && !inp.limit_exceeded() {
            let pos_state = (dict.processed & self.pos_mask) as usize;

            if rc.decode_bit(&mut self.is_match[self.state][pos_state], inp) == 0 {
                self.decode_literal(rc, inp, dict);
                continue;
            }

            if rc.decode_bit(&mut self.is_rep[self.state], inp) == 0 {
                self.decode_match(rc, inp, pos_state);
            } else {
                self.decode_rep_match(rc, inp, pos_state);
            }
            dict.repeat(&mut self.len, self.reps[0])?;
        }

        rc.normalize(inp);
        Ok(())
    }

    /// Decodes a literal byte and appends it to the dictionary.
    fn decode_literal(&mut self, rc: &mut LzmaRangeDecoder, inp: &mut RcInput<'_>, dict: &mut Dict<'_>) {
        let prev_byte = dict.get(0) as usize;
        let pos_bits = (dict.processed & self.literal_pos_mask) as usize;
        let context = (pos_bits << self.props.lc) + (prev_byte >> (8 - self.props.lc));
        let base = context * LITERAL_CODER_SIZE;
        let probs = &mut self.literal_probs[base..base + LITERAL_CODER_SIZE];

        let symbol = if self.state < NUM_LIT_STATES {
            rc.decode_bit_tree(probs, 8, inp)
        } else {
            // After match/rep: the byte at rep0 steers the first bits
            let mut match_byte = (dict.get(self.reps[0]) as u32) << 1;
            let mut offset = 0x100u32;
            let mut symbol = 1u32;
            while symbol < 0x100 {
                let match_bit = match_byte & offset;
                match_byte <<= 1;
                let i = (offset + match_bit + symbol) as usize;
                if rc.decode_bit(&mut probs[i], inp) == 0 {
                    symbol <<= 1;
                    offset &= !match_bit;
                } else {
                    symbol = (symbol << 1) | 1;
                    offset &= match_bit;
                }
            }
            symbol - 0x100
        };

        dict.put(symbol as u8);
        self.state = LIT_NEXT_STATES[self.state];
    }

    /// Decodes a new match: length, then distance into `reps[0]`.
    fn decode_match(&mut self, rc: &mut LzmaRangeDecoder, inp: &mut RcInput<'_>, pos_state: usize) {
        self.state = MATCH_NEXT_STATES[self.state];
        self.reps[3] = self.reps[2];
        self.reps[2] = self.reps[1];
        self.reps[1] = self.reps[0];

        self.len = self.len_decoder.decode(rc, inp, pos_state);

        let len_state = ((self.len - MATCH_LEN_MIN) as usize).min(NUM_LEN_TO_POS_STATES - 1);
        let slot = rc.decode_bit_tree(&mut self.dist_slot_decoders[len_state], NUM_POS_SLOT_BITS, inp);

        if slot < START_POS_MODEL_INDEX {
            self.reps[0] = slot;
            return;
        }

        let num_direct_bits = (slot >> 1) - 1;
        let mut dist = (2 | (slot & 1)) << num_direct_bits;
        if slot < END_POS_MODEL_INDEX {
            let base = (dist - slot) as usize;
            dist += rc.decode_bit_tree_reverse(&mut self.dist_decoders[base..], num_direct_bits, inp);
        } else {
            dist = dist.wrapping_add(rc.decode_direct_bits(num_direct_bits - NUM_ALIGN_BITS, inp) << NUM_ALIGN_BITS);
            dist = dist.wrapping_add(rc.decode_bit_tree_reverse(&mut self.dist_align_decoders, NUM_ALIGN_BITS, inp));
        }
        self.reps[0] = dist;
    }

    /// Decodes a repeated match (short rep, or one of the four saved distances).
    fn decode_rep_match(&mut self, rc: &mut LzmaRangeDecoder, inp: &mut RcInput<'_>, pos_state: usize) {
        if rc.decode_bit(&mut self.is_rep_g0[self.state], inp) == 0 {
            if rc.decode_bit(&mut self.is_rep0_long[self.state][pos_state], inp) == 0 {
                self.state = SHORT_REP_NEXT_STATES[self.state];
                self.len = 1;
                return;
            }
        } else {
            let dist;
            if rc.decode_bit(&mut self.is_rep_g1[self.state], inp) == 0 {
                dist = self.reps[1];
            } else {
                if rc.decode_bit(&mut self.is_rep_g2[self.state], inp) == 0 {
                    dist = self.reps[2];
                } else {
                    dist = self.reps[3];
                    self.reps[3] = self.reps[2];
                }
                self.reps[2] = self.reps[1];
            }
            self.reps[1] = self.reps[0];
            self.reps[0] = dist;
        }

        self.state = REP_NEXT_STATES[self.state];
        self.len = self.rep_len_decoder.decode(rc, inp, pos_state);
    }
}
