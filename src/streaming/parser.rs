//! Chunk boundary parser for the multithreaded decoder.
//!
//! Walks LZMA2 chunk headers in the input chain without decoding anything,
//! accumulating each block's unpacked size and finding the places where the
//! stream can be split: dictionary resets and the end marker.

use super::inbuf::{InputBlock, InputChain};
use crate::Result;
use crate::codec::ChunkHeader;
use crate::codec::lzma2_chunk::{MAX_HEADER_SIZE, header_len};

/// Result of one parser step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// An ordinary chunk was added to the block.
    Continue,
    /// A dictionary reset was found after the block start; the block ends
    /// before it.
    DictReset,
    /// The end marker was found; the block ends after it.
    Final,
    /// The next header is not fully buffered yet.
    NeedMoreData,
}

/// Incremental chunk header parser.
#[derive(Debug, Clone, Default)]
pub struct ChunkParser {
    pos: u64,
}

impl ChunkParser {
    /// Creates a parser positioned at the first chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the absolute offset of the next header.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Examines the chunk header at the parse position.
    ///
    /// On [`ChunkStatus::Continue`] the chunk is appended to `block` and the
    /// position moves past its payload, whether or not the payload is
    /// buffered yet. A dictionary reset at the very start of `block` marks
    /// the block independent instead of ending it.
    pub fn step(&mut self, chain: &InputChain, block: &mut InputBlock) -> Result<ChunkStatus> {
        let mut bytes = [0u8; MAX_HEADER_SIZE];
        let n = chain.peek(self.pos, &mut bytes);
        let Some(header) = ChunkHeader::parse(&bytes[..n])? else {
            return Ok(ChunkStatus::NeedMoreData);
        };

        let at_block_start = self.pos == chain.offset_of(block.start);
        if header.is_end() {
            self.pos += 1;
            block.end = chain.pos_of(self.pos);
            log::trace!("end marker at offset {}", self.pos - 1);
            return Ok(ChunkStatus::Final);
        }
        if header.resets_dict() {
            if !at_block_start {
                log::trace!("dictionary reset at offset {}", self.pos);
                return Ok(ChunkStatus::DictReset);
            }
            block.independent = true;
        }

        self.pos += header.total_len() as u64;
        block.unpack_size += header.unpacked_size as u64;
        block.end = chain.pos_of(self.pos);
        log::trace!(
            "chunk {:#04x}: {} -> {} bytes",
            header.control,
            header.packed_size,
            header.unpacked_size
        );
        Ok(ChunkStatus::Continue)
    }

    /// Returns the chain offset that must be buffered before the next step
    /// can make progress.
    ///
    /// This is the end of the pending payload plus the next control byte, or
    /// the end of a partially buffered header. It never reaches past the end
    /// marker, so bytes following the stream stay with the caller.
    pub fn needed_end(&self, chain: &InputChain) -> u64 {
        let mut control = [0u8; 1];
        if chain.peek(self.pos, &mut control) == 0 {
            return self.pos + 1;
        }
        self.pos + header_len(control[0]).unwrap_or(1) as u64
    }

    /// Starts a new block at the parse position.
    pub fn next_block(&self, chain: &InputChain) -> InputBlock {
        let here = chain.pos_of(self.pos);
        InputBlock {
            start: here,
            end: here,
            unpack_size: 0,
            independent: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn chain_with(node_size: usize, data: &[u8]) -> InputChain {
        let mut chain = InputChain::new(node_size).unwrap();
        let mut pos = 0;
        while pos < data.len() {
            pos += chain.fill_tail(&data[pos..]).unwrap();
        }
        chain
    }

    fn raw_chunk(reset: bool, payload: &[u8]) -> Vec<u8> {
        let mut v = vec![if reset { 0x01 } else { 0x02 }];
        v.extend_from_slice(&((payload.len() - 1) as u16).to_be_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn test_splits_at_dict_reset() {
        let mut data = raw_chunk(true, b"abc");
        data.extend(raw_chunk(false, b"de"));
        data.extend(raw_chunk(true, b"fgh"));
        data.push(0x00);
        let chain = chain_with(16, &data);

        let mut parser = ChunkParser::new();
        let mut block = parser.next_block(&chain);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::Continue);
        assert!(block.independent);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::Continue);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::DictReset);
        assert_eq!(block.unpack_size, 5);
        assert_eq!(chain.offset_of(block.end), 11);

        let mut block = parser.next_block(&chain);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::Continue);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::Final);
        assert_eq!(block.unpack_size, 3);
        assert!(block.independent);
        assert_eq!(chain.offset_of(block.end), data.len() as u64);
    }

    #[test]
    fn test_pauses_on_partial_header() {
        let data = raw_chunk(true, b"abcdef");
        let chain = chain_with(16, &data[..2]);
        let mut parser = ChunkParser::new();
        let mut block = parser.next_block(&chain);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::NeedMoreData);
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn test_skips_unbuffered_payload() {
        let mut data = raw_chunk(true, &[7u8; 40]);
        data.push(0x00);
        let chain = chain_with(16, &data[..10]);
        let mut parser = ChunkParser::new();
        let mut block = parser.next_block(&chain);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::Continue);
        assert_eq!(parser.pos(), 43);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::NeedMoreData);
    }

    #[test]
    fn test_needed_end_stops_at_marker() {
        let mut data = raw_chunk(true, b"abc");
        data.push(0x00);
        data.extend_from_slice(&[0xEE; 8]);

        assert_eq!(ChunkParser::new().needed_end(&chain_with(16, &[])), 1);
        assert_eq!(ChunkParser::new().needed_end(&chain_with(16, &data[..1])), 3);

        let chain = chain_with(16, &data[..6]);
        let mut parser = ChunkParser::new();
        let mut block = parser.next_block(&chain);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::Continue);
        assert_eq!(parser.needed_end(&chain), 7);

        let chain = chain_with(16, &data[..7]);
        assert_eq!(parser.needed_end(&chain), 7);
        assert_eq!(parser.step(&chain, &mut block).unwrap(), ChunkStatus::Final);
    }

    #[test]
    fn test_rejects_bad_control() {
        let chain = chain_with(16, &[0x10, 0, 0]);
        let mut parser = ChunkParser::new();
        let mut block = parser.next_block(&chain);
        assert!(matches!(parser.step(&chain, &mut block), Err(Error::Corrupted(_))));
    }
}
