//! Input buffer chain for the multithreaded decoder.
//!
//! Compressed input arrives in caller-sized pieces but blocks are decoded
//! only once their boundaries are known, so input is copied into a chain of
//! fixed-capacity nodes. Only the tail node grows; nodes are released from the
//! front once every block that touches them has been flushed.
//!
//! Positions are absolute stream offsets (counted from the first byte after
//! the property byte). Because every node except the tail is full, node `n`
//! always covers offsets `n * node_size .. (n + 1) * node_size`.

use std::collections::VecDeque;

use crate::{Error, Result};

/// Position of a byte inside the chain: absolute node index and offset in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockPos {
    /// Absolute node index.
    pub node: usize,
    /// Offset inside the node.
    pub offset: usize,
}

/// A span of compressed input that decodes to a known number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputBlock {
    /// First byte of the block.
    pub start: BlockPos,
    /// One past the last byte of the block.
    pub end: BlockPos,
    /// Decompressed size of the block.
    pub unpack_size: u64,
    /// Whether the block starts with a dictionary reset and can be decoded
    /// without any earlier output.
    pub independent: bool,
}

/// Chain of fixed-capacity input nodes.
#[derive(Debug)]
pub struct InputChain {
    nodes: VecDeque<Vec<u8>>,
    first_index: usize,
    node_size: usize,
}

impl InputChain {
    /// Creates a chain with one empty head node.
    pub fn new(node_size: usize) -> Result<Self> {
        let mut chain = Self {
            nodes: VecDeque::new(),
            first_index: 0,
            node_size: node_size.max(1),
        };
        chain.push_node()?;
        Ok(chain)
    }

    fn push_node(&mut self) -> Result<()> {
        let mut node = Vec::new();
        node.try_reserve_exact(self.node_size)
            .map_err(|_| Error::allocation(format!("{} byte input node", self.node_size)))?;
        self.nodes.push_back(node);
        Ok(())
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Converts an absolute offset to a chain position.
    pub fn pos_of(&self, offset: u64) -> BlockPos {
        let size = self.node_size as u64;
        BlockPos {
            node: (offset / size) as usize,
            offset: (offset % size) as usize,
        }
    }

    /// Converts a chain position to an absolute offset.
    pub fn offset_of(&self, pos: BlockPos) -> u64 {
        pos.node as u64 * self.node_size as u64 + pos.offset as u64
    }

    /// Returns the absolute offset one past the last buffered byte.
    pub fn end(&self) -> u64 {
        let tail = self.first_index + self.nodes.len() - 1;
        let tail_len = self.nodes.back().map_or(0, Vec::len);
        tail as u64 * self.node_size as u64 + tail_len as u64
    }

    /// Returns the absolute offset of the first byte still held.
    pub fn start(&self) -> u64 {
        self.first_index as u64 * self.node_size as u64
    }

    /// Copies as much of `src` as fits into the tail node, appending a new
    /// node first if the tail is full. Returns the number of bytes taken.
    pub fn fill_tail(&mut self, src: &[u8]) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        if self.nodes.back().is_none_or(|tail| tail.len() == self.node_size) {
            self.push_node()?;
        }
        let node_size = self.node_size;
        let Some(tail) = self.nodes.back_mut() else {
            return Ok(0);
        };
        let n = src.len().min(node_size - tail.len());
        tail.extend_from_slice(&src[..n]);
        Ok(n)
    }

    /// Copies bytes starting at `offset` into `buf`, returning how many were
    /// available.
    pub fn peek(&self, offset: u64, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        for piece in self.slices(offset, self.end()) {
            let n = piece.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&piece[..n]);
            filled += n;
            if filled == buf.len() {
                break;
            }
        }
        filled
    }

    /// Returns the buffered bytes in `start..end` as a sequence of slices,
    /// one per node touched.
    ///
    /// Offsets outside the held range are clipped.
    pub fn slices(&self, start: u64, end: u64) -> impl Iterator<Item = &[u8]> + '_ {
        let start = start.max(self.start());
        let end = end.min(self.end());
        let size = self.node_size as u64;
        let first = self.first_index as u64;
        (start < end)
            .then(|| (start / size)..=((end - 1) / size))
            .into_iter()
            .flatten()
            .filter_map(move |abs_node| {
                let node = self.nodes.get((abs_node - first) as usize)?;
                let node_start = abs_node * size;
                let lo = (start.max(node_start) - node_start) as usize;
                let hi = ((end.min(node_start + size) - node_start) as usize).min(node.len());
                (lo < hi).then(|| &node[lo..hi])
            })
    }

    #[cfg(test)]
    fn copy_range(&self, start: u64, end: u64) -> Vec<u8> {
        let mut out = Vec::new();
        for piece in self.slices(start, end) {
            out.extend_from_slice(piece);
        }
        out
    }

    /// Drops every node that lies entirely before `offset`.
    ///
    /// The tail node is always kept.
    pub fn release_before(&mut self, offset: u64) {
        let size = self.node_size as u64;
        while self.nodes.len() > 1 && (self.first_index as u64 + 1) * size <= offset {
            self.nodes.pop_front();
            self.first_index += 1;
        }
    }
}
