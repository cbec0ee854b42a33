//! One-shot decompression.
//!
//! [`DCtx`] decodes a complete stream held in memory straight into the
//! caller's output buffer. The output buffer doubles as the dictionary, so no
//! window is allocated.

use crate::checksum::{Checksum, Xxh32Digest, read_canonical};
use crate::codec::lzma_context::LITERAL_PROBS_BYTES;
use crate::codec::{DecodeStatus, FinishMode, Lzma2Decoder, StreamProp, unpacked_size_of};
use crate::streaming::config::DEFAULT_INPUT_NODE_SIZE;
use crate::{Error, Result};

/// A reusable single-threaded decompression context.
///
/// # Example
///
/// ```rust
/// use flzma2::DCtx;
///
/// let src = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
/// let mut dctx = DCtx::new();
/// let mut dst = [0u8; 16];
/// let n = dctx.decompress(&mut dst, &src)?;
/// assert_eq!(&dst[..n], b"AB");
/// # Ok::<(), flzma2::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct DCtx {
    dec: Lzma2Decoder,
}

impl DCtx {
    /// Creates a context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompresses a whole stream from `src` into `dst`.
    ///
    /// Returns the number of bytes written. Fails with
    /// [`Error::DstSizeTooSmall`] if `dst` fills before the end marker and
    /// with [`Error::SrcSizeWrong`] if `src` ends early.
    pub fn decompress(&mut self, dst: &mut [u8], src: &[u8]) -> Result<usize> {
        let Some((&prop_byte, chunks)) = src.split_first() else {
            return Err(Error::SrcSizeWrong);
        };
        let prop = StreamProp::parse(prop_byte);
        log::debug!(
            "one-shot decode: dict prop {:#04x}, checksum {}",
            prop.dict_prop,
            prop.has_checksum
        );

        self.dec.init(prop.dict_prop)?;
        let (used, status) = self.dec.decode_to_dic(dst, dst.len(), chunks, FinishMode::End)?;
        match status {
            DecodeStatus::FinishedWithMark => {}
            DecodeStatus::NeedsMoreInput => return Err(Error::SrcSizeWrong),
            DecodeStatus::NotFinished => return Err(Error::DstSizeTooSmall),
        }
        let written = self.dec.dic_pos();

        if prop.has_checksum {
            let expected = read_canonical(&chunks[used..]).ok_or(Error::SrcSizeWrong)?;
            let actual = Xxh32Digest::compute(&dst[..written]);
            if expected != actual {
                return Err(Error::ChecksumWrong { expected, actual });
            }
            log::debug!("checksum verified: {:#010x}", actual);
        }
        Ok(written)
    }
}

/// Decompresses `src` into `dst` with a temporary context.
///
/// # Example
///
/// ```rust
/// let src = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
/// let mut dst = [0u8; 2];
/// assert_eq!(flzma2::decompress(&mut dst, &src)?, 2);
/// # Ok::<(), flzma2::Error>(())
/// ```
pub fn decompress(dst: &mut [u8], src: &[u8]) -> Result<usize> {
    DCtx::new().decompress(dst, src)
}

/// Returns the decompressed size of a complete stream without decoding it.
///
/// Only chunk headers are read. Fails with [`Error::SrcSizeWrong`] if `src`
/// ends before the end marker.
pub fn find_decompressed_size(src: &[u8]) -> Result<u64> {
    let Some((&prop_byte, chunks)) = src.split_first() else {
        return Err(Error::SrcSizeWrong);
    };
    StreamProp::parse(prop_byte).dict_size()?;
    unpacked_size_of(chunks)
}

/// Decompresses a complete stream into a new vector sized from its chunk headers.
pub fn decompress_to_vec(src: &[u8]) -> Result<Vec<u8>> {
    let size = find_decompressed_size(src)?;
    let size = usize::try_from(size)
        .map_err(|_| Error::allocation(format!("{} byte output does not fit in memory", size)))?;
    let mut out = Vec::new();
    out.try_reserve_exact(size)
        .map_err(|_| Error::allocation(format!("{} byte output buffer", size)))?;
    out.resize(size, 0);
    let n = decompress(&mut out, src)?;
    out.truncate(n);
    Ok(out)
}

/// Estimates the memory held by a [`DCtx`].
pub fn estimate_dctx_size() -> usize {
    std::mem::size_of::<DCtx>() + LITERAL_PROBS_BYTES
}

/// Estimates the memory a [`DStream`](crate::DStream) needs for a dictionary
/// size and worker count.
///
/// With zero or one thread this is one decoder plus its window. With more,
/// each worker holds a decoder and a block buffer assumed to be about one
/// dictionary in size, plus one input node.
pub fn estimate_dstream_size(dict_size: usize, threads: usize) -> usize {
    if threads <= 1 {
        estimate_dctx_size().saturating_add(dict_size)
    } else {
        estimate_dctx_size()
            .saturating_add(dict_size)
            .saturating_mul(threads)
            .saturating_add(DEFAULT_INPUT_NODE_SIZE)
    }
}
