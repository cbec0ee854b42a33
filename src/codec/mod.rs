//! LZMA2 decoding for Fast LZMA2 streams.
//!
//! A stream starts with one property byte:
//!
//! | Bits | Meaning |
//! |------|---------|
//! | 0-5 | Dictionary size class `p` (`0..=40`) |
//! | 6 | Reserved |
//! | 7 | An XXH32 digest follows the end marker |
//!
//! followed by LZMA2 chunks (see [`lzma2_chunk`]) terminated by a `0x00`
//! control byte.

pub mod lzma2_chunk;
pub mod lzma2_dec;

// Internal LZMA symbol decoding (not part of public API)
pub(crate) mod lzma_context;
pub(crate) mod lzma_rc;

pub use lzma2_chunk::{ChunkHeader, ChunkKind, ChunkResetMode, is_dict_reset, unpacked_size_of};
pub use lzma2_dec::{DecodeStatus, FinishMode, Lzma2Decoder, WindowDecoder};

use crate::{Error, Result};

/// Bit of the property byte that flags a trailing checksum.
pub const PROP_HASH_BIT: u8 = 7;

/// Mask selecting the dictionary size class from the property byte.
pub const LZMA_PROP_MASK: u8 = 0x3F;

/// Largest valid dictionary size class.
pub const DICT_PROP_MAX: u8 = 40;

/// A decoded stream property byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProp {
    /// Dictionary size class.
    pub dict_prop: u8,
    /// Whether a checksum follows the end marker.
    pub has_checksum: bool,
}

impl StreamProp {
    /// Splits a property byte into its fields.
    ///
    /// The dictionary class is validated separately, when the decoder is
    /// initialized.
    pub fn parse(byte: u8) -> Self {
        Self {
            dict_prop: byte & LZMA_PROP_MASK,
            has_checksum: byte >> PROP_HASH_BIT != 0,
        }
    }

    /// Returns the dictionary size this property selects.
    pub fn dict_size(&self) -> Result<usize> {
        dict_size_from_prop(self.dict_prop)
    }

    /// Re-encodes the property byte.
    pub fn to_byte(self) -> u8 {
        self.dict_prop | ((self.has_checksum as u8) << PROP_HASH_BIT)
    }
}

/// Returns the dictionary size for a size class.
///
/// Classes alternate between `2 << n` and `3 << n`, starting at 4 KiB for
/// class 0. Class 40 stands for the 4 GiB - 1 maximum.
///
/// # Example
///
/// ```rust
/// use flzma2::dict_size_from_prop;
///
/// assert_eq!(dict_size_from_prop(0).unwrap(), 4096);
/// assert_eq!(dict_size_from_prop(1).unwrap(), 6144);
/// assert_eq!(dict_size_from_prop(16).unwrap(), 1 << 20);
/// assert!(dict_size_from_prop(41).is_err());
/// ```
pub fn dict_size_from_prop(prop: u8) -> Result<usize> {
    if prop > DICT_PROP_MAX {
        return Err(Error::InvalidProperty(prop));
    }
    if prop == DICT_PROP_MAX {
        return Ok(u32::MAX as usize);
    }
    let size = (2u32 | (prop as u32 & 1)) << (prop / 2 + 11);
    Ok(size as usize)
}

/// Returns the smallest size class whose dictionary holds `size` bytes.
pub fn prop_for_dict_size(size: u32) -> u8 {
    (0..DICT_PROP_MAX)
        .find(|&p| {
            let class = (2u32 | (p as u32 & 1)) << (p / 2 + 11);
            class >= size
        })
        .unwrap_or(DICT_PROP_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_sizes() {
        assert_eq!(dict_size_from_prop(0).unwrap(), 4 << 10);
        assert_eq!(dict_size_from_prop(2).unwrap(), 8 << 10);
        assert_eq!(dict_size_from_prop(3).unwrap(), 12 << 10);
        assert_eq!(dict_size_from_prop(39).unwrap(), 3 << 30);
        assert_eq!(dict_size_from_prop(40).unwrap(), 0xFFFF_FFFF);
        assert!(matches!(dict_size_from_prop(41), Err(Error::InvalidProperty(41))));
        assert!(matches!(dict_size_from_prop(63), Err(Error::InvalidProperty(63))));
    }

    #[test]
    fn test_stream_prop_parse() {
        let p = StreamProp::parse(0x81);
        assert_eq!(p.dict_prop, 1);
        assert!(p.has_checksum);
        assert_eq!(p.to_byte(), 0x81);

        let p = StreamProp::parse(0x10);
        assert_eq!(p.dict_prop, 16);
        assert!(!p.has_checksum);

        // Bit 6 is not part of the dictionary class.
        assert_eq!(StreamProp::parse(0x50).dict_prop, 0x10);
    }

    #[test]
    fn test_prop_for_dict_size() {
        assert_eq!(prop_for_dict_size(1), 0);
        assert_eq!(prop_for_dict_size(4096), 0);
        assert_eq!(prop_for_dict_size(4097), 1);
        assert_eq!(prop_for_dict_size(1 << 20), 16);
        assert_eq!(prop_for_dict_size(u32::MAX), 40);
        for p in 0..DICT_PROP_MAX {
            let size = dict_size_from_prop(p).unwrap() as u32;
            assert_eq!(prop_for_dict_size(size), p);
        }
    }
}
