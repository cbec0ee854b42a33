//! LZMA2 chunk headers.
//!
//! Every LZMA2 chunk starts with a control byte:
//!
//! | Control | Meaning | Header size |
//! |---------|---------|-------------|
//! | `0x00` | End of stream | 1 |
//! | `0x01` | Uncompressed, dictionary reset | 3 |
//! | `0x02` | Uncompressed, no reset | 3 |
//! | `0x03..=0x7F` | Invalid | - |
//! | `0x80..=0xFF` | LZMA, reset level in bits 5-6 | 5 or 6 |
//!
//! Uncompressed chunks store `size - 1` as a big-endian u16. LZMA chunks keep
//! bits 16-20 of `unpacked - 1` in the control byte, followed by the low 16
//! bits, then `packed - 1` as a big-endian u16, then the props byte when the
//! reset level is two or more.
//!
//! Headers can be read without decoding the payload, which is how block
//! boundaries are found for parallel decoding and how the decompressed size
//! of a whole stream is computed up front.

use crate::{Error, Result};

/// Control byte values.
pub mod ctrl {
    /// End of stream marker.
    pub const END_MARKER: u8 = 0x00;
    /// Uncompressed chunk, reset dictionary.
    pub const UNCOMPRESSED_RESET: u8 = 0x01;
    /// Uncompressed chunk, no dictionary reset.
    pub const UNCOMPRESSED_NO_RESET: u8 = 0x02;
    /// LZMA compressed chunk base (bits 0-4 are unpacked size high bits).
    pub const LZMA_BASE: u8 = 0x80;
    /// LZMA compressed, reset state.
    pub const LZMA_RESET_STATE: u8 = 0xA0;
    /// LZMA compressed, reset state and properties.
    pub const LZMA_RESET_STATE_PROPS: u8 = 0xC0;
    /// LZMA compressed, reset state, properties, and dictionary.
    pub const LZMA_RESET_ALL: u8 = 0xE0;
}

/// Longest chunk header (LZMA chunk with props byte).
pub const MAX_HEADER_SIZE: usize = 6;

/// Reset level of an LZMA2 compressed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkResetMode {
    /// Continue with the previous decoder state.
    None = ctrl::LZMA_BASE,
    /// Reset state only; keep dictionary and properties.
    StateReset = ctrl::LZMA_RESET_STATE,
    /// Reset state and load new properties; keep dictionary.
    StatePropsReset = ctrl::LZMA_RESET_STATE_PROPS,
    /// Reset everything: state, properties, and dictionary.
    AllReset = ctrl::LZMA_RESET_ALL,
}

impl ChunkResetMode {
    fn from_control(control: u8) -> Self {
        match control & 0xE0 {
            ctrl::LZMA_RESET_ALL => Self::AllReset,
            ctrl::LZMA_RESET_STATE_PROPS => Self::StatePropsReset,
            ctrl::LZMA_RESET_STATE => Self::StateReset,
            _ => Self::None,
        }
    }

    /// Returns true if a props byte follows the sizes.
    pub fn includes_props(self) -> bool {
        matches!(self, Self::StatePropsReset | Self::AllReset)
    }

    /// Returns true if the LZMA state is reset at the start of the chunk.
    pub fn resets_state(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// What a chunk carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// The end-of-stream marker.
    End,
    /// Raw bytes copied to the output.
    Uncompressed {
        /// Whether the dictionary is reset first.
        reset_dict: bool,
    },
    /// Range-coded LZMA data.
    Lzma {
        /// Reset level.
        reset: ChunkResetMode,
        /// Props byte, present for [`ChunkResetMode::StatePropsReset`] and above.
        props: Option<u8>,
    },
}

/// A parsed chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// The raw control byte.
    pub control: u8,
    /// The chunk kind.
    pub kind: ChunkKind,
    /// Decompressed bytes the chunk produces.
    pub unpacked_size: u32,
    /// Payload bytes following the header.
    pub packed_size: u32,
}

/// Returns true if a chunk with this control byte resets the dictionary.
pub fn is_dict_reset(control: u8) -> bool {
    control == ctrl::UNCOMPRESSED_RESET || control >= ctrl::LZMA_RESET_ALL
}

/// Returns the header length implied by a control byte.
pub fn header_len(control: u8) -> Result<usize> {
    match control {
        ctrl::END_MARKER => Ok(1),
        ctrl::UNCOMPRESSED_RESET | ctrl::UNCOMPRESSED_NO_RESET => Ok(3),
        c if c >= ctrl::LZMA_RESET_STATE_PROPS => Ok(6),
        c if c >= ctrl::LZMA_BASE => Ok(5),
        c => Err(Error::corrupted(format!("invalid LZMA2 control byte {:#04x}", c))),
    }
}

impl ChunkHeader {
    /// Parses a header from the start of `bytes`.
    ///
    /// Returns `Ok(None)` when `bytes` is too short to hold the whole header.
    pub fn parse(bytes: &[u8]) -> Result<Option<Self>> {
        let Some(&control) = bytes.first() else {
            return Ok(None);
        };
        let len = header_len(control)?;
        if bytes.len() < len {
            return Ok(None);
        }

        let header = match control {
            ctrl::END_MARKER => Self {
                control,
                kind: ChunkKind::End,
                unpacked_size: 0,
                packed_size: 0,
            },
            ctrl::UNCOMPRESSED_RESET | ctrl::UNCOMPRESSED_NO_RESET => {
                let size = u16::from_be_bytes([bytes[1], bytes[2]]) as u32 + 1;
                Self {
                    control,
                    kind: ChunkKind::Uncompressed {
                        reset_dict: control == ctrl::UNCOMPRESSED_RESET,
                    },
                    unpacked_size: size,
                    packed_size: size,
                }
            }
            _ => {
                let reset = ChunkResetMode::from_control(control);
                let unpacked = (((control & 0x1F) as u32) << 16)
                    + u16::from_be_bytes([bytes[1], bytes[2]]) as u32
                    + 1;
                let packed = u16::from_be_bytes([bytes[3], bytes[4]]) as u32 + 1;
                Self {
                    control,
                    kind: ChunkKind::Lzma {
                        reset,
                        props: reset.includes_props().then(|| bytes[5]),
                    },
                    unpacked_size: unpacked,
                    packed_size: packed,
                }
            }
        };
        Ok(Some(header))
    }

    /// Returns the number of header bytes.
    pub fn header_len(&self) -> usize {
        match self.kind {
            ChunkKind::End => 1,
            ChunkKind::Uncompressed { .. } => 3,
            ChunkKind::Lzma { reset, .. } => {
                if reset.includes_props() {
                    6
                } else {
                    5
                }
            }
        }
    }

    /// Returns the header plus payload length.
    pub fn total_len(&self) -> usize {
        self.header_len() + self.packed_size as usize
    }

    /// Returns true if this chunk resets the dictionary.
    pub fn resets_dict(&self) -> bool {
        is_dict_reset(self.control)
    }

    /// Returns true for the end-of-stream marker.
    pub fn is_end(&self) -> bool {
        matches!(self.kind, ChunkKind::End)
    }
}

/// Sums the unpacked sizes of every chunk up to and including the end marker.
///
/// `chunks` starts at the first chunk header (after the property byte).
/// Fails with [`Error::SrcSizeWrong`] if the end marker is not reached
/// within `chunks`.
pub fn unpacked_size_of(chunks: &[u8]) -> Result<u64> {
    let mut pos = 0usize;
    let mut total = 0u64;
    loop {
        let Some(header) = ChunkHeader::parse(&chunks[pos.min(chunks.len())..])? else {
            return Err(Error::SrcSizeWrong);
        };
        if header.is_end() {
            return Ok(total);
        }
        total += header.unpacked_size as u64;
        pos += header.total_len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_end_marker() {
        let h = ChunkHeader::parse(&[0x00]).unwrap().unwrap();
        assert!(h.is_end());
        assert_eq!(h.total_len(), 1);
    }

    #[test]
    fn test_parse_uncompressed() {
        let h = ChunkHeader::parse(&[0x01, 0x00, 0x01, b'A', b'B'])
            .unwrap()
            .unwrap();
        assert_eq!(h.kind, ChunkKind::Uncompressed { reset_dict: true });
        assert_eq!(h.unpacked_size, 2);
        assert_eq!(h.packed_size, 2);
        assert_eq!(h.total_len(), 5);
        assert!(h.resets_dict());

        let h = ChunkHeader::parse(&[0x02, 0xFF, 0xFF]).unwrap().unwrap();
        assert_eq!(h.unpacked_size, 65536);
        assert!(!h.resets_dict());
    }

    #[test]
    fn test_parse_lzma() {
        // Reset all, unpacked 0x1_0000 + 0x0203 + 1, packed 0x0405 + 1, props 0x5D
        let h = ChunkHeader::parse(&[0xE1, 0x02, 0x03, 0x04, 0x05, 0x5D])
            .unwrap()
            .unwrap();
        assert_eq!(
            h.kind,
            ChunkKind::Lzma {
                reset: ChunkResetMode::AllReset,
                props: Some(0x5D)
            }
        );
        assert_eq!(h.unpacked_size, 0x1_0204);
        assert_eq!(h.packed_size, 0x0406);
        assert_eq!(h.header_len(), 6);
        assert!(h.resets_dict());

        let h = ChunkHeader::parse(&[0xA0, 0x00, 0x00, 0x00, 0x09])
            .unwrap()
            .unwrap();
        assert_eq!(
            h.kind,
            ChunkKind::Lzma {
                reset: ChunkResetMode::StateReset,
                props: None
            }
        );
        assert_eq!(h.header_len(), 5);
        assert!(!h.resets_dict());
    }

    #[test]
    fn test_reset_mode_values() {
        assert_eq!(ChunkResetMode::from_control(0x85), ChunkResetMode::None);
        assert_eq!(ChunkResetMode::from_control(0xA0), ChunkResetMode::StateReset);
        assert_eq!(ChunkResetMode::from_control(0xDF), ChunkResetMode::StatePropsReset);
        assert_eq!(ChunkResetMode::from_control(0xFF), ChunkResetMode::AllReset);
        assert!(!ChunkResetMode::None.resets_state());
        assert!(ChunkResetMode::StateReset.resets_state());
    }

    #[test]
    fn test_parse_incomplete() {
        assert_eq!(ChunkHeader::parse(&[]).unwrap(), None);
        assert_eq!(ChunkHeader::parse(&[0x01, 0x00]).unwrap(), None);
        assert_eq!(ChunkHeader::parse(&[0xC0, 0, 0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn test_parse_invalid_control() {
        for c in [0x03u8, 0x40, 0x7F] {
            assert!(matches!(ChunkHeader::parse(&[c]), Err(Error::Corrupted(_))));
        }
    }

    #[test]
    fn test_unpacked_size_of() {
        let stream = [
            0x01, 0x00, 0x01, b'A', b'B', // 2 bytes
            0x02, 0x00, 0x00, b'C', // 1 byte
            0x00,
        ];
        assert_eq!(unpacked_size_of(&stream).unwrap(), 3);
        assert_eq!(unpacked_size_of(&[0x00]).unwrap(), 0);
    }

    #[test]
    fn test_unpacked_size_of_truncated() {
        let stream = [0x01, 0x00, 0x01, b'A', b'B'];
        assert!(matches!(unpacked_size_of(&stream), Err(Error::SrcSizeWrong)));
        assert!(matches!(unpacked_size_of(&[]), Err(Error::SrcSizeWrong)));
    }
}
