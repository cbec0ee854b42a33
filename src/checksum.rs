//! Checksum computation utilities.
//!
//! Fast LZMA2 streams may carry a trailing XXH32 digest (seed 0) of the
//! decompressed data. It is stored in canonical form: four bytes, most
//! significant first, independent of host byte order.
//!
//! # Example
//!
//! ```rust
//! use flzma2::checksum::{Checksum, Xxh32Digest, canonical_from_hash, hash_from_canonical};
//!
//! let mut digest = Xxh32Digest::new();
//! digest.update(b"Hello, ");
//! digest.update(b"World!");
//! let value = digest.finalize();
//! assert_eq!(value, Xxh32Digest::compute(b"Hello, World!"));
//!
//! let stored = canonical_from_hash(value);
//! assert_eq!(hash_from_canonical(stored), value);
//! ```

use xxhash_rust::xxh32::Xxh32;

/// Width in bytes of the stored digest.
pub const CHECKSUM_SIZE: usize = 4;

/// Seed used for the stream digest.
const XXH32_SEED: u32 = 0;

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Finishes the checksum computation and returns the value.
    fn finalize(&self) -> Self::Output;

    /// Resets the checksum to its initial state.
    fn reset(&mut self);

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// Incremental XXH32 digest over decompressed bytes.
#[derive(Clone)]
pub struct Xxh32Digest {
    state: Xxh32,
}

impl Default for Xxh32Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Xxh32Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Xxh32Digest")
            .field("current", &self.state.digest())
            .finish()
    }
}

impl Checksum for Xxh32Digest {
    type Output = u32;

    fn new() -> Self {
        Self {
            state: Xxh32::new(XXH32_SEED),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn finalize(&self) -> u32 {
        self.state.digest()
    }

    fn reset(&mut self) {
        self.state.reset(XXH32_SEED);
    }

    fn compute(data: &[u8]) -> u32 {
        xxhash_rust::xxh32::xxh32(data, XXH32_SEED)
    }
}

/// Encodes a digest in its canonical on-wire form.
pub fn canonical_from_hash(hash: u32) -> [u8; CHECKSUM_SIZE] {
    hash.to_be_bytes()
}

/// Decodes a digest from its canonical on-wire form.
pub fn hash_from_canonical(canonical: [u8; CHECKSUM_SIZE]) -> u32 {
    u32::from_be_bytes(canonical)
}

/// Reads a canonical digest from the start of `src`, if enough bytes are present.
pub(crate) fn read_canonical(src: &[u8]) -> Option<u32> {
    let bytes: [u8; CHECKSUM_SIZE] = src.get(..CHECKSUM_SIZE)?.try_into().ok()?;
    Some(hash_from_canonical(bytes))
}
