//! Memory budget for multithreaded block buffers.
//!
//! Every block resolved by the multithreaded decoder owns one output buffer
//! holding its history prefix and its decoded bytes. [`MemoryTracker`] is the
//! budget those buffers are charged against; a [`TrackedBuffer`] gives its
//! charge back when the block has been flushed and the buffer is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Error, Result};

/// Byte budget shared by the decoder and the buffers of in-flight blocks.
///
/// Charges are atomic, so buffers may be dropped on worker threads.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use flzma2::streaming::MemoryTracker;
///
/// let budget = Arc::new(MemoryTracker::new(1 << 20));
/// let charge = budget.reserve(4096)?;
/// assert_eq!(budget.in_use(), 4096);
/// drop(charge);
/// assert_eq!(budget.in_use(), 0);
/// assert_eq!(budget.high_water(), 4096);
/// # Ok::<(), flzma2::Error>(())
/// ```
#[derive(Debug)]
pub struct MemoryTracker {
    in_use: AtomicUsize,
    high_water: AtomicUsize,
    limit: usize,
}

impl MemoryTracker {
    /// Creates a budget of `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            in_use: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            limit,
        }
    }

    /// Returns the budget in bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the bytes currently charged.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Returns the largest charge seen at any one time.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }

    /// Returns the bytes that can still be reserved.
    pub fn headroom(&self) -> usize {
        self.limit.saturating_sub(self.in_use())
    }

    /// Charges `bytes` against the budget.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMemory`] when the charge would exceed the limit.
    pub fn reserve(self: &Arc<Self>, bytes: usize) -> Result<MemoryGuard> {
        let limit = self.limit;
        let previous = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= limit)
            })
            .map_err(|_| Error::NoMemory {
                requested: bytes,
                limit,
            })?;
        self.high_water.fetch_max(previous + bytes, Ordering::AcqRel);
        Ok(MemoryGuard {
            budget: Arc::clone(self),
            bytes,
        })
    }
}

/// A charge against a [`MemoryTracker`], returned on drop.
#[derive(Debug)]
pub struct MemoryGuard {
    budget: Arc<MemoryTracker>,
    bytes: usize,
}

impl MemoryGuard {
    /// Returns the charged byte count.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryGuard {
    fn drop(&mut self) {
        self.budget.in_use.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// Zero-filled block buffer charged against a [`MemoryTracker`].
#[derive(Debug)]
pub struct TrackedBuffer {
    data: Box<[u8]>,
    charge: MemoryGuard,
}

impl TrackedBuffer {
    /// Charges `size` bytes to `budget` and allocates them.
    ///
    /// Fails with [`Error::NoMemory`] if either the budget or the allocator
    /// refuses.
    pub fn zeroed(budget: &Arc<MemoryTracker>, size: usize) -> Result<Self> {
        let charge = budget.reserve(size)?;
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| Error::NoMemory {
            requested: size,
            limit: budget.limit(),
        })?;
        data.resize(size, 0);
        Ok(Self {
            data: data.into_boxed_slice(),
            charge,
        })
    }

    /// Returns the charged byte count.
    pub fn charged(&self) -> usize {
        self.charge.bytes()
    }
}

impl std::ops::Deref for TrackedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for TrackedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_and_release() {
        let budget = Arc::new(MemoryTracker::new(1000));
        let charge = budget.reserve(400).unwrap();
        assert_eq!(charge.bytes(), 400);
        assert_eq!(budget.in_use(), 400);
        assert_eq!(budget.headroom(), 600);
        drop(charge);
        assert_eq!(budget.in_use(), 0);
        assert_eq!(budget.headroom(), 1000);
    }

    #[test]
    fn test_over_budget_leaves_usage_unchanged() {
        let budget = Arc::new(MemoryTracker::new(1000));
        let _held = budget.reserve(700).unwrap();
        assert!(matches!(
            budget.reserve(301),
            Err(Error::NoMemory {
                requested: 301,
                limit: 1000
            })
        ));
        assert_eq!(budget.in_use(), 700);
        assert!(budget.reserve(300).is_ok());
    }

    #[test]
    fn test_reserve_overflow() {
        let budget = Arc::new(MemoryTracker::new(usize::MAX));
        let _held = budget.reserve(10).unwrap();
        assert!(budget.reserve(usize::MAX).is_err());
    }

    #[test]
    fn test_high_water() {
        let budget = Arc::new(MemoryTracker::new(1000));
        let a = budget.reserve(250).unwrap();
        let b = budget.reserve(500).unwrap();
        drop(a);
        let c = budget.reserve(100).unwrap();
        assert_eq!(budget.high_water(), 750);
        drop((b, c));
        assert_eq!(budget.high_water(), 750);
    }

    #[test]
    fn test_block_buffer() {
        let budget = Arc::new(MemoryTracker::new(256));
        let mut buf = TrackedBuffer::zeroed(&budget, 200).unwrap();
        assert_eq!(buf.len(), 200);
        assert_eq!(buf.charged(), 200);
        assert!(buf.iter().all(|&b| b == 0));
        buf[199] = 0xFF;
        assert!(TrackedBuffer::zeroed(&budget, 57).is_err());

        // Released from a worker thread, as after a parallel decode
        std::thread::spawn(move || drop(buf)).join().unwrap();
        assert_eq!(budget.in_use(), 0);
    }
}
