//! Configuration for streaming decompression.
//!
//! This module provides [`DecoderConfig`] for choosing between the
//! single-threaded and multithreaded decoders and bounding the memory the
//! multithreaded decoder may reserve.

use std::num::NonZeroUsize;

/// Default capacity of one input buffer node (256 KiB).
pub const DEFAULT_INPUT_NODE_SIZE: usize = 256 * 1024;

/// Smallest accepted input buffer node capacity.
pub const MIN_INPUT_NODE_SIZE: usize = 16;

/// Default unpacked size at which a block is split without a dictionary reset (64 MiB).
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Default limit on block output buffers (1 GiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 1024 * 1024 * 1024;

/// Default read buffer size for [`Fl2Reader`](crate::Fl2Reader) (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Thread configuration for decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threads {
    /// One worker per available CPU; single-threaded on a one-CPU system.
    #[default]
    Auto,
    /// Use the multithreaded decoder with exactly this many workers.
    ///
    /// A count of one still runs the multithreaded pipeline on one worker,
    /// which is useful for testing it against the single-threaded path.
    Count(NonZeroUsize),
    /// Decode on the calling thread with a dictionary window.
    Single,
}

impl Threads {
    /// Creates a `Threads::Count` variant from a `usize`.
    ///
    /// Returns `Threads::Single` if the count is zero.
    ///
    /// # Example
    ///
    /// ```rust
    /// use flzma2::Threads;
    ///
    /// assert_eq!(Threads::count_or_single(0), Threads::Single);
    /// assert_eq!(Threads::count_or_single(4).count(), 4);
    /// ```
    pub fn count_or_single(n: usize) -> Self {
        match NonZeroUsize::new(n) {
            Some(count) => Self::Count(count),
            None => Self::Single,
        }
    }

    /// Returns the number of threads that will do decoding work.
    pub fn count(&self) -> usize {
        match self {
            Self::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            Self::Count(n) => n.get(),
            Self::Single => 1,
        }
    }

    /// Returns the worker count for the multithreaded decoder, or `None`
    /// when the single-threaded path should be used.
    pub fn workers(&self) -> Option<usize> {
        match self {
            Self::Single => None,
            Self::Count(n) => Some(n.get()),
            Self::Auto => match self.count() {
                1 => None,
                n => Some(n),
            },
        }
    }
}

/// Configuration for [`DStream`](crate::DStream) and [`Fl2Reader`](crate::Fl2Reader).
///
/// # Example
///
/// ```rust
/// use flzma2::{DecoderConfig, Threads};
///
/// let config = DecoderConfig::new()
///     .threads(Threads::count_or_single(4))
///     .memory_limit(256 * 1024 * 1024)
///     .max_block_size(16 * 1024 * 1024);
/// assert_eq!(config.threads.workers(), Some(4));
/// ```
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Thread selection. Default: [`Threads::Auto`].
    pub threads: Threads,

    /// Capacity of each node in the multithreaded input chain (bytes).
    ///
    /// Default: 256 KiB. Values below 16 are raised to 16.
    pub input_node_size: usize,

    /// Unpacked size at which the multithreaded decoder ends a block even
    /// without a dictionary reset (bytes).
    ///
    /// Streams written with a single dictionary reset would otherwise become
    /// one block as large as the whole output. Default: 64 MiB.
    pub max_block_size: usize,

    /// Limit on the output buffers reserved by the multithreaded decoder (bytes).
    ///
    /// Default: 1 GiB.
    pub memory_limit: usize,

    /// Size of the compressed read buffer used by [`Fl2Reader`](crate::Fl2Reader).
    ///
    /// Default: 64 KiB.
    pub read_buffer_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            threads: Threads::Auto,
            input_node_size: DEFAULT_INPUT_NODE_SIZE,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl DecoderConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for the single-threaded decoder.
    pub fn single_threaded() -> Self {
        Self::default().threads(Threads::Single)
    }

    /// Creates a configuration optimized for low memory usage.
    ///
    /// Decodes on two workers with small blocks and a 64 MiB buffer limit.
    pub fn low_memory() -> Self {
        Self {
            threads: Threads::count_or_single(2),
            input_node_size: 64 * 1024,
            max_block_size: 8 * 1024 * 1024,
            memory_limit: 64 * 1024 * 1024,
            read_buffer_size: 16 * 1024,
        }
    }

    /// Creates a configuration optimized for high performance.
    ///
    /// Uses every CPU, large input nodes and a 4 GiB buffer limit.
    pub fn high_performance() -> Self {
        Self {
            threads: Threads::Auto,
            input_node_size: 1024 * 1024,
            max_block_size: 128 * 1024 * 1024,
            memory_limit: usize::try_from(4u64 << 30).unwrap_or(usize::MAX),
            read_buffer_size: 256 * 1024,
        }
    }

    /// Creates a configuration sized for the current system.
    ///
    /// The memory limit is about 25% of available RAM, clamped between
    /// 64 MiB and 4 GiB, and the block size is scaled so every worker can
    /// hold two blocks within it.
    #[cfg(feature = "sysinfo")]
    pub fn auto_sized() -> Self {
        use sysinfo::System;

        let mut sys = System::new();
        sys.refresh_memory();

        let available = sys.available_memory();
        let total = sys.total_memory();
        let target = (available / 4).max(total / 16);

        let min_limit = 64 * 1024 * 1024;
        let max_limit = 4 * 1024 * 1024 * 1024_u64;
        let limit = usize::try_from(target.clamp(min_limit, max_limit)).unwrap_or(usize::MAX);

        let workers = Threads::Auto.count();
        let block = (limit / (2 * workers)).clamp(1024 * 1024, 256 * 1024 * 1024);

        Self {
            threads: Threads::Auto,
            input_node_size: DEFAULT_INPUT_NODE_SIZE,
            max_block_size: block,
            memory_limit: limit,
            read_buffer_size: (limit / 1000).clamp(32 * 1024, 512 * 1024),
        }
    }

    /// Creates a configuration sized for the current system.
    ///
    /// This is a fallback when the `sysinfo` feature is not enabled.
    /// Returns the default configuration.
    #[cfg(not(feature = "sysinfo"))]
    pub fn auto_sized() -> Self {
        Self::default()
    }

    /// Sets the thread selection.
    pub fn threads(mut self, threads: Threads) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the input node capacity, raised to at least 16 bytes.
    pub fn input_node_size(mut self, bytes: usize) -> Self {
        self.input_node_size = bytes.max(MIN_INPUT_NODE_SIZE);
        self
    }

    /// Sets the block split size, at least one byte.
    pub fn max_block_size(mut self, bytes: usize) -> Self {
        self.max_block_size = bytes.max(1);
        self
    }

    /// Sets the block buffer memory limit.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Sets the reader's compressed read buffer size, at least one byte.
    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes.max(1);
        self
    }

    /// Returns the input node capacity actually used.
    pub(crate) fn effective_node_size(&self) -> usize {
        self.input_node_size.max(MIN_INPUT_NODE_SIZE)
    }
}
