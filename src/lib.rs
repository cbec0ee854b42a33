//! # flzma2
//!
//! A pure-Rust decoder for Fast-LZMA2 streams.
//!
//! A stream is a property byte, a sequence of LZMA2 chunks closed by an end
//! marker, and an optional XXH32 checksum of the decompressed data. This
//! crate decodes such streams in one shot, incrementally through
//! caller-owned buffers, or on a pool of worker threads that decode blocks
//! separated by dictionary resets in parallel.
//!
//! ## Quick Start
//!
//! ### One-Shot Decompression
//!
//! ```rust
//! use flzma2::{Result, decompress_to_vec, find_decompressed_size};
//!
//! fn main() -> Result<()> {
//!     let src = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
//!
//!     // The size is read from chunk headers without decoding
//!     assert_eq!(find_decompressed_size(&src)?, 2);
//!
//!     let data = decompress_to_vec(&src)?;
//!     assert_eq!(data, b"AB");
//!     Ok(())
//! }
//! ```
//!
//! ### Decompressing from a Reader
//!
//! ```rust,no_run
//! use flzma2::{DecoderConfig, Fl2Reader, Threads};
//! use std::fs::File;
//! use std::io;
//!
//! fn main() -> io::Result<()> {
//!     let config = DecoderConfig::new().threads(Threads::Auto);
//!     let mut reader = Fl2Reader::with_config(File::open("data.fl2")?, config)?;
//!     io::copy(&mut reader, &mut io::stdout())?;
//!     Ok(())
//! }
//! ```
//!
//! ### Driving the Stream Decoder
//!
//! [`DStream`] consumes input and fills output in pieces of any size, which
//! suits callers that manage their own buffers or event loops:
//!
//! ```rust
//! use flzma2::{DStream, InBuffer, OutBuffer};
//!
//! let src = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
//! let mut stream = DStream::new();
//! stream.init_stream();
//!
//! let mut dst = [0u8; 16];
//! let mut output = OutBuffer::new(&mut dst);
//! let mut input = InBuffer::new(&src);
//! while stream.decompress_stream(&mut output, &mut input)? {}
//! assert_eq!(output.written(), b"AB");
//! # Ok::<(), flzma2::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `parallel` | Yes | Worker threads via rayon; without it blocks decode in sequence |
//! | `sysinfo` | No | [`DecoderConfig::auto_sized`] reads available memory |
//! | `cli` | No | The `flzma2` command-line tool |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], which is an alias for
//! `std::result::Result<T, Error>`. Every [`Error`] maps to a stable
//! [`ErrorCode`]:
//!
//! ```rust
//! use flzma2::{Error, ErrorCode};
//!
//! let mut dst = [0u8; 1];
//! let src = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
//! match flzma2::decompress(&mut dst, &src) {
//!     Err(e @ Error::DstSizeTooSmall) => assert_eq!(e.code(), ErrorCode::DstSizeTooSmall),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod checksum;
pub mod codec;
mod decompress;
pub mod error;
pub mod streaming;

pub use codec::{dict_size_from_prop, prop_for_dict_size};
pub use decompress::{
    DCtx, decompress, decompress_to_vec, estimate_dctx_size, estimate_dstream_size,
    find_decompressed_size,
};
pub use error::{Error, ErrorCode, Result};
pub use streaming::{
    DStream, DecoderConfig, DecoderStage, Fl2Reader, InBuffer, OutBuffer, StreamProgress, Threads,
};
