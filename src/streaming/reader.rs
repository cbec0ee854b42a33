//! `Read` adapter for compressed streams.
//!
//! This module provides [`Fl2Reader`] which wraps a reader of compressed
//! bytes and yields the decompressed stream.

use std::io::{self, Read};

use super::config::DecoderConfig;
use super::{DStream, InBuffer, OutBuffer, StreamProgress};
use crate::Result;

/// A reader that decompresses a stream read from `inner`.
///
/// Reading stops at the end of the stream; bytes after the checksum are left
/// in the internal buffer and never returned.
///
/// # Example
///
/// ```rust
/// use flzma2::Fl2Reader;
/// use std::io::Read;
///
/// let src: &[u8] = &[0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
/// let mut reader = Fl2Reader::new(src);
///
/// let mut out = String::new();
/// reader.read_to_string(&mut out)?;
/// assert_eq!(out, "AB");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct Fl2Reader<R> {
    inner: R,
    stream: DStream,
    buf: Vec<u8>,
    buf_pos: usize,
    buf_len: usize,
    eof: bool,
    done: bool,
}

impl<R: Read> Fl2Reader<R> {
    /// Creates a single-threaded reader.
    pub fn new(inner: R) -> Self {
        Self::from_stream(inner, DStream::new())
    }

    /// Creates a reader for `config`.
    ///
    /// # Errors
    ///
    /// Fails if the worker pool cannot be started.
    pub fn with_config(inner: R, config: DecoderConfig) -> Result<Self> {
        Ok(Self::from_stream(inner, DStream::with_config(config)?))
    }

    fn from_stream(inner: R, mut stream: DStream) -> Self {
        stream.init_stream();
        let size = stream.config().read_buffer_size.max(1);
        Self {
            inner,
            stream,
            buf: vec![0; size],
            buf_pos: 0,
            buf_len: 0,
            eof: false,
            done: false,
        }
    }

    /// Returns the compressed and decompressed byte counts so far.
    pub fn progress(&self) -> StreamProgress {
        self.stream.progress()
    }

    /// Returns true once the end of the stream has been reached.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Consumes the reader and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: Read> Read for Fl2Reader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.done {
            return Ok(0);
        }
        loop {
            if self.buf_pos == self.buf_len && !self.eof {
                self.buf_len = self.inner.read(&mut self.buf)?;
                self.buf_pos = 0;
                self.eof = self.buf_len == 0;
            }

            let mut input = InBuffer::new(&self.buf[self.buf_pos..self.buf_len]);
            let mut output = OutBuffer::new(out);
            let more = self.stream.decompress_stream(&mut output, &mut input)?;
            self.buf_pos += input.pos;

            if !more {
                self.done = true;
                return Ok(output.pos);
            }
            if output.pos > 0 {
                return Ok(output.pos);
            }
            if input.pos == 0 {
                if self.eof {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "compressed stream ended before the end marker",
                    ));
                }
                if self.buf_pos < self.buf_len {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "decoder made no progress",
                    ));
                }
            }
        }
    }
}
