//! Refillable read-ahead window over a byte stream.

use crate::error::{DecodeError, Result};
use crate::parser::read_full;
use log::debug;
use std::io::Read;

/// Fixed-capacity buffer with a fill level and a read cursor.
///
/// The buffer is refilled from the underlying reader on request. End of data
/// is reached only once the reader is exhausted *and* every buffered byte has
/// been consumed; bytes still in the buffer stay valid after the reader has
/// reported end of stream.
#[derive(Debug)]
pub struct StreamBuffer<R> {
    reader: R,
    buf: Vec<u8>,
    fill: usize,
    pos: usize,
    exhausted: bool,
}

impl<R: Read> StreamBuffer<R> {
    /// Creates an empty buffer of `capacity` bytes over `reader`.
    ///
    /// Nothing is read until the first [`refill`](Self::refill).
    pub fn with_capacity(reader: R, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DecodeError::invalid_format("stream buffer capacity must be non-zero"));
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)?;
        buf.resize(capacity, 0);
        Ok(Self {
            reader,
            buf,
            fill: 0,
            pos: 0,
            exhausted: false,
        })
    }

    /// Reads as much as fits from the stream and resets the cursor to zero.
    ///
    /// Unconsumed bytes are moved to the front of the buffer first, so a
    /// refill never drops data. Returns the new fill level. Once the stream
    /// is exhausted this only reports what is still buffered.
    pub fn refill(&mut self) -> Result<usize> {
        if self.at_end() {
            return Err(DecodeError::UseAfterEnd);
        }
        if self.exhausted {
            return Ok(self.remaining());
        }

        let tail = self.fill - self.pos;
        self.buf.copy_within(self.pos..self.fill, 0);
        let wanted = self.buf.len() - tail;
        let got = read_full(&mut self.reader, &mut self.buf[tail..])?;
        if got < wanted {
            debug!("Stream exhausted after {} of {} requested bytes", got, wanted);
            self.exhausted = true;
        }
        self.fill = tail + got;
        self.pos = 0;
        Ok(self.fill)
    }

    /// Refills only if fewer than `wanted` bytes are buffered and more may come.
    pub fn ensure(&mut self, wanted: usize) -> Result<usize> {
        if self.remaining() < wanted && !self.exhausted {
            self.refill()?;
        }
        Ok(self.remaining())
    }

    /// True when the stream is exhausted and every buffered byte was consumed.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.exhausted && self.pos == self.fill
    }

    /// True when the cursor has reached the fill level.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.pos == self.fill
    }

    /// True once the underlying reader has reported end of stream.
    #[inline]
    pub fn is_stream_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of buffered, unconsumed bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.fill - self.pos
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns up to `len` unconsumed bytes without advancing.
    pub fn peek(&self, len: usize) -> Result<&[u8]> {
        if self.at_end() {
            return Err(DecodeError::UseAfterEnd);
        }
        let end = self.fill.min(self.pos + len);
        Ok(&self.buf[self.pos..end])
    }

    /// Moves the cursor forward by `len` bytes, clamped to the fill level.
    pub fn advance(&mut self, len: usize) {
        self.pos = self.fill.min(self.pos + len);
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
