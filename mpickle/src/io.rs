// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte sources and sinks.
//!
//! The codec never owns the underlying stream; it only reads and writes through these traits.
//! In-memory implementations are provided for `&[u8]` and `Vec<u8>`; with the `std` feature,
//! [`IoSource`] and [`IoSink`] adapt `std::io` readers and writers.

use alloc::vec::Vec;

use crate::error::IoError;

/// A readable byte stream.
pub trait Source {
    /// Appends up to `n` bytes to `buf` and returns how many were appended.
    ///
    /// Fewer than `n` bytes means the stream ended.
    fn read(&mut self, n: usize, buf: &mut Vec<u8>) -> Result<usize, IoError>;

    /// Appends bytes up to and including the next `\n` (or the end of the stream).
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, IoError>;
}

/// A writable byte stream.
pub trait Sink {
    /// Writes all of `bytes`.
    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError>;
}

impl Source for &[u8] {
    fn read(&mut self, n: usize, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        let take = n.min(self.len());
        let (head, tail) = self.split_at(take);
        buf.extend_from_slice(head);
        *self = tail;
        Ok(take)
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        let take = self
            .iter()
            .position(|&b| b == b'\n')
            .map_or(self.len(), |i| i + 1);
        self.read(take, buf)
    }
}

impl<S: Source + ?Sized> Source for &mut S {
    fn read(&mut self, n: usize, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        (**self).read(n, buf)
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        (**self).read_line(buf)
    }
}

impl Sink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        (**self).write(bytes)
    }
}

/// Adapts a [`std::io::BufRead`] into a [`Source`].
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct IoSource<R>(pub R);

#[cfg(feature = "std")]
impl<R: std::io::BufRead> Source for IoSource<R> {
    fn read(&mut self, n: usize, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        use std::io::Read;
        let limit = u64::try_from(n).unwrap_or(u64::MAX);
        let got = (&mut self.0).take(limit).read_to_end(buf)?;
        Ok(got)
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        Ok(self.0.read_until(b'\n', buf)?)
    }
}

/// Adapts a [`std::io::Write`] into a [`Sink`].
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct IoSink<W>(pub W);

#[cfg(feature = "std")]
impl<W: std::io::Write> Sink for IoSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        Ok(self.0.write_all(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source_reads_and_lines() {
        let mut src: &[u8] = b"ab\ncd";
        let mut buf = Vec::new();
        assert_eq!(src.read_line(&mut buf).unwrap(), 3);
        assert_eq!(buf, b"ab\n");
        buf.clear();
        assert_eq!(src.read(5, &mut buf).unwrap(), 2);
        assert_eq!(buf, b"cd");
        buf.clear();
        assert_eq!(src.read(1, &mut buf).unwrap(), 0);
        assert_eq!(src.read_line(&mut buf).unwrap(), 0);
    }

    #[test]
    fn line_without_terminator_returns_remainder() {
        let mut src: &[u8] = b"tail";
        let mut buf = Vec::new();
        assert_eq!(src.read_line(&mut buf).unwrap(), 4);
        assert_eq!(buf, b"tail");
    }

    #[cfg(feature = "std")]
    #[test]
    fn std_adapters() {
        let mut src = IoSource(std::io::Cursor::new(b"x\nyz".to_vec()));
        let mut buf = Vec::new();
        assert_eq!(src.read_line(&mut buf).unwrap(), 2);
        assert_eq!(src.read(10, &mut buf).unwrap(), 2);
        assert_eq!(buf, b"x\nyz");

        let mut sink = IoSink(Vec::new());
        sink.write(b"abc").unwrap();
        assert_eq!(sink.0, b"abc");
    }
}
