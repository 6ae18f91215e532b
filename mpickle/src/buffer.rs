// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-memory seekable byte buffer.

use alloc::vec::Vec;

use crate::error::IoError;
use crate::io::{Sink, Source};

/// Reference point for [`ByteBuffer::seek`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Whence {
    /// From the start of the buffer.
    Start,
    /// From the current position.
    Current,
    /// From the end of the buffer.
    End,
}

/// A growable byte buffer with a cursor, usable as both [`Source`] and [`Sink`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads up to `n` bytes from the cursor and advances it.
    pub fn read(&mut self, n: usize) -> &[u8] {
        let start = self.pos.min(self.data.len());
        let end = start.saturating_add(n).min(self.data.len());
        self.pos = end;
        &self.data[start..end]
    }

    /// Writes `bytes` at the cursor, overwriting and then extending; a cursor past the end
    /// zero-fills the gap.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if self.pos > self.data.len() {
            self.data.resize(self.pos, 0);
        }
        let overlap = (self.data.len() - self.pos).min(bytes.len());
        self.data[self.pos..self.pos + overlap].copy_from_slice(&bytes[..overlap]);
        self.data.extend_from_slice(&bytes[overlap..]);
        self.pos += bytes.len();
        bytes.len()
    }

    /// Moves the cursor and returns the new absolute position.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, IoError> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos as i64,
            Whence::End => self.data.len() as i64,
        };
        let target = base
            .checked_add(offset)
            .filter(|t| *t >= 0)
            .ok_or_else(|| IoError::new("negative seek position"))?;
        self.pos = usize::try_from(target).map_err(|_| IoError::new("seek position overflow"))?;
        Ok(target as u64)
    }

    /// Returns the cursor position.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.pos as u64
    }

    /// Borrows the whole contents without copying.
    #[must_use]
    pub fn get_buffer(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer and returns its contents.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl Source for ByteBuffer {
    fn read(&mut self, n: usize, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        let chunk = Self::read(self, n);
        buf.extend_from_slice(chunk);
        Ok(chunk.len())
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, IoError> {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        let n = rest
            .iter()
            .position(|&b| b == b'\n')
            .map_or(rest.len(), |i| i + 1);
        Source::read(self, n, buf)
    }
}

impl Sink for ByteBuffer {
    fn write(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        Self::write(self, bytes);
        Ok(())
    }
}
