// Copyright 2026 the Execution Tape Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame chunking for protocols 4 and up.
//!
//! A frame is `FRAME` + `u64` little-endian payload length + payload. Removing every frame
//! header from a framed stream yields exactly the unframed opcode stream.

use alloc::vec::Vec;

use super::{FRAME_SIZE_MIN, FRAME_SIZE_TARGET};
use crate::error::{PickleError, UnpicklingError};
use crate::io::{Sink, Source};
use crate::opcode::Opcode;

/// Buffers opcode bytes into frames on the write side.
#[derive(Debug)]
pub struct Framer<W> {
    sink: W,
    current: Option<Vec<u8>>,
}

impl<W: Sink> Framer<W> {
    /// Wraps `sink`; framing is off until [`Framer::start_framing`].
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            current: None,
        }
    }

    /// Starts buffering writes into frames.
    pub fn start_framing(&mut self) {
        self.current = Some(Vec::new());
    }

    /// Flushes the pending frame and stops framing.
    pub fn end_framing(&mut self) -> Result<(), PickleError> {
        self.commit_frame(true)?;
        self.current = None;
        Ok(())
    }

    /// Returns `true` while inside a framing region.
    #[must_use]
    pub fn is_framing(&self) -> bool {
        self.current.is_some()
    }

    /// Emits the pending frame if it reached the target size, or unconditionally with `force`.
    ///
    /// Payloads shorter than [`FRAME_SIZE_MIN`] are written without a header.
    pub fn commit_frame(&mut self, force: bool) -> Result<(), PickleError> {
        let Some(frame) = self.current.as_mut() else {
            return Ok(());
        };
        if frame.is_empty() || (frame.len() < FRAME_SIZE_TARGET && !force) {
            return Ok(());
        }
        if frame.len() >= FRAME_SIZE_MIN {
            let mut header = [0_u8; super::FRAME_HEADER_LEN];
            header[0] = Opcode::Frame.byte();
            header[1..].copy_from_slice(&(frame.len() as u64).to_le_bytes());
            self.sink.write(&header)?;
        }
        self.sink.write(frame)?;
        frame.clear();
        Ok(())
    }

    /// Writes opcode bytes, into the pending frame when framing.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), PickleError> {
        match self.current.as_mut() {
            Some(frame) => {
                frame.extend_from_slice(bytes);
                Ok(())
            }
            None => Ok(self.sink.write(bytes)?),
        }
    }

    /// Writes a large payload outside any frame, committing the pending frame first.
    pub fn write_large_bytes(&mut self, header: &[u8], payload: &[u8]) -> Result<(), PickleError> {
        self.commit_frame(true)?;
        self.sink.write(header)?;
        self.sink.write(payload)?;
        Ok(())
    }

    /// Returns the wrapped sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Borrows the wrapped sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }
}

/// Transparently reassembles framed input on the read side.
#[derive(Debug)]
pub struct Unframer<S> {
    source: S,
    frame: Vec<u8>,
    cursor: usize,
    in_frame: bool,
    consumed: u64,
}

impl<S: Source> Unframer<S> {
    /// Wraps `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            frame: Vec::new(),
            cursor: 0,
            in_frame: false,
            consumed: 0,
        }
    }

    /// Offset of the next unread byte in the raw stream, frame headers included.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.consumed - (self.frame.len() - self.cursor) as u64
    }

    fn remaining(&self) -> &[u8] {
        &self.frame[self.cursor..]
    }

    /// Appends up to `n` bytes to `buf`, crossing into the raw stream after the frame ends.
    pub fn read(&mut self, n: usize, buf: &mut Vec<u8>) -> Result<usize, PickleError> {
        if self.in_frame {
            let rest = self.remaining();
            if rest.is_empty() && n != 0 {
                self.in_frame = false;
                return self.read_raw(n, buf);
            }
            if rest.len() < n {
                return Err(UnpicklingError::FrameExhausted.into());
            }
            buf.extend_from_slice(&rest[..n]);
            self.cursor += n;
            return Ok(n);
        }
        self.read_raw(n, buf)
    }

    /// Appends one line to `buf`, crossing into the raw stream after the frame ends.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, PickleError> {
        if self.in_frame {
            let rest = self.remaining();
            if rest.is_empty() {
                self.in_frame = false;
                return self.read_line_raw(buf);
            }
            let Some(end) = rest.iter().position(|&b| b == b'\n') else {
                return Err(UnpicklingError::FrameExhausted.into());
            };
            buf.extend_from_slice(&rest[..=end]);
            self.cursor += end + 1;
            return Ok(end + 1);
        }
        self.read_line_raw(buf)
    }

    /// Replaces the current frame with the next `len` bytes of the raw stream.
    pub fn load_frame(&mut self, len: u64) -> Result<(), PickleError> {
        if self.in_frame && !self.remaining().is_empty() {
            return Err(UnpicklingError::FrameOverlap.into());
        }
        let want = usize::try_from(len).map_err(|_| UnpicklingError::LimitExceeded {
            limit: "frame length",
        })?;
        self.frame.clear();
        self.cursor = 0;
        let got = self.source.read(want, &mut self.frame)?;
        self.consumed += got as u64;
        if got < want {
            return Err(UnpicklingError::FrameExhausted.into());
        }
        self.in_frame = true;
        Ok(())
    }

    fn read_raw(&mut self, n: usize, buf: &mut Vec<u8>) -> Result<usize, PickleError> {
        self.drop_frame();
        let got = self.source.read(n, buf)?;
        self.consumed += got as u64;
        Ok(got)
    }

    fn read_line_raw(&mut self, buf: &mut Vec<u8>) -> Result<usize, PickleError> {
        self.drop_frame();
        let got = self.source.read_line(buf)?;
        self.consumed += got as u64;
        Ok(got)
    }

    fn drop_frame(&mut self) {
        if !self.frame.is_empty() {
            self.frame.clear();
            self.cursor = 0;
        }
    }

    /// Returns the wrapped source.
    pub fn into_inner(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![Opcode::Frame.byte()];
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn small_frames_are_written_without_header() {
        let mut framer = Framer::new(Vec::new());
        framer.start_framing();
        framer.write(b"K\x01").unwrap();
        framer.end_framing().unwrap();
        assert_eq!(framer.into_inner(), b"K\x01");
    }

    #[test]
    fn forced_commit_emits_header() {
        let mut framer = Framer::new(Vec::new());
        framer.start_framing();
        framer.write(b"]K\x01a.").unwrap();
        framer.end_framing().unwrap();
        assert_eq!(framer.into_inner(), framed(b"]K\x01a."));
    }

    #[test]
    fn commit_waits_for_target() {
        let mut framer = Framer::new(Vec::new());
        framer.start_framing();
        framer.write(&[b'N'; 10]).unwrap();
        framer.commit_frame(false).unwrap();
        assert!(framer.get_ref().is_empty());

        framer.write(&vec![b'N'; FRAME_SIZE_TARGET]).unwrap();
        framer.commit_frame(false).unwrap();
        assert_eq!(framer.get_ref().len(), FRAME_SIZE_TARGET + 10 + 9);
    }

    #[test]
    fn large_bytes_bypass_frame() {
        let mut framer = Framer::new(Vec::new());
        framer.start_framing();
        framer.write(b"]q\x00").unwrap();
        framer.write_large_bytes(b"B\x03\x00\x00\x00", b"xyz").unwrap();
        framer.write(b".").unwrap();
        framer.end_framing().unwrap();
        let mut expected = b"]q\x00".to_vec();
        expected.extend_from_slice(b"B\x03\x00\x00\x00xyz.");
        assert_eq!(framer.into_inner(), expected);
    }

    #[test]
    fn passthrough_without_framing() {
        let mut framer = Framer::new(Vec::new());
        framer.write(b"abc").unwrap();
        assert_eq!(framer.into_inner(), b"abc");
    }

    #[test]
    fn reads_cross_frame_boundaries() {
        let mut stream = framed(b"ab\ncd");
        stream.extend_from_slice(b"ef");
        let mut un = Unframer::new(stream.as_slice());
        let mut buf = Vec::new();

        un.read(1, &mut buf).unwrap();
        assert_eq!(buf, [Opcode::Frame.byte()]);
        buf.clear();
        un.read(8, &mut buf).unwrap();
        un.load_frame(5).unwrap();
        assert_eq!(un.position(), 9);

        buf.clear();
        un.read_line(&mut buf).unwrap();
        assert_eq!(buf, b"ab\n");
        buf.clear();
        un.read(2, &mut buf).unwrap();
        assert_eq!(buf, b"cd");
        buf.clear();
        assert_eq!(un.read(2, &mut buf).unwrap(), 2);
        assert_eq!(buf, b"ef");
        assert_eq!(un.position(), stream.len() as u64);
    }

    #[test]
    fn read_past_frame_end_is_an_error() {
        let src: &[u8] = b"abc";
        let mut un = Unframer::new(src);
        un.load_frame(2).unwrap();
        let mut buf = Vec::new();
        assert_eq!(
            un.read(3, &mut buf),
            Err(PickleError::Unpickling(UnpicklingError::FrameExhausted))
        );
    }

    #[test]
    fn new_frame_before_end_is_an_error() {
        let src: &[u8] = b"abcd";
        let mut un = Unframer::new(src);
        un.load_frame(2).unwrap();
        assert_eq!(
            un.load_frame(2),
            Err(PickleError::Unpickling(UnpicklingError::FrameOverlap))
        );
    }

    #[test]
    fn truncated_frame_payload() {
        let src: &[u8] = b"ab";
        let mut un = Unframer::new(src);
        assert_eq!(
            un.load_frame(5),
            Err(PickleError::Unpickling(UnpicklingError::FrameExhausted))
        );
    }
}
