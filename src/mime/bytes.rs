//-
// Copyright (c) 2023, Jason Lingle
//
// This file is part of Lazymime.
//
// Lazymime is free software: you can redistribute it and/or modify it under
// the terms of the GNU  General Public License as published  by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Lazymime is distributed  in the hope that it will  be useful, but WITHOUT
// ANY  WARRANTY; without  even  the implied  warranty  of MERCHANTABILITY  or
// FITNESS FOR  A PARTICULAR  PURPOSE. See the  GNU General  Public License
// for more details.
//
// You should have received a copy of the GNU General Public License along
// with Lazymime. If not, see <http://www.gnu.org/licenses/>.

//! Byte-range views over a shared message source.
//!
//! All machinery in this crate reads the message through one shared,
//! seekable handle. A `RangeReader` is a bounded window over that handle;
//! any number of them may alias the same source because each one re-seeks
//! before every read.

use std::fmt;
use std::io::{self, Read, Seek};

use crate::support::rcio::RcIo;

/// Anything usable as the backing store for a message.
pub trait Source: Read + Seek {}
impl<T: Read + Seek> Source for T {}

/// The shared handle to the message source.
pub type SharedSource = RcIo<Box<dyn Source>>;

/// Puts a source behind a `SharedSource` handle.
pub fn share(source: impl Source + 'static) -> SharedSource {
    RcIo::wrap(Box::new(source))
}

/// A read-only window of `[start, start + len)` over a shared source.
///
/// Reads are clamped to the window. The reader keeps its own position and
/// seeks the shared handle before every read, so interleaved use of several
/// readers (or of a reader and the line scanner) is safe.
pub struct RangeReader {
    source: SharedSource,
    start: u64,
    len: u64,
    pos: u64,
}

impl fmt::Debug for RangeReader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RangeReader")
            .field("source", &"<source>")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

impl RangeReader {
    pub fn new(source: SharedSource, start: u64, len: u64) -> Self {
        RangeReader {
            source,
            start,
            len,
            pos: 0,
        }
    }

    /// Returns the length, in bytes, of the window.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len
    }

    /// Rewind to the start of the window.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Read for RangeReader {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        let max = (dst.len() as u64).min(remaining) as usize;
        if 0 == max {
            return Ok(0);
        }

        self.source
            .seek(io::SeekFrom::Start(self.start + self.pos))?;
        let nread = self.source.read(&mut dst[..max])?;
        self.pos += nread as u64;
        Ok(nread)
    }
}

impl Seek for RangeReader {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(off) => off as i64,
            io::SeekFrom::End(off) => self.len as i64 + off,
            io::SeekFrom::Current(off) => self.pos as i64 + off,
        };

        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of range",
            ));
        }

        self.pos = target as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn source(data: &[u8]) -> SharedSource {
        share(Cursor::new(data.to_vec()))
    }

    fn read_all(r: &mut RangeReader, buf_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; buf_size];
        let mut out = Vec::new();
        loop {
            let nread = r.read(&mut buf).unwrap();
            if 0 == nread {
                break;
            }
            out.extend_from_slice(&buf[..nread]);
        }
        out
    }

    #[test]
    fn clamps_to_window() {
        let src = source(b"hello world");
        let mut r = RangeReader::new(src, 6, 5);
        assert_eq!(5, r.len());
        assert_eq!(b"world".to_vec(), read_all(&mut r, 3));
    }

    #[test]
    fn window_past_eof_reads_short() {
        let src = source(b"abc");
        let mut r = RangeReader::new(src, 1, 100);
        assert_eq!(b"bc".to_vec(), read_all(&mut r, 16));
    }

    #[test]
    fn interleaved_readers_are_independent() {
        let src = source(b"aaaabbbb");
        let mut ra = RangeReader::new(src.clone(), 0, 4);
        let mut rb = RangeReader::new(src, 4, 4);

        let mut buf = [0u8; 2];
        ra.read(&mut buf).unwrap();
        assert_eq!(b"aa", &buf);
        rb.read(&mut buf).unwrap();
        assert_eq!(b"bb", &buf);
        ra.read(&mut buf).unwrap();
        assert_eq!(b"aa", &buf);
        rb.read(&mut buf).unwrap();
        assert_eq!(b"bb", &buf);
    }

    #[test]
    fn rewind_and_seek() {
        let src = source(b"0123456789");
        let mut r = RangeReader::new(src, 2, 6);

        assert_eq!(b"234567".to_vec(), read_all(&mut r, 4));
        r.rewind();
        assert_eq!(b"234567".to_vec(), read_all(&mut r, 4));

        r.seek(io::SeekFrom::Start(4)).unwrap();
        assert_eq!(b"67".to_vec(), read_all(&mut r, 4));
        r.seek(io::SeekFrom::End(-2)).unwrap();
        assert_eq!(b"67".to_vec(), read_all(&mut r, 4));

        assert!(r.seek(io::SeekFrom::Current(-100)).is_err());
    }
}
