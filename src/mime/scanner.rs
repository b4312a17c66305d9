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

//! The boundary scanner: bounded line reading over the shared source plus
//! the line-classification loops that advance a part to its next MIME
//! boundary or uuencode sentinel.
//!
//! Boundary ownership is tested against an explicit stack of
//! `(part, boundary)` pairs gathered from the part's ancestry, innermost
//! first, so one scan can terminate any number of nested parts in a single
//! step without recursive calls.

use std::io::{self, Read, Seek};

use crate::mime::bytes::SharedSource;
use crate::mime::part::{ParseContext, PartId};
use crate::support::error::Error;

/// Physical lines longer than this have their excess discarded; the
/// truncated prefix never matches a boundary or sentinel. This bounds
/// buffering against hostile input.
#[cfg(not(test))]
pub const MAX_LINE: usize = 2048;
#[cfg(test)]
pub const MAX_LINE: usize = 128;

// Room for the terminator so a line of exactly MAX_LINE content is not
// considered truncated.
const RAW_CAP: usize = MAX_LINE + 2;

#[cfg(not(test))]
const READ_CHUNK: usize = 8192;
#[cfg(test)]
const READ_CHUNK: usize = 32;

const KEEP_MAX: usize = READ_CHUNK * 4;

/// The most recently read physical line.
#[derive(Debug, Default)]
pub struct ScannedLine {
    /// Absolute offset of the line's first byte.
    pub start: u64,
    /// Absolute offset just past the line's terminator.
    pub end: u64,
    /// Line content, without the terminator, capped near `MAX_LINE`.
    pub text: Vec<u8>,
    /// Bytes of terminator consumed: 0 (EOF), 1 (`\n`) or 2 (`\r\n`).
    pub term_len: u8,
    pub truncated: bool,
}

/// Line-oriented reader over the shared source.
///
/// Keeps its own absolute cursor and buffer window; because the source is
/// read-only, a buffered window keyed by absolute offset can never go
/// stale, and the scanner re-seeks the shared handle on every refill so it
/// tolerates interleaved range-view reads.
pub struct LineScanner {
    source: SharedSource,
    cursor: u64,
    buf: Vec<u8>,
    buf_start: u64,
    line: ScannedLine,
}

impl LineScanner {
    pub fn new(source: SharedSource) -> Self {
        LineScanner {
            source,
            cursor: 0,
            buf: Vec::new(),
            buf_start: 0,
            line: ScannedLine::default(),
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn pos(&self) -> u64 {
        self.cursor
    }

    /// The line most recently returned by `next_line`.
    pub fn line(&self) -> &ScannedLine {
        &self.line
    }

    /// Moves the cursor back, un-reading a line that turned out to belong
    /// to content rather than structure.
    pub fn rewind_to(&mut self, pos: u64) {
        debug_assert!(pos <= self.cursor);
        self.cursor = pos;
    }

    /// Length of the terminator of the line ending exactly at the cursor,
    /// or 0 when the cursor does not sit just past a consumed line.
    ///
    /// A scan resumed after a consumed boundary or sentinel line needs
    /// this so an immediately following delimiter still excludes the
    /// preceding terminator from content.
    pub fn term_before_cursor(&self) -> u64 {
        if self.line.end == self.cursor && self.line.end > self.line.start
        {
            u64::from(self.line.term_len)
        } else {
            0
        }
    }

    /// Makes bytes at the cursor available, returning how many are
    /// buffered there; 0 means EOF.
    fn refill(&mut self) -> Result<usize, Error> {
        let buf_end = self.buf_start + self.buf.len() as u64;
        if self.cursor < self.buf_start || self.cursor > buf_end {
            self.buf.clear();
            self.buf_start = self.cursor;
        } else if self.buf.len() >= KEEP_MAX {
            let consumed = (self.cursor - self.buf_start) as usize;
            if consumed > 0 {
                self.buf.copy_within(consumed.., 0);
                self.buf.truncate(self.buf.len() - consumed);
                self.buf_start += consumed as u64;
            }
        }

        let mut avail =
            (self.buf_start + self.buf.len() as u64 - self.cursor) as usize;
        if 0 == avail {
            let read_pos = self.buf_start + self.buf.len() as u64;
            self.source.seek(io::SeekFrom::Start(read_pos))?;
            let mut chunk = [0u8; READ_CHUNK];
            let nread = self.source.read(&mut chunk)?;
            self.buf.extend_from_slice(&chunk[..nread]);
            avail = nread;
        }

        Ok(avail)
    }

    /// Reads the next physical line; false at EOF.
    pub fn next_line(&mut self) -> Result<bool, Error> {
        self.line.text.clear();
        self.line.start = self.cursor;
        self.line.term_len = 0;
        self.line.truncated = false;

        let mut prev_raw = 0u8;
        loop {
            let avail = self.refill()?;
            if 0 == avail {
                // Unterminated final line, or nothing at all
                self.line.end = self.cursor;
                return Ok(self.cursor != self.line.start);
            }

            let off = (self.cursor - self.buf_start) as usize;
            let window = &self.buf[off..off + avail];
            match memchr::memchr(b'\n', window) {
                Some(lf) => {
                    let before_lf =
                        if lf > 0 { window[lf - 1] } else { prev_raw };
                    append_capped(&mut self.line, &window[..=lf]);
                    self.cursor += lf as u64 + 1;
                    self.line.term_len =
                        if b'\r' == before_lf { 2 } else { 1 };
                    if !self.line.truncated {
                        let len = self.line.text.len()
                            - usize::from(self.line.term_len);
                        self.line.text.truncate(len);
                    }
                    self.line.end = self.cursor;
                    return Ok(true);
                },
                None => {
                    prev_raw = window[window.len() - 1];
                    append_capped(&mut self.line, window);
                    self.cursor += avail as u64;
                },
            }
        }
    }
}

fn append_capped(line: &mut ScannedLine, bytes: &[u8]) {
    let room = RAW_CAP.saturating_sub(line.text.len());
    if bytes.len() > room {
        line.text.extend_from_slice(&bytes[..room]);
        line.truncated = true;
    } else {
        line.text.extend_from_slice(bytes);
    }
}

/// Parses a uuencode `begin {octal-mode} {filename}` sentinel line.
pub fn parse_begin_line(text: &[u8]) -> Option<(u32, String)> {
    let rest = text.strip_prefix(b"begin ")?;
    let space = rest.iter().position(|&b| b' ' == b)?;
    let (mode_text, name) = rest.split_at(space);
    let name = &name[1..];

    if mode_text.is_empty()
        || mode_text.len() > 4
        || !mode_text.iter().all(|b| (b'0'..=b'7').contains(b))
        || name.is_empty()
    {
        return None;
    }

    let mode = u32::from_str_radix(
        std::str::from_utf8(mode_text).expect("octal digits are UTF-8"),
        8,
    )
    .ok()?;
    Some((mode, String::from_utf8_lossy(name).into_owned()))
}

/// How a boundary scan ended.
#[derive(Clone, Copy, Debug)]
pub enum ScanOutcome {
    /// A boundary line owned by `owner` (the scanned part itself or an
    /// ancestor) was consumed. Every part between the scanned one and
    /// `owner` (exclusive) has been closed.
    Boundary { owner: PartId, terminal: bool },
    /// The source ran out; the scanned part and all its ancestors have
    /// been closed at the EOF position.
    Eof { pos: u64 },
}

/// How a sentinel scan ended.
#[derive(Clone, Debug)]
pub enum SentinelOutcome {
    /// A `begin` sentinel line was consumed. Nothing has been closed; the
    /// caller decides which part the sentinel terminates and which child
    /// it opens.
    Begin {
        start: u64,
        mode: u32,
        filename: String,
    },
    /// A MIME boundary of an ancestor was consumed (closing as for
    /// `ScanOutcome::Boundary`).
    Boundary { owner: PartId, terminal: bool },
    Eof {
        pos: u64,
    },
}

impl ParseContext {
    /// Advances the cursor line-by-line until a boundary belonging to
    /// `id` or one of its ancestors is consumed, or EOF.
    ///
    /// The content end excludes the line terminator immediately preceding
    /// the boundary line: that terminator belongs to the delimiter, not to
    /// part content. A match always fixes the scanned part's own content
    /// end, even when the boundary is the part's own (the content of a
    /// multipart is its preamble).
    pub(crate) fn scan_to_boundary(
        &mut self,
        id: PartId,
    ) -> Result<ScanOutcome, Error> {
        let stack = self.live_boundary_stack(id);
        let mut prev_term = self.scanner.term_before_cursor();

        loop {
            if !self.scanner.next_line()? {
                let pos = self.scanner.pos();
                log::trace!(
                    "EOF before boundary for part {}; closing at {}",
                    id,
                    pos
                );
                self.close_upward(id, None, pos);
                return Ok(ScanOutcome::Eof { pos });
            }

            let line = self.scanner.line();
            let (start, term_len) = (line.start, u64::from(line.term_len));
            let matched = if line.truncated {
                None
            } else {
                stack
                    .iter()
                    .find(|(_, boundary)| line.text.starts_with(boundary))
                    .map(|(owner, boundary)| {
                        (
                            *owner,
                            line.text[boundary.len()..]
                                .starts_with(b"--"),
                        )
                    })
            };

            if let Some((owner, terminal)) = matched {
                let content_end = start - prev_term;
                self.set_content_end_if_unset(id, content_end);
                self.close_upward(id, Some(owner), content_end);
                if terminal {
                    self.part_mut(owner).end_boundary_found = true;
                }
                return Ok(ScanOutcome::Boundary { owner, terminal });
            }

            prev_term = term_len;
        }
    }

    /// Advances the cursor until a uuencode `begin` sentinel, an ancestor
    /// MIME boundary, or EOF.
    pub(crate) fn scan_to_sentinel(
        &mut self,
        id: PartId,
    ) -> Result<SentinelOutcome, Error> {
        let stack = self.live_boundary_stack(id);
        let mut prev_term = self.scanner.term_before_cursor();

        loop {
            if !self.scanner.next_line()? {
                let pos = self.scanner.pos();
                self.close_upward(id, None, pos);
                return Ok(SentinelOutcome::Eof { pos });
            }

            let line = self.scanner.line();
            let (start, term_len) = (line.start, u64::from(line.term_len));

            if !line.truncated {
                if let Some((mode, filename)) =
                    parse_begin_line(&line.text)
                {
                    return Ok(SentinelOutcome::Begin {
                        start,
                        mode,
                        filename,
                    });
                }

                let matched = stack
                    .iter()
                    .find(|(_, boundary)| line.text.starts_with(boundary))
                    .map(|(owner, boundary)| {
                        (
                            *owner,
                            line.text[boundary.len()..]
                                .starts_with(b"--"),
                        )
                    });
                if let Some((owner, terminal)) = matched {
                    let content_end = start - prev_term;
                    self.set_content_end_if_unset(id, content_end);
                    self.close_upward(id, Some(owner), content_end);
                    if terminal {
                        self.part_mut(owner).end_boundary_found = true;
                    }
                    return Ok(SentinelOutcome::Boundary {
                        owner,
                        terminal,
                    });
                }
            }

            prev_term = term_len;
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::mime::bytes::share;

    fn scanner(data: &[u8]) -> LineScanner {
        LineScanner::new(share(Cursor::new(data.to_vec())))
    }

    #[test]
    fn reads_lines_with_offsets_and_terminators() {
        let mut s = scanner(b"ab\r\ncd\nef");

        assert!(s.next_line().unwrap());
        assert_eq!(0, s.line().start);
        assert_eq!(b"ab".to_vec(), s.line().text);
        assert_eq!(2, s.line().term_len);

        assert!(s.next_line().unwrap());
        assert_eq!(4, s.line().start);
        assert_eq!(b"cd".to_vec(), s.line().text);
        assert_eq!(1, s.line().term_len);

        assert!(s.next_line().unwrap());
        assert_eq!(7, s.line().start);
        assert_eq!(b"ef".to_vec(), s.line().text);
        assert_eq!(0, s.line().term_len);

        assert!(!s.next_line().unwrap());
        assert_eq!(9, s.pos());
    }

    #[test]
    fn empty_lines() {
        let mut s = scanner(b"\r\n\n");
        assert!(s.next_line().unwrap());
        assert!(s.line().text.is_empty());
        assert_eq!(2, s.line().term_len);
        assert!(s.next_line().unwrap());
        assert!(s.line().text.is_empty());
        assert_eq!(1, s.line().term_len);
        assert!(!s.next_line().unwrap());
    }

    #[test]
    fn oversized_line_truncated_but_fully_consumed() {
        let mut data = vec![b'x'; MAX_LINE * 3];
        data.extend_from_slice(b"\r\nok\r\n");
        let mut s = scanner(&data);

        assert!(s.next_line().unwrap());
        assert!(s.line().truncated);
        assert_eq!(2, s.line().term_len);

        assert!(s.next_line().unwrap());
        assert!(!s.line().truncated);
        assert_eq!(b"ok".to_vec(), s.line().text);
        assert_eq!(MAX_LINE as u64 * 3 + 2, s.line().start);
    }

    #[test]
    fn crlf_split_across_buffer_refills() {
        // Put the \r at the end of one read chunk and the \n at the start
        // of the next
        let mut data = vec![b'a'; READ_CHUNK - 1];
        data.extend_from_slice(b"\r\nb\r\n");
        let mut s = scanner(&data);

        assert!(s.next_line().unwrap());
        assert_eq!(2, s.line().term_len);
        assert_eq!(READ_CHUNK - 1, s.line().text.len());

        assert!(s.next_line().unwrap());
        assert_eq!(b"b".to_vec(), s.line().text);
    }

    #[test]
    fn rewind_rereads_line() {
        let mut s = scanner(b"one\r\ntwo\r\n");
        assert!(s.next_line().unwrap());
        assert!(s.next_line().unwrap());
        let start = s.line().start;
        s.rewind_to(start);
        assert!(s.next_line().unwrap());
        assert_eq!(b"two".to_vec(), s.line().text);
    }

    #[test]
    fn resumed_scan_excludes_terminator_before_boundary() {
        use crate::mime::header::HeaderBlock;

        let mut ctx = ParseContext::new(share(Cursor::new(
            b"--B\r\n--out--\r\n".to_vec(),
        )));
        let mut headers = HeaderBlock::new();
        headers.add("Content-Type", b"multipart/mixed; boundary=out");
        let root = ctx.open_root_with_headers(headers);
        let child = ctx.open_part(Some(root), 0, false, None).unwrap();
        ctx.part_mut(child)
            .headers
            .add("Content-Type", b"multipart/mixed; boundary=B");

        // The child's own boundary opens its (empty) preamble
        assert_matches!(
            ScanOutcome::Boundary {
                terminal: false,
                ..
            },
            ctx.scan_to_boundary(child).unwrap()
        );
        assert_eq!(Some(0), ctx.part(child).content_end());

        // Resuming right after that line, the outer boundary on the next
        // line must still exclude the consumed terminator from the extent
        assert_matches!(
            ScanOutcome::Boundary { terminal: true, .. },
            ctx.scan_to_boundary(child).unwrap()
        );
        assert_eq!(Some(3), ctx.part(child).part_end());
    }

    #[test]
    fn test_parse_begin_line() {
        assert_eq!(
            Some((0o644, "a.txt".to_owned())),
            parse_begin_line(b"begin 644 a.txt")
        );
        assert_eq!(
            Some((0o755, "two words".to_owned())),
            parse_begin_line(b"begin 755 two words")
        );
        assert_matches!(None, parse_begin_line(b"begin"));
        assert_matches!(None, parse_begin_line(b"begin 644"));
        assert_matches!(None, parse_begin_line(b"begin 888 a.txt"));
        assert_matches!(None, parse_begin_line(b"begin 64499 a.txt"));
        assert_matches!(None, parse_begin_line(b"begin  a.txt"));
        assert_matches!(None, parse_begin_line(b"beginning 644 a.txt"));
    }
}
