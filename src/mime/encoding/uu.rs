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

//! Historic uuencode codecs.
//!
//! Each data line carries a length character (`0x20 + n`, `n` the number of
//! decoded bytes on the line, at most 45) followed by 4-character groups
//! encoding 3 bytes each, every character holding 6 bits offset by `0x20`.
//! Backtick is the traditional alternative to space for the zero value.

use super::Codec;
use crate::mime::scanner::parse_begin_line;

const BYTES_PER_LINE: usize = 45;

/// The longest line a well-formed encoder produces. Used only as a safety
/// valve against pathological unterminated input.
const MAX_UU_LINE: usize = 2048;

fn uu_6bit(byte: u8) -> u32 {
    u32::from(byte.wrapping_sub(0x20) & 0x3F)
}

fn uu_char(bits: u32) -> u8 {
    if 0 == bits {
        b'`'
    } else {
        0x20 + bits as u8
    }
}

fn decode_line(line: &[u8], out: &mut Vec<u8>) {
    let count = uu_6bit(line[0]) as usize;
    if 0 == count {
        return;
    }

    let mut acc = 0u32;
    let mut bits = 0u32;
    let mut produced = 0usize;
    for &ch in &line[1..] {
        if produced >= count {
            break;
        }

        acc = acc << 6 | uu_6bit(ch);
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            produced += 1;
        }
    }
}

/// Streaming uudecoder.
///
/// Operates line-by-line, carrying a partial trailing line between chunks.
/// Blank lines and `begin` headers are skipped; a lone backtick or `end`
/// stops decoding, after which remaining input is ignored.
#[derive(Debug, Default)]
pub struct UuDecoder {
    carry: Vec<u8>,
    done: bool,
}

impl UuDecoder {
    pub fn new() -> Self {
        UuDecoder::default()
    }

    fn take_line(&mut self, line: &[u8], out: &mut Vec<u8>) {
        if self.done {
            return;
        }

        let line = match line.split_last() {
            Some((b'\r', init)) => init,
            _ => line,
        };

        if line.is_empty() || parse_begin_line(line).is_some() {
            return;
        }
        if b"`" == line || b"end" == line {
            self.done = true;
            return;
        }

        decode_line(line, out);
    }
}

impl Codec for UuDecoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.carry.extend_from_slice(input);

        let mut start = 0;
        while let Some(lf) = memchr::memchr(b'\n', &self.carry[start..]) {
            let line = self.carry[start..start + lf].to_vec();
            self.take_line(&line, out);
            start += lf + 1;
        }
        self.carry.copy_within(start.., 0);
        self.carry.truncate(self.carry.len() - start);

        if self.carry.len() > MAX_UU_LINE {
            log::trace!("Discarding oversized unterminated uuencode line");
            self.carry.clear();
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        if !self.carry.is_empty() {
            let line = std::mem::replace(&mut self.carry, Vec::new());
            self.take_line(&line, out);
        }
    }
}

/// Streaming uuencoder, including the `begin`/`` ` ``/`end` framing.
///
/// Carries the `len % 45` remainder between chunks; the final partial line
/// is flushed on close.
#[derive(Debug)]
pub struct UuEncoder {
    carry: Vec<u8>,
    started: bool,
    mode: u32,
    filename: String,
}

impl UuEncoder {
    /// Creates an encoder framing its output with the given file mode
    /// (octal, e.g. `0o644`) and name.
    pub fn new(mode: u32, filename: &str) -> Self {
        UuEncoder {
            carry: Vec::new(),
            started: false,
            mode,
            filename: filename.to_owned(),
        }
    }

    fn begin(&mut self, out: &mut Vec<u8>) {
        if !self.started {
            out.extend_from_slice(
                format!("begin {:o} {}\r\n", self.mode, self.filename)
                    .as_bytes(),
            );
            self.started = true;
        }
    }

    fn emit_line(data: &[u8], out: &mut Vec<u8>) {
        out.push(0x20 + data.len() as u8);
        for group in data.chunks(3) {
            let mut acc = 0u32;
            for i in 0..3 {
                acc = acc << 8 | u32::from(*group.get(i).unwrap_or(&0));
            }
            for shift in &[18u32, 12, 6, 0] {
                out.push(uu_char(acc >> shift & 0x3F));
            }
        }
        out.extend_from_slice(b"\r\n");
    }
}

impl Codec for UuEncoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.begin(out);
        self.carry.extend_from_slice(input);

        let mut start = 0;
        while self.carry.len() - start >= BYTES_PER_LINE {
            Self::emit_line(
                &self.carry[start..start + BYTES_PER_LINE],
                out,
            );
            start += BYTES_PER_LINE;
        }
        self.carry.copy_within(start.., 0);
        self.carry.truncate(self.carry.len() - start);
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        self.begin(out);
        if !self.carry.is_empty() {
            let line = std::mem::replace(&mut self.carry, Vec::new());
            Self::emit_line(&line, out);
        }
        out.extend_from_slice(b"`\r\nend\r\n");
    }
}
