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

//! Quoted-printable codecs, as described by RFC 2045.
//!
//! Decoding never fails. Invalid escape sequences are passed through
//! untransformed, and restrictions such as not having trailing whitespace
//! on a line are not enforced. 8-bit characters pass through, including
//! invalid UTF-8.

use super::Codec;

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Decodes as much of `input` as possible, appending to `out`.
///
/// Returns the number of bytes consumed. The unconsumed tail (at most 2
/// bytes, always starting with `=`) is an escape sequence that may continue
/// in the next chunk and must be retried with more data.
fn qp_decode_chunk(input: &[u8], out: &mut Vec<u8>) -> usize {
    let mut ix = 0;

    while ix < input.len() {
        let byte = input[ix];
        if b'=' != byte {
            out.push(byte);
            ix += 1;
            continue;
        }

        let rest = &input[ix + 1..];
        match rest.first() {
            // Possibly-split escape; wait for more input
            None => break,
            // Soft line break, UNIX ending, discard
            Some(b'\n') => ix += 2,
            Some(b'\r') => {
                if rest.len() < 2 {
                    break;
                }
                if b'\n' == rest[1] {
                    // Soft line break, DOS ending, discard
                    ix += 3;
                } else {
                    // Not a soft break after all; pass through
                    out.extend_from_slice(b"=\r");
                    ix += 2;
                }
            },
            Some(&first) => {
                if rest.len() < 2 {
                    break;
                }
                match (hex_val(first), hex_val(rest[1])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        ix += 3;
                    },
                    // Invalid escape; emit the '=' verbatim and rescan the
                    // following bytes, which may hold a valid escape
                    _ => {
                        out.push(b'=');
                        ix += 1;
                    },
                }
            },
        }
    }

    ix
}

/// Streaming quoted-printable decoder.
///
/// Carries up to 2 bytes of a split escape sequence between chunks. A
/// dangling escape at EOF is undecodable and dropped.
#[derive(Debug, Default)]
pub struct QpDecoder {
    carry: Vec<u8>,
}

impl QpDecoder {
    pub fn new() -> Self {
        QpDecoder::default()
    }
}

impl Codec for QpDecoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        if self.carry.is_empty() {
            let consumed = qp_decode_chunk(input, out);
            self.carry.extend_from_slice(&input[consumed..]);
        } else {
            self.carry.extend_from_slice(input);
            let consumed = qp_decode_chunk(&self.carry, out);
            self.carry.copy_within(consumed.., 0);
            self.carry.truncate(self.carry.len() - consumed);
        }
    }

    fn finish(&mut self, _out: &mut Vec<u8>) {
        if !self.carry.is_empty() {
            log::trace!(
                "Dropping dangling quoted-printable escape at EOF ({} bytes)",
                self.carry.len()
            );
            self.carry.clear();
        }
    }
}

const LINE_WIDTH: usize = 76;
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Streaming quoted-printable encoder.
///
/// Printable US-ASCII other than `=` passes through literally; everything
/// else becomes an `=XX` escape. Line endings pass through raw. Whitespace
/// is escaped when it would otherwise end a line. Output lines are kept
/// under 76 characters with `=` soft breaks.
#[derive(Debug, Default)]
pub struct QpEncoder {
    column: usize,
    pending_ws: Option<u8>,
}

impl QpEncoder {
    pub fn new() -> Self {
        QpEncoder::default()
    }

    fn soft_break_for(&mut self, width: usize, out: &mut Vec<u8>) {
        if self.column + width > LINE_WIDTH - 1 {
            out.extend_from_slice(b"=\r\n");
            self.column = 0;
        }
    }

    fn literal(&mut self, byte: u8, out: &mut Vec<u8>) {
        self.soft_break_for(1, out);
        out.push(byte);
        self.column += 1;
    }

    fn escaped(&mut self, byte: u8, out: &mut Vec<u8>) {
        self.soft_break_for(3, out);
        out.push(b'=');
        out.push(HEX_DIGITS[usize::from(byte >> 4)]);
        out.push(HEX_DIGITS[usize::from(byte & 0xF)]);
        self.column += 3;
    }
}

impl Codec for QpEncoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            match byte {
                b'\r' | b'\n' => {
                    if let Some(ws) = self.pending_ws.take() {
                        self.escaped(ws, out);
                    }
                    out.push(byte);
                    self.column = 0;
                },
                b' ' | b'\t' => {
                    if let Some(prev) = self.pending_ws.replace(byte) {
                        self.literal(prev, out);
                    }
                },
                33..=126 if b'=' != byte => {
                    if let Some(ws) = self.pending_ws.take() {
                        self.literal(ws, out);
                    }
                    self.literal(byte, out);
                },
                _ => {
                    if let Some(ws) = self.pending_ws.take() {
                        self.literal(ws, out);
                    }
                    self.escaped(byte, out);
                },
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        // Whitespace at the very end of the data would be stripped by
        // transport if left literal
        if let Some(ws) = self.pending_ws.take() {
            self.escaped(ws, out);
        }
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::super::test_util::*;
    use super::*;

    fn decode(input: &[u8], chunk_size: usize) -> Vec<u8> {
        transform(&mut QpDecoder::new(), input, chunk_size)
    }

    fn assert_qp(expected: &[u8], input: &[u8]) {
        for &chunk_size in &[1usize, 3, 7, 4096] {
            assert_eq!(
                expected.to_vec(),
                decode(input, chunk_size),
                "input {:?} at chunk size {}",
                input,
                chunk_size
            );
        }
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"hello world");
        assert_qp(b"\xabfoo", b"=ABfoo");
        assert_qp(b"fo\xabo", b"fo=ABo");
        assert_qp(b"foo\xab", b"foo=AB");

        assert_qp(b"foo\xab\xcd", b"foo=AB=CD");
        assert_qp(b"foo\xabbar\xcd", b"foo=ABbar=CD");

        assert_qp(b"foo", b"foo=\n");
        assert_qp(b"foobar", b"foo=\nbar");
        assert_qp(b"foo", b"foo=\r\n");
        assert_qp(b"foobar", b"foo=\r\nbar");
        assert_qp(b"line1line2", b"line1=\r\nline2");

        assert_qp(b"foo=()bar", b"foo=()bar");
        assert_qp(b"foo=\xabbar", b"foo==ABbar");
        assert_qp(b"foo=A\xabbar", b"foo=A=ABbar");
        assert_qp("foo=\u{3051}bar".as_bytes(), "foo=\u{3051}bar".as_bytes());
        assert_qp(b"foo=\x80\x80bar", b"foo=\x80\x80bar");

        // Dangling escapes at EOF are dropped
        assert_qp(b"foo", b"foo=");
        assert_qp(b"foo", b"foo=A");
        assert_qp(b"foo", b"foo=\r");
    }

    #[test]
    fn test_qp_encode() {
        assert_eq!(
            b"hello world".to_vec(),
            transform(&mut QpEncoder::new(), b"hello world", 4096)
        );
        assert_eq!(
            b"foo=3Dbar".to_vec(),
            transform(&mut QpEncoder::new(), b"foo=bar", 4096)
        );
        assert_eq!(
            b"a=20\r\nb".to_vec(),
            transform(&mut QpEncoder::new(), b"a \r\nb", 4096)
        );
        assert_eq!(
            b"trailing=20".to_vec(),
            transform(&mut QpEncoder::new(), b"trailing ", 4096)
        );
        assert_eq!(
            b"=AB=CD".to_vec(),
            transform(&mut QpEncoder::new(), b"\xab\xcd", 4096)
        );
    }

    #[test]
    fn encode_wraps_long_lines() {
        let out = transform(&mut QpEncoder::new(), &[b'x'; 300], 4096);
        for line in out.split(|&b| b == b'\n') {
            assert!(line.len() <= 77, "line too long: {}", line.len());
        }
        assert_eq!(vec![b'x'; 300], decode(&out, 4096));
    }

    proptest! {
        #[test]
        fn round_trip(
            data in prop::collection::vec(prop::num::u8::ANY, 0..200),
            chunk_size in 1usize..64,
        ) {
            let encoded =
                transform(&mut QpEncoder::new(), &data, chunk_size);
            let decoded = decode(&encoded, chunk_size);
            prop_assert_eq!(data, decoded);
        }

        #[test]
        fn decode_never_panics(
            data in prop::collection::vec(prop::num::u8::ANY, 0..64),
            chunk_size in 1usize..16,
        ) {
            decode(&data, chunk_size);
        }
    }
}
