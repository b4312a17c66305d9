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

use super::Codec;

/// Streaming base64 decoder.
///
/// Bytes outside the base64 alphabet (line endings, whitespace, garbage)
/// are discarded. Decoding happens in whole 4-character groups; up to 3
/// characters are carried between chunks. Anything left over at EOF is
/// undecodable and gets dropped.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    carry: Vec<u8>,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Base64Decoder::default()
    }
}

impl Codec for Base64Decoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/'
                | b'=' => self.carry.push(byte),
                _ => (),
            }
        }

        let usable_length = self.carry.len() / 4 * 4;
        if usable_length > 0 {
            // Group-by-group so an invalid group (e.g. stray padding) can
            // be skipped without losing the groups after it. On error
            // `decode_config_buf` leaves its buffer extension in place, so
            // roll `out` back to drop the junk.
            for group in self.carry[..usable_length].chunks(4) {
                let decoded_to = out.len();
                if base64::decode_config_buf(
                    group,
                    base64::STANDARD,
                    out,
                )
                .is_err()
                {
                    out.truncate(decoded_to);
                    log::trace!("Skipping malformed base64 group");
                }
            }
            self.carry.copy_within(usable_length.., 0);
            self.carry.truncate(self.carry.len() - usable_length);
        }
    }

    fn finish(&mut self, _out: &mut Vec<u8>) {
        if !self.carry.is_empty() {
            log::trace!(
                "Dropping {} undecodable base64 byte(s) at EOF",
                self.carry.len()
            );
            self.carry.clear();
        }
    }
}

const LINE_WIDTH: usize = 76;

/// Streaming base64 encoder, wrapping output lines at 76 characters.
///
/// Carries the `len % 3` remainder and the current output column between
/// chunks.
#[derive(Debug, Default)]
pub struct Base64Encoder {
    carry: Vec<u8>,
    column: usize,
}

impl Base64Encoder {
    pub fn new() -> Self {
        Base64Encoder::default()
    }

    fn emit(&mut self, encoded: &[u8], out: &mut Vec<u8>) {
        for quad in encoded.chunks(4) {
            if self.column >= LINE_WIDTH {
                out.extend_from_slice(b"\r\n");
                self.column = 0;
            }
            out.extend_from_slice(quad);
            self.column += quad.len();
        }
    }
}

impl Codec for Base64Encoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.carry.extend_from_slice(input);

        let usable_length = self.carry.len() / 3 * 3;
        if usable_length > 0 {
            let encoded = base64::encode_config(
                &self.carry[..usable_length],
                base64::STANDARD,
            );
            self.emit(encoded.as_bytes(), out);
            self.carry.copy_within(usable_length.., 0);
            self.carry.truncate(self.carry.len() - usable_length);
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        if !self.carry.is_empty() {
            let encoded =
                base64::encode_config(&self.carry, base64::STANDARD);
            self.emit(encoded.as_bytes(), out);
            self.carry.clear();
        }

        if self.column > 0 {
            out.extend_from_slice(b"\r\n");
            self.column = 0;
        }
    }
}
