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

//! Charset conversion codecs.
//!
//! Both directions are built on `encoding_rs`'s incremental converters,
//! which buffer incomplete multi-byte sequences internally, so output is
//! identical no matter where chunk boundaries fall.

use std::str;

use super::Codec;

/// Converts bytes in a named charset to UTF-8.
pub struct CharsetDecoder {
    decoder: encoding_rs::Decoder,
}

impl CharsetDecoder {
    /// Looks the charset up by its MIME label; `None` if unknown.
    pub fn for_label(label: &[u8]) -> Option<Self> {
        encoding_rs::Encoding::for_label_no_replacement(label).map(
            |encoding| CharsetDecoder {
                decoder: encoding.new_decoder_with_bom_removal(),
            },
        )
    }

    fn decode(&mut self, input: &[u8], last: bool, out: &mut Vec<u8>) {
        let needed = self
            .decoder
            .max_utf8_buffer_length(input.len())
            .unwrap_or(input.len() * 4 + 16);
        let start = out.len();
        out.resize(start + needed, 0);
        let (result, _, written, _) =
            self.decoder.decode_to_utf8(input, &mut out[start..], last);
        debug_assert_eq!(encoding_rs::CoderResult::InputEmpty, result);
        out.truncate(start + written);
    }
}

impl Codec for CharsetDecoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.decode(input, false, out);
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        self.decode(&[], true, out);
    }
}

/// Converts UTF-8 to bytes in a named charset.
///
/// Ill-formed UTF-8 becomes replacement characters; an incomplete sequence
/// at a chunk edge is carried to the next call. Unmappable characters are
/// emitted as numeric character references, `encoding_rs`'s behavior.
pub struct CharsetEncoder {
    encoder: encoding_rs::Encoder,
    carry: Vec<u8>,
}

impl CharsetEncoder {
    pub fn for_label(label: &[u8]) -> Option<Self> {
        encoding_rs::Encoding::for_label_no_replacement(label).map(
            |encoding| CharsetEncoder {
                encoder: encoding.new_encoder(),
                carry: Vec::new(),
            },
        )
    }

    fn encode(&mut self, input: &str, last: bool, out: &mut Vec<u8>) {
        let mut src = input;
        loop {
            let needed = self
                .encoder
                .max_buffer_length_from_utf8_if_no_unmappables(src.len())
                .unwrap_or(src.len() * 4 + 16)
                + 16;
            let start = out.len();
            out.resize(start + needed, 0);
            let (result, nread, written, _) =
                self.encoder.encode_from_utf8(src, &mut out[start..], last);
            out.truncate(start + written);
            src = &src[nread..];

            // OutputFull is possible when unmappable characters expand
            // into character references
            if encoding_rs::CoderResult::InputEmpty == result {
                break;
            }
        }
    }
}

impl Codec for CharsetEncoder {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.carry.extend_from_slice(input);

        let mut start = 0;
        loop {
            match str::from_utf8(&self.carry[start..]) {
                Ok(valid) => {
                    let valid = valid.to_owned();
                    self.encode(&valid, false, out);
                    start = self.carry.len();
                    break;
                },
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    let valid = str::from_utf8(
                        &self.carry[start..start + valid_len],
                    )
                    .expect("valid_up_to lied")
                    .to_owned();
                    self.encode(&valid, false, out);

                    match e.error_len() {
                        Some(bad) => {
                            self.encode("\u{FFFD}", false, out);
                            start += valid_len + bad;
                        },
                        // Incomplete trailing sequence; wait for more input
                        None => {
                            start += valid_len;
                            break;
                        },
                    }
                },
            }
        }

        self.carry.copy_within(start.., 0);
        self.carry.truncate(self.carry.len() - start);
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        if !self.carry.is_empty() {
            log::trace!(
                "Dropping {} bytes of truncated UTF-8 at EOF",
                self.carry.len()
            );
            self.carry.clear();
        }
        self.encode("", true, out);
    }
}
