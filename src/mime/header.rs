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

//! Header storage and the few header values the parser itself consumes.
//!
//! This is deliberately not a header grammar: values are kept as raw bytes
//! and only Content-Type (with its parameters), Content-Transfer-Encoding,
//! and the Content-Disposition filename get ad-hoc, tolerant parsing.
//! Structured interpretation of anything else is the business of whatever
//! sits on top of the parse tree.

use crate::mime::scanner::LineScanner;
use crate::support::error::Error;

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|ix| ix + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

/// The headers of one part: an ordered multimap of raw name/value pairs.
#[derive(Clone, Debug, Default)]
pub struct HeaderBlock {
    headers: Vec<(String, Vec<u8>)>,
}

impl HeaderBlock {
    pub fn new() -> Self {
        HeaderBlock::default()
    }

    pub fn add(&mut self, name: &str, value: &[u8]) {
        self.headers.push((name.to_owned(), trim(value).to_vec()));
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the first value of the named header (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| &v[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.headers.iter().map(|(n, v)| (&n[..], &v[..]))
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.get("Content-Type").and_then(parse_content_type)
    }

    /// The part's declared transfer encoding, defaulting to 7bit when
    /// absent or unintelligible.
    pub fn content_transfer_encoding(&self) -> ContentTransferEncoding {
        match self.get("Content-Transfer-Encoding") {
            None => ContentTransferEncoding::SevenBit,
            Some(value) => parse_content_transfer_encoding(value)
                .unwrap_or_else(|| {
                    log::trace!(
                        "Unknown Content-Transfer-Encoding {:?}; \
                         treating as identity",
                        String::from_utf8_lossy(value)
                    );
                    ContentTransferEncoding::SevenBit
                }),
        }
    }

    /// The filename from Content-Disposition, falling back to the
    /// Content-Type `name` parameter.
    pub fn filename(&self) -> Option<String> {
        self.get("Content-Disposition")
            .and_then(|v| parse_parm(v, "filename"))
            .or_else(|| {
                self.content_type()
                    .and_then(|ct| ct.parm("name").map(|v| v.to_vec()))
            })
            .map(|v| String::from_utf8_lossy(&v).into_owned())
    }
}

/// A parsed Content-Type value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType {
    pub typ: Vec<u8>,
    pub subtype: Vec<u8>,
    parms: Vec<(Vec<u8>, Vec<u8>)>,
}

impl ContentType {
    pub fn is_type(&self, typ: &str) -> bool {
        self.typ.eq_ignore_ascii_case(typ.as_bytes())
    }

    pub fn is_subtype(&self, subtype: &str) -> bool {
        self.subtype.eq_ignore_ascii_case(subtype.as_bytes())
    }

    pub fn parm(&self, name: &str) -> Option<&[u8]> {
        self.parms
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
            .map(|(_, v)| &v[..])
    }
}

/// Parses a Content-Type value tolerantly.
///
/// Returns `None` only if there is no recognizable type token at all.
pub fn parse_content_type(value: &[u8]) -> Option<ContentType> {
    let mut sections = value.split(|&b| b';' == b);
    let head = sections.next()?;

    let mut type_parts = head.splitn(2, |&b| b'/' == b);
    let typ = trim(type_parts.next()?);
    let subtype = type_parts.next().map(trim).unwrap_or(b"");
    if typ.is_empty() {
        return None;
    }

    let mut parms = Vec::new();
    for section in sections {
        let mut halves = section.splitn(2, |&b| b'=' == b);
        let name = trim(halves.next().expect("splitn yields at least one"));
        let raw = match halves.next() {
            Some(raw) => trim(raw),
            None => continue,
        };
        if name.is_empty() {
            continue;
        }
        parms.push((name.to_ascii_lowercase(), unquote(raw)));
    }

    Some(ContentType {
        typ: typ.to_vec(),
        subtype: subtype.to_vec(),
        parms,
    })
}

fn unquote(raw: &[u8]) -> Vec<u8> {
    if raw.first() != Some(&b'"') {
        return raw.to_vec();
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw[1..].iter();
    while let Some(&b) = bytes.next() {
        match b {
            b'"' => break,
            b'\\' => {
                if let Some(&escaped) = bytes.next() {
                    out.push(escaped);
                }
            },
            _ => out.push(b),
        }
    }
    out
}

fn parse_parm(value: &[u8], name: &str) -> Option<Vec<u8>> {
    for section in value.split(|&b| b';' == b) {
        let mut halves = section.splitn(2, |&b| b'=' == b);
        let n = trim(halves.next().expect("splitn yields at least one"));
        if let Some(raw) = halves.next() {
            if n.eq_ignore_ascii_case(name.as_bytes()) {
                return Some(unquote(trim(raw)));
            }
        }
    }
    None
}

/// The transfer encodings the decoder pipeline understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentTransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
    XUuencode,
}

impl Default for ContentTransferEncoding {
    fn default() -> Self {
        ContentTransferEncoding::SevenBit
    }
}

impl ContentTransferEncoding {
    /// Whether this encoding passes the wire bytes through unchanged.
    pub fn is_identity(self) -> bool {
        matches!(
            self,
            ContentTransferEncoding::SevenBit
                | ContentTransferEncoding::EightBit
                | ContentTransferEncoding::Binary
        )
    }
}

/// Parses a Content-Transfer-Encoding value.
///
/// The historic uuencode aliases `uue`, `x-uue`, and `uuencode` all
/// normalize to `x-uuencode`.
pub fn parse_content_transfer_encoding(
    value: &[u8],
) -> Option<ContentTransferEncoding> {
    match trim(value).to_ascii_lowercase().as_slice() {
        b"7bit" => Some(ContentTransferEncoding::SevenBit),
        b"8bit" => Some(ContentTransferEncoding::EightBit),
        b"binary" => Some(ContentTransferEncoding::Binary),
        b"quoted-printable" => {
            Some(ContentTransferEncoding::QuotedPrintable)
        },
        b"base64" => Some(ContentTransferEncoding::Base64),
        b"x-uuencode" | b"x-uue" | b"uue" | b"uuencode" => {
            Some(ContentTransferEncoding::XUuencode)
        },
        _ => None,
    }
}

/// Reads an RFC 822-style header block from the scanner's current
/// position, unfolding continuation lines.
///
/// Returns the block and the content start offset. The block ends at a
/// blank line (consumed) or at the first line that cannot be a header,
/// which is left unconsumed — tolerance for body-only inputs and for
/// multipart children that jump straight into content.
pub(crate) fn read_header_block(
    scanner: &mut LineScanner,
) -> Result<(HeaderBlock, u64), Error> {
    let mut block = HeaderBlock::new();
    let mut buffered: Vec<u8> = Vec::new();

    let content_start = loop {
        if !scanner.next_line()? {
            break scanner.pos();
        }

        let start = scanner.line().start;
        let text = scanner.line().text.clone();

        if text.is_empty() {
            break scanner.pos();
        }

        if b' ' == text[0] || b'\t' == text[0] {
            if buffered.is_empty() {
                // Leading whitespace with nothing to continue: content
                scanner.rewind_to(start);
                break start;
            }
            buffered.extend_from_slice(&text);
        } else if memchr::memchr(b':', &text).is_some() {
            flush_header(&mut block, &buffered);
            buffered = text;
        } else {
            // Not a header line; the body starts here
            scanner.rewind_to(start);
            break start;
        }
    };

    flush_header(&mut block, &buffered);
    Ok((block, content_start))
}

fn flush_header(block: &mut HeaderBlock, raw: &[u8]) {
    if raw.is_empty() {
        return;
    }

    let mut halves = raw.splitn(2, |&b| b':' == b);
    let name = halves.next().expect("splitn yields at least one");
    let value = match halves.next() {
        Some(value) => value,
        None => return,
    };

    match std::str::from_utf8(trim(name)) {
        Ok(name) if !name.is_empty() => block.add(name, value),
        _ => log::trace!("Skipping header with malformed name"),
    }
}
