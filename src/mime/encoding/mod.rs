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

//! Content-transfer-encoding and charset codecs.
//!
//! Every codec is a stateful chunk transform: input may be split at
//! arbitrary points across `push` calls and the concatenated output is the
//! same regardless of the splits. Codecs never fail; undecodable input is
//! passed through or dropped according to each codec's tolerance rules.

pub mod base64;
pub mod charset;
pub mod quoted_printable;
pub mod uu;

use std::io::{self, Read};

pub use self::base64::{Base64Decoder, Base64Encoder};
pub use self::charset::{CharsetDecoder, CharsetEncoder};
pub use self::quoted_printable::{QpDecoder, QpEncoder};
pub use self::uu::{UuDecoder, UuEncoder};

/// A stateful, infallible byte-stream transform.
pub trait Codec {
    /// Transforms `input`, appending output to `out`.
    ///
    /// Bytes which cannot be transformed yet (e.g. a partial base64 group)
    /// are carried inside the codec until the next call.
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>);

    /// Signals end of input, flushing whatever the codec can still produce.
    fn finish(&mut self, out: &mut Vec<u8>);
}

/// A sequence of codecs applied in order.
///
/// An empty chain is the identity transform.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Codec>>,
}

impl Chain {
    pub fn new() -> Self {
        Chain::default()
    }

    pub fn add(&mut self, stage: Box<dyn Codec>) {
        self.stages.push(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Codec for Chain {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        match self.stages.len() {
            0 => out.extend_from_slice(input),
            1 => self.stages[0].push(input, out),
            _ => {
                let last = self.stages.len() - 1;
                let mut cur = Vec::new();
                self.stages[0].push(input, &mut cur);
                for stage in &mut self.stages[1..last] {
                    let mut next = Vec::new();
                    stage.push(&cur, &mut next);
                    cur = next;
                }
                self.stages[last].push(&cur, out);
            },
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        // Flushing stage i can produce output that still needs to pass
        // through stages i+1.., before those flush their own state.
        for i in 0..self.stages.len() {
            let mut cur = Vec::new();
            self.stages[i].finish(&mut cur);
            for stage in &mut self.stages[i + 1..] {
                let mut next = Vec::new();
                stage.push(&cur, &mut next);
                cur = next;
            }
            out.extend_from_slice(&cur);
        }
    }
}

const READ_CHUNK: usize = 4096;

/// Adapts a push-style codec (chain) into a `Read`.
///
/// This is what `PartProxy::content_stream` hands back: the raw byte-range
/// view wrapped by the part's transfer-encoding and charset codecs.
pub struct CodecReader<R> {
    inner: R,
    codec: Chain,
    pending: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> CodecReader<R> {
    pub fn new(inner: R, codec: Chain) -> Self {
        CodecReader {
            inner,
            codec,
            pending: Vec::new(),
            pos: 0,
            finished: false,
        }
    }
}

impl<R: Read> Read for CodecReader<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.pending.len() {
                let n = dst.len().min(self.pending.len() - self.pos);
                dst[..n]
                    .copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            if self.finished {
                return Ok(0);
            }

            self.pending.clear();
            self.pos = 0;

            let mut chunk = [0u8; READ_CHUNK];
            let nread = self.inner.read(&mut chunk)?;
            if 0 == nread {
                self.codec.finish(&mut self.pending);
                self.finished = true;
            } else {
                self.codec.push(&chunk[..nread], &mut self.pending);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Run `input` through `codec` in chunks of `chunk_size`.
    pub fn transform(
        codec: &mut dyn Codec,
        input: &[u8],
        chunk_size: usize,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in input.chunks(chunk_size.max(1)) {
            codec.push(chunk, &mut out);
        }
        codec.finish(&mut out);
        out
    }

    /// Assert that the transform is insensitive to how the input is split.
    pub fn assert_chunk_invariant<F: Fn() -> Box<dyn Codec>>(
        make: F,
        input: &[u8],
    ) -> Vec<u8> {
        let baseline = transform(&mut *make(), input, 4096);
        for &size in &[1usize, 3, 7] {
            assert_eq!(
                baseline,
                transform(&mut *make(), input, size),
                "output changed with chunk size {}",
                size
            );
        }
        baseline
    }
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use super::*;

    #[test]
    fn empty_chain_is_identity() {
        let mut reader = CodecReader::new(&b"hello"[..], Chain::new());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(b"hello".to_vec(), out);
    }

    #[test]
    fn chained_decode_through_reader() {
        // base64("line1=\r\nline2" as QP) -> chained b64 + QP decode
        let qp = b"bGluZTE9DQpsaW5lMg==";
        let mut chain = Chain::new();
        chain.add(Box::new(Base64Decoder::new()));
        chain.add(Box::new(QpDecoder::new()));

        let mut reader = CodecReader::new(&qp[..], chain);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(b"line1line2".to_vec(), out);
    }

    #[test]
    fn reader_with_tiny_destination_buffer() {
        let mut chain = Chain::new();
        chain.add(Box::new(Base64Decoder::new()));
        let mut reader = CodecReader::new(&b"dGVzdA=="[..], chain);

        let mut out = Vec::new();
        let mut buf = [0u8; 1];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if 0 == n {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(b"test".to_vec(), out);
    }
}
