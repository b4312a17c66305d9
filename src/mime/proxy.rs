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

//! The lazy proxies through which consumers see the part tree.
//!
//! A `PartProxy` defers all parsing until asked: requesting a part's
//! content runs the scanner just far enough to fix the content region;
//! requesting children discovers them one at a time, in stream order.
//! Because every part of a message shares one forward-only cursor, a new
//! child can only be discovered once the previous one is fully drained;
//! the proxy enforces that, and memoizes discovered children so they can
//! be revisited freely afterwards.

use std::cell::{Cell, Ref, RefCell};
use std::io::{Read, Seek};
use std::rc::Rc;

use crate::mime::bytes::{share, RangeReader};
use crate::mime::encoding::{
    Base64Decoder, Chain, CharsetDecoder, CharsetEncoder, CodecReader,
    QpDecoder, UuDecoder,
};
use crate::mime::header::{ContentTransferEncoding, ContentType, HeaderBlock};
use crate::mime::part::{ParseContext, PartId};
use crate::mime::strategy::{ParserStrategy, StrategySet};
use crate::support::error::Error;

/// A lazily parsed part of a message.
pub struct PartProxy {
    ctx: Rc<RefCell<ParseContext>>,
    strategies: Rc<StrategySet>,
    strategy: Rc<dyn ParserStrategy>,
    id: PartId,
    children: RefCell<Vec<Rc<PartProxy>>>,
    popped: Cell<usize>,
    exhausted: Cell<bool>,
}

impl PartProxy {
    fn wrap(
        ctx: Rc<RefCell<ParseContext>>,
        strategies: Rc<StrategySet>,
        id: PartId,
    ) -> Result<Rc<Self>, Error> {
        let strategy = {
            let ctx_ref = ctx.borrow();
            strategies.select(&ctx_ref.part(id).headers)?
        };
        Ok(Rc::new(PartProxy {
            ctx,
            strategies,
            strategy,
            id,
            children: RefCell::new(Vec::new()),
            popped: Cell::new(0),
            exhausted: Cell::new(false),
        }))
    }

    /// The part's headers.
    pub fn headers(&self) -> Ref<HeaderBlock> {
        Ref::map(self.ctx.borrow(), |ctx| &ctx.part(self.id).headers)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.headers().content_type()
    }

    /// The part's filename: the uuencode sentinel's if there was one,
    /// otherwise whatever the headers claim.
    pub fn filename(&self) -> Option<String> {
        let from_uu = self
            .ctx
            .borrow()
            .part(self.id)
            .uu_info()
            .map(|uu| uu.filename.clone());
        from_uu.or_else(|| self.headers().filename())
    }

    /// The octal file mode from a uuencode sentinel, if this part came
    /// from one.
    pub fn uu_mode(&self) -> Option<u32> {
        self.ctx.borrow().part(self.id).uu_info().map(|uu| uu.mode)
    }

    /// Establishes the content region. Idempotent; the first call does
    /// just enough scanning to fix the content end offset.
    pub fn parse_content(&self) -> Result<(), Error> {
        loop {
            if self
                .ctx
                .borrow()
                .part(self.id)
                .content_end()
                .is_some()
            {
                return Ok(());
            }

            if self.exhausted.get() {
                let mut ctx = self.ctx.borrow_mut();
                return self.strategy.finish_content(&mut ctx, self.id);
            }
            self.discover_one()?;
        }
    }

    /// Forces content parsing and full child enumeration for this part
    /// and everything beneath it, fixing the part's raw byte extent.
    pub fn parse_all(&self) -> Result<(), Error> {
        let mut ix = 0;
        while let Some(child) = self.child(ix)? {
            child.parse_all()?;
            ix += 1;
        }

        if self.ctx.borrow().part(self.id).part_end().is_none() {
            let mut ctx = self.ctx.borrow_mut();
            self.strategy.finish_content(&mut ctx, self.id)?;
        }
        Ok(())
    }

    /// Returns the child at `index`, discovering (and draining earlier
    /// children) as needed; `None` past the last child.
    ///
    /// Already-discovered children replay from the memo without touching
    /// the parser.
    pub fn child(
        &self,
        index: usize,
    ) -> Result<Option<Rc<PartProxy>>, Error> {
        while self.children.borrow().len() <= index
            && !self.exhausted.get()
        {
            self.discover_one()?;
        }
        Ok(self.children.borrow().get(index).cloned())
    }

    /// Returns the next not-yet-returned child, `None` once the part's
    /// children are exhausted.
    pub fn pop_next_child(
        &self,
    ) -> Result<Option<Rc<PartProxy>>, Error> {
        let ix = self.popped.get();
        let child = self.child(ix)?;
        if child.is_some() {
            self.popped.set(ix + 1);
        }
        Ok(child)
    }

    /// How many children have been discovered so far.
    pub fn children_discovered(&self) -> usize {
        self.children.borrow().len()
    }

    /// Iterates over all children from the first, replaying the memoized
    /// prefix and discovering past it.
    pub fn children(&self) -> ChildIter {
        ChildIter {
            parent: self,
            next: 0,
        }
    }

    fn discover_one(&self) -> Result<(), Error> {
        debug_assert!(!self.exhausted.get());

        // Drain-before-advance: the cursor must be past the previous
        // child before a new one can begin
        let last = self.children.borrow().last().cloned();
        if let Some(last) = last {
            last.parse_all()?;
        }

        let next = {
            let mut ctx = self.ctx.borrow_mut();
            self.strategy.next_child(&mut ctx, self.id)?
        };
        match next {
            Some(child_id) => {
                let proxy = PartProxy::wrap(
                    Rc::clone(&self.ctx),
                    Rc::clone(&self.strategies),
                    child_id,
                )?;
                self.children.borrow_mut().push(proxy);
            },
            None => self.exhausted.set(true),
        }
        Ok(())
    }

    /// The part's full extent (headers and content) as (offset, length).
    pub fn part_range(&self) -> Result<(u64, u64), Error> {
        self.parse_all()?;
        let ctx = self.ctx.borrow();
        let builder = ctx.part(self.id);
        let start = builder
            .part_start()
            .expect("part start fixed at creation");
        let end = builder.part_end().expect("part end fixed by parse_all");
        Ok((start, end - start))
    }

    /// The content region as (offset, length).
    pub fn content_range(&self) -> Result<(u64, u64), Error> {
        self.parse_content()?;
        let ctx = self.ctx.borrow();
        let builder = ctx.part(self.id);
        let start = builder
            .content_start()
            .expect("content start fixed at creation");
        let end = builder
            .content_end()
            .expect("content end fixed by parse_content");
        Ok((start, end - start))
    }

    pub fn has_content(&self) -> Result<bool, Error> {
        let (_, len) = self.content_range()?;
        Ok(len > 0)
    }

    /// The content region, undecoded.
    pub fn raw_stream(&self) -> Result<RangeReader, Error> {
        let (start, len) = self.content_range()?;
        Ok(RangeReader::new(
            self.ctx.borrow().source.clone(),
            start,
            len,
        ))
    }

    /// The whole part (headers included), undecoded.
    pub fn part_stream(&self) -> Result<RangeReader, Error> {
        let (start, len) = self.part_range()?;
        Ok(RangeReader::new(
            self.ctx.borrow().source.clone(),
            start,
            len,
        ))
    }

    /// The content decoded per the part's own headers: the declared
    /// transfer encoding, and charset conversion to UTF-8 for `text/*`
    /// parts with a known charset.
    pub fn content_stream(
        &self,
    ) -> Result<CodecReader<RangeReader>, Error> {
        let (cte, from_charset) = {
            let ctx = self.ctx.borrow();
            let builder = ctx.part(self.id);
            let cte = if builder.uu_info().is_some() {
                ContentTransferEncoding::XUuencode
            } else {
                builder.headers.content_transfer_encoding()
            };
            let from_charset = builder
                .headers
                .content_type()
                .filter(|ct| ct.is_type("text"))
                .and_then(|ct| ct.parm("charset").map(|c| c.to_vec()));
            (cte, from_charset)
        };
        self.content_stream_with(
            Some(cte),
            from_charset.as_deref(),
            None,
        )
    }

    /// The content decoded with explicit parameters, each overriding the
    /// part's headers: the transfer encoding (`None` for identity), the
    /// source charset, and the target charset (`None` for UTF-8).
    pub fn content_stream_with(
        &self,
        cte: Option<ContentTransferEncoding>,
        from_charset: Option<&[u8]>,
        to_charset: Option<&[u8]>,
    ) -> Result<CodecReader<RangeReader>, Error> {
        let mut chain = Chain::new();

        match cte {
            Some(ContentTransferEncoding::Base64) => {
                chain.add(Box::new(Base64Decoder::new()))
            },
            Some(ContentTransferEncoding::QuotedPrintable) => {
                chain.add(Box::new(QpDecoder::new()))
            },
            Some(ContentTransferEncoding::XUuencode) => {
                chain.add(Box::new(UuDecoder::new()))
            },
            _ => (),
        }

        if let Some(label) = from_charset {
            if !label.eq_ignore_ascii_case(b"utf-8") {
                match CharsetDecoder::for_label(label) {
                    Some(decoder) => chain.add(Box::new(decoder)),
                    None => log::trace!(
                        "Unknown charset {:?}; leaving content as-is",
                        String::from_utf8_lossy(label)
                    ),
                }
            }
        }

        if let Some(label) = to_charset {
            if !label.eq_ignore_ascii_case(b"utf-8") {
                match CharsetEncoder::for_label(label) {
                    Some(encoder) => chain.add(Box::new(encoder)),
                    None => log::trace!(
                        "Unknown target charset {:?}; leaving as UTF-8",
                        String::from_utf8_lossy(label)
                    ),
                }
            }
        }

        Ok(CodecReader::new(self.raw_stream()?, chain))
    }
}

/// Iterator over a part's children; see `PartProxy::children`.
pub struct ChildIter<'a> {
    parent: &'a PartProxy,
    next: usize,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = Result<Rc<PartProxy>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.parent.child(self.next) {
            Ok(Some(child)) => {
                self.next += 1;
                Some(Ok(child))
            },
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// A message being parsed: owns the source and the root part.
pub struct Message {
    root: Rc<PartProxy>,
}

impl Message {
    /// Parses a full message: header block, then body.
    pub fn parse(
        source: impl Read + Seek + 'static,
    ) -> Result<Self, Error> {
        Self::parse_with_strategies(source, StrategySet::default())
    }

    pub fn parse_with_strategies(
        source: impl Read + Seek + 'static,
        strategies: StrategySet,
    ) -> Result<Self, Error> {
        let mut ctx = ParseContext::new(share(source));
        let root = ctx.open_part(None, 0, true, None)?;
        Self::assemble(ctx, root, strategies)
    }

    /// Parses a bare body whose headers were obtained elsewhere.
    pub fn parse_body(
        source: impl Read + Seek + 'static,
        headers: HeaderBlock,
    ) -> Result<Self, Error> {
        Self::parse_body_with_strategies(
            source,
            headers,
            StrategySet::default(),
        )
    }

    pub fn parse_body_with_strategies(
        source: impl Read + Seek + 'static,
        headers: HeaderBlock,
        strategies: StrategySet,
    ) -> Result<Self, Error> {
        let mut ctx = ParseContext::new(share(source));
        let root = ctx.open_root_with_headers(headers);
        Self::assemble(ctx, root, strategies)
    }

    fn assemble(
        ctx: ParseContext,
        root: PartId,
        strategies: StrategySet,
    ) -> Result<Self, Error> {
        let root = PartProxy::wrap(
            Rc::new(RefCell::new(ctx)),
            Rc::new(strategies),
            root,
        )?;
        Ok(Message { root })
    }

    pub fn root(&self) -> &Rc<PartProxy> {
        &self.root
    }
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Read, Write};

    use super::*;

    fn multipart_headers(boundary: &str) -> HeaderBlock {
        let mut headers = HeaderBlock::new();
        headers.add(
            "Content-Type",
            format!("multipart/mixed; boundary={}", boundary).as_bytes(),
        );
        headers
    }

    fn parse_body(data: &[u8], headers: HeaderBlock) -> Message {
        Message::parse_body(Cursor::new(data.to_vec()), headers).unwrap()
    }

    fn read_to_vec(mut reader: impl Read) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    fn content(part: &PartProxy) -> Vec<u8> {
        read_to_vec(part.content_stream().unwrap())
    }

    #[test]
    fn two_part_multipart_body() {
        let msg = parse_body(
            b"--B\r\nA\r\n--B\r\nC\r\n--B--\r\n",
            multipart_headers("B"),
        );
        let root = msg.root();

        let first = root.pop_next_child().unwrap().unwrap();
        assert_eq!(b"A".to_vec(), content(&first));
        let second = root.pop_next_child().unwrap().unwrap();
        assert_eq!(b"C".to_vec(), content(&second));
        assert!(root.pop_next_child().unwrap().is_none());

        // Boundary containment: content ends before the boundary line
        // and excludes the preceding CRLF
        assert_eq!((5, 1), first.content_range().unwrap());
        assert_eq!((13, 1), second.content_range().unwrap());
        assert_eq!((0, 23), root.part_range().unwrap());
        // No preamble, so the multipart's own content is empty
        assert_eq!((0, 0), root.content_range().unwrap());
    }

    #[test]
    fn multipart_content_is_the_preamble() {
        let msg = parse_body(
            b"pre\r\n--B\r\nA\r\n--B--\r\n",
            multipart_headers("B"),
        );
        let root = msg.root();

        assert_eq!((0, 3), root.content_range().unwrap());
        assert_eq!(
            b"pre".to_vec(),
            read_to_vec(root.raw_stream().unwrap())
        );
        assert!(root.has_content().unwrap());

        let child = root.pop_next_child().unwrap().unwrap();
        assert_eq!(b"A".to_vec(), content(&child));
        assert!(root.pop_next_child().unwrap().is_none());
        assert_eq!((0, 20), root.part_range().unwrap());
    }

    #[test]
    fn full_message_with_preamble_and_epilogue() {
        let msg = Message::parse(Cursor::new(
            b"Mime-Version: 1.0\r\n\
              Content-Type: multipart/alternative; boundary=\"b o\"\r\n\
              \r\n\
              preamble\r\n\
              --b o\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              hello\r\n\
              --b o--\r\n\
              epilogue\r\n"
                .to_vec(),
        ))
        .unwrap();
        let root = msg.root();

        let child = root.pop_next_child().unwrap().unwrap();
        assert!(child.content_type().unwrap().is_type("text"));
        assert_eq!(b"hello".to_vec(), content(&child));
        assert!(root.pop_next_child().unwrap().is_none());

        // The epilogue belongs to the root's raw extent
        let (start, len) = root.part_range().unwrap();
        assert_eq!(0, start);
        let total = 17 + 2 + 51 + 2 + 2 + 10 + 7 + 26 + 2 + 7 + 9 + 10;
        assert_eq!(total, len);
    }

    #[test]
    fn nested_multiparts_with_ancestor_close() {
        let msg = parse_body(
            b"--out\r\n\
              Content-Type: multipart/digest; boundary=in\r\n\
              \r\n\
              --in\r\n\
              \r\n\
              1\r\n\
              --in\r\n\
              \r\n\
              2\r\n\
              --in--\r\n\
              inner epilogue\r\n\
              --out\r\n\
              \r\n\
              tail\r\n\
              --out--\r\n",
            multipart_headers("out"),
        );
        let root = msg.root();

        let inner = root.pop_next_child().unwrap().unwrap();
        assert!(inner.content_type().unwrap().is_type("multipart"));
        let a = inner.pop_next_child().unwrap().unwrap();
        assert_eq!(b"1".to_vec(), content(&a));
        let b = inner.pop_next_child().unwrap().unwrap();
        assert_eq!(b"2".to_vec(), content(&b));
        assert!(inner.pop_next_child().unwrap().is_none());

        let tail = root.pop_next_child().unwrap().unwrap();
        assert_eq!(b"tail".to_vec(), content(&tail));
        assert!(root.pop_next_child().unwrap().is_none());

        // Offset monotonicity: each parent encloses its descendants
        let (root_start, root_len) = root.part_range().unwrap();
        let (inner_start, inner_len) = inner.part_range().unwrap();
        let (a_start, a_len) = a.part_range().unwrap();
        assert!(root_start <= inner_start);
        assert!(inner_start <= a_start);
        assert!(a_start + a_len <= inner_start + inner_len);
        assert!(inner_start + inner_len <= root_start + root_len);
    }

    #[test]
    fn inner_multipart_closed_by_outer_boundary() {
        // The inner multipart never sees its own terminal boundary; the
        // outer boundary closes it and its open child in one step
        let msg = parse_body(
            b"--out\r\n\
              Content-Type: multipart/mixed; boundary=in\r\n\
              \r\n\
              --in\r\n\
              \r\n\
              orphan\r\n\
              --out--\r\n",
            multipart_headers("out"),
        );
        let root = msg.root();

        let inner = root.pop_next_child().unwrap().unwrap();
        let orphan = inner.pop_next_child().unwrap().unwrap();
        assert_eq!(b"orphan".to_vec(), content(&orphan));
        assert!(inner.pop_next_child().unwrap().is_none());
        assert!(root.pop_next_child().unwrap().is_none());

        let (o_start, o_len) = orphan.content_range().unwrap();
        let (i_start, i_len) = inner.part_range().unwrap();
        assert!(o_start + o_len <= i_start + i_len);
    }

    #[test]
    fn unterminated_multipart_closes_at_eof() {
        let msg = parse_body(b"--B\r\nX", multipart_headers("B"));
        let root = msg.root();

        let child = root.pop_next_child().unwrap().unwrap();
        assert_eq!(b"X".to_vec(), content(&child));
        assert!(root.pop_next_child().unwrap().is_none());
        assert_eq!((0, 6), root.part_range().unwrap());
    }

    #[test]
    fn empty_multipart_terminal_only() {
        let msg =
            parse_body(b"--B--\r\ntrailing\r\n", multipart_headers("B"));
        let root = msg.root();
        assert!(root.pop_next_child().unwrap().is_none());
        assert_eq!((0, 17), root.part_range().unwrap());
    }

    #[test]
    fn children_replay_from_memo() {
        let msg = parse_body(
            b"--B\r\nA\r\n--B\r\nC\r\n--B--\r\n",
            multipart_headers("B"),
        );
        let root = msg.root();
        root.parse_all().unwrap();
        assert_eq!(2, root.children_discovered());

        // Replaying yields the same proxies with the same regions
        let first = root.child(0).unwrap().unwrap();
        let again = root.child(0).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(b"A".to_vec(), content(&first));
        assert_eq!(b"A".to_vec(), content(&first));
        assert!(root.child(2).unwrap().is_none());

        let texts = root
            .children()
            .map(|c| content(&c.unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(vec![b"A".to_vec(), b"C".to_vec()], texts);
    }

    #[test]
    fn sequential_access_does_not_disturb_earlier_children() {
        let msg = parse_body(
            b"--B\r\nA\r\n--B\r\nC\r\n--B--\r\n",
            multipart_headers("B"),
        );
        let root = msg.root();

        // Ask for the second child before touching the first's content;
        // draining happens internally and the first child's bytes must
        // be intact afterwards
        let first = root.child(0).unwrap().unwrap();
        let second = root.child(1).unwrap().unwrap();
        assert_eq!(b"C".to_vec(), content(&second));
        assert_eq!(b"A".to_vec(), content(&first));
    }

    #[test]
    fn decoded_content_streams() {
        let msg = parse_body(
            b"--B\r\n\
              Content-Type: text/plain; charset=iso-8859-1\r\n\
              Content-Transfer-Encoding: base64\r\n\
              \r\n\
              5mJsZQ==\r\n\
              --B\r\n\
              Content-Transfer-Encoding: quoted-printable\r\n\
              \r\n\
              line1=\r\n\
              line2\r\n\
              --B--\r\n",
            multipart_headers("B"),
        );
        let root = msg.root();

        let b64 = root.pop_next_child().unwrap().unwrap();
        // 0xE6 'ble' in latin-1, transfer-decoded then charset-decoded
        assert_eq!("\u{e6}ble".as_bytes().to_vec(), content(&b64));
        assert_eq!(b"5mJsZQ==".to_vec(), read_to_vec(b64.raw_stream().unwrap()));

        let qp = root.pop_next_child().unwrap().unwrap();
        assert_eq!(b"line1line2".to_vec(), content(&qp));
    }

    #[test]
    fn uuencode_transfer_encoding_alias() {
        let msg = parse_body(
            b"--B\r\n\
              Content-Type: application/octet-stream\r\n\
              Content-Transfer-Encoding: uue\r\n\
              \r\n\
              begin 644 cat.bin\r\n\
              #0V%T\r\n\
              `\r\n\
              end\r\n\
              --B--\r\n",
            multipart_headers("B"),
        );
        let child = msg.root().pop_next_child().unwrap().unwrap();
        assert_eq!(
            ContentTransferEncoding::XUuencode,
            child.headers().content_transfer_encoding()
        );
        assert_eq!(b"Cat".to_vec(), content(&child));
    }

    #[test]
    fn non_mime_single_uu_section() {
        let msg = parse_body(
            b"begin 644 a.txt\r\n#0V%T\r\n`\r\nend\r\n",
            HeaderBlock::new(),
        );
        let root = msg.root();

        let child = root.pop_next_child().unwrap().unwrap();
        assert_eq!(Some("a.txt".to_owned()), child.filename());
        assert_eq!(Some(0o644), child.uu_mode());
        assert_eq!(b"Cat".to_vec(), content(&child));
        assert!(root.pop_next_child().unwrap().is_none());

        // The sentinel line itself belongs to the child
        assert_eq!((0, 32), child.part_range().unwrap());
        assert!(!root.has_content().unwrap());
    }

    #[test]
    fn non_mime_text_around_uu_sections() {
        let msg = parse_body(
            b"hello\r\n\
              begin 644 a.txt\r\n\
              #0V%T\r\n\
              `\r\n\
              end\r\n\
              begin 755 b.txt\r\n\
              #0V%T\r\n\
              `\r\n\
              end\r\n",
            HeaderBlock::new(),
        );
        let root = msg.root();

        let a = root.pop_next_child().unwrap().unwrap();
        let b = root.pop_next_child().unwrap().unwrap();
        assert!(root.pop_next_child().unwrap().is_none());

        assert_eq!(Some("a.txt".to_owned()), a.filename());
        assert_eq!(Some("b.txt".to_owned()), b.filename());
        assert_eq!(Some(0o755), b.uu_mode());
        assert_eq!(b"Cat".to_vec(), content(&a));
        assert_eq!(b"Cat".to_vec(), content(&b));

        // Leading free text is the root's own content
        assert_eq!((0, 7), root.content_range().unwrap());
        assert_eq!(
            b"hello\r\n".to_vec(),
            read_to_vec(root.raw_stream().unwrap())
        );

        let (a_start, _) = a.part_range().unwrap();
        assert_eq!(7, a_start);
    }

    #[test]
    fn non_mime_without_sentinels_is_all_content() {
        let msg =
            parse_body(b"just\r\nsome\r\ntext\r\n", HeaderBlock::new());
        let root = msg.root();
        assert!(root.pop_next_child().unwrap().is_none());
        assert_eq!(
            b"just\r\nsome\r\ntext\r\n".to_vec(),
            read_to_vec(root.raw_stream().unwrap())
        );
    }

    #[test]
    fn uu_section_inside_multipart_child() {
        // A headerless child of a multipart falls to the catch-all
        // strategy; an ancestor MIME boundary still closes its sections
        let msg = parse_body(
            b"--B\r\n\
              \r\n\
              begin 644 inner.txt\r\n\
              #0V%T\r\n\
              `\r\n\
              end\r\n\
              --B--\r\n",
            multipart_headers("B"),
        );
        let child = msg.root().pop_next_child().unwrap().unwrap();
        let section = child.pop_next_child().unwrap().unwrap();
        assert_eq!(Some("inner.txt".to_owned()), section.filename());
        assert_eq!(b"Cat".to_vec(), content(&section));
        assert!(child.pop_next_child().unwrap().is_none());
        assert!(msg.root().pop_next_child().unwrap().is_none());
    }

    #[test]
    fn embedded_rfc822_message() {
        let msg = parse_body(
            b"--B\r\n\
              Content-Type: message/rfc822\r\n\
              \r\n\
              Subject: inner\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              body\r\n\
              --B--\r\n",
            multipart_headers("B"),
        );
        let envelope = msg.root().pop_next_child().unwrap().unwrap();
        assert!(envelope.content_type().unwrap().is_type("message"));

        let inner = envelope.pop_next_child().unwrap().unwrap();
        assert_eq!(Some(&b"inner"[..]), inner.headers().get("subject"));
        assert_eq!(b"body".to_vec(), content(&inner));
        assert!(envelope.pop_next_child().unwrap().is_none());
    }

    #[test]
    fn content_stream_with_explicit_target_charset() {
        let msg = parse_body(
            b"--B\r\n\
              Content-Type: text/plain; charset=utf-8\r\n\
              \r\n\
              \xc3\xa6ble\r\n\
              --B--\r\n",
            multipart_headers("B"),
        );
        let child = msg.root().pop_next_child().unwrap().unwrap();
        let converted = read_to_vec(
            child
                .content_stream_with(
                    None,
                    Some(b"utf-8"),
                    Some(b"iso-8859-1"),
                )
                .unwrap(),
        );
        assert_eq!(b"\xe6ble".to_vec(), converted);
    }

    #[test]
    fn file_backed_source() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"--B\r\nA\r\n--B\r\nC\r\n--B--\r\n")
            .unwrap();

        let msg =
            Message::parse_body(file, multipart_headers("B")).unwrap();
        let root = msg.root();
        let first = root.pop_next_child().unwrap().unwrap();
        let second = root.pop_next_child().unwrap().unwrap();
        assert_eq!(b"A".to_vec(), content(&first));
        assert_eq!(b"C".to_vec(), content(&second));
    }

    #[test]
    fn oversized_boundary_like_line_is_content() {
        // A line that would match the boundary but exceeds the line cap
        // is truncated and must not match
        let mut data = b"--B\r\n".to_vec();
        let mut long = b"--B".to_vec();
        long.extend(vec![b'x'; crate::mime::scanner::MAX_LINE * 2]);
        data.extend_from_slice(&long);
        data.extend_from_slice(b"\r\nshort\r\n--B--\r\n");

        let msg = parse_body(&data, multipart_headers("B"));
        let child = msg.root().pop_next_child().unwrap().unwrap();
        let got = content(&child);
        assert!(got.ends_with(b"short"));
        assert_eq!(long.len() + 2 + 5, got.len());
        assert!(msg.root().pop_next_child().unwrap().is_none());
    }
}
