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

//! Per-part parse state.
//!
//! Parts live in an id-indexed arena owned by one `ParseContext` per
//! message, with parent links as plain ids. This keeps the ancestry that
//! boundary matching walks as explicit data and leaves the proxies free to
//! hold cheap ids instead of borrows.

use crate::mime::bytes::SharedSource;
use crate::mime::header::{read_header_block, HeaderBlock};
use crate::mime::scanner::LineScanner;
use crate::support::error::Error;

/// Maximum nesting depth before new children are refused and their bytes
/// degrade to the enclosing part's content.
const MAX_DEPTH: u32 = 20;
/// Maximum total parts in one message, against hostile input.
const MAX_PARTS: usize = 1000;

pub type PartId = usize;

/// A uuencoded section's metadata, captured from its `begin` sentinel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UuInfo {
    /// File mode as the octal number from the sentinel (`644` parses to
    /// `0o644`).
    pub mode: u32,
    pub filename: String,
}

/// A `begin` sentinel that has been consumed but whose child part has not
/// been opened yet.
#[derive(Clone, Debug)]
pub(crate) struct PendingUu {
    pub start: u64,
    pub mode: u32,
    pub filename: String,
}

/// The parse state of one not-yet-fully-realized part.
#[derive(Debug)]
pub struct PartBuilder {
    parent: Option<PartId>,
    part_start: Option<u64>,
    part_end: Option<u64>,
    content_start: Option<u64>,
    content_end: Option<u64>,
    /// The part's own boundary with the leading `--`, resolved lazily
    /// from Content-Type.
    boundary: Option<Vec<u8>>,
    boundary_resolved: bool,
    /// The part's own terminal boundary was seen.
    pub end_boundary_found: bool,
    /// An ancestor's boundary (or EOF, the implicit outermost boundary)
    /// closed this part.
    pub parent_boundary_found: bool,
    can_have_headers: bool,
    pub headers: HeaderBlock,
    uu_info: Option<UuInfo>,
    pending_uu: Option<PendingUu>,
    pub(crate) children_spawned: u32,
}

impl PartBuilder {
    fn new(parent: Option<PartId>, can_have_headers: bool) -> Self {
        PartBuilder {
            parent,
            part_start: None,
            part_end: None,
            content_start: None,
            content_end: None,
            boundary: None,
            boundary_resolved: false,
            end_boundary_found: false,
            parent_boundary_found: false,
            can_have_headers,
            headers: HeaderBlock::new(),
            uu_info: None,
            pending_uu: None,
            children_spawned: 0,
        }
    }

    pub fn parent(&self) -> Option<PartId> {
        self.parent
    }

    pub fn part_start(&self) -> Option<u64> {
        self.part_start
    }

    pub fn part_end(&self) -> Option<u64> {
        self.part_end
    }

    pub fn content_start(&self) -> Option<u64> {
        self.content_start
    }

    pub fn content_end(&self) -> Option<u64> {
        self.content_end
    }

    pub fn uu_info(&self) -> Option<&UuInfo> {
        self.uu_info.as_ref()
    }

    /// Whether this part may carry headers; false marks a discardable
    /// trailing part spawned only to consume an epilogue.
    pub fn can_have_headers(&self) -> bool {
        self.can_have_headers
    }

    fn close_at(&mut self, end: u64) {
        // A close position can never precede the content start (an empty
        // part closes exactly at it)
        let end = end.max(self.content_start.unwrap_or(end));
        if self.content_end.is_none() {
            self.content_end = Some(end);
        }
        if self.part_end.is_none() {
            self.part_end = Some(end.max(self.content_end.unwrap_or(end)));
        }
    }
}

/// All parse state for one message: the shared source, the line scanner
/// over it, and the part arena.
pub struct ParseContext {
    pub(crate) source: SharedSource,
    pub(crate) scanner: LineScanner,
    parts: Vec<PartBuilder>,
}

impl ParseContext {
    pub fn new(source: SharedSource) -> Self {
        ParseContext {
            scanner: LineScanner::new(source.clone()),
            source,
            parts: Vec::new(),
        }
    }

    pub fn part(&self, id: PartId) -> &PartBuilder {
        &self.parts[id]
    }

    pub(crate) fn part_mut(&mut self, id: PartId) -> &mut PartBuilder {
        &mut self.parts[id]
    }

    /// Opens the top-level part with externally supplied headers; the
    /// whole source is body.
    pub(crate) fn open_root_with_headers(
        &mut self,
        headers: HeaderBlock,
    ) -> PartId {
        debug_assert!(self.parts.is_empty());
        let mut builder = PartBuilder::new(None, true);
        builder.part_start = Some(0);
        builder.content_start = Some(0);
        builder.headers = headers;
        self.parts.push(builder);
        self.parts.len() - 1
    }

    /// Opens a part at `part_start`, reading its header block from the
    /// scanner if `with_headers`.
    ///
    /// For parts created from a uuencode sentinel the sentinel line is
    /// already consumed but belongs to the part, so `part_start` may lie
    /// before the cursor; such parts never read headers.
    pub(crate) fn open_part(
        &mut self,
        parent: Option<PartId>,
        part_start: u64,
        with_headers: bool,
        uu_info: Option<UuInfo>,
    ) -> Result<PartId, Error> {
        let mut builder = PartBuilder::new(parent, with_headers);
        builder.part_start = Some(part_start);
        builder.uu_info = uu_info;

        if with_headers {
            debug_assert_eq!(part_start, self.scanner.pos());
            let (headers, content_start) =
                read_header_block(&mut self.scanner)?;
            builder.headers = headers;
            builder.content_start = Some(content_start);
        } else {
            builder.content_start = Some(part_start);
        }

        self.parts.push(builder);
        let id = self.parts.len() - 1;
        if let Some(parent) = parent {
            self.parts[parent].children_spawned += 1;
        }
        Ok(id)
    }

    pub(crate) fn depth(&self, id: PartId) -> u32 {
        let mut depth = 0;
        let mut cur = self.parts[id].parent;
        while let Some(id) = cur {
            depth += 1;
            cur = self.parts[id].parent;
        }
        depth
    }

    /// Whether a new child of `parent` is within the hostile-input
    /// limits. A refusal silently degrades the child's bytes to parent
    /// content.
    pub(crate) fn may_spawn(&self, parent: PartId) -> bool {
        if self.parts.len() >= MAX_PARTS {
            log::warn!("Part limit reached; treating rest as content");
            return false;
        }
        if self.depth(parent) + 1 >= MAX_DEPTH {
            log::warn!(
                "Nesting limit reached; treating part as opaque content"
            );
            return false;
        }
        true
    }

    /// Resolves the part's boundary from its Content-Type, once; returns
    /// whether it has one.
    pub(crate) fn ensure_boundary(&mut self, id: PartId) -> bool {
        if !self.parts[id].boundary_resolved {
            let boundary =
                self.parts[id].headers.content_type().and_then(|ct| {
                    ct.parm("boundary").map(|b| {
                        let mut owned =
                            Vec::with_capacity(b.len() + 2);
                        owned.extend_from_slice(b"--");
                        owned.extend_from_slice(b);
                        owned
                    })
                });
            let builder = &mut self.parts[id];
            builder.boundary = boundary;
            builder.boundary_resolved = true;
        }
        self.parts[id].boundary.is_some()
    }

    /// The boundaries that can still close a scan of `id`: the part's own
    /// and each ancestor's, innermost first, omitting levels that already
    /// saw their terminal boundary.
    pub(crate) fn live_boundary_stack(
        &mut self,
        id: PartId,
    ) -> Vec<(PartId, Vec<u8>)> {
        let mut stack = Vec::new();
        let mut cur = Some(id);
        while let Some(id) = cur {
            self.ensure_boundary(id);
            let builder = &self.parts[id];
            if !builder.end_boundary_found {
                if let Some(ref boundary) = builder.boundary {
                    stack.push((id, boundary.clone()));
                }
            }
            cur = builder.parent;
        }
        stack
    }

    /// Closes `from` and every ancestor strictly below `owner` at `end`,
    /// marking them terminated-by-ancestor. `None` is EOF, the implicit
    /// boundary owned by nothing, which closes all the way to the root.
    pub(crate) fn close_upward(
        &mut self,
        from: PartId,
        owner: Option<PartId>,
        end: u64,
    ) {
        let mut cur = Some(from);
        while let Some(id) = cur {
            if Some(id) == owner {
                break;
            }
            let builder = &mut self.parts[id];
            builder.close_at(end);
            builder.parent_boundary_found = true;
            cur = builder.parent;
        }
    }

    /// Closes a single part at `end` without touching its ancestors; used
    /// when a sibling sentinel ends a uuencode section.
    pub(crate) fn close_part_at(&mut self, id: PartId, end: u64) {
        self.parts[id].close_at(end);
    }

    pub(crate) fn set_content_end_if_unset(
        &mut self,
        id: PartId,
        end: u64,
    ) {
        let builder = &mut self.parts[id];
        if builder.content_end.is_none() {
            // As in close_at, an end derived from a delimiter terminator
            // can never precede the content start
            let end = end.max(builder.content_start.unwrap_or(end));
            builder.content_end = Some(end);
        }
    }

    pub(crate) fn set_pending_uu(&mut self, id: PartId, pending: PendingUu) {
        self.parts[id].pending_uu = Some(pending);
    }

    pub(crate) fn take_pending_uu(
        &mut self,
        id: PartId,
    ) -> Option<PendingUu> {
        self.parts[id].pending_uu.take()
    }
}
