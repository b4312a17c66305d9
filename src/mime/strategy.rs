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

//! Parser strategies: the per-part algorithms that know how to discover a
//! part's children and establish its content region.
//!
//! A strategy is selected per part, from a priority list, by the first
//! `applies` predicate that accepts the part's headers. The list is an
//! explicit value carried through the parse — callers may prepend their
//! own strategies in front of the built-in ones, and there is no global
//! registry.

use std::fmt;
use std::rc::Rc;

use crate::mime::header::HeaderBlock;
use crate::mime::part::{ParseContext, PartId, PendingUu, UuInfo};
use crate::mime::scanner::{ScanOutcome, SentinelOutcome};
use crate::support::error::Error;

/// One algorithm for growing a part.
///
/// Both operations leave the shared cursor positioned for whatever comes
/// next, and record everything they learn (offsets, termination flags) on
/// the part builders, so they are driven entirely through the context.
pub trait ParserStrategy: fmt::Debug {
    /// Whether this strategy can parse a part with these headers.
    fn applies(&self, headers: &HeaderBlock) -> bool;

    /// Discovers the next child of `id`, assuming all previous children
    /// are fully drained. `None` once the part can have no further
    /// children.
    fn next_child(
        &self,
        ctx: &mut ParseContext,
        id: PartId,
    ) -> Result<Option<PartId>, Error>;

    /// Runs the scanner until the part's end offsets are fixed. Called
    /// after child discovery is exhausted; a no-op if a boundary or EOF
    /// already closed the part.
    fn finish_content(
        &self,
        ctx: &mut ParseContext,
        id: PartId,
    ) -> Result<(), Error>;
}

/// MIME parsing: multipart children by boundary, `message/rfc822` as a
/// single embedded child, everything else a leaf.
#[derive(Clone, Copy, Debug, Default)]
pub struct MimeStrategy;

impl MimeStrategy {
    fn is_embedded_message(headers: &HeaderBlock) -> bool {
        headers
            .content_type()
            .map_or(false, |ct| {
                ct.is_type("message") && ct.is_subtype("rfc822")
            })
    }
}

impl ParserStrategy for MimeStrategy {
    fn applies(&self, headers: &HeaderBlock) -> bool {
        headers.has("Content-Type") || headers.has("Mime-Version")
    }

    fn next_child(
        &self,
        ctx: &mut ParseContext,
        id: PartId,
    ) -> Result<Option<PartId>, Error> {
        if ctx.part(id).end_boundary_found
            || ctx.part(id).parent_boundary_found
        {
            return Ok(None);
        }

        if Self::is_embedded_message(&ctx.part(id).headers) {
            // The embedded message is the one child; it runs to whatever
            // closes us
            if ctx.part(id).children_spawned > 0 || !ctx.may_spawn(id) {
                return Ok(None);
            }
            let start = ctx.scanner.pos();
            return ctx.open_part(Some(id), start, true, None).map(Some);
        }

        if !ctx.ensure_boundary(id) {
            // Leaf, or multipart with no usable boundary parameter
            return Ok(None);
        }

        if 0 == ctx.part(id).children_spawned {
            // Consume the preamble up to the first boundary line
            match ctx.scan_to_boundary(id)? {
                ScanOutcome::Boundary {
                    owner,
                    terminal: false,
                } if owner == id => (),
                // Immediately terminal, closed by an ancestor, or EOF
                _ => return Ok(None),
            }
        }

        if !ctx.may_spawn(id) {
            return Ok(None);
        }
        let start = ctx.scanner.pos();
        ctx.open_part(Some(id), start, true, None).map(Some)
    }

    fn finish_content(
        &self,
        ctx: &mut ParseContext,
        id: PartId,
    ) -> Result<(), Error> {
        while ctx.part(id).part_end().is_none() {
            if ctx.part(id).end_boundary_found && ctx.may_spawn(id) {
                // The epilogue after our terminal boundary still belongs
                // to our raw extent; a discardable headerless part
                // consumes it up to whatever closes us
                let start = ctx.scanner.pos();
                let trailer =
                    ctx.open_part(Some(id), start, false, None)?;
                ctx.scan_to_boundary(trailer)?;
            } else {
                // Leaf content, or a degraded container: scan ourselves.
                // Matches of our own boundary (preamble-less or
                // limit-refused children) just keep the loop going.
                ctx.scan_to_boundary(id)?;
            }
        }
        Ok(())
    }
}

/// Non-MIME parsing: free text interleaved with uuencoded sections, each
/// introduced by a `begin {mode} {filename}` sentinel.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonMimeStrategy;

impl NonMimeStrategy {
    /// Closes a section (or fixes the top-level content end) at a
    /// sentinel and records the sentinel for the parent that will spawn
    /// the next section from it.
    fn note_sentinel(
        ctx: &mut ParseContext,
        id: PartId,
        start: u64,
        mode: u32,
        filename: String,
    ) {
        let pending = PendingUu {
            start,
            mode,
            filename,
        };
        if ctx.part(id).uu_info().is_some() {
            // A sibling section begins; this one ends at the sentinel
            ctx.close_part_at(id, start);
            if let Some(parent) = ctx.part(id).parent() {
                ctx.set_pending_uu(parent, pending);
            }
        } else {
            ctx.set_content_end_if_unset(id, start);
            ctx.set_pending_uu(id, pending);
        }
    }
}

impl ParserStrategy for NonMimeStrategy {
    fn applies(&self, _headers: &HeaderBlock) -> bool {
        true
    }

    fn next_child(
        &self,
        ctx: &mut ParseContext,
        id: PartId,
    ) -> Result<Option<PartId>, Error> {
        if ctx.part(id).end_boundary_found
            || ctx.part(id).parent_boundary_found
            || ctx.part(id).uu_info().is_some()
        {
            // uuencoded sections are leaves
            return Ok(None);
        }

        let mut pending = ctx.take_pending_uu(id);
        if pending.is_none() && ctx.part(id).content_end().is_none() {
            // Scan our own text up to the first sentinel
            match ctx.scan_to_sentinel(id)? {
                SentinelOutcome::Begin {
                    start,
                    mode,
                    filename,
                } => {
                    ctx.set_content_end_if_unset(id, start);
                    pending = Some(PendingUu {
                        start,
                        mode,
                        filename,
                    });
                },
                // Boundary or EOF; everything was plain content
                _ => return Ok(None),
            }
        }

        let pending = match pending {
            Some(pending) => pending,
            None => return Ok(None),
        };

        if !ctx.may_spawn(id) {
            return Ok(None);
        }
        ctx.open_part(
            Some(id),
            pending.start,
            false,
            Some(UuInfo {
                mode: pending.mode,
                filename: pending.filename,
            }),
        )
        .map(Some)
    }

    fn finish_content(
        &self,
        ctx: &mut ParseContext,
        id: PartId,
    ) -> Result<(), Error> {
        while ctx.part(id).part_end().is_none() {
            match ctx.scan_to_sentinel(id)? {
                SentinelOutcome::Begin {
                    start,
                    mode,
                    filename,
                } => Self::note_sentinel(ctx, id, start, mode, filename),
                // Closing handled by the scan itself
                _ => (),
            }
        }
        Ok(())
    }
}

/// The priority-ordered strategy list.
pub struct StrategySet {
    strategies: Vec<Rc<dyn ParserStrategy>>,
}

impl Default for StrategySet {
    /// MIME first, then the catch-all.
    fn default() -> Self {
        StrategySet {
            strategies: vec![
                Rc::new(MimeStrategy),
                Rc::new(NonMimeStrategy),
            ],
        }
    }
}

impl StrategySet {
    pub fn new() -> Self {
        StrategySet::default()
    }

    /// Inserts a strategy ahead of everything currently in the list.
    pub fn prepend(&mut self, strategy: Rc<dyn ParserStrategy>) {
        self.strategies.insert(0, strategy);
    }

    /// Selects the first strategy accepting `headers`.
    pub fn select(
        &self,
        headers: &HeaderBlock,
    ) -> Result<Rc<dyn ParserStrategy>, Error> {
        self.strategies
            .iter()
            .find(|s| s.applies(headers))
            .cloned()
            .ok_or(Error::NoCompatibleParser)
    }
}
