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

//! Lazy, streaming parser for email messages.
//!
//! Messages are parsed into a tree of parts on demand: no part is scanned
//! until a consumer asks for its content or its children, and at no point
//! does the whole message need to reside in memory. Both RFC 2045/2046 MIME
//! multipart structures and legacy non-MIME messages with inline uuencoded
//! sections are supported, with the tolerant-parsing posture expected of
//! mail software: malformed input degrades to "treat it as content" rather
//! than to an error.
//!
//! The usual entry point is [`Message`]; see [`PartProxy`] for what can be
//! done with a parsed part.

#[cfg(test)]
macro_rules! assert_matches {
    ($pat:pat, $val:expr) => {
        match $val {
            $pat => (),
            v => panic!("{:?} does not match {}", v, stringify!($pat)),
        }
    };
}

pub mod mime;
mod support;

pub use crate::mime::proxy::{Message, PartProxy};
pub use crate::mime::strategy::{
    MimeStrategy, NonMimeStrategy, ParserStrategy, StrategySet,
};
pub use crate::support::error::Error;
