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

use std::io;

use thiserror::Error;

/// The crate-wide error type.
///
/// Parsing is deliberately tolerant, so very few conditions actually surface
/// as errors: I/O failures on the underlying source, and configuration
/// mistakes in a caller-supplied strategy list.
#[derive(Error, Debug)]
pub enum Error {
    /// No parser strategy accepted a part's headers.
    ///
    /// Unreachable with the default strategy list, whose catch-all accepts
    /// everything; only a caller-modified list can trigger it.
    #[error("No compatible parser strategy for part")]
    NoCompatibleParser,
    #[error(transparent)]
    Io(#[from] io::Error),
}
