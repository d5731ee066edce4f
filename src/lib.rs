// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # cilbody
//!
//! Layout and serialization of the method body region of a .NET PE executable.
//! `cilbody` collects CIL method bodies, shares byte-identical ones to shrink
//! the output image, assigns every retained body a file offset and RVA, and
//! writes the region out byte-for-byte against that layout.
//!
//! ## Features
//!
//! - **Content-based body sharing** - byte-identical method bodies are stored
//!   once, with the saved output size tracked per region
//! - **Two-pass layout** - tiny bodies are packed back to back, fat bodies are
//!   grouped afterwards so 4-byte alignment padding is only paid where
//!   ECMA-335 requires it
//! - **Deterministic emission** - the write pass replays the exact padding
//!   decisions of the layout pass and verifies every body's size on the way out
//! - **ECMA-335 encodings** - tiny and fat method headers plus small and fat
//!   exception handler sections (ECMA-335 §II.25.4)
//!
//! ## Quick Start
//!
//! ```rust
//! use cilbody::prelude::*;
//!
//! let mut region = MethodBodyRegion::new(true);
//!
//! // `ret` as a one-byte tiny method
//! let body = region.add(MethodBody::new(vec![0x2A]))?;
//!
//! region.set_position(FileOffset::new(0x200), Rva::new(0x2000))?;
//! assert_eq!(body.position().unwrap().1, Rva::new(0x2000));
//!
//! let mut output = Vec::new();
//! region.write_to(&mut output)?;
//! assert_eq!(output, [0x06, 0x2A]);
//! # Ok::<(), cilbody::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`region::MethodBodyRegion`] - the region itself: pool, layout assigner
//!   and emitter behind a strict open/frozen state machine
//! - [`body::MethodBody`] - a concrete CIL method body with its ECMA-335
//!   encoding
//! - [`chunk`] - the [`chunk::BodyChunk`] record contract the region lays out
//!   and the [`chunk::ChunkSink`] contract it writes into
//! - [`addressing`] - [`addressing::FileOffset`] and [`addressing::Rva`]
//!   position value types
//! - [`prelude`] - convenient re-exports of the common types
//!
//! The host image builder decides where the region lives inside the final
//! file, then drives it in order: admit bodies, assign the base position
//! once, query the resulting length, and emit. Admission after the position
//! has been assigned, or assigning it twice, fails with
//! [`Error::InvalidState`].

mod error;

pub mod addressing;
pub mod body;
pub mod chunk;
pub mod prelude;
pub mod region;
mod utils;

/// Convenience `Result` type used throughout this crate.
///
/// # Examples
///
/// ```rust
/// use cilbody::{MethodBodyRegion, Result};
///
/// fn freeze(region: &mut MethodBodyRegion) -> Result<u32> {
///     region.set_position(Default::default(), Default::default())?;
///     region.file_length()
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `cilbody` Error type
///
/// Every failure this crate surfaces is a caller-logic or collaborator
/// contract defect, never a transient condition; see the variants for the
/// taxonomy.
pub use error::Error;

/// Stores every method body of an image and turns them into laid-out bytes.
///
/// See [`region::MethodBodyRegion`] for the full admission / layout /
/// emission lifecycle.
pub use region::MethodBodyRegion;

/// A single CIL method body with its ECMA-335 tiny or fat encoding.
///
/// See [`body::MethodBody`].
pub use body::MethodBody;
