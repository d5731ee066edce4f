//! # cilbody Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits when building a method body region: the region itself, the
//! concrete body type with its flags and exception handler clauses, the
//! collaborator contracts, the position value types, and the crate's error
//! handling.
//!
//! # Examples
//!
//! ```rust
//! use cilbody::prelude::*;
//!
//! let mut region = MethodBodyRegion::new(true);
//! region.add(MethodBody::new(vec![0x2A]))?;
//! region.set_position(FileOffset::new(0x200), Rva::new(0x2000))?;
//! println!("region spans {} bytes", region.file_length()?);
//! # Ok::<(), cilbody::Error>(())
//! ```

pub use crate::{
    addressing::{FileOffset, Rva},
    body::{ExceptionHandler, ExceptionHandlerFlags, MethodBody, MethodBodyFlags, SectionFlags},
    chunk::{BodyChunk, ChunkSink},
    region::MethodBodyRegion,
    Error, Result,
};
