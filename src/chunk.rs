//! Contracts between the region and its collaborators.
//!
//! The region itself never looks inside a body's encoding. It relies on two
//! seams: [`BodyChunk`], implemented by anything that wants to be laid out
//! as a method body, and [`ChunkSink`], implemented by whatever receives the
//! emitted bytes. [`crate::body::MethodBody`] is the crate's own
//! [`BodyChunk`], and every [`std::io::Write`] is a [`ChunkSink`] for free.

use std::hash::Hash;
use std::io::Write;

use crate::{
    addressing::{FileOffset, Rva},
    Result,
};

/// A binary record the region can pool, lay out and emit.
///
/// The `Eq` and `Hash` supertraits carry the sharing contract: they must be
/// computed purely from the bytes the chunk will encode to, never from the
/// assigned position or from metadata that does not affect the output. Two
/// chunks that compare equal must encode to identical bytes of identical
/// length, which is what allows the region to keep only the first of the two.
pub trait BodyChunk: Eq + Hash {
    /// `true` if this chunk uses the fat encoding and therefore must start
    /// on a 4-byte boundary; `false` for the tiny encoding, which can be
    /// packed without padding.
    fn is_fat(&self) -> bool;

    /// Encoded size of this chunk in bytes.
    ///
    /// Must be stable for the lifetime of the chunk: the layout pass
    /// reserves exactly this many bytes and the emission pass verifies the
    /// chunk wrote exactly this many.
    fn size(&self) -> u32;

    /// Accepts the position assigned by the layout pass.
    ///
    /// Takes `&self` so a canonical chunk shared between several admissions
    /// can still record its position; implementations use interior
    /// mutability.
    fn set_position(&self, offset: FileOffset, rva: Rva);

    /// Writes the encoded bytes to `sink` and returns the number of bytes
    /// written.
    ///
    /// # Errors
    /// Returns an error if writing to the sink fails.
    fn write_to(&self, sink: &mut dyn ChunkSink) -> Result<u32>;
}

/// Receives the bytes of an emitted region.
///
/// Only two operations are required: accepting arbitrary byte spans and
/// accepting a run of zero bytes for alignment padding. Every
/// [`std::io::Write`] implements this automatically.
pub trait ChunkSink {
    /// Writes a byte span to the sink.
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails.
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    /// Writes `count` zero bytes to the sink.
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails.
    fn write_zeros(&mut self, count: usize) -> Result<()>;
}

impl<W: Write> ChunkSink for W {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        Ok(())
    }

    fn write_zeros(&mut self, mut count: usize) -> Result<()> {
        const ZEROS: [u8; 16] = [0; 16];

        while count > 0 {
            let run = count.min(ZEROS.len());
            self.write_all(&ZEROS[..run])?;
            count -= run;
        }
        Ok(())
    }
}
