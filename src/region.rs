//! The method body region: pooling, layout assignment, and emission.
//!
//! [`MethodBodyRegion`] collects every method body destined for the image,
//! optionally sharing byte-identical ones, then fixes the layout in a single
//! `set_position` call and replays it verbatim when the region is written
//! out.
//!
//! # Layout Strategy
//!
//! Positions are assigned in two passes over the admission order: first all
//! tiny bodies, packed back to back with no padding, then all fat bodies,
//! each preceded by the padding that brings its RVA to the next 4-byte
//! boundary. Grouping the classes keeps the total padding down compared to
//! interleaving, since only the fat header format carries an alignment
//! requirement.
//!
//! # Lifecycle
//!
//! ```text
//! Open --(add)*--> Open --set_position--> Frozen --(queries | write_to)*
//! ```
//!
//! `add` is only legal while the region is open; `set_position` transitions
//! it exactly once; length and offset queries and `write_to` are only legal
//! afterwards. There is no path back: violations fail with
//! [`Error::InvalidState`].

use std::collections::HashSet;
use std::rc::Rc;

use crate::{
    addressing::{FileOffset, Rva},
    body::MethodBody,
    chunk::{BodyChunk, ChunkSink},
    Error, Result,
};

/// Alignment boundary required in front of every fat method body.
const FAT_BODY_ALIGNMENT: u32 = 4;

/// Padding needed in front of a fat body at `rva`.
///
/// Both the layout pass and the emission pass call this one helper, so the
/// padding they account for can never diverge.
fn fat_body_padding(rva: Rva) -> u32 {
    rva.align_up(FAT_BODY_ALIGNMENT) - rva
}

/// Content index used while sharing is enabled: one set per header class,
/// each holding the canonical instance for a given body content.
struct DedupIndex<B> {
    tiny: HashSet<Rc<B>>,
    fat: HashSet<Rc<B>>,
}

/// Region lifecycle state. The dedup indices are owned by the open phase,
/// so freezing the layout tears them down structurally - there is no frozen
/// region that could still admit a body.
enum RegionState<B> {
    /// Accepting bodies; holds the dedup indices while sharing is enabled.
    Open { dedup: Option<DedupIndex<B>> },
    /// Layout assigned; admissions are rejected and queries are served from
    /// the recorded base position and total length.
    Frozen {
        offset: FileOffset,
        rva: Rva,
        length: u32,
    },
}

/// Stores every method body of an image and turns them into laid-out bytes.
///
/// The region is generic over the [`BodyChunk`] contract with
/// [`MethodBody`] as the default record type, so hosts with their own body
/// representation can reuse the same pooling and layout machinery.
///
/// Admission returns an `Rc` handle to the retained body: with sharing
/// enabled, admitting a body whose content was seen before hands back the
/// canonical instance admitted first and counts the duplicate's size as
/// saved. After `set_position` the handle's assigned position can be read
/// back, e.g. to fill `MethodDef` RVA columns.
///
/// # Examples
///
/// ```rust
/// use cilbody::prelude::*;
///
/// let mut region = MethodBodyRegion::new(true);
///
/// let a = region.add(MethodBody::new(vec![0x02, 0x2A]))?;
/// let b = region.add(MethodBody::new(vec![0x02, 0x2A]))?;
/// assert!(std::rc::Rc::ptr_eq(&a, &b));
/// assert_eq!(region.saved_bytes(), 3);
///
/// region.set_position(FileOffset::new(0x200), Rva::new(0x2000))?;
/// assert_eq!(region.file_length()?, 3);
///
/// let mut output = Vec::new();
/// region.write_to(&mut output)?;
/// assert_eq!(output, [0x0A, 0x02, 0x2A]);
/// # Ok::<(), cilbody::Error>(())
/// ```
pub struct MethodBodyRegion<B: BodyChunk = MethodBody> {
    /// Tiny bodies in admission order, laid out first
    tiny_bodies: Vec<Rc<B>>,
    /// Fat bodies in admission order, laid out after the tiny ones
    fat_bodies: Vec<Rc<B>>,
    /// Whether fat bodies are aligned to [`FAT_BODY_ALIGNMENT`]
    align_fat_bodies: bool,
    /// Bytes avoided in the output by sharing bodies
    saved_bytes: u32,
    state: RegionState<B>,
}

impl<B: BodyChunk> MethodBodyRegion<B> {
    /// Creates an empty region.
    ///
    /// # Arguments
    /// * `share_bodies` - `true` if byte-identical bodies can be stored once
    ///   and shared
    #[must_use]
    pub fn new(share_bodies: bool) -> MethodBodyRegion<B> {
        MethodBodyRegion {
            tiny_bodies: Vec::new(),
            fat_bodies: Vec::new(),
            align_fat_bodies: true,
            saved_bytes: 0,
            state: RegionState::Open {
                dedup: share_bodies.then(|| DedupIndex {
                    tiny: HashSet::new(),
                    fat: HashSet::new(),
                }),
            },
        }
    }

    /// Adds a method body and returns the instance that has been retained.
    ///
    /// With sharing enabled, a body whose content equals an earlier
    /// admission is dropped in favor of the canonical instance, and the
    /// duplicate's size is added to [`MethodBodyRegion::saved_bytes`].
    /// Otherwise the submitted body itself is retained, appended to the
    /// sequence matching its header class.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if `set_position` has already been
    /// called.
    pub fn add(&mut self, body: B) -> Result<Rc<B>> {
        match &mut self.state {
            RegionState::Frozen { .. } => Err(Error::InvalidState(
                "cannot add a method body after set_position",
            )),
            RegionState::Open { dedup: Some(index) } => {
                let set = if body.is_fat() {
                    &mut index.fat
                } else {
                    &mut index.tiny
                };
                if let Some(cached) = set.get(&body) {
                    self.saved_bytes += body.size();
                    return Ok(Rc::clone(cached));
                }

                let body = Rc::new(body);
                set.insert(Rc::clone(&body));
                let list = if body.is_fat() {
                    &mut self.fat_bodies
                } else {
                    &mut self.tiny_bodies
                };
                list.push(Rc::clone(&body));
                Ok(body)
            }
            RegionState::Open { dedup: None } => {
                let body = Rc::new(body);
                let list = if body.is_fat() {
                    &mut self.fat_bodies
                } else {
                    &mut self.tiny_bodies
                };
                list.push(Rc::clone(&body));
                Ok(body)
            }
        }
    }

    /// Assigns file offsets and RVAs to every retained body and freezes the
    /// layout.
    ///
    /// Tiny bodies are placed first, in admission order and without
    /// padding. Fat bodies follow, each aligned up to the next 4-byte RVA
    /// boundary before it is placed. The dedup indices are dropped here; no
    /// further admissions are possible.
    ///
    /// # Arguments
    /// * `offset` - File offset of the start of the region
    /// * `rva` - RVA of the start of the region
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the layout has already been
    /// frozen.
    pub fn set_position(&mut self, offset: FileOffset, rva: Rva) -> Result<()> {
        if let RegionState::Frozen { .. } = self.state {
            return Err(Error::InvalidState("set_position has already been called"));
        }

        let mut current_offset = offset;
        let mut current_rva = rva;

        for body in &self.tiny_bodies {
            body.set_position(current_offset, current_rva);
            let length = body.size();
            current_offset += length;
            current_rva += length;
        }

        for body in &self.fat_bodies {
            if self.align_fat_bodies {
                let padding = fat_body_padding(current_rva);
                current_offset += padding;
                current_rva += padding;
            }
            body.set_position(current_offset, current_rva);
            let length = body.size();
            current_offset += length;
            current_rva += length;
        }

        // Replacing the open state drops the dedup indices with it
        self.state = RegionState::Frozen {
            offset,
            rva,
            length: current_rva - rva,
        };
        Ok(())
    }

    /// The file offset assigned to the start of the region.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] before `set_position`.
    pub fn file_offset(&self) -> Result<FileOffset> {
        match self.state {
            RegionState::Frozen { offset, .. } => Ok(offset),
            RegionState::Open { .. } => Err(Error::InvalidState("position not assigned yet")),
        }
    }

    /// The RVA assigned to the start of the region.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] before `set_position`.
    pub fn rva(&self) -> Result<Rva> {
        match self.state {
            RegionState::Frozen { rva, .. } => Ok(rva),
            RegionState::Open { .. } => Err(Error::InvalidState("position not assigned yet")),
        }
    }

    /// Total size of the region in the output file, padding included.
    ///
    /// Stable across calls once the layout is frozen.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] before `set_position`.
    pub fn file_length(&self) -> Result<u32> {
        match self.state {
            RegionState::Frozen { length, .. } => Ok(length),
            RegionState::Open { .. } => Err(Error::InvalidState("position not assigned yet")),
        }
    }

    /// Size of the region in the mapped image; equal to
    /// [`MethodBodyRegion::file_length`], since the region introduces no
    /// virtual-only padding.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] before `set_position`.
    pub fn virtual_size(&self) -> Result<u32> {
        self.file_length()
    }

    /// The number of bytes saved by re-using method bodies.
    #[must_use]
    pub fn saved_bytes(&self) -> u32 {
        self.saved_bytes
    }

    /// The number of bodies the region retains across both header classes.
    #[must_use]
    pub fn body_count(&self) -> usize {
        self.tiny_bodies.len() + self.fat_bodies.len()
    }

    /// Writes the region to `sink`, reproducing the frozen layout
    /// byte-for-byte.
    ///
    /// Re-walks both sequences in layout order. The padding in front of
    /// each fat body is recomputed with the same rule the layout pass used,
    /// and every body's written size is checked against the size the layout
    /// reserved for it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] before `set_position`,
    /// [`Error::LengthMismatch`] if a body writes a different number of
    /// bytes than it was laid out with, or the sink's error if writing
    /// fails.
    pub fn write_to(&self, sink: &mut dyn ChunkSink) -> Result<()> {
        let mut current_rva = match self.state {
            RegionState::Frozen { rva, .. } => rva,
            RegionState::Open { .. } => {
                return Err(Error::InvalidState("cannot write before set_position"))
            }
        };

        for body in &self.tiny_bodies {
            current_rva += self.write_verified(body, sink)?;
        }

        for body in &self.fat_bodies {
            if self.align_fat_bodies {
                let padding = fat_body_padding(current_rva);
                sink.write_zeros(padding as usize)?;
                current_rva += padding;
            }
            current_rva += self.write_verified(body, sink)?;
        }
        Ok(())
    }

    /// Writes one body and verifies it produced exactly the size the layout
    /// pass reserved.
    fn write_verified(&self, body: &Rc<B>, sink: &mut dyn ChunkSink) -> Result<u32> {
        let expected = body.size();
        let actual = body.write_to(sink)?;
        if actual != expected {
            return Err(Error::LengthMismatch { expected, actual });
        }
        Ok(actual)
    }
}
