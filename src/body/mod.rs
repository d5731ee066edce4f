//! Writable CIL method bodies and their ECMA-335 encodings.
//!
//! This module provides [`MethodBody`], the concrete record type the region
//! lays out: it owns a method's IL code, stack and local variable metadata,
//! and exception handler clauses, and knows how to encode itself with either
//! the tiny (1 byte) or fat (12 byte) header format.
//!
//! # Method Body Format
//!
//! .NET methods have two header formats (ECMA-335 §II.25.4):
//!
//! ## Tiny Format (1 byte header)
//! - Code size ≤ 63 bytes
//! - Max stack = 8 (implied)
//! - No local variables
//! - No exception handlers
//!
//! ## Fat Format (12 byte header)
//! - Code size up to 4GB
//! - Configurable max stack
//! - Local variable signature token
//! - Optional exception handler section, 4-byte aligned after the code
//!
//! Exception handler clauses use the small 12-byte encoding when every
//! clause fits its field widths and the whole section size fits one byte;
//! otherwise the section is promoted to the fat 24-byte clause encoding.
//!
//! # References
//! - ECMA-335 6th Edition, Partition II, Section 25.4 - Method Header Format

mod exceptions;
mod types;

pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::{MethodBodyFlags, SectionFlags};

use std::cell::Cell;
use std::hash::{Hash, Hasher};

use crate::{
    addressing::{FileOffset, Rva},
    chunk::{BodyChunk, ChunkSink},
    utils::align_to,
    Result,
};

/// Largest code size the tiny header's 6-bit length field can describe.
const TINY_MAX_CODE_SIZE: usize = 63;
/// Operand stack depth implied by the tiny format.
const TINY_MAX_STACK: u16 = 8;
/// Size of the fat method header in bytes.
const FAT_HEADER_SIZE: u32 = 12;
/// Size of the exception section header in bytes.
const SECTION_HEADER_SIZE: u32 = 4;
/// Size of one clause in the small exception section encoding.
const SMALL_CLAUSE_SIZE: u32 = 12;
/// Size of one clause in the fat exception section encoding.
const FAT_CLAUSE_SIZE: u32 = 24;

/// One method compiled to CIL, ready to be pooled and laid out.
///
/// A `MethodBody` is immutable content plus one late-bound property: the
/// `(FileOffset, Rva)` pair assigned when the owning region's layout
/// freezes. Equality and hashing cover the content only - exactly the
/// inputs to the encoding - which is what makes content-based sharing in
/// [`crate::region::MethodBodyRegion`] sound.
///
/// The header format is not chosen by the caller: a body classifies itself
/// tiny or fat from its own content, per ECMA-335 §II.25.4.
///
/// # Examples
///
/// ```rust
/// use cilbody::body::MethodBody;
///
/// // ldarg.0; ret
/// let body = MethodBody::new(vec![0x02, 0x2A]);
/// assert!(!body.is_fat());
/// assert_eq!(body.size(), 3); // 1 byte header + 2 bytes code
///
/// // 100 nops cannot use the tiny header
/// let large = MethodBody::new(vec![0x00; 100]).with_max_stack(2);
/// assert!(large.is_fat());
/// assert_eq!(large.size(), 112); // 12 byte header + 100 bytes code
/// ```
#[derive(Debug)]
pub struct MethodBody {
    /// Maximum number of items on the operand stack
    max_stack: u16,
    /// `MetaData` token for the local variable signature. 0 == no local variables
    local_var_sig_token: u32,
    /// Call the default constructor on all local variables
    init_locals: bool,
    /// The method's IL code, headerless
    code: Vec<u8>,
    /// Exception handler clauses, encoded as a trailing data section
    exception_handlers: Vec<ExceptionHandler>,
    /// Position assigned by the owning region's layout pass
    position: Cell<Option<(FileOffset, Rva)>>,
}

impl MethodBody {
    /// Creates a method body for the given IL code.
    ///
    /// Defaults: max stack 8, no local variable signature, locals not
    /// zero-initialized, no exception handlers. Bodies built this way stay
    /// tiny as long as the code fits 63 bytes.
    #[must_use]
    pub fn new(code: Vec<u8>) -> MethodBody {
        MethodBody {
            max_stack: TINY_MAX_STACK,
            local_var_sig_token: 0,
            init_locals: false,
            code,
            exception_handlers: Vec::new(),
            position: Cell::new(None),
        }
    }

    /// Sets the maximum operand stack depth.
    #[must_use]
    pub fn with_max_stack(mut self, max_stack: u16) -> MethodBody {
        self.max_stack = max_stack;
        self
    }

    /// Sets the metadata token of the local variable signature.
    #[must_use]
    pub fn with_local_var_sig_token(mut self, token: u32) -> MethodBody {
        self.local_var_sig_token = token;
        self
    }

    /// Requests zero-initialization of all local variables.
    #[must_use]
    pub fn with_init_locals(mut self, init_locals: bool) -> MethodBody {
        self.init_locals = init_locals;
        self
    }

    /// Sets the exception handler clauses.
    #[must_use]
    pub fn with_exception_handlers(mut self, handlers: Vec<ExceptionHandler>) -> MethodBody {
        self.exception_handlers = handlers;
        self
    }

    /// The method's IL code.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Maximum number of items on the operand stack.
    #[must_use]
    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    /// Metadata token of the local variable signature, 0 if none.
    #[must_use]
    pub fn local_var_sig_token(&self) -> u32 {
        self.local_var_sig_token
    }

    /// Whether locals are zero-initialized on entry.
    #[must_use]
    pub fn init_locals(&self) -> bool {
        self.init_locals
    }

    /// The exception handler clauses of this body.
    #[must_use]
    pub fn exception_handlers(&self) -> &[ExceptionHandler] {
        &self.exception_handlers
    }

    /// The position assigned by the owning region, `None` until the
    /// region's layout has been frozen.
    ///
    /// Hosts read the RVA half to fill the `MethodDef` table's RVA column.
    #[must_use]
    pub fn position(&self) -> Option<(FileOffset, Rva)> {
        self.position.get()
    }

    /// `true` if this body requires the fat header format.
    ///
    /// A body is tiny only when the code fits the 6-bit length field, the
    /// stack depth fits the implied maximum, and there are neither local
    /// variables nor exception handlers.
    #[must_use]
    pub fn is_fat(&self) -> bool {
        !(self.code.len() <= TINY_MAX_CODE_SIZE
            && self.max_stack <= TINY_MAX_STACK
            && self.local_var_sig_token == 0
            && self.exception_handlers.is_empty())
    }

    /// Encoded size of this body in bytes: header, code, and for fat bodies
    /// the aligned exception handler section.
    ///
    /// The size depends on content only and never changes once the body is
    /// constructed.
    #[must_use]
    pub fn size(&self) -> u32 {
        if !self.is_fat() {
            return 1 + self.code.len() as u32;
        }

        let mut size = FAT_HEADER_SIZE + self.code.len() as u32;
        if !self.exception_handlers.is_empty() {
            size = align_to(size, 4) + self.section_size();
        }
        size
    }

    /// Writes the encoded body to `sink` and returns the number of bytes
    /// written.
    ///
    /// # Errors
    /// Returns an error if writing to the sink fails.
    pub fn write_to(&self, sink: &mut dyn ChunkSink) -> Result<u32> {
        if !self.is_fat() {
            // Tiny header: length in the upper six bits, format in the lower two
            let header = ((self.code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8;
            sink.write_bytes(&[header])?;
            sink.write_bytes(&self.code)?;
            return Ok(1 + self.code.len() as u32);
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }

        // Flags share their word with the header size in 4-byte units (3)
        let flags_and_size: u16 = flags.bits() | (3 << 12);

        let mut header = [0u8; FAT_HEADER_SIZE as usize];
        header[0..2].copy_from_slice(&flags_and_size.to_le_bytes());
        header[2..4].copy_from_slice(&self.max_stack.to_le_bytes());
        header[4..8].copy_from_slice(&(self.code.len() as u32).to_le_bytes());
        header[8..12].copy_from_slice(&self.local_var_sig_token.to_le_bytes());
        sink.write_bytes(&header)?;
        sink.write_bytes(&self.code)?;

        let mut written = FAT_HEADER_SIZE + self.code.len() as u32;
        if !self.exception_handlers.is_empty() {
            // The section must start 4-byte aligned relative to the body;
            // fat bodies themselves start on a 4-byte boundary
            let padding = align_to(written, 4) - written;
            sink.write_zeros(padding as usize)?;
            written += padding;
            written += self.write_exception_section(sink)?;
        }
        Ok(written)
    }

    /// `true` if any clause exceeds the small encoding's field widths, or
    /// the small section size would not fit its one-byte size field.
    fn needs_fat_clauses(&self) -> bool {
        let handler_count = self.exception_handlers.len() as u32;
        if SECTION_HEADER_SIZE + handler_count * SMALL_CLAUSE_SIZE > 0xFF {
            return true;
        }
        self.exception_handlers.iter().any(|handler| {
            handler.try_offset > 0xFFFF
                || handler.try_length > 0xFF
                || handler.handler_offset > 0xFFFF
                || handler.handler_length > 0xFF
        })
    }

    /// Size of the exception handler section, header included.
    fn section_size(&self) -> u32 {
        let clause_size = if self.needs_fat_clauses() {
            FAT_CLAUSE_SIZE
        } else {
            SMALL_CLAUSE_SIZE
        };
        SECTION_HEADER_SIZE + self.exception_handlers.len() as u32 * clause_size
    }

    /// Writes the exception handler section (ECMA-335 §II.25.4.5/6) and
    /// returns its size.
    fn write_exception_section(&self, sink: &mut dyn ChunkSink) -> Result<u32> {
        let fat_clauses = self.needs_fat_clauses();
        let size = self.section_size();

        let mut section_flags = SectionFlags::EHTABLE;
        if fat_clauses {
            section_flags |= SectionFlags::FAT_FORMAT;
        }

        // Kind byte followed by a 24-bit data size; the small format only
        // uses the low byte and zeroes the rest
        let header = [
            section_flags.bits(),
            (size & 0xFF) as u8,
            ((size >> 8) & 0xFF) as u8,
            ((size >> 16) & 0xFF) as u8,
        ];
        sink.write_bytes(&header)?;

        if fat_clauses {
            for handler in &self.exception_handlers {
                let mut clause = [0u8; FAT_CLAUSE_SIZE as usize];
                clause[0..4].copy_from_slice(&u32::from(handler.flags.bits()).to_le_bytes());
                clause[4..8].copy_from_slice(&handler.try_offset.to_le_bytes());
                clause[8..12].copy_from_slice(&handler.try_length.to_le_bytes());
                clause[12..16].copy_from_slice(&handler.handler_offset.to_le_bytes());
                clause[16..20].copy_from_slice(&handler.handler_length.to_le_bytes());
                clause[20..24].copy_from_slice(&handler.class_token.to_le_bytes());
                sink.write_bytes(&clause)?;
            }
        } else {
            for handler in &self.exception_handlers {
                let mut clause = [0u8; SMALL_CLAUSE_SIZE as usize];
                clause[0..2].copy_from_slice(&handler.flags.bits().to_le_bytes());
                clause[2..4].copy_from_slice(&(handler.try_offset as u16).to_le_bytes());
                clause[4] = handler.try_length as u8;
                clause[5..7].copy_from_slice(&(handler.handler_offset as u16).to_le_bytes());
                clause[7] = handler.handler_length as u8;
                clause[8..12].copy_from_slice(&handler.class_token.to_le_bytes());
                sink.write_bytes(&clause)?;
            }
        }
        Ok(size)
    }
}

impl BodyChunk for MethodBody {
    fn is_fat(&self) -> bool {
        MethodBody::is_fat(self)
    }

    fn size(&self) -> u32 {
        MethodBody::size(self)
    }

    fn set_position(&self, offset: FileOffset, rva: Rva) {
        self.position.set(Some((offset, rva)));
    }

    fn write_to(&self, sink: &mut dyn ChunkSink) -> Result<u32> {
        MethodBody::write_to(self, sink)
    }
}

impl PartialEq for MethodBody {
    fn eq(&self, other: &MethodBody) -> bool {
        self.max_stack == other.max_stack
            && self.local_var_sig_token == other.local_var_sig_token
            && self.init_locals == other.init_locals
            && self.code == other.code
            && self.exception_handlers == other.exception_handlers
    }
}

impl Eq for MethodBody {}

impl Hash for MethodBody {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.max_stack.hash(state);
        self.local_var_sig_token.hash(state);
        self.init_locals.hash(state);
        self.code.hash(state);
        self.exception_handlers.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn written_bytes(body: &MethodBody) -> Vec<u8> {
        let mut sink = Vec::new();
        let written = body.write_to(&mut sink).unwrap();
        assert_eq!(written, body.size());
        assert_eq!(written as usize, sink.len());
        sink
    }

    fn hash_of(body: &MethodBody) -> u64 {
        let mut hasher = DefaultHasher::new();
        body.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn tiny_encoding() {
        // ldarg.0; ret
        let body = MethodBody::new(vec![0x02, 0x2A]);
        assert!(!body.is_fat());
        assert_eq!(body.size(), 3);

        let bytes = written_bytes(&body);
        // Header: (2 << 2) | 0x02 = 0x0A
        assert_eq!(bytes, [0x0A, 0x02, 0x2A]);
    }

    #[test]
    fn fat_encoding() {
        let body = MethodBody::new(vec![0x00; 100])
            .with_max_stack(8)
            .with_local_var_sig_token(0x1100_0001)
            .with_init_locals(true);
        assert!(body.is_fat());
        assert_eq!(body.size(), 112);

        let bytes = written_bytes(&body);
        // FAT_FORMAT | INIT_LOCALS | header size 3 dwords
        assert_eq!(&bytes[0..2], &0x3013u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &8u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &100u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x1100_0001u32.to_le_bytes());
        assert!(bytes[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn classification_boundaries() {
        assert!(!MethodBody::new(vec![0x00; 63]).is_fat());
        assert!(MethodBody::new(vec![0x00; 64]).is_fat());
        assert!(MethodBody::new(vec![0x2A]).with_max_stack(9).is_fat());
        assert!(MethodBody::new(vec![0x2A])
            .with_local_var_sig_token(0x1100_0001)
            .is_fat());
        assert!(MethodBody::new(vec![0x2A])
            .with_exception_handlers(vec![finally_handler()])
            .is_fat());
    }

    fn finally_handler() -> ExceptionHandler {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: 4,
            handler_offset: 4,
            handler_length: 2,
            class_token: 0,
        }
    }

    #[test]
    fn small_exception_section() {
        // 10 bytes of code: header + code = 22, padded to 24, then a
        // 16 byte section
        let body = MethodBody::new(vec![0x00; 10])
            .with_max_stack(1)
            .with_exception_handlers(vec![finally_handler()]);
        assert_eq!(body.size(), 40);

        let bytes = written_bytes(&body);
        // Two alignment bytes between code and section
        assert_eq!(&bytes[22..24], &[0, 0]);
        // Section header: EHTABLE, size 16, reserved zeros
        assert_eq!(&bytes[24..28], &[0x01, 16, 0, 0]);
        // Small clause: flags u16, try_offset u16, try_length u8,
        // handler_offset u16, handler_length u8, class_token u32
        assert_eq!(
            &bytes[28..40],
            &[0x02, 0x00, 0x00, 0x00, 0x04, 0x04, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn fat_exception_section() {
        // A handler length beyond u8 promotes every clause to the fat encoding
        let handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_offset: 0,
            try_length: 8,
            handler_offset: 8,
            handler_length: 0x100,
            class_token: 0x0100_0010,
        };
        let body = MethodBody::new(vec![0x00; 8])
            .with_max_stack(1)
            .with_exception_handlers(vec![handler]);
        // 12 + 8 code, already aligned, + 4 + 24
        assert_eq!(body.size(), 48);

        let bytes = written_bytes(&body);
        assert_eq!(&bytes[20..24], &[0x41, 28, 0, 0]);
        assert_eq!(&bytes[24..28], &0u32.to_le_bytes());
        assert_eq!(&bytes[28..32], &0u32.to_le_bytes());
        assert_eq!(&bytes[32..36], &8u32.to_le_bytes());
        assert_eq!(&bytes[36..40], &8u32.to_le_bytes());
        assert_eq!(&bytes[40..44], &0x100u32.to_le_bytes());
        assert_eq!(&bytes[44..48], &0x0100_0010u32.to_le_bytes());
    }

    #[test]
    fn many_small_clauses_promote_to_fat() {
        // 21 small clauses would need 4 + 21 * 12 = 256 bytes, one past the
        // one-byte size field
        let handlers = vec![finally_handler(); 21];
        let body = MethodBody::new(vec![0x00; 4])
            .with_max_stack(1)
            .with_exception_handlers(handlers);

        let bytes = written_bytes(&body);
        let section_flags = SectionFlags::from_bits_truncate(bytes[16]);
        assert!(section_flags.contains(SectionFlags::FAT_FORMAT));
        assert_eq!(body.size(), 16 + 4 + 21 * 24);
    }

    #[test]
    fn equality_ignores_assigned_position() {
        let first = MethodBody::new(vec![0x02, 0x2A]);
        let second = MethodBody::new(vec![0x02, 0x2A]);
        BodyChunk::set_position(&first, FileOffset::new(0x200), Rva::new(0x2000));

        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));
    }

    #[test]
    fn equality_tracks_encoded_content() {
        let base = MethodBody::new(vec![0x02, 0x2A]);
        assert_ne!(base, MethodBody::new(vec![0x03, 0x2A]));
        assert_ne!(base, MethodBody::new(vec![0x02, 0x2A]).with_max_stack(2));
        assert_ne!(
            base,
            MethodBody::new(vec![0x02, 0x2A]).with_local_var_sig_token(0x1100_0001)
        );
        assert_ne!(
            base,
            MethodBody::new(vec![0x02, 0x2A]).with_exception_handlers(vec![finally_handler()])
        );
    }

    #[test]
    fn position_is_none_until_assigned() {
        let body = MethodBody::new(vec![0x2A]);
        assert!(body.position().is_none());

        BodyChunk::set_position(&body, FileOffset::new(4), Rva::new(0x1004));
        assert_eq!(body.position(), Some((FileOffset::new(4), Rva::new(0x1004))));
    }
}
