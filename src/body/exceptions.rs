//! Exception handler clauses for CIL method bodies.
//!
//! Fat method bodies may carry one exception handler section describing
//! try/catch/filter/finally/fault regions, as specified by ECMA-335
//! §II.25.4.6. The clauses here are the writable counterpart of that
//! section: they hold the raw offsets and tokens that get encoded, and they
//! participate in a body's content equality so two bodies with identical
//! handlers can be shared.

use bitflags::bitflags;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The clause's `class_token` field contains the metadata token of
        /// the exception type that this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        ///
        /// The clause's `class_token` field carries the offset of the filter
        /// code instead of a type token.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Exception handler defining a try region and its handling code within a method.
///
/// All offsets and lengths are in bytes, relative to the start of the
/// method's IL code. A method body whose handlers all fit the small clause
/// encoding (16-bit try/handler offsets, 8-bit lengths) gets a small
/// exception section; a single clause outside those limits promotes the
/// whole section to the fat encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Offset in bytes of the try block from the start of the IL code.
    pub try_offset: u32,
    /// Length in bytes of the try block.
    pub try_length: u32,
    /// Offset in bytes of the handler for this try block.
    pub handler_offset: u32,
    /// Size of the handler code in bytes.
    pub handler_length: u32,
    /// Metadata token of the caught exception type for [`ExceptionHandlerFlags::EXCEPTION`]
    /// clauses, or the filter code offset for [`ExceptionHandlerFlags::FILTER`] clauses.
    pub class_token: u32,
}
