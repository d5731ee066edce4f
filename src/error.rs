use thiserror::Error;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant describes a defect rather than a transient condition: either the host drove
/// the region outside its documented lifecycle, or a body collaborator broke its encoding
/// contract. Retrying is never appropriate; errors propagate to the host unmodified and abort
/// the current build.
///
/// # Error Categories
///
/// ## Lifecycle Errors
/// - [`Error::InvalidState`] - An operation was attempted in the wrong region state
///
/// ## Contract Errors
/// - [`Error::LengthMismatch`] - A body wrote a different number of bytes than it was laid
///   out with
///
/// ## I/O Errors
/// - [`Error::FileError`] - Sink write failures
///
/// # Examples
///
/// ```rust
/// use cilbody::{Error, MethodBody, MethodBodyRegion};
/// use cilbody::addressing::{FileOffset, Rva};
///
/// let mut region = MethodBodyRegion::new(false);
/// region.set_position(FileOffset::new(0), Rva::new(0x2000))?;
///
/// match region.add(MethodBody::new(vec![0x2A])) {
///     Err(Error::InvalidState(reason)) => println!("caller bug: {}", reason),
///     Err(e) => println!("other error: {}", e),
///     Ok(_) => unreachable!("the region is already frozen"),
/// }
/// # Ok::<(), cilbody::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An operation is not valid for the current region state.
    ///
    /// Raised when a body is added after `set_position`, when `set_position`
    /// is called twice, or when length / offset queries and emission are
    /// attempted before the layout exists. Always a caller-logic defect,
    /// never recoverable locally.
    #[error("Invalid region state - {0}")]
    InvalidState(&'static str),

    /// A method body's written size differs from its laid-out size.
    ///
    /// Detected during emission when the byte count a body reports writing
    /// does not equal the size the layout pass reserved for it. Indicates a
    /// violated [`crate::chunk::BodyChunk`] contract; the build must abort
    /// rather than emit a corrupt image.
    #[error("Method body size changed between layout and write - laid out {expected} bytes, wrote {actual}")]
    LengthMismatch {
        /// The size reserved for the body during layout assignment
        expected: u32,
        /// The number of bytes the body actually wrote
        actual: u32,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors surfaced by the sink while the region is
    /// being written out.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}
